//! Abstract Syntax Tree (AST) representation
//!
//! The tree keeps the shape of the FHIRPath grammar: terms, invocations chained
//! with `.`, indexers, and binary operators grouped by precedence level in the
//! parser. Evaluation walks this tree directly.

use crate::temporal::{FhirDate, FhirDateTime, FhirTime};
use rust_decimal::Decimal;

/// AST node representing a FHIRPath expression
#[derive(Debug, Clone, PartialEq)]
pub enum AstNode {
    /// Literal term
    Literal(Literal),

    /// `{ a, b, c }`
    CollectionLiteral(Vec<AstNode>),

    /// `%name`
    ExternalConstant(String),

    /// Identifier evaluated against the current focus
    Member(String),

    /// `name(args...)` evaluated against the current focus
    Function { name: String, args: Vec<AstNode> },

    /// `$this`
    This,

    /// `$index`
    Index,

    /// `$total`
    Total,

    /// `expression '.' invocation`
    Invocation {
        target: Box<AstNode>,
        invocation: Box<AstNode>,
    },

    /// `expression '[' expression ']'`
    Indexer {
        collection: Box<AstNode>,
        index: Box<AstNode>,
    },

    /// Unary `+` / `-`
    Polarity {
        operator: PolarityOperator,
        expression: Box<AstNode>,
    },

    Binary {
        left: Box<AstNode>,
        operator: BinaryOperator,
        right: Box<AstNode>,
    },

    /// `expression ('is' | 'as') typeSpecifier`
    Type {
        expression: Box<AstNode>,
        operator: TypeOperator,
        type_specifier: QualifiedIdentifier,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    /// `{}`
    Null,
    Boolean(bool),
    String(String),
    Integer(i64),
    Decimal(Decimal),
    Date(FhirDate),
    DateTime(FhirDateTime),
    Time(FhirTime),
    /// `5 'mg'` or `3 months`
    Quantity { value: Decimal, unit: String },
}

/// Qualified identifier: identifier ('.' identifier)*
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QualifiedIdentifier {
    pub parts: Vec<String>,
}

impl QualifiedIdentifier {
    pub fn new(parts: Vec<String>) -> Self {
        Self { parts }
    }

    /// Unqualified type name (`FHIR.Coding` and `System.String` drop the namespace)
    pub fn type_name(&self) -> &str {
        self.parts.last().map(String::as_str).unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PolarityOperator {
    Plus,
    Minus,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    // multiplicative
    Multiply,
    Divide,
    Div,
    Mod,
    // additive
    Add,
    Subtract,
    Concat,
    Union,
    // comparison
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    Equal,
    Equivalent,
    NotEqual,
    NotEquivalent,
    // membership
    In,
    Contains,
    // boolean
    And,
    Or,
    Xor,
    Implies,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeOperator {
    Is,
    As,
}

impl AstNode {
    pub(crate) fn binary(left: AstNode, operator: BinaryOperator, right: AstNode) -> Self {
        AstNode::Binary {
            left: Box::new(left),
            operator,
            right: Box::new(right),
        }
    }

    /// Visits this node and every descendant in pre-order.
    pub fn walk<'a>(&'a self, visit: &mut dyn FnMut(&'a AstNode)) {
        visit(self);
        match self {
            AstNode::CollectionLiteral(nodes) | AstNode::Function { args: nodes, .. } => {
                for node in nodes {
                    node.walk(visit);
                }
            }
            AstNode::Invocation { target, invocation } => {
                target.walk(visit);
                invocation.walk(visit);
            }
            AstNode::Indexer { collection, index } => {
                collection.walk(visit);
                index.walk(visit);
            }
            AstNode::Polarity { expression, .. } | AstNode::Type { expression, .. } => {
                expression.walk(visit)
            }
            AstNode::Binary { left, right, .. } => {
                left.walk(visit);
                right.walk(visit);
            }
            AstNode::Literal(_)
            | AstNode::ExternalConstant(_)
            | AstNode::Member(_)
            | AstNode::This
            | AstNode::Index
            | AstNode::Total => {}
        }
    }
}
