//! Tree-walking evaluator.
//!
//! Each node evaluates against a [`Frame`] whose `this` is the focus for
//! unqualified terms: the context focus at the top level, and the current
//! item inside `where()`, `select()` and the other per-item functions.

use crate::ast::{AstNode, BinaryOperator, Literal, PolarityOperator, TypeOperator};
use crate::context::Context;
use crate::error::{Error, Result};
use crate::functions::{self, FunctionKind};
use crate::operations::{self, arithmetic, compare, equals, equivalent, ArithmeticOperator};
use crate::value::{Collection, Value, ValueData};
use std::cmp::Ordering;

/// Upper bound on `repeat()` output to stop runaway self-referencing paths
const MAX_REPEAT_ITEMS: usize = 10_000;

#[derive(Debug, Clone)]
struct Frame {
    this: Collection,
    index: Option<usize>,
    total: Collection,
}

impl Frame {
    fn item(&self, item: &Value, index: usize) -> Self {
        Self {
            this: Collection::singleton(item.clone()),
            index: Some(index),
            total: self.total.clone(),
        }
    }
}

pub struct Evaluator<'a> {
    ctx: &'a Context,
}

impl<'a> Evaluator<'a> {
    pub fn new(ctx: &'a Context) -> Self {
        Self { ctx }
    }

    pub fn evaluate(&self, node: &AstNode) -> Result<Collection> {
        let frame = Frame {
            this: self.ctx.focus().clone(),
            index: None,
            total: Collection::empty(),
        };
        self.eval(node, &frame)
    }

    fn eval(&self, node: &AstNode, frame: &Frame) -> Result<Collection> {
        match node {
            AstNode::Literal(literal) => Ok(literal_value(literal)),
            AstNode::CollectionLiteral(items) => {
                let mut out = Collection::empty();
                for item in items {
                    out.extend(self.eval(item, frame)?);
                }
                Ok(out)
            }
            AstNode::ExternalConstant(name) => self
                .ctx
                .get_variable(name)
                .cloned()
                .ok_or_else(|| Error::VariableNotFound(format!("%{}", name))),
            AstNode::Member(name) => Ok(self.member_at_root(&frame.this, name)),
            AstNode::Function { name, args } => self.call(name, args, frame.this.clone(), frame),
            AstNode::This => Ok(frame.this.clone()),
            AstNode::Index => Ok(frame
                .index
                .map(|i| Collection::singleton(Value::integer(i as i64)))
                .unwrap_or_default()),
            AstNode::Total => Ok(frame.total.clone()),
            AstNode::Invocation { target, invocation } => {
                let input = self.eval(target, frame)?;
                match invocation.as_ref() {
                    AstNode::Member(name) => Ok(navigate(&input, name)),
                    AstNode::Function { name, args } => self.call(name, args, input, frame),
                    other => self.eval(other, frame),
                }
            }
            AstNode::Indexer { collection, index } => {
                let input = self.eval(collection, frame)?;
                let index = self.eval(index, frame)?.as_integer()?;
                Ok(usize::try_from(index)
                    .ok()
                    .and_then(|i| input.get(i).cloned())
                    .map(Collection::singleton)
                    .unwrap_or_default())
            }
            AstNode::Polarity {
                operator,
                expression,
            } => {
                let value = self.eval(expression, frame)?;
                match operator {
                    PolarityOperator::Plus => Ok(value),
                    PolarityOperator::Minus => negate(&value),
                }
            }
            AstNode::Binary {
                left,
                operator,
                right,
            } => self.binary(left, *operator, right, frame),
            AstNode::Type {
                expression,
                operator,
                type_specifier,
            } => {
                let value = self.eval(expression, frame)?;
                type_operation(&value, *operator, type_specifier.type_name())
            }
        }
    }

    /// `Questionnaire.item` names the focus by type before navigating.
    fn member_at_root(&self, focus: &Collection, name: &str) -> Collection {
        if name.starts_with(char::is_uppercase) {
            let typed: Collection = focus
                .iter()
                .filter(|item| item.type_name() == name)
                .cloned()
                .collect();
            if !typed.is_empty() {
                return typed;
            }
        }
        navigate(focus, name)
    }

    fn call(
        &self,
        name: &str,
        args: &[AstNode],
        input: Collection,
        frame: &Frame,
    ) -> Result<Collection> {
        let metadata = functions::lookup(name)?;
        metadata.check_arity(args.len())?;
        let kind = metadata.kind;

        if kind.takes_type() {
            let type_name = type_argument(&args[0])?;
            return match kind {
                FunctionKind::OfType => Ok(input
                    .into_iter()
                    .filter(|item| item.is_type(&type_name))
                    .collect()),
                FunctionKind::Is => type_operation(&input, TypeOperator::Is, &type_name),
                _ => type_operation(&input, TypeOperator::As, &type_name),
            };
        }
        if kind.is_lambda() && !args.is_empty() {
            return self.call_lambda(kind, args, input, frame);
        }

        let mut evaluated = Vec::with_capacity(args.len());
        for arg in args {
            evaluated.push(self.eval(arg, frame)?);
        }
        functions::call(kind, input, &evaluated, self.ctx)
    }

    fn call_lambda(
        &self,
        kind: FunctionKind,
        args: &[AstNode],
        input: Collection,
        frame: &Frame,
    ) -> Result<Collection> {
        let criteria = &args[0];
        match kind {
            FunctionKind::Where => {
                let mut out = Collection::empty();
                for (index, item) in input.iter().enumerate() {
                    let result = self.eval(criteria, &frame.item(item, index))?;
                    if result.to_boolean()? == Some(true) {
                        out.push(item.clone());
                    }
                }
                Ok(out)
            }
            FunctionKind::Select => {
                let mut out = Collection::empty();
                for (index, item) in input.iter().enumerate() {
                    out.extend(self.eval(criteria, &frame.item(item, index))?);
                }
                Ok(out)
            }
            FunctionKind::Repeat => {
                let mut out = Collection::empty();
                let mut frontier = input;
                while !frontier.is_empty() {
                    let mut next = Collection::empty();
                    for (index, item) in frontier.iter().enumerate() {
                        for produced in self.eval(criteria, &frame.item(item, index))? {
                            if !functions::existence::contains_item(&out, &produced) {
                                out.push(produced.clone());
                                next.push(produced);
                            }
                        }
                    }
                    if out.len() > MAX_REPEAT_ITEMS {
                        return Err(Error::EvaluationError(format!(
                            "repeat() produced more than {} items",
                            MAX_REPEAT_ITEMS
                        )));
                    }
                    frontier = next;
                }
                Ok(out)
            }
            FunctionKind::All => {
                for (index, item) in input.iter().enumerate() {
                    let result = self.eval(criteria, &frame.item(item, index))?;
                    if result.to_boolean()? != Some(true) {
                        return Ok(functions::boolean(false));
                    }
                }
                Ok(functions::boolean(true))
            }
            FunctionKind::Exists => {
                for (index, item) in input.iter().enumerate() {
                    let result = self.eval(criteria, &frame.item(item, index))?;
                    if result.to_boolean()? == Some(true) {
                        return Ok(functions::boolean(true));
                    }
                }
                Ok(functions::boolean(false))
            }
            FunctionKind::Iif => {
                // The condition sees the invocation input as $this.
                let condition_frame = Frame {
                    this: input,
                    ..frame.clone()
                };
                let condition = self.eval(criteria, &condition_frame)?.to_boolean()?;
                if condition == Some(true) {
                    self.eval(&args[1], frame)
                } else if let Some(otherwise) = args.get(2) {
                    self.eval(otherwise, frame)
                } else {
                    Ok(Collection::empty())
                }
            }
            _ => Err(Error::InvalidOperation(format!(
                "{:?} does not take an expression argument",
                kind
            ))),
        }
    }

    fn binary(
        &self,
        left: &AstNode,
        operator: BinaryOperator,
        right: &AstNode,
        frame: &Frame,
    ) -> Result<Collection> {
        use BinaryOperator as B;
        if matches!(operator, B::And | B::Or | B::Xor | B::Implies) {
            return self.logical(left, operator, right, frame);
        }

        let lhs = self.eval(left, frame)?;
        let rhs = self.eval(right, frame)?;
        match operator {
            B::Union => functions::combining::union(lhs, &rhs),
            B::Equal => Ok(optional_boolean(equals(&lhs, &rhs))),
            B::NotEqual => Ok(optional_boolean(equals(&lhs, &rhs).map(|b| !b))),
            B::Equivalent => Ok(functions::boolean(equivalent(&lhs, &rhs))),
            B::NotEquivalent => Ok(functions::boolean(!equivalent(&lhs, &rhs))),
            B::LessThan | B::LessThanOrEqual | B::GreaterThan | B::GreaterThanOrEqual => {
                let (Some(a), Some(b)) = (lhs.as_singleton()?, rhs.as_singleton()?) else {
                    return Ok(Collection::empty());
                };
                let result = compare(a, b)?.map(|ordering| match operator {
                    B::LessThan => ordering == Ordering::Less,
                    B::LessThanOrEqual => ordering != Ordering::Greater,
                    B::GreaterThan => ordering == Ordering::Greater,
                    _ => ordering != Ordering::Less,
                });
                Ok(optional_boolean(result))
            }
            B::In => membership(&lhs, &rhs),
            B::Contains => membership(&rhs, &lhs),
            B::Concat => {
                let text = |c: &Collection| -> Result<String> {
                    Ok(c.as_singleton()?
                        .and_then(|v| v.as_str().map(str::to_string))
                        .unwrap_or_default())
                };
                Ok(Collection::singleton(Value::string(format!(
                    "{}{}",
                    text(&lhs)?,
                    text(&rhs)?
                ))))
            }
            B::Add | B::Subtract | B::Multiply | B::Divide | B::Div | B::Mod => {
                let (Some(a), Some(b)) = (lhs.as_singleton()?, rhs.as_singleton()?) else {
                    return Ok(Collection::empty());
                };
                let op = match operator {
                    B::Add => ArithmeticOperator::Add,
                    B::Subtract => ArithmeticOperator::Subtract,
                    B::Multiply => ArithmeticOperator::Multiply,
                    B::Divide => ArithmeticOperator::Divide,
                    B::Div => ArithmeticOperator::Div,
                    _ => ArithmeticOperator::Mod,
                };
                Ok(arithmetic(op, a, b)?
                    .map(Collection::singleton)
                    .unwrap_or_default())
            }
            B::And | B::Or | B::Xor | B::Implies => unreachable!("handled above"),
        }
    }

    /// Three-valued logic; the right operand is skipped when the left decides.
    fn logical(
        &self,
        left: &AstNode,
        operator: BinaryOperator,
        right: &AstNode,
        frame: &Frame,
    ) -> Result<Collection> {
        let lhs = self.eval(left, frame)?.to_boolean()?;
        let short_circuit = match (operator, lhs) {
            (BinaryOperator::And, Some(false)) => Some(false),
            (BinaryOperator::Or, Some(true)) => Some(true),
            (BinaryOperator::Implies, Some(false)) => Some(true),
            _ => None,
        };
        if let Some(result) = short_circuit {
            return Ok(functions::boolean(result));
        }
        let rhs = self.eval(right, frame)?.to_boolean()?;
        let result = match operator {
            BinaryOperator::And => match (lhs, rhs) {
                (_, Some(false)) => Some(false),
                (Some(true), Some(true)) => Some(true),
                _ => None,
            },
            BinaryOperator::Or => match (lhs, rhs) {
                (_, Some(true)) => Some(true),
                (Some(false), Some(false)) => Some(false),
                _ => None,
            },
            BinaryOperator::Xor => match (lhs, rhs) {
                (Some(a), Some(b)) => Some(a != b),
                _ => None,
            },
            _ => match (lhs, rhs) {
                (_, Some(true)) => Some(true),
                (Some(true), Some(false)) => Some(false),
                _ => None,
            },
        };
        Ok(optional_boolean(result))
    }
}

fn navigate(input: &Collection, name: &str) -> Collection {
    let mut out = Collection::empty();
    for item in input {
        out.extend(item.navigate(name));
    }
    out
}

fn literal_value(literal: &Literal) -> Collection {
    let value = match literal {
        Literal::Null => return Collection::empty(),
        Literal::Boolean(b) => Value::boolean(*b),
        Literal::String(s) => Value::string(s.as_str()),
        Literal::Integer(i) => Value::integer(*i),
        Literal::Decimal(d) => Value::decimal(*d),
        Literal::Date(d) => Value::date(*d),
        Literal::DateTime(d) => Value::date_time(*d),
        Literal::Time(t) => Value::time(*t),
        Literal::Quantity { value, unit } => Value::quantity(*value, unit.as_str()),
    };
    Collection::singleton(value)
}

fn optional_boolean(value: Option<bool>) -> Collection {
    value.map(functions::boolean).unwrap_or_default()
}

fn negate(value: &Collection) -> Result<Collection> {
    let Some(item) = value.as_singleton()? else {
        return Ok(Collection::empty());
    };
    let negated = match item.data() {
        ValueData::Integer(i) => match i.checked_neg() {
            Some(negated) => Value::integer(negated),
            None => return Ok(Collection::empty()),
        },
        ValueData::Decimal(d) => Value::decimal(-*d),
        ValueData::Quantity { value, unit } => Value::quantity(-*value, unit.clone()),
        _ => {
            return Err(Error::TypeError(format!(
                "Cannot negate {}",
                item.type_name()
            )))
        }
    };
    Ok(Collection::singleton(negated))
}

/// `item in collection`: empty item gives empty, otherwise equality membership.
fn membership(item: &Collection, collection: &Collection) -> Result<Collection> {
    let Some(item) = item.as_singleton()? else {
        return Ok(Collection::empty());
    };
    Ok(functions::boolean(collection.iter().any(|candidate| {
        operations::item_equals(item, candidate).unwrap_or(false)
    })))
}

fn type_operation(value: &Collection, operator: TypeOperator, type_name: &str) -> Result<Collection> {
    let Some(item) = value.as_singleton()? else {
        return Ok(Collection::empty());
    };
    let matches = item.is_type(type_name);
    Ok(match operator {
        TypeOperator::Is => functions::boolean(matches),
        TypeOperator::As if matches => Collection::singleton(item.clone()),
        TypeOperator::As => Collection::empty(),
    })
}

/// Extracts `Coding` or `FHIR.Coding` from a function argument.
fn type_argument(node: &AstNode) -> Result<String> {
    match node {
        AstNode::Member(name) => Ok(name.clone()),
        AstNode::Invocation { invocation, .. } => type_argument(invocation),
        other => Err(Error::EvaluationError(format!(
            "Expected a type specifier, got {:?}",
            other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use serde_json::json;

    fn eval(expr: &str, resource: serde_json::Value) -> Collection {
        let ctx = Context::from_json(&resource);
        Evaluator::new(&ctx).evaluate(&parse(expr).unwrap()).unwrap()
    }

    #[test]
    fn test_three_valued_and() {
        assert_eq!(eval("{} and false", json!({})), functions::boolean(false));
        assert!(eval("{} and true", json!({})).is_empty());
        assert_eq!(eval("false implies {}", json!({})), functions::boolean(true));
    }

    #[test]
    fn test_root_type_prefix() {
        let result = eval(
            "Questionnaire.item.linkId",
            json!({"resourceType": "Questionnaire", "item": [{"linkId": "a"}]}),
        );
        assert_eq!(result, Collection::singleton(Value::string("a")));
    }

    #[test]
    fn test_where_uses_item_focus() {
        let result = eval(
            "item.where(linkId = 'b').text",
            json!({"item": [{"linkId": "a", "text": "A"}, {"linkId": "b", "text": "B"}]}),
        );
        assert_eq!(result, Collection::singleton(Value::string("B")));
    }

    #[test]
    fn test_repeat_collects_nested_items() {
        let result = eval(
            "repeat(item).linkId",
            json!({"item": [{"linkId": "a", "item": [{"linkId": "b"}]}]}),
        );
        assert_eq!(result.len(), 2);
    }

    #[test]
    fn test_iif_and_index() {
        assert_eq!(
            eval("iif(1 > 2, 'yes', 'no')", json!({})),
            Collection::singleton(Value::string("no"))
        );
        assert_eq!(
            eval("item.select($index)", json!({"item": [{}, {}]})),
            [0, 1].iter().map(|i| Value::integer(*i)).collect::<Collection>()
        );
    }

    #[test]
    fn test_unknown_function() {
        let ctx = Context::from_json(&json!({}));
        let err = Evaluator::new(&ctx)
            .evaluate(&parse("frobnicate()").unwrap())
            .unwrap_err();
        assert!(matches!(err, Error::FunctionNotFound(_)));
    }

    #[test]
    fn test_of_type_on_choice_value() {
        let result = eval(
            "answer.value.ofType(Coding).code",
            json!({"answer": [{"valueCoding": {"code": "x"}}, {"valueString": "y"}]}),
        );
        assert_eq!(result, Collection::singleton(Value::string("x")));
    }
}
