//! Static reference extraction for dependency analysis.
//!
//! Questionnaire expressions reach other items through paths such as
//! `%resource.item.where(linkId = 'weight').answer.value` and reach variables
//! through `%name`. Collecting both lets callers build a dependency graph
//! without evaluating anything.

use crate::ast::{AstNode, BinaryOperator, Literal};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpressionReferences {
    /// `%name` constants, without the `%`
    pub constants: BTreeSet<String>,
    /// Literal linkIds compared against a `linkId` element
    pub link_ids: BTreeSet<String>,
}

impl ExpressionReferences {
    pub fn collect(ast: &AstNode) -> Self {
        let mut references = Self::default();
        ast.walk(&mut |node| match node {
            AstNode::ExternalConstant(name) => {
                references.constants.insert(name.clone());
            }
            AstNode::Binary {
                left,
                operator: BinaryOperator::Equal | BinaryOperator::Equivalent,
                right,
            } => {
                let link_id = match (left.as_ref(), right.as_ref()) {
                    (path, AstNode::Literal(Literal::String(id)))
                    | (AstNode::Literal(Literal::String(id)), path)
                        if ends_with_link_id(path) =>
                    {
                        Some(id.clone())
                    }
                    _ => None,
                };
                references.link_ids.extend(link_id);
            }
            _ => {}
        });
        references
    }

    pub fn is_empty(&self) -> bool {
        self.constants.is_empty() && self.link_ids.is_empty()
    }
}

fn ends_with_link_id(node: &AstNode) -> bool {
    match node {
        AstNode::Member(name) => name == "linkId",
        AstNode::Invocation { invocation, .. } => ends_with_link_id(invocation),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;

    #[test]
    fn test_collects_link_ids_and_constants() {
        let ast = parse(
            "%resource.repeat(item).where(linkId = 'weight').answer.value / (%height * %height)",
        )
        .unwrap();
        let refs = ExpressionReferences::collect(&ast);
        assert!(refs.link_ids.contains("weight"));
        assert_eq!(
            refs.constants.iter().cloned().collect::<Vec<_>>(),
            vec!["height".to_string(), "resource".to_string()]
        );
    }

    #[test]
    fn test_reversed_comparison() {
        let ast = parse("%resource.item.where('a' = linkId).exists()").unwrap();
        let refs = ExpressionReferences::collect(&ast);
        assert_eq!(refs.link_ids.iter().next().map(String::as_str), Some("a"));
    }

    #[test]
    fn test_plain_literal_is_not_a_reference() {
        let refs = ExpressionReferences::collect(&parse("text = 'a'").unwrap());
        assert!(refs.link_ids.is_empty());
    }
}
