//! calculatedExpression, initialExpression and cqf-expression text

use crate::answer;
use crate::enablement::EnablementEvaluator;
use crate::error::Result;
use crate::expression::{ExpressionEvaluator, ResponseView, ScopeEntry};
use crate::path::ItemPath;
use crate::response::copy_nested_items_to_childless_answers;
use crate::tree::{walk, Walk};
use sdc_fhirpath::{Collection, ValueData};
use sdc_models::{
    AnswerValue, Questionnaire, QuestionnaireItem, QuestionnaireResponse,
    QuestionnaireResponseAnswer,
};
use std::collections::BTreeSet;

/// Answers for `item` from an expression result.
pub fn to_answers(item: &QuestionnaireItem, values: &Collection) -> Vec<AnswerValue> {
    let answers = values
        .iter()
        .filter_map(|value| answer::from_fhirpath(value, item.item_type()));
    if item.is_repeating() {
        answers.collect()
    } else {
        answers.take(1).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmptyResult {
    /// Leave the item alone
    Skip,
    /// Clear the item's answers
    Clear,
}

/// Re-run the calculated expressions of `link_ids`, in the given order,
/// for every enabled instance not in `modified`. Returns the paths that
/// were written.
pub fn recalculate(
    link_ids: &[String],
    definitions: &[QuestionnaireItem],
    response: &mut QuestionnaireResponse,
    modified: &BTreeSet<ItemPath>,
    expressions: &ExpressionEvaluator,
    on_empty: EmptyResult,
) -> Result<Vec<ItemPath>> {
    let mut written = Vec::new();
    for link_id in link_ids {
        let view = ResponseView::new(response)?;
        let mut writes: Vec<(ItemPath, Vec<AnswerValue>)> = Vec::new();
        {
            let enablement = EnablementEvaluator::new(response, &view, expressions);
            walk(definitions, &response.item, &mut |path, scope| {
                let Some(current) = scope.last() else {
                    return Walk::Skip;
                };
                if !enablement.is_enabled(current.item, scope) {
                    return Walk::Skip;
                }
                if current.item.link_id != *link_id || modified.contains(path) {
                    return Walk::Descend;
                }
                let Some(expression) = current.item.calculated_expression() else {
                    return Walk::Descend;
                };
                let result = expressions.evaluate(expression, &view, scope);
                if result.is_empty() && on_empty == EmptyResult::Skip {
                    return Walk::Descend;
                }
                let answers = to_answers(current.item, &result);
                let existing: Vec<AnswerValue> = current
                    .response
                    .map(|r| r.answer_values().cloned().collect())
                    .unwrap_or_default();
                if !answer::same_answers(&answers, &existing) {
                    writes.push((path.clone(), answers));
                }
                Walk::Descend
            });
        }

        for (path, answers) in writes {
            let Some(definition) = find_definition(definitions, path.link_id()) else {
                continue;
            };
            if let Some(item) = path.find_mut(&mut response.item) {
                tracing::debug!(path = %path, count = answers.len(), "writing calculated value");
                item.answer = answers.into_iter().map(QuestionnaireResponseAnswer::new).collect();
                copy_nested_items_to_childless_answers(definition, item)?;
                written.push(path);
            }
        }
    }
    Ok(written)
}

/// Fill items of a new response that have an `initialExpression` and no
/// literal initial value.
pub fn apply_initial_expressions(
    questionnaire: &Questionnaire,
    response: &mut QuestionnaireResponse,
    expressions: &ExpressionEvaluator,
) -> Result<()> {
    let view = ResponseView::new(response)?;
    let mut writes: Vec<(ItemPath, Vec<AnswerValue>)> = Vec::new();
    walk(&questionnaire.item, &response.item, &mut |path, scope| {
        let Some(current) = scope.last() else {
            return Walk::Skip;
        };
        if let Some(expression) = current.item.initial_expression() {
            if current.item.initial.is_empty() {
                let answers = to_answers(current.item, &expressions.evaluate(expression, &view, scope));
                if !answers.is_empty() {
                    writes.push((path.clone(), answers));
                }
            }
        }
        Walk::Descend
    });

    for (path, answers) in writes {
        let Some(definition) = find_definition(&questionnaire.item, path.link_id()) else {
            continue;
        };
        if let Some(item) = path.find_mut(&mut response.item) {
            item.answer = answers.into_iter().map(QuestionnaireResponseAnswer::new).collect();
            copy_nested_items_to_childless_answers(definition, item)?;
        }
    }
    Ok(())
}

/// Display text from a `cqf-expression` on `_text`, if any.
pub fn evaluated_text(
    item: &QuestionnaireItem,
    expressions: &ExpressionEvaluator,
    view: &ResponseView,
    scope: &[ScopeEntry<'_>],
) -> Option<String> {
    let expression = item.text_expression()?;
    let result = expressions.evaluate(expression, view, scope);
    if result.is_empty() {
        return None;
    }
    let parts: Vec<String> = result
        .iter()
        .map(|value| match value.data() {
            ValueData::String(s) => s.to_string(),
            _ => match value.to_json() {
                serde_json::Value::String(s) => s,
                other => other.to_string(),
            },
        })
        .collect();
    Some(parts.join(""))
}

pub fn find_definition<'a>(items: &'a [QuestionnaireItem], link_id: &str) -> Option<&'a QuestionnaireItem> {
    items.iter().find_map(|item| {
        if item.link_id == link_id {
            Some(item)
        } else {
            find_definition(&item.item, link_id)
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdc_models::{extensions, Expression, Extension, ExtensionValue, ItemType, QuestionnaireResponseItem};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn calculated(link_id: &str, expression: &str) -> QuestionnaireItem {
        let mut item = QuestionnaireItem::new(link_id, ItemType::Integer);
        item.extension.push(Extension::new(
            extensions::CALCULATED_EXPRESSION,
            ExtensionValue::Expression(Expression::fhirpath(expression)),
        ));
        item
    }

    fn setup() -> (Arc<Questionnaire>, QuestionnaireResponse) {
        let mut q = Questionnaire::default();
        q.item.push(QuestionnaireItem::new("a", ItemType::Integer));
        q.item.push(calculated(
            "double",
            "%resource.item.where(linkId = 'a').answer.value * 2",
        ));
        let mut response = QuestionnaireResponse::default();
        let mut a = QuestionnaireResponseItem::new("a");
        a.answer.push(AnswerValue::Integer(4).into());
        response.item = vec![a, QuestionnaireResponseItem::new("double")];
        (Arc::new(q), response)
    }

    #[test]
    fn test_recalculate_writes_result() {
        let (q, mut response) = setup();
        let expressions = ExpressionEvaluator::new(q.clone(), HashMap::new()).unwrap();
        let written = recalculate(
            &["double".to_string()],
            &q.item,
            &mut response,
            &BTreeSet::new(),
            &expressions,
            EmptyResult::Skip,
        )
        .unwrap();
        assert_eq!(written, vec![ItemPath::root("double")]);
        assert_eq!(
            response.item[1].answer_values().collect::<Vec<_>>(),
            vec![&AnswerValue::Integer(8)]
        );

        // unchanged result: nothing written
        let again = recalculate(
            &["double".to_string()],
            &q.item,
            &mut response,
            &BTreeSet::new(),
            &expressions,
            EmptyResult::Skip,
        )
        .unwrap();
        assert!(again.is_empty());
    }

    #[test]
    fn test_user_modified_items_are_kept() {
        let (q, mut response) = setup();
        response.item[1].answer.push(AnswerValue::Integer(1).into());
        let expressions = ExpressionEvaluator::new(q.clone(), HashMap::new()).unwrap();
        let modified = BTreeSet::from([ItemPath::root("double")]);
        recalculate(
            &["double".to_string()],
            &q.item,
            &mut response,
            &modified,
            &expressions,
            EmptyResult::Clear,
        )
        .unwrap();
        assert_eq!(
            response.item[1].answer_values().collect::<Vec<_>>(),
            vec![&AnswerValue::Integer(1)]
        );
    }

    #[test]
    fn test_empty_result_clears_after_load() {
        let (q, mut response) = setup();
        response.item[0].answer.clear();
        response.item[1].answer.push(AnswerValue::Integer(8).into());
        let expressions = ExpressionEvaluator::new(q.clone(), HashMap::new()).unwrap();
        recalculate(
            &["double".to_string()],
            &q.item,
            &mut response,
            &BTreeSet::new(),
            &expressions,
            EmptyResult::Clear,
        )
        .unwrap();
        assert!(!response.item[1].has_answer());
    }

    #[test]
    fn test_text_expression() {
        let mut item = QuestionnaireItem::new("q", ItemType::String);
        item.text = Some("fallback".into());
        item.text_element = Some(sdc_models::Element {
            id: None,
            extension: vec![Extension::new(
                extensions::CQF_EXPRESSION,
                ExtensionValue::Expression(Expression::fhirpath("'Hello ' + 'there'")),
            )],
        });
        let q = Arc::new(Questionnaire::default());
        let expressions = ExpressionEvaluator::new(q, HashMap::new()).unwrap();
        assert_eq!(
            evaluated_text(&item, &expressions, &ResponseView::empty(), &[]).as_deref(),
            Some("Hello there")
        );
    }
}
