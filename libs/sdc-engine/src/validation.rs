//! Per-item answer constraints

use crate::answer;
use crate::enablement::EnablementEvaluator;
use crate::error::Result;
use crate::expression::{ExpressionEvaluator, ResponseView, ScopeEntry};
use crate::path::ItemPath;
use crate::tree::{walk, Walk};
use regex::Regex;
use sdc_models::{AnswerValue, Expression, QuestionnaireItem, QuestionnaireResponse};
use serde::Serialize;
use std::cmp::Ordering;
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", content = "messages", rename_all = "snake_case")]
pub enum ValidationResult {
    /// Not shown until the user touched the item
    NotValidated,
    Valid,
    Invalid(Vec<String>),
}

impl ValidationResult {
    pub fn is_invalid(&self) -> bool {
        matches!(self, ValidationResult::Invalid(_))
    }
}

/// Effective answer bounds of an item
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bounds {
    pub min: Option<AnswerValue>,
    pub max: Option<AnswerValue>,
}

impl Bounds {
    /// A `cqf-calculatedValue` expression replaces the literal bound.
    pub fn evaluate(
        item: &QuestionnaireItem,
        expressions: &ExpressionEvaluator,
        view: &ResponseView,
        scope: &[ScopeEntry<'_>],
    ) -> Self {
        let bound = |expression: Option<Expression>, literal: Option<AnswerValue>| match expression {
            Some(expression) => expressions
                .evaluate(&expression, view, scope)
                .first()
                .and_then(|value| answer::from_fhirpath(value, item.item_type())),
            None => literal,
        };
        Self {
            min: bound(item.min_value_expression(), item.min_value()),
            max: bound(item.max_value_expression(), item.max_value()),
        }
    }
}

pub fn validate(item: &QuestionnaireItem, answers: &[AnswerValue], bounds: &Bounds) -> ValidationResult {
    if answers.is_empty() {
        return if item.is_required() {
            ValidationResult::Invalid(vec!["Missing answer for required field.".to_string()])
        } else {
            ValidationResult::Valid
        };
    }

    let pattern = item.regex().and_then(|source| match Regex::new(&format!("^(?:{source})$")) {
        Ok(regex) => Some((source, regex)),
        Err(error) => {
            tracing::warn!(link_id = %item.link_id, %error, "ignoring invalid regex extension");
            None
        }
    });

    let mut messages = Vec::new();
    for value in answers {
        if let Some(min) = &bounds.min {
            if answer::compare(value, min) == Some(Ordering::Less) {
                messages.push(format!("Minimum value allowed is:{}", min.display_string()));
            }
        }
        if let Some(max) = &bounds.max {
            if answer::compare(value, max) == Some(Ordering::Greater) {
                messages.push(format!("Maximum value allowed is:{}", max.display_string()));
            }
        }

        let Some(text) = primitive_text(value) else {
            continue;
        };
        let length = text.chars().count();
        if let Some(max_length) = item.max_length {
            if length > max_length as usize {
                messages.push(format!(
                    "The maximum number of characters that are permitted in the answer is: {max_length}"
                ));
            }
        }
        if let Some(min_length) = item.min_length() {
            if (length as i64) < min_length {
                messages.push(format!(
                    "The minimum number of characters that are permitted in the answer is: {min_length}"
                ));
            }
        }
        if let Some((source, regex)) = &pattern {
            if !regex.is_match(&text) {
                messages.push(format!("The answer doesn't match regular expression: {source}"));
            }
        }
    }

    if messages.is_empty() {
        ValidationResult::Valid
    } else {
        ValidationResult::Invalid(messages)
    }
}

fn primitive_text(value: &AnswerValue) -> Option<String> {
    match value {
        AnswerValue::Integer(_) | AnswerValue::Decimal(_) => Some(value.display_string()),
        other => other.as_str().map(str::to_string),
    }
}

/// Validate every enabled item of a packed response.
pub fn validate_response(
    definitions: &[QuestionnaireItem],
    response: &QuestionnaireResponse,
    expressions: &ExpressionEvaluator,
) -> Result<BTreeMap<ItemPath, ValidationResult>> {
    let view = ResponseView::new(response)?;
    let enablement = EnablementEvaluator::new(response, &view, expressions);
    let mut results = BTreeMap::new();
    walk(definitions, &response.item, &mut |path, scope| {
        let Some(current) = scope.last() else {
            return Walk::Skip;
        };
        if !enablement.is_enabled(current.item, scope) {
            return Walk::Skip;
        }
        if !current.item.is_group() && !current.item.is_display_item() {
            let answers: Vec<AnswerValue> = current
                .response
                .map(|r| r.answer_values().cloned().collect())
                .unwrap_or_default();
            let bounds = Bounds::evaluate(current.item, expressions, &view, scope);
            results.insert(path.clone(), validate(current.item, &answers, &bounds));
        }
        Walk::Descend
    });
    Ok(results)
}
