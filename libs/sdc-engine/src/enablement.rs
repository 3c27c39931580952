//! enableWhen and enableWhenExpression
//!
//! Disabled items disappear from the response. Their subtree is parked in
//! a [`ShadowStore`] keyed by item path and put back verbatim once the item
//! is enabled again.

use crate::answer;
use crate::error::Result;
use crate::expression::{ExpressionEvaluator, ResponseView, ScopeEntry};
use crate::path::ItemPath;
use crate::tree::{find_response_item, walk, Walk};
use sdc_models::{
    AnswerValue, EnableBehavior, EnableWhen, EnableWhenOperator, QuestionnaireItem,
    QuestionnaireResponse, QuestionnaireResponseItem,
};
use std::cmp::Ordering;
use std::collections::BTreeMap;

pub struct EnablementEvaluator<'a> {
    response: &'a QuestionnaireResponse,
    view: &'a ResponseView,
    expressions: &'a ExpressionEvaluator,
}

impl<'a> EnablementEvaluator<'a> {
    pub fn new(
        response: &'a QuestionnaireResponse,
        view: &'a ResponseView,
        expressions: &'a ExpressionEvaluator,
    ) -> Self {
        Self {
            response,
            view,
            expressions,
        }
    }

    /// `scope` ends with the item being checked. Unsupported comparisons
    /// are logged and read as unsatisfied.
    pub fn is_enabled(&self, item: &QuestionnaireItem, scope: &[ScopeEntry<'_>]) -> bool {
        match self.try_is_enabled(item, scope) {
            Ok(enabled) => enabled,
            Err(error) => {
                tracing::warn!(link_id = %item.link_id, %error, "enableWhen could not be evaluated");
                false
            }
        }
    }

    pub fn try_is_enabled(&self, item: &QuestionnaireItem, scope: &[ScopeEntry<'_>]) -> Result<bool> {
        if let Some(expression) = item.enable_when_expression() {
            return Ok(self.expressions.evaluate_boolean(expression, self.view, scope));
        }
        if item.enable_when.is_empty() {
            return Ok(true);
        }

        let ancestors = &scope[..scope.len().saturating_sub(1)];
        let results = item
            .enable_when
            .iter()
            .map(|condition| self.condition_holds(condition, ancestors));
        match item.enable_behavior.unwrap_or(EnableBehavior::All) {
            EnableBehavior::All => {
                for result in results {
                    if !result? {
                        return Ok(false);
                    }
                }
                Ok(true)
            }
            EnableBehavior::Any => {
                for result in results {
                    if result? {
                        return Ok(true);
                    }
                }
                Ok(false)
            }
        }
    }

    fn condition_holds(&self, condition: &EnableWhen, ancestors: &[ScopeEntry<'_>]) -> Result<bool> {
        let answers: Vec<&AnswerValue> = self
            .find_question(&condition.question, ancestors)
            .map(|item| item.answer_values().collect())
            .unwrap_or_default();
        evaluate_condition(condition.operator, &answers, &condition.answer)
    }

    /// Nearest occurrence within the ancestors' subtrees, then anywhere.
    fn find_question<'s>(
        &'s self,
        link_id: &str,
        ancestors: &[ScopeEntry<'s>],
    ) -> Option<&'s QuestionnaireResponseItem> {
        ancestors
            .iter()
            .rev()
            .filter_map(|entry| entry.response)
            .find_map(|parent| find_response_item(std::slice::from_ref(parent), link_id))
            .or_else(|| find_response_item(&self.response.item, link_id))
    }
}

/// Whether any of `answers` satisfies the condition. Missing answers
/// satisfy only `exists = false`.
pub fn evaluate_condition(
    operator: EnableWhenOperator,
    answers: &[&AnswerValue],
    expected: &AnswerValue,
) -> Result<bool> {
    use EnableWhenOperator as Op;
    if answers.is_empty() {
        return Ok(operator == Op::Exists && matches!(expected, AnswerValue::Boolean(false)));
    }
    for actual in answers {
        let holds = match operator {
            Op::Exists => matches!(expected, AnswerValue::Boolean(true)),
            Op::Equal => answer::equals(actual, expected)?,
            Op::NotEqual => !answer::equals(actual, expected)?,
            Op::GreaterThan => answer::compare(actual, expected) == Some(Ordering::Greater),
            Op::LessThan => answer::compare(actual, expected) == Some(Ordering::Less),
            Op::GreaterOrEqual => matches!(
                answer::compare(actual, expected),
                Some(Ordering::Greater | Ordering::Equal)
            ),
            Op::LessOrEqual => matches!(
                answer::compare(actual, expected),
                Some(Ordering::Less | Ordering::Equal)
            ),
        };
        if holds {
            return Ok(true);
        }
    }
    Ok(false)
}

/// Answers of disabled subtrees, parked until re-enable
#[derive(Debug, Clone, Default)]
pub struct ShadowStore {
    parked: BTreeMap<ItemPath, QuestionnaireResponseItem>,
}

impl ShadowStore {
    pub fn is_empty(&self) -> bool {
        self.parked.is_empty()
    }

    pub fn len(&self) -> usize {
        self.parked.len()
    }

    pub fn contains(&self, path: &ItemPath) -> bool {
        self.parked.contains_key(path)
    }

    pub fn clear(&mut self) {
        self.parked.clear();
    }

    /// Re-key parked subtrees after a repeated group occurrence is removed.
    pub fn occurrence_removed(&mut self, group: &ItemPath, removed: usize) {
        self.parked = std::mem::take(&mut self.parked)
            .into_iter()
            .filter_map(|(path, item)| {
                path.after_occurrence_removed(group, removed)
                    .map(|path| (path, item))
            })
            .collect();
    }

    /// Drop parked subtrees at or below `path`.
    pub fn forget(&mut self, path: &ItemPath) {
        self.parked.retain(|parked, _| !parked.starts_with(path));
    }
}

/// Park answers of newly disabled items and restore re-enabled ones until
/// nothing changes, so chains of dependent items settle in one call.
/// Returns whether the response changed.
pub fn settle(
    response: &mut QuestionnaireResponse,
    shadow: &mut ShadowStore,
    definitions: &[QuestionnaireItem],
    expressions: &ExpressionEvaluator,
) -> Result<bool> {
    let limit = count_items(definitions) + 1;
    let mut changed_any = false;

    for _ in 0..limit {
        let view = ResponseView::new(response)?;
        let mut park = Vec::new();
        let mut restore = Vec::new();
        {
            let evaluator = EnablementEvaluator::new(response, &view, expressions);
            walk(definitions, &response.item, &mut |path, scope| {
                let Some(current) = scope.last() else {
                    return Walk::Skip;
                };
                let enabled = evaluator.is_enabled(current.item, scope);
                let has_content = current.response.is_some_and(has_content);
                if !enabled {
                    if has_content {
                        park.push(path.clone());
                    }
                    return Walk::Skip;
                }
                if shadow.contains(path) && !has_content {
                    restore.push(path.clone());
                }
                Walk::Descend
            });
        }
        if park.is_empty() && restore.is_empty() {
            return Ok(changed_any);
        }
        changed_any = true;

        for path in park {
            if let Some(item) = path.find_mut(&mut response.item) {
                let blank = QuestionnaireResponseItem {
                    link_id: item.link_id.clone(),
                    text: item.text.clone(),
                    ..Default::default()
                };
                tracing::debug!(path = %path, "parking answers of disabled item");
                shadow.forget(&path);
                shadow.parked.insert(path, std::mem::replace(item, blank));
            }
        }
        for path in restore {
            if let (Some(item), Some(parked)) =
                (path.find_mut(&mut response.item), shadow.parked.remove(&path))
            {
                tracing::debug!(path = %path, "restoring answers of re-enabled item");
                *item = parked;
            }
        }
    }

    tracing::warn!("enablement did not settle; answers may be stale");
    Ok(changed_any)
}

fn has_content(item: &QuestionnaireResponseItem) -> bool {
    !item.answer.is_empty() || item.item.iter().any(has_content)
}

fn count_items(items: &[QuestionnaireItem]) -> usize {
    items.iter().map(|i| 1 + count_items(&i.item)).sum()
}
