//! Answer options: static, value set, expression, and toggles

use crate::answer;
use crate::error::{Error, Result};
use crate::expression::{ExpressionEvaluator, ResponseView, ScopeEntry};
use crate::path::ItemPath;
use crate::resolver::AnswerValueSetResolver;
use sdc_models::{AnswerValue, Coding, ItemType, Questionnaire, QuestionnaireItem, Reference, ValueSet};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// Work that has to be awaited before options can be listed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OptionsRequest {
    ValueSet(String),
    Query { path: ItemPath, query: String },
}

/// Results of awaited requests for one projection pass
#[derive(Debug, Default)]
pub struct ResolvedOptions {
    pub queries: HashMap<ItemPath, Arc<Vec<JsonValue>>>,
}

/// Value set expansions, kept for the lifetime of the engine
pub struct ValueSetCache {
    resolver: Option<Arc<dyn AnswerValueSetResolver>>,
    expansions: Mutex<HashMap<String, Arc<Vec<Coding>>>>,
}

impl ValueSetCache {
    pub fn new(resolver: Option<Arc<dyn AnswerValueSetResolver>>) -> Self {
        Self {
            resolver,
            expansions: Mutex::new(HashMap::new()),
        }
    }

    fn cached(&self, url: &str) -> Option<Arc<Vec<Coding>>> {
        self.expansions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .cloned()
    }

    /// Expand `url` through the resolver once. Without a resolver the
    /// expansion is empty.
    pub async fn resolve(&self, url: &str) -> Result<Arc<Vec<Coding>>> {
        if let Some(hit) = self.cached(url) {
            return Ok(hit);
        }
        let codings = match &self.resolver {
            Some(resolver) => {
                tracing::debug!(url, "expanding answer value set");
                resolver.resolve(url).await?
            }
            None => {
                tracing::warn!(url, "no answer value set resolver; options are empty");
                Vec::new()
            }
        };
        let codings = Arc::new(codings);
        self.expansions
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), codings.clone());
        Ok(codings)
    }
}

/// Codings of a `#id` reference to a contained ValueSet
pub fn contained_value_set(questionnaire: &Questionnaire, reference: &str) -> Vec<Coding> {
    let id = reference.trim_start_matches('#');
    questionnaire
        .contained
        .iter()
        .filter(|r| r.get("resourceType").and_then(JsonValue::as_str) == Some("ValueSet"))
        .filter(|r| {
            r.get("id")
                .and_then(JsonValue::as_str)
                .is_some_and(|rid| rid.trim_start_matches('#') == id)
        })
        .find_map(|r| match serde_json::from_value::<ValueSet>(r.clone()) {
            Ok(value_set) => Some(value_set.selectable_codings()),
            Err(error) => {
                tracing::warn!(reference, %error, "unreadable contained value set");
                None
            }
        })
        .unwrap_or_default()
}

/// What must be awaited before listing the options of `item`.
pub fn request_for(
    item: &QuestionnaireItem,
    path: &ItemPath,
    expressions: &ExpressionEvaluator,
    view: &ResponseView,
    scope: &[ScopeEntry<'_>],
) -> Result<Option<OptionsRequest>> {
    if !item.answer_option.is_empty() {
        return Ok(None);
    }
    if let Some(url) = item.answer_value_set.as_deref().filter(|u| !u.is_empty()) {
        if url.starts_with('#') {
            return Ok(None);
        }
        return Ok(Some(OptionsRequest::ValueSet(url.to_string())));
    }
    match item.answer_expression() {
        Some(expression) if expression.is_x_fhir_query() => {
            if !expressions.has_query_resolver() {
                return Err(Error::MissingXFhirQueryResolver(expression.text().to_string()));
            }
            let query = expressions.prepare_x_fhir_query(expression, view, scope)?;
            Ok(Some(OptionsRequest::Query {
                path: path.clone(),
                query,
            }))
        }
        Some(expression) if !expression.is_fhirpath() => Err(Error::UnsupportedExpressionLanguage(
            expression.language.clone(),
        )),
        _ => Ok(None),
    }
}

pub struct OptionsContext<'a> {
    pub questionnaire: &'a Questionnaire,
    pub value_sets: &'a ValueSetCache,
    pub resolved: &'a ResolvedOptions,
    pub expressions: &'a ExpressionEvaluator,
    pub view: &'a ResponseView,
}

impl OptionsContext<'_> {
    /// Options from the first source the item declares: `answerOption`,
    /// `answerValueSet`, then `answerExpression`.
    pub fn answer_options(
        &self,
        item: &QuestionnaireItem,
        path: &ItemPath,
        scope: &[ScopeEntry<'_>],
    ) -> Vec<AnswerValue> {
        if !item.answer_option.is_empty() {
            return item.answer_option.iter().map(|o| o.value.clone()).collect();
        }
        if let Some(url) = item.answer_value_set.as_deref().filter(|u| !u.is_empty()) {
            let codings = if url.starts_with('#') {
                contained_value_set(self.questionnaire, url)
            } else {
                self.value_sets
                    .cached(url)
                    .map(|c| c.as_ref().clone())
                    .unwrap_or_default()
            };
            return codings.into_iter().map(AnswerValue::Coding).collect();
        }
        let Some(expression) = item.answer_expression() else {
            return Vec::new();
        };
        if expression.is_x_fhir_query() {
            return self
                .resolved
                .queries
                .get(path)
                .map(|resources| resources.iter().filter_map(resource_reference).collect())
                .unwrap_or_default();
        }
        self.expressions
            .evaluate(expression, self.view, scope)
            .iter()
            .filter_map(|value| answer::from_fhirpath(value, option_type(item)))
            .collect()
    }

    /// Options left after `answerOptionsToggleExpression`s. An option is
    /// hidden only when every group listing it evaluates false.
    pub fn enabled_options(
        &self,
        item: &QuestionnaireItem,
        options: Vec<AnswerValue>,
        scope: &[ScopeEntry<'_>],
    ) -> Vec<AnswerValue> {
        let toggles = item.answer_options_toggle_expressions();
        if toggles.is_empty() {
            return options;
        }
        let mut allowed: Vec<AnswerValue> = Vec::new();
        let mut disallowed: Vec<AnswerValue> = Vec::new();
        for toggle in toggles {
            if self.expressions.evaluate_boolean(&toggle.expression, self.view, scope) {
                allowed.extend(toggle.options);
            } else {
                disallowed.extend(toggle.options);
            }
        }
        disallowed.retain(|d| !allowed.iter().any(|a| answer::same_value(a, d)));
        options
            .into_iter()
            .filter(|o| !disallowed.iter().any(|d| answer::same_value(o, d)))
            .collect()
    }
}

/// Selected answers no longer offered
pub fn disallowed_answers(selected: &[AnswerValue], enabled: &[AnswerValue]) -> Vec<AnswerValue> {
    selected
        .iter()
        .filter(|s| !enabled.iter().any(|e| answer::same_value(s, e)))
        .cloned()
        .collect()
}

fn option_type(item: &QuestionnaireItem) -> Option<ItemType> {
    match item.item_type() {
        Some(ItemType::Choice | ItemType::OpenChoice) => None,
        other => other,
    }
}

fn resource_reference(resource: &JsonValue) -> Option<AnswerValue> {
    let kind = resource.get("resourceType")?.as_str()?;
    let id = resource.get("id")?.as_str()?;
    Some(AnswerValue::Reference(Reference {
        reference: Some(format!("{kind}/{id}")),
        ..Default::default()
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use sdc_models::{extensions, AnswerOption, Expression, Extension, ExtensionValue};
    use serde_json::json;

    fn coding(code: &str) -> AnswerValue {
        AnswerValue::Coding(Coding::new("http://example.org", code))
    }

    fn toggle(options: &[&str], expression: &str) -> Extension {
        let mut parts: Vec<Extension> = options
            .iter()
            .map(|code| {
                Extension::new(
                    extensions::ANSWER_OPTIONS_TOGGLE_OPTION,
                    ExtensionValue::Coding(Coding::new("http://example.org", *code)),
                )
            })
            .collect();
        parts.push(Extension::new(
            extensions::ANSWER_OPTIONS_TOGGLE_EXPRESSION_PART,
            ExtensionValue::Expression(Expression::fhirpath(expression)),
        ));
        Extension::complex(extensions::ANSWER_OPTIONS_TOGGLE_EXPRESSION, parts)
    }

    #[test]
    fn test_toggle_groups_are_inclusive() {
        let mut item = QuestionnaireItem::new("q", ItemType::Choice);
        for code in ["a", "b", "c", "d"] {
            item.answer_option.push(AnswerOption::new(coding(code)));
        }
        item.extension.push(toggle(&["a", "b"], "false"));
        item.extension.push(toggle(&["b"], "true"));

        let q = Arc::new(Questionnaire::default());
        let expressions = ExpressionEvaluator::new(q.clone(), HashMap::new()).unwrap();
        let cache = ValueSetCache::new(None);
        let resolved = ResolvedOptions::default();
        let view = ResponseView::empty();
        let ctx = OptionsContext {
            questionnaire: &q,
            value_sets: &cache,
            resolved: &resolved,
            expressions: &expressions,
            view: &view,
        };
        let path = ItemPath::root("q");
        let options = ctx.answer_options(&item, &path, &[]);
        let enabled = ctx.enabled_options(&item, options, &[]);
        assert_eq!(enabled, vec![coding("b"), coding("c"), coding("d")]);
        assert_eq!(disallowed_answers(&[coding("a"), coding("c")], &enabled), vec![coding("a")]);
    }

    #[test]
    fn test_contained_value_set_skips_abstract_and_inactive() {
        let mut q = Questionnaire::default();
        q.contained.push(json!({
            "resourceType": "ValueSet",
            "id": "colors",
            "expansion": {"contains": [
                {"system": "s", "code": "red"},
                {"system": "s", "code": "group", "abstract": true},
                {"system": "s", "code": "old", "inactive": true}
            ]}
        }));
        let codings = contained_value_set(&q, "#colors");
        assert_eq!(codings, vec![Coding::new("s", "red")]);
    }

    #[tokio::test]
    async fn test_value_set_without_resolver_is_empty() {
        let cache = ValueSetCache::new(None);
        assert!(cache.resolve("http://example.org/vs").await.unwrap().is_empty());
        assert!(cache.cached("http://example.org/vs").is_some());
    }

    #[test]
    fn test_query_without_resolver_is_an_error() {
        let mut item = QuestionnaireItem::new("q", ItemType::Reference);
        item.extension.push(Extension::new(
            extensions::ANSWER_EXPRESSION,
            ExtensionValue::Expression(Expression {
                language: "application/x-fhir-query".into(),
                expression: Some("Practitioner?active=true".into()),
                ..Default::default()
            }),
        ));
        let q = Arc::new(Questionnaire::default());
        let expressions = ExpressionEvaluator::new(q, HashMap::new()).unwrap();
        let result = request_for(&item, &ItemPath::root("q"), &expressions, &ResponseView::empty(), &[]);
        assert!(matches!(result, Err(Error::MissingXFhirQueryResolver(_))));
    }
}
