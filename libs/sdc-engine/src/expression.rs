//! FHIRPath evaluation in questionnaire context
//!
//! Builds the environment SDC expressions expect (`%resource`, `%context`,
//! `%questionnaire`, `%qItem`, launch contexts and `variable` extensions)
//! and runs expressions through [`sdc_fhirpath::Engine`]. Evaluation
//! failures are logged and read as an empty result.

use crate::error::{Error, Result};
use crate::resolver::XFhirQueryResolver;
use chrono::{DateTime, FixedOffset};
use lru::LruCache;
use regex::Regex;
use sdc_fhirpath::{Collection, Context, Engine, ExpressionReferences, ValueData};
use sdc_models::{Expression, Questionnaire, QuestionnaireItem, QuestionnaireResponse, QuestionnaireResponseItem};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, OnceLock};

/// Names with a fixed meaning; `variable` extensions cannot shadow them.
pub const RESERVED_VARIABLE_NAMES: &[&str] = &[
    "sct",
    "loinc",
    "ucum",
    "resource",
    "rootResource",
    "context",
    "map-codes",
    "questionnaire",
    "qItem",
];

const MAX_VARIABLE_DEPTH: usize = 32;
const QUERY_CACHE_SIZE: usize = 128;

pub fn is_reserved(name: &str) -> bool {
    RESERVED_VARIABLE_NAMES.contains(&name)
}

/// One level of the tree around the item being evaluated
#[derive(Debug, Clone, Copy)]
pub struct ScopeEntry<'a> {
    pub item: &'a QuestionnaireItem,
    pub response: Option<&'a QuestionnaireResponseItem>,
}

/// The response as FHIRPath input, serialized once per evaluation pass
#[derive(Debug, Clone)]
pub struct ResponseView {
    resource: Collection,
}

impl ResponseView {
    pub fn new(response: &QuestionnaireResponse) -> Result<Self> {
        Ok(Self {
            resource: Collection::from_json(&serde_json::to_value(response)?),
        })
    }

    pub fn empty() -> Self {
        Self {
            resource: Collection::empty(),
        }
    }
}

pub struct ExpressionEvaluator {
    engine: Engine,
    questionnaire: Arc<Questionnaire>,
    questionnaire_json: Collection,
    launch_contexts: HashMap<String, Collection>,
    now: Option<DateTime<FixedOffset>>,
    query_resolver: Option<Arc<dyn XFhirQueryResolver>>,
    query_cache: Mutex<LruCache<String, Arc<Vec<JsonValue>>>>,
}

impl ExpressionEvaluator {
    /// Launch contexts whose name is not declared by a `launchContext`
    /// extension are dropped.
    pub fn new(
        questionnaire: Arc<Questionnaire>,
        launch_contexts: HashMap<String, JsonValue>,
    ) -> Result<Self> {
        let declared: Vec<String> = questionnaire
            .launch_contexts()
            .into_iter()
            .filter_map(|c| c.name)
            .collect();
        let launch_contexts = launch_contexts
            .into_iter()
            .filter(|(name, _)| {
                let keep = declared.contains(name);
                if !keep {
                    tracing::debug!(name = %name, "ignoring undeclared launch context");
                }
                keep
            })
            .map(|(name, resource)| (name, Collection::from_json(&resource)))
            .collect();
        let questionnaire_json = Collection::from_json(&serde_json::to_value(&*questionnaire)?);
        let capacity = NonZeroUsize::new(QUERY_CACHE_SIZE).unwrap_or(NonZeroUsize::MIN);

        Ok(Self {
            engine: Engine::new(),
            questionnaire,
            questionnaire_json,
            launch_contexts,
            now: None,
            query_resolver: None,
            query_cache: Mutex::new(LruCache::new(capacity)),
        })
    }

    pub fn with_now(mut self, now: DateTime<FixedOffset>) -> Self {
        self.now = Some(now);
        self
    }

    pub fn with_query_resolver(mut self, resolver: Option<Arc<dyn XFhirQueryResolver>>) -> Self {
        self.query_resolver = resolver;
        self
    }

    pub fn has_query_resolver(&self) -> bool {
        self.query_resolver.is_some()
    }

    pub fn now(&self) -> Option<DateTime<FixedOffset>> {
        self.now
    }

    /// Linkids and `%names` referenced by `text`
    pub fn references(&self, text: &str) -> Result<ExpressionReferences> {
        let ast = self.engine.compile(text)?;
        Ok(ExpressionReferences::collect(&ast))
    }

    /// Evaluate, logging failures and returning empty in their place.
    pub fn evaluate(
        &self,
        expression: &Expression,
        response: &ResponseView,
        scope: &[ScopeEntry<'_>],
    ) -> Collection {
        match self.try_evaluate(expression, response, scope) {
            Ok(result) => result,
            Err(error) => {
                tracing::warn!(
                    expression = %expression.text(),
                    link_id = scope.last().map(|s| s.item.link_id.as_str()).unwrap_or(""),
                    %error,
                    "could not evaluate expression"
                );
                Collection::empty()
            }
        }
    }

    pub fn try_evaluate(
        &self,
        expression: &Expression,
        response: &ResponseView,
        scope: &[ScopeEntry<'_>],
    ) -> Result<Collection> {
        if !expression.is_fhirpath() {
            return Err(Error::UnsupportedExpressionLanguage(expression.language.clone()));
        }
        self.evaluate_text(expression.text(), response, scope, 0)
    }

    /// Evaluate and read the result as a boolean; empty reads as `false`.
    pub fn evaluate_boolean(
        &self,
        expression: &Expression,
        response: &ResponseView,
        scope: &[ScopeEntry<'_>],
    ) -> bool {
        let result = self.evaluate(expression, response, scope);
        match result.to_boolean() {
            Ok(value) => value.unwrap_or(false),
            Err(error) => {
                tracing::warn!(expression = %expression.text(), %error, "expected a boolean result");
                false
            }
        }
    }

    fn evaluate_text(
        &self,
        text: &str,
        response: &ResponseView,
        scope: &[ScopeEntry<'_>],
        depth: usize,
    ) -> Result<Collection> {
        let ast = self.engine.compile(text)?;
        let references = ExpressionReferences::collect(&ast);
        let mut ctx = self.context(response, scope)?;
        for name in &references.constants {
            if is_reserved(name) || ctx.has_variable(name) {
                continue;
            }
            if let Some(value) = self.resolve_variable(name, response, scope, depth)? {
                ctx.set_variable(name, value);
            }
        }
        Ok(self.engine.evaluate(&ast, &ctx)?)
    }

    fn context(&self, response: &ResponseView, scope: &[ScopeEntry<'_>]) -> Result<Context> {
        let mut ctx = Context::new(response.resource.clone())
            .with_variable("questionnaire", self.questionnaire_json.clone());
        if let Some(now) = self.now {
            ctx = ctx.with_now(now);
        }
        for (name, value) in &self.launch_contexts {
            ctx.set_variable(name, value.clone());
        }
        if let Some(current) = scope.last() {
            ctx.set_variable("qItem", Collection::from_json(&serde_json::to_value(current.item)?));
            let focus = match current.response {
                Some(item) => Collection::from_json(&serde_json::to_value(item)?),
                None => Collection::empty(),
            };
            ctx = ctx.with_focus(focus);
        }
        Ok(ctx)
    }

    /// Nearest declaration wins: the item itself, then its ancestors, then
    /// the questionnaire root.
    fn resolve_variable(
        &self,
        name: &str,
        response: &ResponseView,
        scope: &[ScopeEntry<'_>],
        depth: usize,
    ) -> Result<Option<Collection>> {
        if depth >= MAX_VARIABLE_DEPTH {
            return Err(Error::FhirPath(sdc_fhirpath::Error::EvaluationError(format!(
                "variable %{name} nests too deeply"
            ))));
        }
        for level in (0..scope.len()).rev() {
            let declared = scope[level]
                .item
                .variable_expressions()
                .into_iter()
                .find(|e| e.name.as_deref() == Some(name));
            if let Some(expression) = declared {
                return self
                    .evaluate_variable(expression, response, &scope[..=level], depth)
                    .map(Some);
            }
        }
        let root = self
            .questionnaire
            .variable_expressions()
            .into_iter()
            .find(|e| e.name.as_deref() == Some(name));
        match root {
            Some(expression) => self
                .evaluate_variable(expression, response, &[], depth)
                .map(Some),
            None => Ok(None),
        }
    }

    fn evaluate_variable(
        &self,
        expression: &Expression,
        response: &ResponseView,
        scope: &[ScopeEntry<'_>],
        depth: usize,
    ) -> Result<Collection> {
        if !expression.is_fhirpath() {
            return Err(Error::UnsupportedExpressionLanguage(expression.language.clone()));
        }
        self.evaluate_text(expression.text(), response, scope, depth + 1)
    }

    /// Substitute `{{ fhirpath }}` placeholders in an x-fhir-query.
    pub fn prepare_x_fhir_query(
        &self,
        expression: &Expression,
        response: &ResponseView,
        scope: &[ScopeEntry<'_>],
    ) -> Result<String> {
        static PLACEHOLDER: OnceLock<Option<Regex>> = OnceLock::new();
        let text = expression.text();
        let Some(pattern) = PLACEHOLDER
            .get_or_init(|| Regex::new(r"\{\{(.+?)\}\}").ok())
            .as_ref()
        else {
            return Ok(text.to_string());
        };

        let mut query = String::with_capacity(text.len());
        let mut last = 0;
        for captures in pattern.captures_iter(text) {
            let (Some(whole), Some(inner)) = (captures.get(0), captures.get(1)) else {
                continue;
            };
            query.push_str(&text[last..whole.start()]);
            let value = self.evaluate_text(inner.as_str().trim(), response, scope, 0)?;
            query.push_str(&join_values(&value));
            last = whole.end();
        }
        query.push_str(&text[last..]);
        Ok(query)
    }

    /// Run a prepared query, reusing earlier results for the same query.
    pub async fn run_x_fhir_query(&self, query: &str) -> Result<Arc<Vec<JsonValue>>> {
        let resolver = self
            .query_resolver
            .clone()
            .ok_or_else(|| Error::MissingXFhirQueryResolver(query.to_string()))?;
        if let Some(hit) = self
            .query_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(query)
        {
            return Ok(hit.clone());
        }
        tracing::debug!(query, "resolving x-fhir-query");
        let resources = Arc::new(resolver.resolve(query).await?);
        self.query_cache
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .put(query.to_string(), resources.clone());
        Ok(resources)
    }
}

fn join_values(values: &Collection) -> String {
    values
        .iter()
        .map(|value| match value.data() {
            ValueData::String(s) => s.to_string(),
            _ => match value.to_json() {
                JsonValue::String(s) => s,
                other => other.to_string(),
            },
        })
        .collect::<Vec<_>>()
        .join(",")
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use sdc_models::{extensions, Extension, ExtensionValue, ItemType};
    use serde_json::json;

    fn questionnaire() -> Arc<Questionnaire> {
        let mut item = QuestionnaireItem::new("weight", ItemType::Decimal);
        item.extension.push(Extension::new(
            extensions::VARIABLE,
            ExtensionValue::Expression(Expression {
                name: Some("doubled".into()),
                ..Expression::fhirpath("%base * 2")
            }),
        ));
        let mut q = Questionnaire::default();
        q.extension.push(Extension::new(
            extensions::VARIABLE,
            ExtensionValue::Expression(Expression {
                name: Some("base".into()),
                ..Expression::fhirpath("21")
            }),
        ));
        q.item.push(item);
        Arc::new(q)
    }

    #[test]
    fn test_variables_resolve_through_scope() {
        let q = questionnaire();
        let evaluator = ExpressionEvaluator::new(q.clone(), HashMap::new()).unwrap();
        let scope = [ScopeEntry {
            item: &q.item[0],
            response: None,
        }];
        let result = evaluator.evaluate(
            &Expression::fhirpath("%doubled"),
            &ResponseView::empty(),
            &scope,
        );
        assert_eq!(result.as_integer().unwrap(), 42);

        // item-level variables are invisible from the root
        let outside = evaluator.evaluate(
            &Expression::fhirpath("%doubled"),
            &ResponseView::empty(),
            &[],
        );
        assert!(outside.is_empty());
    }

    #[test]
    fn test_context_is_current_response_item() {
        let q = questionnaire();
        let evaluator = ExpressionEvaluator::new(q.clone(), HashMap::new()).unwrap();
        let response_item = QuestionnaireResponseItem::new("weight");
        let scope = [ScopeEntry {
            item: &q.item[0],
            response: Some(&response_item),
        }];
        let result = evaluator.evaluate(
            &Expression::fhirpath("%context.linkId = %qItem.linkId"),
            &ResponseView::empty(),
            &scope,
        );
        assert!(result.as_boolean().unwrap());
    }

    #[test]
    fn test_unsupported_language() {
        let evaluator = ExpressionEvaluator::new(questionnaire(), HashMap::new()).unwrap();
        let cql = Expression {
            language: "text/cql".into(),
            expression: Some("1".into()),
            ..Default::default()
        };
        assert!(matches!(
            evaluator.try_evaluate(&cql, &ResponseView::empty(), &[]),
            Err(Error::UnsupportedExpressionLanguage(_))
        ));
    }

    #[test]
    fn test_undeclared_launch_context_is_dropped() {
        let contexts = HashMap::from([("patient".to_string(), json!({"resourceType": "Patient"}))]);
        let evaluator = ExpressionEvaluator::new(questionnaire(), contexts).unwrap();
        let result = evaluator.evaluate(
            &Expression::fhirpath("%patient"),
            &ResponseView::empty(),
            &[],
        );
        assert!(result.is_empty());
    }

    struct EchoResolver;

    #[async_trait]
    impl XFhirQueryResolver for EchoResolver {
        async fn resolve(&self, query: &str) -> Result<Vec<JsonValue>> {
            Ok(vec![json!({"resourceType": "Basic", "id": query})])
        }
    }

    #[tokio::test]
    async fn test_x_fhir_query_placeholders() {
        let evaluator = ExpressionEvaluator::new(questionnaire(), HashMap::new())
            .unwrap()
            .with_query_resolver(Some(Arc::new(EchoResolver)));
        let expression = Expression {
            language: "application/x-fhir-query".into(),
            expression: Some("Observation?value={{ %base + 1 }}".into()),
            ..Default::default()
        };
        let query = evaluator
            .prepare_x_fhir_query(&expression, &ResponseView::empty(), &[])
            .unwrap();
        assert_eq!(query, "Observation?value=22");
        let resources = evaluator.run_x_fhir_query(&query).await.unwrap();
        assert_eq!(resources[0]["id"], json!("Observation?value=22"));
    }

    #[tokio::test]
    async fn test_missing_resolver() {
        let evaluator = ExpressionEvaluator::new(questionnaire(), HashMap::new()).unwrap();
        assert!(matches!(
            evaluator.run_x_fhir_query("Patient").await,
            Err(Error::MissingXFhirQueryResolver(_))
        ));
    }
}
