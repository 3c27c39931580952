//! Evaluation context for FHIRPath expressions
//!
//! Context provides the initial focus, the environment variables
//! (`%resource`, `%context`, user variables, ...) and the clock used by
//! `now()` / `today()`.

use crate::value::{Collection, Value};
use chrono::{DateTime, FixedOffset, Local};
use serde_json::Value as JsonValue;
use std::collections::HashMap;
use std::sync::Arc;

/// Evaluation context containing the focus and variables
#[derive(Debug, Clone)]
pub struct Context {
    /// Input collection of the expression
    focus: Collection,
    /// Environment variables. Names are stored without the leading `%`,
    /// which the lexer strips from external constants.
    variables: Arc<HashMap<Arc<str>, Collection>>,
    /// Fixed clock for `now()`; `None` reads the system clock.
    now: Option<DateTime<FixedOffset>>,
}

impl Context {
    pub fn new(resource: Collection) -> Self {
        Self::new_with_root_resource(resource.clone(), resource)
    }

    /// `%resource` and `%rootResource` may differ when evaluating inside a
    /// contained resource.
    pub fn new_with_root_resource(resource: Collection, root_resource: Collection) -> Self {
        let mut variables: HashMap<Arc<str>, Collection> = HashMap::new();
        variables.insert(Arc::from("resource"), resource.clone());
        variables.insert(Arc::from("context"), resource.clone());
        variables.insert(Arc::from("rootResource"), root_resource);
        for (name, url) in [
            ("sct", "http://snomed.info/sct"),
            ("loinc", "http://loinc.org"),
            ("ucum", "http://unitsofmeasure.org"),
        ] {
            variables.insert(Arc::from(name), Collection::singleton(Value::string(url)));
        }

        Self {
            focus: resource,
            variables: Arc::new(variables),
            now: None,
        }
    }

    pub fn from_json(resource: &JsonValue) -> Self {
        Self::new(Collection::from_json(resource))
    }

    /// Evaluates against `focus` instead of `%resource`; `%context` follows.
    pub fn with_focus(mut self, focus: Collection) -> Self {
        self.set_variable("context", focus.clone());
        self.focus = focus;
        self
    }

    pub fn with_variable(mut self, name: &str, value: Collection) -> Self {
        self.set_variable(name, value);
        self
    }

    pub fn with_now(mut self, now: DateTime<FixedOffset>) -> Self {
        self.now = Some(now);
        self
    }

    /// Set a variable; a leading `%` in `name` is ignored.
    pub fn set_variable(&mut self, name: &str, value: Collection) {
        let name = name.strip_prefix('%').unwrap_or(name);
        Arc::make_mut(&mut self.variables).insert(Arc::from(name), value);
    }

    pub fn get_variable(&self, name: &str) -> Option<&Collection> {
        self.variables.get(name.strip_prefix('%').unwrap_or(name))
    }

    pub fn has_variable(&self, name: &str) -> bool {
        self.get_variable(name).is_some()
    }

    pub fn focus(&self) -> &Collection {
        &self.focus
    }

    pub fn now(&self) -> DateTime<FixedOffset> {
        self.now.unwrap_or_else(|| DateTime::<FixedOffset>::from(Local::now()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prefix_is_ignored() {
        let mut ctx = Context::from_json(&json!({"resourceType": "QuestionnaireResponse"}));
        ctx.set_variable("%score", Collection::singleton(Value::integer(3)));
        assert!(ctx.has_variable("score"));
        assert!(ctx.has_variable("%score"));
        assert!(ctx.has_variable("rootResource"));
    }

    #[test]
    fn test_with_focus_updates_context_variable() {
        let item = Collection::from_json(&json!({"linkId": "a"}));
        let ctx = Context::from_json(&json!({})).with_focus(item.clone());
        assert_eq!(ctx.get_variable("context"), Some(&item));
        assert_eq!(ctx.focus(), &item);
    }
}
