//! Compile-and-evaluate entry point with a parsed-expression cache.

use crate::ast::AstNode;
use crate::context::Context;
use crate::error::Result;
use crate::evaluator::Evaluator;
use crate::parser::Parser;
use crate::value::Collection;
use lru::LruCache;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};

const DEFAULT_CACHE_SIZE: usize = 1000;

/// FHIRPath engine
///
/// Parsed expressions are cached by source text, so re-evaluating the same
/// questionnaire expression on every answer change only pays for evaluation.
/// Cloning shares the cache.
#[derive(Clone)]
pub struct Engine {
    cache: Arc<Mutex<LruCache<String, Arc<AstNode>>>>,
}

impl Engine {
    pub fn new() -> Self {
        Self::with_cache_size(DEFAULT_CACHE_SIZE)
    }

    pub fn with_cache_size(size: usize) -> Self {
        let capacity = NonZeroUsize::new(size).unwrap_or(NonZeroUsize::MIN);
        Self {
            cache: Arc::new(Mutex::new(LruCache::new(capacity))),
        }
    }

    /// Parse `expr`, reusing a cached AST when available.
    pub fn compile(&self, expr: &str) -> Result<Arc<AstNode>> {
        {
            let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
            if let Some(ast) = cache.get(expr) {
                return Ok(ast.clone());
            }
        }

        let ast = Arc::new(Parser::new(expr).parse()?);
        tracing::trace!(expression = expr, "compiled fhirpath expression");

        let mut cache = self.cache.lock().unwrap_or_else(|e| e.into_inner());
        cache.put(expr.to_string(), ast.clone());
        Ok(ast)
    }

    pub fn evaluate(&self, ast: &AstNode, ctx: &Context) -> Result<Collection> {
        Evaluator::new(ctx).evaluate(ast)
    }

    /// Compile + evaluate
    ///
    /// ```
    /// use sdc_fhirpath::{Context, Engine};
    /// use serde_json::json;
    ///
    /// let engine = Engine::new();
    /// let ctx = Context::from_json(&json!({"item": [{"linkId": "a"}]}));
    /// let result = engine.evaluate_expr("item.linkId", &ctx).unwrap();
    /// assert_eq!(result.as_string().unwrap().as_ref(), "a");
    /// ```
    pub fn evaluate_expr(&self, expr: &str, ctx: &Context) -> Result<Collection> {
        let ast = self.compile(expr)?;
        self.evaluate(&ast, ctx)
    }

    /// Evaluate against a JSON resource used as `%resource` and focus.
    pub fn evaluate_json(&self, expr: &str, resource: &serde_json::Value) -> Result<Collection> {
        self.evaluate_expr(expr, &Context::from_json(resource))
    }

    pub fn cached_expressions(&self) -> usize {
        self.cache.lock().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_compile_is_cached() {
        let engine = Engine::with_cache_size(2);
        let first = engine.compile("1 + 1").unwrap();
        let second = engine.compile("1 + 1").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(engine.cached_expressions(), 1);
    }

    #[test]
    fn test_parse_errors_are_not_cached() {
        let engine = Engine::new();
        assert!(engine.compile("1 +").is_err());
        assert_eq!(engine.cached_expressions(), 0);
    }

    #[test]
    fn test_evaluate_json() {
        let engine = Engine::new();
        let result = engine
            .evaluate_json("count()", &json!({"resourceType": "Patient"}))
            .unwrap();
        assert_eq!(result.as_integer().unwrap(), 1);
    }
}
