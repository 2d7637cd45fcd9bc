//! Expression engine with caching support
//!
//! [`ExpressionEngine`] parses, checks and evaluates expressions, keeping
//! parsed ASTs in a bounded cache keyed by source text.

use std::sync::Arc;

use serde_json::Value;
use tracing::{debug, trace};

use crate::builtins::{BuiltinFunction, BuiltinRegistry};
use crate::context::EvaluationContext;
use crate::core::ast::Expr;
use crate::error::{ExpressionError, ExpressionResult};
use crate::eval::Evaluator;
use crate::parser;
use crate::value_utils::is_truthy;

/// Expression engine with parsing and evaluation capabilities
pub struct ExpressionEngine {
    #[cfg(feature = "cache")]
    cache: Option<moka::sync::Cache<Arc<str>, Arc<Expr>>>,
    evaluator: Evaluator,
}

impl ExpressionEngine {
    /// Create a new expression engine without an AST cache
    pub fn new() -> Self {
        Self::with_registry(BuiltinRegistry::new())
    }

    /// Create an engine that dispatches calls to `registry`
    pub fn with_registry(registry: BuiltinRegistry) -> Self {
        Self {
            #[cfg(feature = "cache")]
            cache: None,
            evaluator: Evaluator::new(Arc::new(registry)),
        }
    }

    /// Create a new expression engine with a cache of the specified size
    #[cfg(feature = "cache")]
    pub fn with_cache_size(size: usize) -> Self {
        debug!(cache_size = size, "created expression engine with cache");
        Self {
            cache: Some(
                moka::sync::Cache::builder()
                    .max_capacity(size as u64)
                    .build(),
            ),
            ..Self::new()
        }
    }

    /// Build an engine with extra builtins on top of the standard set
    pub fn with_functions(functions: &[(&'static str, BuiltinFunction)]) -> Self {
        let mut registry = BuiltinRegistry::new();
        for &(name, func) in functions {
            registry.register(name, func);
        }
        Self::with_registry(registry)
    }

    /// Parse `source` and check that every called function exists.
    pub fn compile(&self, source: &str) -> ExpressionResult<Arc<Expr>> {
        #[cfg(feature = "cache")]
        if let Some(cache) = &self.cache {
            if let Some(expr) = cache.get(source) {
                return Ok(expr);
            }
        }

        let expr = parser::parse(source)?;
        for function in expr.called_functions() {
            if !self.evaluator.builtins().has_function(&function) {
                return Err(ExpressionError::function_not_found(function));
            }
        }
        let expr = Arc::new(expr);

        #[cfg(feature = "cache")]
        if let Some(cache) = &self.cache {
            cache.insert(Arc::from(source), Arc::clone(&expr));
        }

        Ok(expr)
    }

    /// Evaluate an expression string in the given context
    pub fn evaluate(
        &self,
        source: &str,
        context: &EvaluationContext<'_>,
    ) -> ExpressionResult<Value> {
        trace!(expression = source, "evaluating expression");
        let expr = self.compile(source)?;
        self.evaluate_compiled(&expr, context)
    }

    /// Evaluate an already compiled expression
    pub fn evaluate_compiled(
        &self,
        expr: &Expr,
        context: &EvaluationContext<'_>,
    ) -> ExpressionResult<Value> {
        let result = self.evaluator.eval(expr, context)?;
        trace!(result = ?result, "expression evaluation completed");
        Ok(result)
    }

    /// Evaluate a compiled expression and reduce the result to its truthiness
    pub fn evaluate_predicate_compiled(
        &self,
        expr: &Expr,
        context: &EvaluationContext<'_>,
    ) -> ExpressionResult<bool> {
        self.evaluate_compiled(expr, context).map(|v| is_truthy(&v))
    }

    /// Evaluate an expression string and reduce the result to its truthiness
    pub fn evaluate_predicate(
        &self,
        source: &str,
        context: &EvaluationContext<'_>,
    ) -> ExpressionResult<bool> {
        self.evaluate(source, context).map(|v| is_truthy(&v))
    }

    /// Whether a function with this name can be called
    pub fn has_function(&self, name: &str) -> bool {
        self.evaluator.builtins().has_function(name)
    }

    /// Clear the cache (if caching is enabled)
    pub fn clear_cache(&self) {
        #[cfg(feature = "cache")]
        if let Some(cache) = &self.cache {
            cache.invalidate_all();
            debug!("expression cache cleared");
        }
    }

    /// Number of cached ASTs, `None` when caching is disabled
    pub fn cached_entries(&self) -> Option<u64> {
        #[cfg(feature = "cache")]
        if let Some(cache) = &self.cache {
            cache.run_pending_tasks();
            return Some(cache.entry_count());
        }
        None
    }
}

impl Default for ExpressionEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ExpressionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExpressionEngine")
            .field("evaluator", &self.evaluator)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_evaluate_arithmetic() {
        let engine = ExpressionEngine::new();
        let context = EvaluationContext::new();
        assert_eq!(engine.evaluate("2 + 3 * 4", &context).unwrap(), json!(14));
    }

    #[test]
    fn test_evaluate_string_function() {
        let engine = ExpressionEngine::new();
        let context = EvaluationContext::new();
        assert_eq!(
            engine.evaluate("uppercase('hello')", &context).unwrap(),
            json!("HELLO")
        );
    }

    #[test]
    fn test_compile_rejects_unknown_function() {
        let engine = ExpressionEngine::new();
        let err = engine.compile("frobnicate(1)").unwrap_err();
        assert_eq!(err, ExpressionError::function_not_found("frobnicate"));
        assert!(err.is_compile_error());
    }

    #[test]
    fn test_predicate_uses_truthiness() {
        let engine = ExpressionEngine::new();
        let mut context = EvaluationContext::new();
        context.bind("name", json!("  "));
        assert!(!engine.evaluate_predicate("trim(name)", &context).unwrap());
        assert!(engine.evaluate_predicate("name", &context).unwrap());
    }

    #[test]
    fn test_custom_function() {
        fn double(args: &[Value], _ctx: &EvaluationContext<'_>) -> ExpressionResult<Value> {
            Ok(json!(args[0].as_i64().unwrap_or(0) * 2))
        }
        let engine = ExpressionEngine::with_functions(&[("double", double as BuiltinFunction)]);
        let context = EvaluationContext::new();
        assert_eq!(engine.evaluate("double(21)", &context).unwrap(), json!(42));
    }

    #[test]
    #[cfg(feature = "cache")]
    fn test_cache_reuses_ast() {
        let engine = ExpressionEngine::with_cache_size(16);
        let first = engine.compile("a + 1").unwrap();
        let second = engine.compile("a + 1").unwrap();
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(engine.cached_entries(), Some(1));

        engine.clear_cache();
        assert_eq!(engine.cached_entries(), Some(0));
    }

    #[test]
    fn test_no_cache_reports_none() {
        assert_eq!(ExpressionEngine::new().cached_entries(), None);
    }
}
