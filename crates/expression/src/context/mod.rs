//! Evaluation context for expression execution
//!
//! A context carries the values an expression can see and the output slots
//! effect builtins write to. Lookups consult local bindings first, then the
//! optional [`VariableResolver`].

use std::cell::{Ref, RefCell};
use std::collections::HashMap;
use std::sync::Arc;

use serde_json::Value;

/// Source of values that are too expensive or too dynamic to bind up front.
pub trait VariableResolver {
    /// Resolve `name` to a value, or `None` when the name is unknown.
    fn resolve(&self, name: &str) -> Option<Value>;
}

impl<F> VariableResolver for F
where
    F: Fn(&str) -> Option<Value>,
{
    fn resolve(&self, name: &str) -> Option<Value> {
        self(name)
    }
}

/// Reserved output slots written by effect builtins.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Outputs {
    /// Failure message override
    pub message: Option<String>,
    /// Extra error strings
    pub errors: Vec<String>,
    /// Extra warning strings
    pub warnings: Vec<String>,
    /// Extra informational strings
    pub information: Vec<String>,
    /// Fail regardless of the body result
    pub force_failure: bool,
}

impl Outputs {
    /// True when no slot has been written
    pub fn is_empty(&self) -> bool {
        self.message.is_none()
            && self.errors.is_empty()
            && self.warnings.is_empty()
            && self.information.is_empty()
            && !self.force_failure
    }
}

/// Evaluation context containing bindings and output slots
pub struct EvaluationContext<'r> {
    bindings: HashMap<Arc<str>, Value>,
    resolver: Option<&'r dyn VariableResolver>,
    outputs: RefCell<Outputs>,
}

impl<'r> EvaluationContext<'r> {
    /// Create a new empty evaluation context
    pub fn new() -> Self {
        Self {
            bindings: HashMap::new(),
            resolver: None,
            outputs: RefCell::new(Outputs::default()),
        }
    }

    /// Create a context that falls back to `resolver` for unbound names
    pub fn with_resolver(resolver: &'r dyn VariableResolver) -> Self {
        Self {
            resolver: Some(resolver),
            ..Self::new()
        }
    }

    /// Bind `name` to `value`, replacing any previous binding
    pub fn bind(&mut self, name: impl Into<Arc<str>>, value: Value) {
        self.bindings.insert(name.into(), value);
    }

    /// Bind `name` only when it is not already bound
    pub fn bind_if_absent(&mut self, name: impl Into<Arc<str>>, value: Value) {
        self.bindings.entry(name.into()).or_insert(value);
    }

    /// Whether `name` has a local binding
    pub fn is_bound(&self, name: &str) -> bool {
        self.bindings.contains_key(name)
    }

    /// Resolve a name through the bindings, then the resolver
    pub fn resolve_variable(&self, name: &str) -> Option<Value> {
        if let Some(value) = self.bindings.get(name) {
            return Some(value.clone());
        }
        self.resolver.and_then(|resolver| resolver.resolve(name))
    }

    /// Snapshot of the output slots
    pub fn outputs(&self) -> Ref<'_, Outputs> {
        self.outputs.borrow()
    }

    /// Take the output slots, leaving them empty
    pub fn take_outputs(&self) -> Outputs {
        self.outputs.take()
    }

    /// Mutate the output slots
    pub fn record(&self, update: impl FnOnce(&mut Outputs)) {
        update(&mut self.outputs.borrow_mut());
    }
}

impl Default for EvaluationContext<'_> {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EvaluationContext<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EvaluationContext")
            .field("bindings", &self.bindings)
            .field("has_resolver", &self.resolver.is_some())
            .field("outputs", &self.outputs)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_bindings_win_over_resolver() {
        let resolver = |name: &str| (name == "a").then(|| json!("resolved"));
        let mut context = EvaluationContext::with_resolver(&resolver);
        assert_eq!(context.resolve_variable("a"), Some(json!("resolved")));

        context.bind("a", json!("bound"));
        assert_eq!(context.resolve_variable("a"), Some(json!("bound")));
        assert_eq!(context.resolve_variable("b"), None);
    }

    #[test]
    fn test_bind_if_absent_keeps_first() {
        let mut context = EvaluationContext::new();
        context.bind("prop", json!(1));
        context.bind_if_absent("prop", json!(2));
        assert_eq!(context.resolve_variable("prop"), Some(json!(1)));
    }

    #[test]
    fn test_outputs_record_and_take() {
        let context = EvaluationContext::new();
        assert!(context.outputs().is_empty());

        context.record(|outputs| outputs.errors.push("bad".into()));
        context.record(|outputs| outputs.force_failure = true);

        let taken = context.take_outputs();
        assert_eq!(taken.errors, vec!["bad".to_string()]);
        assert!(taken.force_failure);
        assert!(context.outputs().is_empty());
    }
}
