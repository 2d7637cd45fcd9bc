//! Compiled rule and condition bodies.
//!
//! A body is either an interpreted expression or a native implementation
//! supplied by the host. Both evaluate against the same
//! [`EvaluationContext`] and write to the same output slots.

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use regula_expression::{EvaluationContext, Expr, ExpressionEngine, Value, VariableResolver};
use serde::{Deserialize, Serialize};

use crate::error::{BodyError, EngineError};
use crate::model::Validator;
use crate::path::InstancePath;
use crate::stats::PreCompilationSkipReason;
use crate::validatable::Validatable;

/// A host-provided body.
pub trait NativeBody: Send + Sync {
    /// Decide whether the current node passes.
    fn evaluate(&self, context: &EvaluationContext<'_>) -> Result<bool, BodyError>;
}

impl<F> NativeBody for F
where
    F: Fn(&EvaluationContext<'_>) -> Result<bool, BodyError> + Send + Sync,
{
    fn evaluate(&self, context: &EvaluationContext<'_>) -> Result<bool, BodyError> {
        self(context)
    }
}

/// Looks up native bodies by rule or condition id.
pub trait NativeBodyProvider: Send + Sync {
    /// Native body for a rule.
    fn rule_body(&self, rule_id: &str) -> Option<Arc<dyn NativeBody>>;

    /// Native body for a condition.
    fn condition_body(&self, _condition_id: &str) -> Option<Arc<dyn NativeBody>> {
        None
    }
}

/// In-memory [`NativeBodyProvider`].
#[derive(Default, Clone)]
pub struct NativeBodies {
    rules: HashMap<String, Arc<dyn NativeBody>>,
    conditions: HashMap<String, Arc<dyn NativeBody>>,
}

impl NativeBodies {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Provide the body of rule `id`.
    pub fn with_rule<F>(mut self, id: impl Into<String>, body: F) -> Self
    where
        F: Fn(&EvaluationContext<'_>) -> Result<bool, BodyError> + Send + Sync + 'static,
    {
        self.rules.insert(id.into(), Arc::new(body));
        self
    }

    /// Provide the body of condition `id`.
    pub fn with_condition<F>(mut self, id: impl Into<String>, body: F) -> Self
    where
        F: Fn(&EvaluationContext<'_>) -> Result<bool, BodyError> + Send + Sync + 'static,
    {
        self.conditions.insert(id.into(), Arc::new(body));
        self
    }
}

impl NativeBodyProvider for NativeBodies {
    fn rule_body(&self, rule_id: &str) -> Option<Arc<dyn NativeBody>> {
        self.rules.get(rule_id).cloned()
    }

    fn condition_body(&self, condition_id: &str) -> Option<Arc<dyn NativeBody>> {
        self.conditions.get(condition_id).cloned()
    }
}

impl fmt::Debug for NativeBodies {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NativeBodies")
            .field("rules", &self.rules.keys().collect::<Vec<_>>())
            .field("conditions", &self.conditions.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Which variant a body compiled to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BodyKind {
    /// Expression source, interpreted.
    Interpreted,
    /// Native implementation from the host.
    Native,
}

/// An executable body.
#[derive(Clone)]
pub enum CompiledBody {
    /// Expression source and its parsed form.
    Interpreted {
        /// Source text.
        source: Arc<str>,
        /// Parsed expression.
        expr: Arc<Expr>,
    },
    /// Host implementation.
    Native(Arc<dyn NativeBody>),
}

impl CompiledBody {
    /// Which variant this is.
    pub fn kind(&self) -> BodyKind {
        match self {
            Self::Interpreted { .. } => BodyKind::Interpreted,
            Self::Native(_) => BodyKind::Native,
        }
    }

    /// Source text of an interpreted body.
    pub fn source(&self) -> Option<&str> {
        match self {
            Self::Interpreted { source, .. } => Some(source),
            Self::Native(_) => None,
        }
    }

    /// Evaluate against `context`; the value's truthiness is the result.
    pub fn evaluate(
        &self,
        expressions: &ExpressionEngine,
        context: &EvaluationContext<'_>,
    ) -> Result<bool, BodyError> {
        match self {
            Self::Interpreted { expr, .. } => Ok(expressions.evaluate_predicate_compiled(expr, context)?),
            Self::Native(body) => body.evaluate(context),
        }
    }
}

impl fmt::Debug for CompiledBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Interpreted { source, .. } => f.debug_tuple("Interpreted").field(source).finish(),
            Self::Native(_) => f.write_str("Native"),
        }
    }
}

/// Result of compiling one body.
#[derive(Debug, Clone)]
pub(crate) struct CompiledOutcome {
    pub body: CompiledBody,
    pub skip_reason: Option<PreCompilationSkipReason>,
    /// Identifiers the expression reads, empty for native bodies without source.
    pub identifiers: BTreeSet<String>,
}

/// What a body belongs to.
#[derive(Debug, Clone, Copy)]
pub(crate) enum BodyOwner<'a> {
    Rule(&'a str),
    Condition(&'a str),
}

impl BodyOwner<'_> {
    fn describe(&self) -> String {
        match self {
            Self::Rule(id) => format!("rule '{id}'"),
            Self::Condition(id) => format!("condition '{id}'"),
        }
    }
}

/// Compiles bodies, preferring native implementations when enabled.
#[derive(Clone)]
pub(crate) struct BodyCompiler {
    expressions: Arc<ExpressionEngine>,
    natives: Option<Arc<dyn NativeBodyProvider>>,
    native_enabled: bool,
}

impl BodyCompiler {
    pub fn new(
        expressions: Arc<ExpressionEngine>,
        natives: Option<Arc<dyn NativeBodyProvider>>,
        native_enabled: bool,
    ) -> Self {
        Self {
            expressions,
            natives,
            native_enabled,
        }
    }

    pub fn expressions(&self) -> &ExpressionEngine {
        &self.expressions
    }

    pub fn compile(
        &self,
        owner: BodyOwner<'_>,
        expression: Option<&str>,
    ) -> Result<CompiledOutcome, EngineError> {
        let native = if self.native_enabled {
            self.natives.as_ref().and_then(|provider| match owner {
                BodyOwner::Rule(id) => provider.rule_body(id),
                BodyOwner::Condition(id) => provider.condition_body(id),
            })
        } else {
            None
        };

        if let Some(native) = native {
            // Source of a native body only feeds implicated properties.
            let identifiers = expression
                .and_then(|source| self.expressions.compile(source).ok())
                .map(|expr| expr.referenced_identifiers())
                .unwrap_or_default();
            return Ok(CompiledOutcome {
                body: CompiledBody::Native(native),
                skip_reason: None,
                identifiers,
            });
        }

        let skip_reason = if self.native_enabled {
            PreCompilationSkipReason::NotProvided
        } else {
            PreCompilationSkipReason::Disabled
        };

        let source = expression
            .map(str::trim)
            .filter(|source| !source.is_empty())
            .ok_or_else(|| {
                EngineError::invalid_expression(
                    owner.describe(),
                    regula_expression::ExpressionError::parse("body is empty"),
                )
            })?;
        let expr = self
            .expressions
            .compile(source)
            .map_err(|error| EngineError::invalid_expression(owner.describe(), error))?;

        Ok(CompiledOutcome {
            identifiers: expr.referenced_identifiers(),
            body: CompiledBody::Interpreted {
                source: Arc::from(source),
                expr,
            },
            skip_reason: Some(skip_reason),
        })
    }
}

impl fmt::Debug for BodyCompiler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BodyCompiler")
            .field("has_natives", &self.natives.is_some())
            .field("native_enabled", &self.native_enabled)
            .finish_non_exhaustive()
    }
}

/// Names a body can read while it runs on one node.
///
/// Lookup order: properties of the current node, then the validator's
/// context values, then ancestor segment names (nearest first), then the
/// root alias.
pub struct Environment<'a> {
    record: &'a dyn Validatable,
    chain: &'a [InstancePath],
    validator: Option<&'a Validator>,
    root_alias: Option<&'a str>,
}

impl<'a> Environment<'a> {
    /// Environment for the last node of `chain`.
    pub fn new(
        record: &'a dyn Validatable,
        chain: &'a [InstancePath],
        validator: Option<&'a Validator>,
        root_alias: Option<&'a str>,
    ) -> Self {
        Self {
            record,
            chain,
            validator,
            root_alias,
        }
    }

    fn current(&self) -> Option<&InstancePath> {
        self.chain.last()
    }
}

impl VariableResolver for Environment<'_> {
    fn resolve(&self, name: &str) -> Option<Value> {
        let current = self.current()?;
        if let Some(value) = self.record.property_value(current, name) {
            return Some(value);
        }
        if let Some(value) = self.validator.and_then(|v| v.context_value(name)) {
            return Some(value.clone());
        }
        if let Some(ancestor) = self.chain.iter().rev().find(|p| &*p.leaf().name == name) {
            return self.record.node_value(ancestor);
        }
        if self.root_alias == Some(name) {
            return self.chain.first().and_then(|root| self.record.node_value(root));
        }
        None
    }
}
