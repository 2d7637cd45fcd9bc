//! Engine error types.

use std::fmt;

use regula_expression::ExpressionError;
use thiserror::Error;

/// What an identifier names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ItemKind {
    /// A validator bundle.
    Validator,
    /// A rule.
    Rule,
    /// A condition.
    Condition,
    /// A rule another rule depends on.
    Dependency,
    /// A named context expression.
    Context,
    /// A named rule set.
    Set,
    /// A rule category.
    Category,
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Validator => "validator",
            Self::Rule => "rule",
            Self::Condition => "condition",
            Self::Dependency => "dependency",
            Self::Context => "context",
            Self::Set => "set",
            Self::Category => "category",
        })
    }
}

/// Construction-time errors. A mutation that returns one of these changed
/// nothing.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// An item with this id already exists.
    #[error("duplicate {kind} id: {id}")]
    DuplicateId {
        /// Kind of the duplicated item.
        kind: ItemKind,
        /// The duplicated id.
        id: String,
    },

    /// A referenced item does not exist (or is not active).
    #[error("unknown {kind}: {id}")]
    UnknownReference {
        /// Kind of the missing item.
        kind: ItemKind,
        /// The missing id.
        id: String,
    },

    /// An entity path failed to parse.
    #[error("invalid entity path '{path}': {reason}")]
    InvalidPath {
        /// The offending path text.
        path: String,
        /// Why it was rejected.
        reason: String,
    },

    /// A body or context expression failed to compile or evaluate.
    #[error("invalid expression for {owner}: {error}")]
    InvalidExpression {
        /// Rule, condition or context the expression belongs to.
        owner: String,
        /// Underlying expression error.
        #[source]
        error: ExpressionError,
    },

    /// The dependency graph would contain a cycle.
    #[error("cyclic dependency: {}", chain.join(" -> "))]
    CyclicDependency {
        /// Rule ids along the cycle; first and last are equal.
        chain: Vec<String>,
    },

    /// The item is still referenced.
    #[error("{kind} '{id}' is still referenced by: {}", dependents.join(", "))]
    DependentsExist {
        /// Kind of the referenced item.
        kind: ItemKind,
        /// The referenced id.
        id: String,
        /// Ids of the items that reference it.
        dependents: Vec<String>,
    },

    /// A rule references a condition declared below it.
    #[error(
        "'{id}' at '{path}' cannot reference condition '{condition}' declared at '{condition_path}'"
    )]
    PathAncestryViolation {
        /// The referencing rule.
        id: String,
        /// Its entity path.
        path: String,
        /// The referenced condition.
        condition: String,
        /// The condition's entity path.
        condition_path: String,
    },

    /// The operation requires an initialized engine.
    #[error("engine is not initialized")]
    NotInitialized,

    /// The compilation worker pool could not be built.
    #[error("compilation worker pool error: {0}")]
    WorkerPool(String),
}

impl EngineError {
    pub(crate) fn unknown(kind: ItemKind, id: impl Into<String>) -> Self {
        Self::UnknownReference {
            kind,
            id: id.into(),
        }
    }

    pub(crate) fn duplicate(kind: ItemKind, id: impl Into<String>) -> Self {
        Self::DuplicateId {
            kind,
            id: id.into(),
        }
    }

    pub(crate) fn invalid_path(path: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidPath {
            path: path.into(),
            reason: reason.into(),
        }
    }

    pub(crate) fn invalid_expression(owner: impl Into<String>, error: ExpressionError) -> Self {
        Self::InvalidExpression {
            owner: owner.into(),
            error,
        }
    }
}

/// Validation-time errors. Only forced rules can raise them.
#[derive(Debug, Clone, Error)]
pub enum ValidationError {
    /// The forced rule's entity path has no instance in the record.
    #[error("rule '{rule_id}' path '{path}' is unreachable in the record")]
    UnreachablePath {
        /// The forced rule.
        rule_id: String,
        /// Its entity path.
        path: String,
    },

    /// The forced rule definition does not compile against the registry.
    #[error("invalid forced rule: {0}")]
    InvalidForcedRule(#[from] EngineError),
}

/// Errors raised by a body while it evaluates. Never returned from
/// `validate`; captured into the failure instead.
#[derive(Debug, Clone, Error)]
pub enum BodyError {
    /// The interpreted expression failed.
    #[error(transparent)]
    Expression(#[from] ExpressionError),

    /// A native body reported an error.
    #[error("{0}")]
    Native(String),
}

impl BodyError {
    /// Create a native body error.
    pub fn native(message: impl Into<String>) -> Self {
        Self::Native(message.into())
    }
}
