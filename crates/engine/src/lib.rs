#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # regula-engine
//!
//! A dependency-aware rule validation engine for hierarchical records.
//!
//! Rules and conditions are declared at entity paths (`level1.level2`) and
//! grouped into validators. [`ValidationEngine::validate`] expands those
//! paths over a concrete record, evaluates every condition and rule at each
//! reachable node, and returns the failures. Rules are skipped when their
//! guard conditions or any rule they depend on failed at the same node or
//! one of its ancestors.
//!
//! ```rust,ignore
//! use regula_engine::{
//!     EditableRule, InitializationOptions, JsonValidatable, ValidationEngine, ValidatorDefinition,
//! };
//!
//! let engine = ValidationEngine::new();
//! engine.initialize(
//!     InitializationOptions::default(),
//!     vec![ValidatorDefinition::new("V1")
//!         .with_context("CONTEXT_VALUE", "'1'")
//!         .with_rule(EditableRule::new("R1", "", "level1.level2.level3", "prop != CONTEXT_VALUE"))],
//! )?;
//!
//! let record = JsonValidatable::new("level1", serde_json::json!({
//!     "level2": [{"level3": [{"prop": "1"}]}]
//! }));
//! assert_eq!(engine.validate(&record).len(), 1);
//! ```

pub mod body;
pub mod context;
pub mod engine;
pub mod error;
pub mod execution;
pub mod expander;
pub mod failure;
mod global;
mod graph;
pub mod model;
pub mod options;
pub mod path;
mod registry;
pub mod stats;
pub mod validatable;

pub use body::{BodyKind, CompiledBody, Environment, NativeBodies, NativeBody, NativeBodyProvider};
pub use context::{DefaultValidatingContext, FailureLedger, ValidatingContext};
pub use engine::{EngineStatus, ValidationEngine};
pub use error::{BodyError, EngineError, ItemKind, ValidationError};
pub use execution::RunFilter;
pub use expander::{ExpandedNode, PathIndex, expand};
pub use failure::{RuleFailure, render_message};
pub use model::{
    CategoryDefinition, Condition, ContextDefinition, ContextEntry, EditableCondition,
    EditableRule, Rule, Severity, SetDefinition, Validator, ValidatorDefinition,
};
pub use options::InitializationOptions;
pub use path::{EntityPath, InstancePath, PathSegment};
pub use stats::{
    ExecutionStats, InitializationStats, PreCompilationSkipReason, RuleCompilation,
    RuleExecutionStats, ValidatorStats,
};
pub use validatable::{Child, JsonValidatable, PathResolver, StaticPathResolver, Validatable};

pub use regula_expression::{EvaluationContext, Value};
