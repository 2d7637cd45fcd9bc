#![forbid(unsafe_code)]
#![warn(missing_docs)]

//! # regula-expression
//!
//! The embedded expression language used to write interpreted rule and
//! condition bodies.
//!
//! A body is a single expression evaluated against an [`EvaluationContext`];
//! its truthiness decides whether the rule passes.
//!
//! - Literals: `42`, `3.5`, `"text"`, `'text'`, `true`, `false`, `null`, `[1, 2]`
//! - Bare identifiers resolve through the context (record properties, named
//!   contexts, path aliases) and evaluate to `null` when unbound
//! - Variables: `$name` must be bound, otherwise evaluation fails
//! - Arithmetic: `+`, `-`, `*`, `/`, `%`, `**`
//! - Comparison: `==`, `!=`, `<`, `>`, `<=`, `>=`, `=~`
//! - Logical: `&&`, `||`, `!` (short-circuiting)
//! - Property and index access: `record.field`, `items[0]`, `map['key']`
//! - Function calls and pipelines: `trim(name)`, `name | trim | length`
//! - Conditionals: `if cond then a else b`
//!
//! Bodies write to the reserved output slots through the effect builtins
//! `set_message`, `add_error`, `add_warning`, `add_info` and `force_failure`.
//!
//! ```rust,ignore
//! use regula_expression::{EvaluationContext, ExpressionEngine};
//!
//! let engine = ExpressionEngine::with_cache_size(256);
//! let mut context = EvaluationContext::new();
//! context.bind("prop", serde_json::json!("1"));
//! let passed = engine.evaluate_predicate("prop != '1'", &context).unwrap();
//! assert!(!passed);
//! ```

pub mod builtins;
pub mod context;
pub mod core;
pub mod engine;
pub mod error;
pub mod eval;
pub mod lexer;
pub mod parser;
pub mod value_utils;

pub use context::{EvaluationContext, Outputs, VariableResolver};
pub use core::ast::{BinaryOp, Expr};
pub use engine::ExpressionEngine;
pub use error::{ExpressionError, ExpressionResult};

/// Re-export of the value type expressions operate on.
pub use serde_json::Value;
