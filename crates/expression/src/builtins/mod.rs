//! Built-in functions for the expression language
//!
//! Functions are grouped by category; effect functions write to the
//! context's output slots instead of computing a value.

pub mod conversion;
pub mod effects;
pub mod math;
pub mod string;
pub mod util;

use std::collections::HashMap;

use serde_json::Value;

use crate::context::EvaluationContext;
use crate::error::{ExpressionError, ExpressionResult};
use crate::value_utils::value_type_name;

/// Type alias for a builtin function
pub type BuiltinFunction = fn(&[Value], &EvaluationContext<'_>) -> ExpressionResult<Value>;

/// Registry of all builtin functions
pub struct BuiltinRegistry {
    functions: HashMap<&'static str, BuiltinFunction>,
}

impl BuiltinRegistry {
    /// Create a new builtin registry with all standard functions
    pub fn new() -> Self {
        let mut registry = Self {
            functions: HashMap::new(),
        };

        registry.register_string_functions();
        registry.register_math_functions();
        registry.register_conversion_functions();
        registry.register_util_functions();
        registry.register_effect_functions();

        registry
    }

    /// Register a builtin function, replacing any previous one with that name
    pub fn register(&mut self, name: &'static str, func: BuiltinFunction) {
        self.functions.insert(name, func);
    }

    /// Call a builtin function by name
    pub fn call(
        &self,
        name: &str,
        args: &[Value],
        context: &EvaluationContext<'_>,
    ) -> ExpressionResult<Value> {
        let func = self
            .functions
            .get(name)
            .ok_or_else(|| ExpressionError::function_not_found(name))?;

        func(args, context)
    }

    /// Check if a function exists
    pub fn has_function(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Get all function names, sorted
    pub fn function_names(&self) -> Vec<&'static str> {
        let mut names: Vec<_> = self.functions.keys().copied().collect();
        names.sort_unstable();
        names
    }

    fn register_string_functions(&mut self) {
        self.register("uppercase", string::uppercase);
        self.register("lowercase", string::lowercase);
        self.register("trim", string::trim);
        self.register("replace", string::replace);
        self.register("substring", string::substring);
        self.register("contains", string::contains);
        self.register("starts_with", string::starts_with);
        self.register("ends_with", string::ends_with);
    }

    fn register_math_functions(&mut self) {
        self.register("abs", math::abs);
        self.register("round", math::round);
        self.register("min", math::min);
        self.register("max", math::max);
    }

    fn register_conversion_functions(&mut self) {
        self.register("to_string", conversion::to_string);
        self.register("to_number", conversion::to_number);
        self.register("to_boolean", conversion::to_boolean);
    }

    fn register_util_functions(&mut self) {
        self.register("length", util::length);
        self.register("is_null", util::is_null);
        self.register("is_empty", util::is_empty);
        self.register("coalesce", util::coalesce);
    }

    fn register_effect_functions(&mut self) {
        self.register("set_message", effects::set_message);
        self.register("add_error", effects::add_error);
        self.register("add_warning", effects::add_warning);
        self.register("add_info", effects::add_info);
        self.register("force_failure", effects::force_failure);
    }
}

impl Default for BuiltinRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for BuiltinRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BuiltinRegistry")
            .field("functions", &self.function_names())
            .finish()
    }
}

/// Helper to check argument count
pub(crate) fn check_arg_count(
    func_name: &str,
    args: &[Value],
    expected: usize,
) -> ExpressionResult<()> {
    if args.len() == expected {
        Ok(())
    } else {
        Err(ExpressionError::invalid_argument(
            func_name,
            format!("expected {expected} arguments, got {}", args.len()),
        ))
    }
}

/// Helper to check minimum argument count
pub(crate) fn check_min_arg_count(
    func_name: &str,
    args: &[Value],
    min: usize,
) -> ExpressionResult<()> {
    if args.len() < min {
        Err(ExpressionError::invalid_argument(
            func_name,
            format!("expected at least {min} arguments, got {}", args.len()),
        ))
    } else {
        Ok(())
    }
}

fn missing_arg(func_name: &str, index: usize, arg_name: &str) -> ExpressionError {
    ExpressionError::invalid_argument(
        func_name,
        format!("missing argument '{arg_name}' at position {index}"),
    )
}

/// Helper to get a string argument with a readable error
pub(crate) fn get_string_arg<'a>(
    func_name: &str,
    args: &'a [Value],
    index: usize,
    arg_name: &str,
) -> ExpressionResult<&'a str> {
    let value = args
        .get(index)
        .ok_or_else(|| missing_arg(func_name, index, arg_name))?;
    value.as_str().ok_or_else(|| {
        ExpressionError::invalid_argument(
            func_name,
            format!(
                "argument '{arg_name}' must be a string, got {}",
                value_type_name(value)
            ),
        )
    })
}

/// Helper to get an integer argument with a readable error
pub(crate) fn get_int_arg(
    func_name: &str,
    args: &[Value],
    index: usize,
    arg_name: &str,
) -> ExpressionResult<i64> {
    let value = args
        .get(index)
        .ok_or_else(|| missing_arg(func_name, index, arg_name))?;
    value.as_i64().ok_or_else(|| {
        ExpressionError::invalid_argument(
            func_name,
            format!(
                "argument '{arg_name}' must be an integer, got {}",
                value_type_name(value)
            ),
        )
    })
}

/// Helper to get a number argument (int or float) with a readable error
pub(crate) fn get_number_arg(
    func_name: &str,
    args: &[Value],
    index: usize,
    arg_name: &str,
) -> ExpressionResult<f64> {
    let value = args
        .get(index)
        .ok_or_else(|| missing_arg(func_name, index, arg_name))?;
    match value {
        Value::Number(n) => crate::value_utils::number_as_f64(n),
        _ => None,
    }
    .ok_or_else(|| {
        ExpressionError::invalid_argument(
            func_name,
            format!(
                "argument '{arg_name}' must be a number, got {}",
                value_type_name(value)
            ),
        )
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_get_string_arg_type_error() {
        let args = vec![json!(42)];
        let msg = get_string_arg("test_func", &args, 0, "text")
            .unwrap_err()
            .to_string();
        assert!(msg.contains("argument 'text' must be a string"));
        assert!(msg.contains("number"));
    }

    #[test]
    fn test_get_int_arg_missing() {
        let msg = get_int_arg("test_func", &[], 1, "count")
            .unwrap_err()
            .to_string();
        assert!(msg.contains("missing argument 'count' at position 1"));
    }

    #[test]
    fn test_get_number_arg_accepts_int_and_float() {
        assert_eq!(get_number_arg("f", &[json!(42)], 0, "v").unwrap(), 42.0);
        assert_eq!(get_number_arg("f", &[json!(2.5)], 0, "v").unwrap(), 2.5);
    }

    #[test]
    fn test_unknown_function() {
        let registry = BuiltinRegistry::new();
        let context = EvaluationContext::new();
        let err = registry.call("nope", &[], &context).unwrap_err();
        assert_eq!(err, ExpressionError::function_not_found("nope"));
    }

    #[test]
    fn test_effect_functions_are_registered() {
        let registry = BuiltinRegistry::new();
        for name in ["set_message", "add_error", "add_warning", "add_info", "force_failure"] {
            assert!(registry.has_function(name), "{name} missing");
        }
    }
}
