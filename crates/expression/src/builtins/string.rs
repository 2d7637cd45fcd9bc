//! String manipulation functions

use serde_json::Value;

use super::{check_arg_count, check_min_arg_count, get_int_arg, get_string_arg};
use crate::context::EvaluationContext;
use crate::error::{ExpressionError, ExpressionResult};

/// Convert string to uppercase
pub fn uppercase(args: &[Value], _ctx: &EvaluationContext<'_>) -> ExpressionResult<Value> {
    check_arg_count("uppercase", args, 1)?;
    let s = get_string_arg("uppercase", args, 0, "text")?;
    Ok(Value::String(s.to_uppercase()))
}

/// Convert string to lowercase
pub fn lowercase(args: &[Value], _ctx: &EvaluationContext<'_>) -> ExpressionResult<Value> {
    check_arg_count("lowercase", args, 1)?;
    let s = get_string_arg("lowercase", args, 0, "text")?;
    Ok(Value::String(s.to_lowercase()))
}

/// Trim whitespace from both ends of a string
pub fn trim(args: &[Value], _ctx: &EvaluationContext<'_>) -> ExpressionResult<Value> {
    check_arg_count("trim", args, 1)?;
    let s = get_string_arg("trim", args, 0, "text")?;
    Ok(Value::String(s.trim().to_string()))
}

/// Replace all occurrences of a substring
pub fn replace(args: &[Value], _ctx: &EvaluationContext<'_>) -> ExpressionResult<Value> {
    check_arg_count("replace", args, 3)?;
    let s = get_string_arg("replace", args, 0, "text")?;
    let from = get_string_arg("replace", args, 1, "search")?;
    let to = get_string_arg("replace", args, 2, "replacement")?;
    Ok(Value::String(s.replace(from, to)))
}

/// Character-based substring: `substring(text, start[, length])`
pub fn substring(args: &[Value], _ctx: &EvaluationContext<'_>) -> ExpressionResult<Value> {
    check_min_arg_count("substring", args, 2)?;
    let s = get_string_arg("substring", args, 0, "text")?;
    let start = get_int_arg("substring", args, 1, "start")?;
    if start < 0 {
        return Err(ExpressionError::invalid_argument(
            "substring",
            "start must not be negative",
        ));
    }

    let chars = s.chars().skip(start as usize);
    let result: String = if args.len() > 2 {
        let length = get_int_arg("substring", args, 2, "length")?;
        chars.take(length.max(0) as usize).collect()
    } else {
        chars.collect()
    };
    Ok(Value::String(result))
}

/// Check if a string contains a substring, or an array contains a value
pub fn contains(args: &[Value], _ctx: &EvaluationContext<'_>) -> ExpressionResult<Value> {
    check_arg_count("contains", args, 2)?;
    if let Value::Array(items) = &args[0] {
        let needle = &args[1];
        return Ok(Value::Bool(
            items
                .iter()
                .any(|item| crate::value_utils::values_equal(item, needle)),
        ));
    }
    let s = get_string_arg("contains", args, 0, "text")?;
    let needle = get_string_arg("contains", args, 1, "search")?;
    Ok(Value::Bool(s.contains(needle)))
}

/// Check if a string starts with a prefix
pub fn starts_with(args: &[Value], _ctx: &EvaluationContext<'_>) -> ExpressionResult<Value> {
    check_arg_count("starts_with", args, 2)?;
    let s = get_string_arg("starts_with", args, 0, "text")?;
    let prefix = get_string_arg("starts_with", args, 1, "prefix")?;
    Ok(Value::Bool(s.starts_with(prefix)))
}

/// Check if a string ends with a suffix
pub fn ends_with(args: &[Value], _ctx: &EvaluationContext<'_>) -> ExpressionResult<Value> {
    check_arg_count("ends_with", args, 2)?;
    let s = get_string_arg("ends_with", args, 0, "text")?;
    let suffix = get_string_arg("ends_with", args, 1, "suffix")?;
    Ok(Value::Bool(s.ends_with(suffix)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn call(f: crate::builtins::BuiltinFunction, args: &[Value]) -> ExpressionResult<Value> {
        f(args, &EvaluationContext::new())
    }

    #[test]
    fn test_substring_is_char_based() {
        assert_eq!(
            call(substring, &[json!("héllo"), json!(1), json!(3)]).unwrap(),
            json!("éll")
        );
        assert_eq!(call(substring, &[json!("abc"), json!(1)]).unwrap(), json!("bc"));
        assert!(call(substring, &[json!("abc"), json!(-1)]).is_err());
    }

    #[test]
    fn test_contains_string_and_array() {
        assert_eq!(call(contains, &[json!("hello"), json!("ell")]).unwrap(), json!(true));
        assert_eq!(call(contains, &[json!([1, 2]), json!(2.0)]).unwrap(), json!(true));
        assert_eq!(call(contains, &[json!(["a"]), json!("b")]).unwrap(), json!(false));
    }

    #[test]
    fn test_replace_all() {
        assert_eq!(
            call(replace, &[json!("a-b-c"), json!("-"), json!("+")]).unwrap(),
            json!("a+b+c")
        );
    }
}
