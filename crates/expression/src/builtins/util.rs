//! General purpose functions

use serde_json::Value;

use super::{check_arg_count, check_min_arg_count};
use crate::context::EvaluationContext;
use crate::error::{ExpressionError, ExpressionResult};
use crate::value_utils::value_type_name;

/// Character length of a string, or element count of an array or object
pub fn length(args: &[Value], _ctx: &EvaluationContext<'_>) -> ExpressionResult<Value> {
    check_arg_count("length", args, 1)?;
    let len = match &args[0] {
        Value::String(s) => s.chars().count(),
        Value::Array(items) => items.len(),
        Value::Object(map) => map.len(),
        Value::Null => 0,
        other => {
            return Err(ExpressionError::type_mismatch(
                "string, array or object",
                value_type_name(other),
            ));
        }
    };
    Ok(Value::from(len))
}

/// True when the value is null
pub fn is_null(args: &[Value], _ctx: &EvaluationContext<'_>) -> ExpressionResult<Value> {
    check_arg_count("is_null", args, 1)?;
    Ok(Value::Bool(args[0].is_null()))
}

/// True for null, empty or whitespace-only strings and empty collections
pub fn is_empty(args: &[Value], _ctx: &EvaluationContext<'_>) -> ExpressionResult<Value> {
    check_arg_count("is_empty", args, 1)?;
    let empty = match &args[0] {
        Value::Null => true,
        Value::String(s) => s.trim().is_empty(),
        Value::Array(items) => items.is_empty(),
        Value::Object(map) => map.is_empty(),
        Value::Bool(_) | Value::Number(_) => false,
    };
    Ok(Value::Bool(empty))
}

/// First argument that is not null
pub fn coalesce(args: &[Value], _ctx: &EvaluationContext<'_>) -> ExpressionResult<Value> {
    check_min_arg_count("coalesce", args, 1)?;
    Ok(args
        .iter()
        .find(|value| !value.is_null())
        .cloned()
        .unwrap_or(Value::Null))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_length_counts_chars() {
        let ctx = EvaluationContext::new();
        assert_eq!(length(&[json!("héllo")], &ctx).unwrap(), json!(5));
        assert_eq!(length(&[json!([1, 2])], &ctx).unwrap(), json!(2));
        assert_eq!(length(&[Value::Null], &ctx).unwrap(), json!(0));
        assert!(length(&[json!(1)], &ctx).is_err());
    }

    #[test]
    fn test_is_empty_treats_blank_as_empty() {
        let ctx = EvaluationContext::new();
        assert_eq!(is_empty(&[json!("  ")], &ctx).unwrap(), json!(true));
        assert_eq!(is_empty(&[json!(0)], &ctx).unwrap(), json!(false));
    }

    #[test]
    fn test_coalesce() {
        let ctx = EvaluationContext::new();
        assert_eq!(
            coalesce(&[Value::Null, json!("x"), json!("y")], &ctx).unwrap(),
            json!("x")
        );
        assert_eq!(coalesce(&[Value::Null], &ctx).unwrap(), Value::Null);
    }
}
