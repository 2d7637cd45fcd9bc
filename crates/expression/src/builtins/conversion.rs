//! Type conversion functions

use serde_json::Value;

use super::check_arg_count;
use crate::context::EvaluationContext;
use crate::error::{ExpressionError, ExpressionResult};
use crate::value_utils::{display_string, is_truthy, number_from_f64, to_float, value_type_name};

/// Convert value to string
pub fn to_string(args: &[Value], _ctx: &EvaluationContext<'_>) -> ExpressionResult<Value> {
    check_arg_count("to_string", args, 1)?;
    let text = match &args[0] {
        Value::Null => "null".to_string(),
        other => display_string(other),
    };
    Ok(Value::String(text))
}

/// Convert value to number
pub fn to_number(args: &[Value], _ctx: &EvaluationContext<'_>) -> ExpressionResult<Value> {
    check_arg_count("to_number", args, 1)?;
    if args[0].is_number() {
        return Ok(args[0].clone());
    }
    to_float(&args[0])
        .map(number_from_f64)
        .map_err(|_| ExpressionError::type_mismatch("convertible to number", value_type_name(&args[0])))
}

/// Convert value to boolean using truthiness
pub fn to_boolean(args: &[Value], _ctx: &EvaluationContext<'_>) -> ExpressionResult<Value> {
    check_arg_count("to_boolean", args, 1)?;
    Ok(Value::Bool(is_truthy(&args[0])))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_to_number() {
        let ctx = EvaluationContext::new();
        assert_eq!(to_number(&[json!(" 42 ")], &ctx).unwrap(), json!(42));
        assert_eq!(to_number(&[json!("1.5")], &ctx).unwrap(), json!(1.5));
        assert!(to_number(&[json!("abc")], &ctx).is_err());
    }

    #[test]
    fn test_to_string() {
        let ctx = EvaluationContext::new();
        assert_eq!(to_string(&[json!(7)], &ctx).unwrap(), json!("7"));
        assert_eq!(to_string(&[Value::Null], &ctx).unwrap(), json!("null"));
    }
}
