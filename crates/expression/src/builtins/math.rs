//! Math functions

use serde_json::Value;

use super::{check_arg_count, check_min_arg_count, get_int_arg, get_number_arg};
use crate::context::EvaluationContext;
use crate::error::ExpressionResult;
use crate::value_utils::number_from_f64;

/// Absolute value
pub fn abs(args: &[Value], _ctx: &EvaluationContext<'_>) -> ExpressionResult<Value> {
    check_arg_count("abs", args, 1)?;
    if let Some(i) = args[0].as_i64() {
        return Ok(Value::from(i.saturating_abs()));
    }
    let num = get_number_arg("abs", args, 0, "value")?;
    Ok(number_from_f64(num.abs()))
}

/// Round to specified decimal places (default: 0)
pub fn round(args: &[Value], _ctx: &EvaluationContext<'_>) -> ExpressionResult<Value> {
    check_min_arg_count("round", args, 1)?;
    let num = get_number_arg("round", args, 0, "value")?;

    if args.len() >= 2 {
        let decimals = get_int_arg("round", args, 1, "decimals")?.clamp(0, 15) as i32;
        let multiplier = 10_f64.powi(decimals);
        Ok(number_from_f64((num * multiplier).round() / multiplier))
    } else {
        Ok(number_from_f64(num.round()))
    }
}

/// Minimum of one or more numbers
pub fn min(args: &[Value], _ctx: &EvaluationContext<'_>) -> ExpressionResult<Value> {
    check_min_arg_count("min", args, 1)?;
    fold_numbers("min", args, f64::min)
}

/// Maximum of one or more numbers
pub fn max(args: &[Value], _ctx: &EvaluationContext<'_>) -> ExpressionResult<Value> {
    check_min_arg_count("max", args, 1)?;
    fold_numbers("max", args, f64::max)
}

fn fold_numbers(name: &str, args: &[Value], pick: fn(f64, f64) -> f64) -> ExpressionResult<Value> {
    let mut result = get_number_arg(name, args, 0, "value")?;
    for index in 1..args.len() {
        result = pick(result, get_number_arg(name, args, index, "value")?);
    }
    Ok(number_from_f64(result))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_min_max() {
        let ctx = EvaluationContext::new();
        assert_eq!(min(&[json!(3), json!(1), json!(2)], &ctx).unwrap(), json!(1));
        assert_eq!(max(&[json!(3), json!(1.5)], &ctx).unwrap(), json!(3));
        assert!(min(&[json!("a")], &ctx).is_err());
    }

    #[test]
    fn test_round_with_decimals() {
        let ctx = EvaluationContext::new();
        assert_eq!(round(&[json!(2.345), json!(2)], &ctx).unwrap(), json!(2.35));
        assert_eq!(round(&[json!(2.5)], &ctx).unwrap(), json!(3));
    }

    #[test]
    fn test_abs_keeps_integers() {
        let ctx = EvaluationContext::new();
        assert_eq!(abs(&[json!(-4)], &ctx).unwrap(), json!(4));
    }
}
