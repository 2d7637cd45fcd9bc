//! Functions that write to the context's output slots.
//!
//! Each returns `true` so it can be chained with `&&` inside a predicate.

use serde_json::Value;

use super::{check_arg_count, check_min_arg_count};
use crate::context::EvaluationContext;
use crate::error::ExpressionResult;
use crate::value_utils::display_string;

fn joined(args: &[Value]) -> String {
    args.iter().map(display_string).collect::<Vec<_>>().join("")
}

/// `set_message(text...)`: override the failure message
pub fn set_message(args: &[Value], ctx: &EvaluationContext<'_>) -> ExpressionResult<Value> {
    check_min_arg_count("set_message", args, 1)?;
    let message = joined(args);
    ctx.record(|outputs| outputs.message = Some(message));
    Ok(Value::Bool(true))
}

/// `add_error(text...)`
pub fn add_error(args: &[Value], ctx: &EvaluationContext<'_>) -> ExpressionResult<Value> {
    check_min_arg_count("add_error", args, 1)?;
    let text = joined(args);
    ctx.record(|outputs| outputs.errors.push(text));
    Ok(Value::Bool(true))
}

/// `add_warning(text...)`
pub fn add_warning(args: &[Value], ctx: &EvaluationContext<'_>) -> ExpressionResult<Value> {
    check_min_arg_count("add_warning", args, 1)?;
    let text = joined(args);
    ctx.record(|outputs| outputs.warnings.push(text));
    Ok(Value::Bool(true))
}

/// `add_info(text...)`
pub fn add_info(args: &[Value], ctx: &EvaluationContext<'_>) -> ExpressionResult<Value> {
    check_min_arg_count("add_info", args, 1)?;
    let text = joined(args);
    ctx.record(|outputs| outputs.information.push(text));
    Ok(Value::Bool(true))
}

/// `force_failure()`: fail the rule whatever the body returns
pub fn force_failure(args: &[Value], ctx: &EvaluationContext<'_>) -> ExpressionResult<Value> {
    check_arg_count("force_failure", args, 0)?;
    ctx.record(|outputs| outputs.force_failure = true);
    Ok(Value::Bool(true))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_effects_fill_slots() {
        let ctx = EvaluationContext::new();
        set_message(&[json!("count is "), json!(3)], &ctx).unwrap();
        add_error(&[json!("e")], &ctx).unwrap();
        add_warning(&[json!("w")], &ctx).unwrap();
        add_info(&[json!("i")], &ctx).unwrap();
        force_failure(&[], &ctx).unwrap();

        let outputs = ctx.take_outputs();
        assert_eq!(outputs.message.as_deref(), Some("count is 3"));
        assert_eq!(outputs.errors, vec!["e".to_string()]);
        assert_eq!(outputs.warnings, vec!["w".to_string()]);
        assert_eq!(outputs.information, vec!["i".to_string()]);
        assert!(outputs.force_failure);
    }

    #[test]
    fn test_force_failure_takes_no_arguments() {
        let ctx = EvaluationContext::new();
        assert!(force_failure(&[json!(1)], &ctx).is_err());
        assert!(!ctx.outputs().force_failure);
    }
}
