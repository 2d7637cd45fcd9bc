//! AST evaluation module
//!
//! Walks a parsed [`Expr`] against an [`EvaluationContext`]. Bare identifiers
//! and missing properties evaluate to `null`; `$variables` must be bound.

use std::cmp::Ordering;
#[cfg(feature = "regex")]
use std::collections::HashMap;
use std::sync::Arc;

#[cfg(feature = "regex")]
use parking_lot::Mutex;
#[cfg(feature = "regex")]
use regex::Regex;
use serde_json::Value;

use crate::builtins::BuiltinRegistry;
use crate::context::EvaluationContext;
use crate::core::ast::{BinaryOp, Expr};
use crate::error::{ExpressionError, ExpressionResult};
use crate::value_utils::{
    compare_values, is_truthy, number_as_f64, number_from_f64, value_type_name, values_equal,
};

/// Maximum recursion depth for expression evaluation
const MAX_RECURSION_DEPTH: usize = 256;

/// Maximum length for regex patterns
#[cfg(feature = "regex")]
const MAX_REGEX_PATTERN_LEN: usize = 1000;

/// Maximum number of cached regex patterns
#[cfg(feature = "regex")]
const MAX_REGEX_CACHE_SIZE: usize = 100;

/// Evaluator for expression ASTs
pub struct Evaluator {
    builtins: Arc<BuiltinRegistry>,
    #[cfg(feature = "regex")]
    regex_cache: Mutex<HashMap<String, Regex>>,
}

impl Evaluator {
    /// Create a new evaluator with the given builtin registry
    pub fn new(builtins: Arc<BuiltinRegistry>) -> Self {
        Self {
            builtins,
            #[cfg(feature = "regex")]
            regex_cache: Mutex::new(HashMap::new()),
        }
    }

    /// Registry this evaluator dispatches function calls to
    pub fn builtins(&self) -> &BuiltinRegistry {
        &self.builtins
    }

    /// Evaluate an expression in the given context
    #[inline]
    pub fn eval(&self, expr: &Expr, context: &EvaluationContext<'_>) -> ExpressionResult<Value> {
        self.eval_with_depth(expr, context, 0)
    }

    fn eval_with_depth(
        &self,
        expr: &Expr,
        context: &EvaluationContext<'_>,
        depth: usize,
    ) -> ExpressionResult<Value> {
        if depth > MAX_RECURSION_DEPTH {
            return Err(ExpressionError::eval(format!(
                "maximum recursion depth ({MAX_RECURSION_DEPTH}) exceeded"
            )));
        }
        match expr {
            Expr::Literal(val) => Ok(val.clone()),

            Expr::Variable(name) => context
                .resolve_variable(name)
                .ok_or_else(|| ExpressionError::variable_not_found(&**name)),

            Expr::Identifier(name) => Ok(context.resolve_variable(name).unwrap_or(Value::Null)),

            Expr::Negate(inner) => {
                let val = self.eval_with_depth(inner, context, depth + 1)?;
                match &val {
                    Value::Number(n) => match n.as_i64() {
                        Some(i) => Ok(i
                            .checked_neg()
                            .map_or_else(|| number_from_f64(-(i as f64)), Value::from)),
                        None => Ok(number_from_f64(-number_as_f64(n).unwrap_or(0.0))),
                    },
                    other => Err(ExpressionError::type_mismatch(
                        "number",
                        value_type_name(other),
                    )),
                }
            }

            Expr::Not(inner) => {
                let val = self.eval_with_depth(inner, context, depth + 1)?;
                Ok(Value::Bool(!is_truthy(&val)))
            }

            Expr::Binary { left, op, right } => {
                self.eval_binary_op(*op, left, right, context, depth)
            }

            Expr::PropertyAccess { object, property } => {
                let obj_val = self.eval_with_depth(object, context, depth + 1)?;
                access_property(&obj_val, property)
            }

            Expr::IndexAccess { object, index } => {
                let obj_val = self.eval_with_depth(object, context, depth + 1)?;
                let index_val = self.eval_with_depth(index, context, depth + 1)?;
                access_index(&obj_val, &index_val)
            }

            Expr::FunctionCall { name, args } => {
                let mut arg_values = Vec::with_capacity(args.len());
                for arg in args {
                    arg_values.push(self.eval_with_depth(arg, context, depth + 1)?);
                }
                self.builtins.call(name, &arg_values, context)
            }

            Expr::Pipeline {
                value,
                function,
                args,
            } => {
                let mut arg_values = Vec::with_capacity(1 + args.len());
                arg_values.push(self.eval_with_depth(value, context, depth + 1)?);
                for arg in args {
                    arg_values.push(self.eval_with_depth(arg, context, depth + 1)?);
                }
                self.builtins.call(function, &arg_values, context)
            }

            Expr::Conditional {
                condition,
                then_expr,
                else_expr,
            } => {
                let cond_val = self.eval_with_depth(condition, context, depth + 1)?;
                if is_truthy(&cond_val) {
                    self.eval_with_depth(then_expr, context, depth + 1)
                } else {
                    self.eval_with_depth(else_expr, context, depth + 1)
                }
            }

            Expr::Array(elements) => elements
                .iter()
                .map(|e| self.eval_with_depth(e, context, depth + 1))
                .collect::<ExpressionResult<Vec<_>>>()
                .map(Value::Array),
        }
    }

    fn eval_binary_op(
        &self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        context: &EvaluationContext<'_>,
        depth: usize,
    ) -> ExpressionResult<Value> {
        // Logical operators short-circuit
        match op {
            BinaryOp::And => {
                let left_val = self.eval_with_depth(left, context, depth + 1)?;
                if !is_truthy(&left_val) {
                    return Ok(Value::Bool(false));
                }
                let right_val = self.eval_with_depth(right, context, depth + 1)?;
                Ok(Value::Bool(is_truthy(&right_val)))
            }
            BinaryOp::Or => {
                let left_val = self.eval_with_depth(left, context, depth + 1)?;
                if is_truthy(&left_val) {
                    return Ok(Value::Bool(true));
                }
                let right_val = self.eval_with_depth(right, context, depth + 1)?;
                Ok(Value::Bool(is_truthy(&right_val)))
            }
            _ => {
                let l = self.eval_with_depth(left, context, depth + 1)?;
                let r = self.eval_with_depth(right, context, depth + 1)?;

                match op {
                    BinaryOp::Add => add(&l, &r),
                    BinaryOp::Subtract => arithmetic(&l, &r, i64::checked_sub, |a, b| a - b),
                    BinaryOp::Multiply => arithmetic(&l, &r, i64::checked_mul, |a, b| a * b),
                    BinaryOp::Divide => divide(&l, &r),
                    BinaryOp::Modulo => modulo(&l, &r),
                    BinaryOp::Power => {
                        let (lf, rf) = float_operands(&l, &r)?;
                        Ok(number_from_f64(lf.powf(rf)))
                    }
                    BinaryOp::Equal => Ok(Value::Bool(values_equal(&l, &r))),
                    BinaryOp::NotEqual => Ok(Value::Bool(!values_equal(&l, &r))),
                    BinaryOp::LessThan => compare(&l, &r, Ordering::is_lt),
                    BinaryOp::GreaterThan => compare(&l, &r, Ordering::is_gt),
                    BinaryOp::LessEqual => compare(&l, &r, Ordering::is_le),
                    BinaryOp::GreaterEqual => compare(&l, &r, Ordering::is_ge),
                    BinaryOp::RegexMatch => self.regex_match(&l, &r),
                    BinaryOp::And | BinaryOp::Or => unreachable!("handled above"),
                }
            }
        }
    }

    /// Regex match against a cached compiled pattern
    #[cfg(feature = "regex")]
    fn regex_match(&self, left: &Value, right: &Value) -> ExpressionResult<Value> {
        let text = left
            .as_str()
            .ok_or_else(|| ExpressionError::type_mismatch("string", value_type_name(left)))?;
        let pattern = right
            .as_str()
            .ok_or_else(|| ExpressionError::type_mismatch("string", value_type_name(right)))?;

        if pattern.len() > MAX_REGEX_PATTERN_LEN {
            return Err(ExpressionError::regex(format!(
                "pattern too long: {} chars (max {MAX_REGEX_PATTERN_LEN})",
                pattern.len()
            )));
        }

        let mut cache = self.regex_cache.lock();
        let regex = if let Some(cached) = cache.get(pattern) {
            cached.clone()
        } else {
            let compiled = Regex::new(pattern).map_err(|e| ExpressionError::regex(e.to_string()))?;
            if cache.len() >= MAX_REGEX_CACHE_SIZE {
                if let Some(key) = cache.keys().next().cloned() {
                    cache.remove(&key);
                }
            }
            cache.insert(pattern.to_string(), compiled.clone());
            compiled
        };
        drop(cache);

        Ok(Value::Bool(regex.is_match(text)))
    }

    #[cfg(not(feature = "regex"))]
    fn regex_match(&self, _left: &Value, _right: &Value) -> ExpressionResult<Value> {
        Err(ExpressionError::eval(
            "regex matching is not enabled (feature 'regex' not enabled)",
        ))
    }
}

impl std::fmt::Debug for Evaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Evaluator")
            .field("builtins", &self.builtins)
            .finish_non_exhaustive()
    }
}

fn operand_error(expected: &str, left: &Value, right: &Value) -> ExpressionError {
    ExpressionError::type_mismatch(
        expected,
        format!("{} and {}", value_type_name(left), value_type_name(right)),
    )
}

fn float_operands(left: &Value, right: &Value) -> ExpressionResult<(f64, f64)> {
    match (left, right) {
        (Value::Number(l), Value::Number(r)) => Ok((
            number_as_f64(l).unwrap_or(0.0),
            number_as_f64(r).unwrap_or(0.0),
        )),
        _ => Err(operand_error("number", left, right)),
    }
}

/// Integer arithmetic with float fallback on overflow or mixed operands
fn arithmetic(
    left: &Value,
    right: &Value,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> ExpressionResult<Value> {
    if let (Some(li), Some(ri)) = (left.as_i64(), right.as_i64()) {
        if let Some(result) = int_op(li, ri) {
            return Ok(Value::from(result));
        }
    }
    let (lf, rf) = float_operands(left, right)?;
    Ok(number_from_f64(float_op(lf, rf)))
}

fn add(left: &Value, right: &Value) -> ExpressionResult<Value> {
    match (left, right) {
        (Value::String(l), Value::String(r)) => {
            let mut result = String::with_capacity(l.len() + r.len());
            result.push_str(l);
            result.push_str(r);
            Ok(Value::String(result))
        }
        (Value::Number(_), Value::Number(_)) => {
            arithmetic(left, right, i64::checked_add, |a, b| a + b)
        }
        _ => Err(operand_error("number or string", left, right)),
    }
}

fn divide(left: &Value, right: &Value) -> ExpressionResult<Value> {
    let (lf, rf) = float_operands(left, right)?;
    if rf == 0.0 {
        return Err(ExpressionError::DivisionByZero);
    }
    Ok(number_from_f64(lf / rf))
}

fn modulo(left: &Value, right: &Value) -> ExpressionResult<Value> {
    if let (Some(li), Some(ri)) = (left.as_i64(), right.as_i64()) {
        if ri == 0 {
            return Err(ExpressionError::DivisionByZero);
        }
        return Ok(Value::from(li.wrapping_rem(ri)));
    }
    let (lf, rf) = float_operands(left, right)?;
    if rf == 0.0 {
        return Err(ExpressionError::DivisionByZero);
    }
    Ok(number_from_f64(lf % rf))
}

fn compare(left: &Value, right: &Value, test: fn(Ordering) -> bool) -> ExpressionResult<Value> {
    compare_values(left, right)
        .map(|ordering| Value::Bool(test(ordering)))
        .ok_or_else(|| operand_error("comparable values", left, right))
}

/// Property of an object; `null` when the object or the property is missing
fn access_property(obj: &Value, property: &str) -> ExpressionResult<Value> {
    match obj {
        Value::Object(map) => Ok(map.get(property).cloned().unwrap_or(Value::Null)),
        Value::Null => Ok(Value::Null),
        other => Err(ExpressionError::type_mismatch(
            "object",
            value_type_name(other),
        )),
    }
}

/// Element of an array (negative indexes count from the end) or object key
fn access_index(obj: &Value, index: &Value) -> ExpressionResult<Value> {
    match obj {
        Value::Array(arr) => {
            let idx = index
                .as_i64()
                .ok_or_else(|| ExpressionError::type_mismatch("integer", value_type_name(index)))?;
            let len = arr.len() as i64;
            let actual = if idx < 0 { len + idx } else { idx };
            if actual < 0 || actual >= len {
                return Err(ExpressionError::IndexOutOfBounds {
                    index: idx,
                    length: arr.len(),
                });
            }
            Ok(arr[actual as usize].clone())
        }
        Value::Object(map) => {
            let key = index
                .as_str()
                .ok_or_else(|| ExpressionError::type_mismatch("string", value_type_name(index)))?;
            Ok(map.get(key).cloned().unwrap_or(Value::Null))
        }
        Value::Null => Ok(Value::Null),
        other => Err(ExpressionError::type_mismatch(
            "array or object",
            value_type_name(other),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse;
    use serde_json::json;

    fn create_evaluator() -> Evaluator {
        Evaluator::new(Arc::new(BuiltinRegistry::new()))
    }

    fn eval_source(source: &str, context: &EvaluationContext<'_>) -> ExpressionResult<Value> {
        create_evaluator().eval(&parse(source)?, context)
    }

    #[test]
    fn test_eval_literal() {
        let context = EvaluationContext::new();
        let expr = Expr::Literal(json!(42));
        assert_eq!(create_evaluator().eval(&expr, &context).unwrap(), json!(42));
    }

    #[test]
    fn test_eval_arithmetic() {
        let context = EvaluationContext::new();
        assert_eq!(eval_source("10 + 5 * 2", &context).unwrap(), json!(20));
        assert_eq!(eval_source("7 / 2", &context).unwrap(), json!(3.5));
        assert_eq!(eval_source("7 % 4", &context).unwrap(), json!(3));
        assert_eq!(eval_source("2 ** 10", &context).unwrap(), json!(1024));
        assert_eq!(eval_source("-(3 - 5)", &context).unwrap(), json!(2));
    }

    #[test]
    fn test_integer_overflow_falls_back_to_float() {
        let context = EvaluationContext::new();
        let result = eval_source("9223372036854775807 + 1", &context).unwrap();
        assert!(result.is_f64());
    }

    #[test]
    fn test_division_by_zero() {
        let context = EvaluationContext::new();
        assert_eq!(
            eval_source("1 / 0", &context).unwrap_err(),
            ExpressionError::DivisionByZero
        );
        assert_eq!(
            eval_source("1 % 0", &context).unwrap_err(),
            ExpressionError::DivisionByZero
        );
    }

    #[test]
    fn test_deep_nesting_within_limit() {
        let context = EvaluationContext::new();
        let mut expr = Expr::Literal(json!(1));
        for _ in 0..50 {
            expr = Expr::Binary {
                left: Box::new(expr),
                op: BinaryOp::Add,
                right: Box::new(Expr::Literal(json!(1))),
            };
        }
        assert_eq!(create_evaluator().eval(&expr, &context).unwrap(), json!(51));
    }

    #[test]
    fn test_short_circuit_and_false() {
        let context = EvaluationContext::new();
        assert_eq!(eval_source("false && 1 / 0", &context).unwrap(), json!(false));
    }

    #[test]
    fn test_short_circuit_or_true() {
        let context = EvaluationContext::new();
        assert_eq!(eval_source("true || 1 / 0", &context).unwrap(), json!(true));
    }

    #[test]
    fn test_short_circuit_skips_effects() {
        let context = EvaluationContext::new();
        eval_source("false && add_error('never')", &context).unwrap();
        assert!(context.outputs().errors.is_empty());
    }

    #[test]
    fn test_unbound_identifier_is_null() {
        let context = EvaluationContext::new();
        assert_eq!(eval_source("missing", &context).unwrap(), Value::Null);
        assert_eq!(eval_source("missing.deeper[0]", &context).unwrap(), Value::Null);
        assert_eq!(eval_source("is_null(missing)", &context).unwrap(), json!(true));
    }

    #[test]
    fn test_unbound_variable_is_an_error() {
        let context = EvaluationContext::new();
        assert_eq!(
            eval_source("$missing", &context).unwrap_err(),
            ExpressionError::variable_not_found("missing")
        );
    }

    #[test]
    fn test_property_and_index_access() {
        let mut context = EvaluationContext::new();
        context.bind("level2", json!({"items": [{"prop": "a"}, {"prop": "b"}]}));
        assert_eq!(eval_source("level2.items[1].prop", &context).unwrap(), json!("b"));
        assert_eq!(eval_source("level2.items[-1].prop", &context).unwrap(), json!("b"));
        assert_eq!(eval_source("level2['items'] | length", &context).unwrap(), json!(2));
        assert!(matches!(
            eval_source("level2.items[5]", &context).unwrap_err(),
            ExpressionError::IndexOutOfBounds { index: 5, length: 2 }
        ));
    }

    #[test]
    fn test_numeric_equality_across_representations() {
        let mut context = EvaluationContext::new();
        context.bind("count", json!(2.0));
        assert_eq!(eval_source("count == 2", &context).unwrap(), json!(true));
        assert_eq!(eval_source("count != 2", &context).unwrap(), json!(false));
    }

    #[test]
    fn test_comparison_type_error() {
        let context = EvaluationContext::new();
        let err = eval_source("1 < 'a'", &context).unwrap_err();
        assert_eq!(err.code(), "EXPR:TYPE");
    }

    #[test]
    fn test_conditional() {
        let mut context = EvaluationContext::new();
        context.bind("score", json!(75));
        assert_eq!(
            eval_source("if score >= 50 then 'pass' else 'fail'", &context).unwrap(),
            json!("pass")
        );
    }

    #[test]
    #[cfg(feature = "regex")]
    fn test_regex_caching() {
        let evaluator = create_evaluator();
        let context = EvaluationContext::new();

        let first = parse("'hello world' =~ '^hello'").unwrap();
        let second = parse("'goodbye' =~ '^hello'").unwrap();
        assert_eq!(evaluator.eval(&first, &context).unwrap(), json!(true));
        assert_eq!(evaluator.eval(&second, &context).unwrap(), json!(false));
        assert_eq!(evaluator.regex_cache.lock().len(), 1);
    }

    #[test]
    #[cfg(feature = "regex")]
    fn test_invalid_regex() {
        let context = EvaluationContext::new();
        let err = eval_source("'a' =~ '('", &context).unwrap_err();
        assert_eq!(err.code(), "EXPR:REGEX");
    }
}
