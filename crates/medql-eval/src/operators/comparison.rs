//! Comparison operators
//!
//! `=` and `!=` are three-valued: Null when either side is Null or when the
//! operands are only known to a different precision. `~` and `!~` always
//! give true or false. Ordering operators raise a type error for operands
//! that have no common ordering.

use super::logical::and3;
use super::{boolean, condition, singleton};
use crate::context::EvaluationContext;
use crate::engine::Engine;
use crate::error::EvalResult;
use medql_ast::BetweenExpr;
use medql_types::{Value, compare, equals, equivalent};
use std::cmp::Ordering;

/// A one-item collection compares as its item; against a scalar, an empty
/// collection is unknown and a larger one is unequal
fn unwrap_against_scalar<'a>(a: &'a Value, b: &'a Value) -> Result<(&'a Value, &'a Value), Option<bool>> {
    match (a, b) {
        (Value::List(items), other) | (other, Value::List(items)) if !matches!(other, Value::List(_)) => {
            match items.as_slice() {
                [] => Err(None),
                [single] => Ok((single, other)),
                _ if other.is_null() => Err(None),
                _ => Err(Some(false)),
            }
        }
        _ => Ok((a, b)),
    }
}

pub fn equal(a: &Value, b: &Value) -> Value {
    match unwrap_against_scalar(a, b) {
        Ok((x, y)) => boolean(equals(x, y)),
        Err(result) => boolean(result),
    }
}

pub fn not_equal(a: &Value, b: &Value) -> Value {
    match equal(a, b) {
        Value::Boolean(v) => Value::Boolean(!v),
        other => other,
    }
}

pub fn equivalent_value(a: &Value, b: &Value) -> Value {
    match (a, b) {
        (Value::List(items), other) | (other, Value::List(items)) if !matches!(other, Value::List(_)) => {
            Value::Boolean(match items.as_slice() {
                [] => other.is_null(),
                [single] => equivalent(single, other),
                _ => false,
            })
        }
        _ => Value::Boolean(equivalent(a, b)),
    }
}

pub fn not_equivalent(a: &Value, b: &Value) -> Value {
    match equivalent_value(a, b) {
        Value::Boolean(v) => Value::Boolean(!v),
        other => other,
    }
}

fn ordered(a: &Value, b: &Value, test: impl FnOnce(Ordering) -> bool) -> EvalResult<Value> {
    Ok(compare(a, b)?.map_or(Value::Null, |ord| Value::Boolean(test(ord))))
}

pub fn less(a: &Value, b: &Value) -> EvalResult<Value> {
    ordered(a, b, Ordering::is_lt)
}

pub fn less_or_equal(a: &Value, b: &Value) -> EvalResult<Value> {
    ordered(a, b, Ordering::is_le)
}

pub fn greater(a: &Value, b: &Value) -> EvalResult<Value> {
    ordered(a, b, Ordering::is_gt)
}

pub fn greater_or_equal(a: &Value, b: &Value) -> EvalResult<Value> {
    ordered(a, b, Ordering::is_ge)
}

/// `x between low and high`; `proper` excludes both ends
pub fn between(x: &Value, low: &Value, high: &Value, proper: bool) -> EvalResult<Value> {
    let (lower, upper) = if proper {
        (greater(x, low)?, less(x, high)?)
    } else {
        (greater_or_equal(x, low)?, less_or_equal(x, high)?)
    };
    Ok(boolean(and3(condition(&lower, "between")?, condition(&upper, "between")?)))
}

impl Engine {
    pub fn eval_between(&self, expr: &BetweenExpr, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        let operand = singleton(self.evaluate(&expr.operand, ctx)?, "between")?;
        let low = singleton(self.evaluate(&expr.low, ctx)?, "between")?;
        let high = singleton(self.evaluate(&expr.high, ctx)?, "between")?;
        between(&operand, &low, &high, expr.proper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use medql_types::Date;
    use rstest::rstest;

    fn date(s: &str) -> Value {
        Date::parse(s).map_or(Value::Null, Value::Date)
    }

    #[rstest]
    #[case(date("2023"), date("2024-01"), Value::Boolean(false))]
    #[case(date("2024"), date("2024-01"), Value::Null)]
    #[case(Value::Integer(1), Value::string("1"), Value::Boolean(false))]
    #[case(Value::List(vec![Value::string("a")]), Value::string("a"), Value::Boolean(true))]
    #[case(Value::List(vec![]), Value::string("a"), Value::Null)]
    fn test_equal(#[case] a: Value, #[case] b: Value, #[case] expected: Value) {
        assert_eq!(equal(&a, &b), expected);
    }

    #[test]
    fn test_equivalent_never_null() {
        assert_eq!(equivalent_value(&Value::Null, &Value::Null), Value::Boolean(true));
        assert_eq!(equivalent_value(&Value::List(vec![]), &Value::Null), Value::Boolean(true));
        assert_eq!(not_equivalent(&Value::Integer(1), &Value::Null), Value::Boolean(true));
    }

    #[test]
    fn test_ordering() {
        assert_eq!(less(&Value::Integer(1), &Value::Integer(2)).ok(), Some(Value::Boolean(true)));
        assert_eq!(less(&date("2024"), &date("2024-03")).ok(), Some(Value::Null));
        assert!(less(&Value::Integer(1), &Value::Boolean(true)).is_err());
    }

    #[test]
    fn test_between() {
        let r = between(&Value::Integer(5), &Value::Integer(1), &Value::Integer(5), false);
        assert_eq!(r.ok(), Some(Value::Boolean(true)));
        let r = between(&Value::Integer(5), &Value::Integer(1), &Value::Integer(5), true);
        assert_eq!(r.ok(), Some(Value::Boolean(false)));
    }
}
