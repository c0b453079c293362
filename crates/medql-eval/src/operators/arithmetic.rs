//! Arithmetic operators and math functions
//!
//! Integer operands stay Integer (or Long when either side is Long) and
//! widen to Decimal next to a Decimal. Overflow, division by zero and
//! results outside a function's domain are Null, never an error. A
//! temporal value plus or minus a duration quantity moves the value in
//! calendar time.

use crate::error::{EvalError, EvalResult};
use medql_types::{Quantity, Value};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::{Decimal, MathematicalOps, RoundingStrategy};

/// Digits kept after the point for results that are not exact
const DECIMAL_DIGITS: u32 = 8;

enum Numeric {
    Integer(i32, i32),
    Long(i64, i64),
    Decimal(Decimal, Decimal),
}

fn numeric_pair(a: &Value, b: &Value) -> Option<Numeric> {
    if let (Value::Integer(x), Value::Integer(y)) = (a, b) {
        return Some(Numeric::Integer(*x, *y));
    }
    if let (Some(x), Some(y)) = (a.as_i64(), b.as_i64()) {
        return Some(Numeric::Long(x, y));
    }
    Some(Numeric::Decimal(a.as_decimal()?, b.as_decimal()?))
}

fn or_null<T>(result: Option<T>, wrap: impl FnOnce(T) -> Value) -> Value {
    result.map_or(Value::Null, wrap)
}

fn scale(q: &Quantity, factor: Decimal) -> Value {
    or_null(q.value.checked_mul(factor), |v| Value::quantity(v, q.unit.clone()))
}

/// Move a date, datetime or time by a duration quantity
fn shift(point: &Value, q: &Quantity, subtract: bool, operator: &str) -> EvalResult<Value> {
    let unit = q
        .temporal_unit()
        .ok_or_else(|| EvalError::type_error(operator, format!("'{}' is not a duration unit", q.unit)))?;
    let amount = if subtract { -q.value } else { q.value };
    Ok(match point {
        Value::Date(d) => or_null(d.add(amount, unit), Value::Date),
        Value::DateTime(dt) => or_null(dt.add(amount, unit), Value::DateTime),
        Value::Time(t) => or_null(t.add(amount, unit), Value::Time),
        other => return Err(EvalError::unsupported(operator, &[other.type_name(), "Quantity"])),
    })
}

fn is_temporal(value: &Value) -> bool {
    matches!(value, Value::Date(_) | Value::DateTime(_) | Value::Time(_))
}

pub fn add(a: &Value, b: &Value) -> EvalResult<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    if let Some(pair) = numeric_pair(a, b) {
        return Ok(match pair {
            Numeric::Integer(x, y) => or_null(x.checked_add(y), Value::Integer),
            Numeric::Long(x, y) => or_null(x.checked_add(y), Value::Long),
            Numeric::Decimal(x, y) => or_null(x.checked_add(y), Value::Decimal),
        });
    }
    match (a, b) {
        (Value::Quantity(x), Value::Quantity(y)) => Ok(or_null(x.checked_add(y), Value::Quantity)),
        (Value::String(x), Value::String(y)) => Ok(Value::String(format!("{x}{y}"))),
        (point, Value::Quantity(q)) if is_temporal(point) => shift(point, q, false, "+"),
        _ => Err(EvalError::unsupported("+", &[a.type_name(), b.type_name()])),
    }
}

pub fn subtract(a: &Value, b: &Value) -> EvalResult<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    if let Some(pair) = numeric_pair(a, b) {
        return Ok(match pair {
            Numeric::Integer(x, y) => or_null(x.checked_sub(y), Value::Integer),
            Numeric::Long(x, y) => or_null(x.checked_sub(y), Value::Long),
            Numeric::Decimal(x, y) => or_null(x.checked_sub(y), Value::Decimal),
        });
    }
    match (a, b) {
        (Value::Quantity(x), Value::Quantity(y)) => Ok(or_null(x.checked_sub(y), Value::Quantity)),
        (point, Value::Quantity(q)) if is_temporal(point) => shift(point, q, true, "-"),
        _ => Err(EvalError::unsupported("-", &[a.type_name(), b.type_name()])),
    }
}

pub fn multiply(a: &Value, b: &Value) -> EvalResult<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    if let Some(pair) = numeric_pair(a, b) {
        return Ok(match pair {
            Numeric::Integer(x, y) => or_null(x.checked_mul(y), Value::Integer),
            Numeric::Long(x, y) => or_null(x.checked_mul(y), Value::Long),
            Numeric::Decimal(x, y) => or_null(x.checked_mul(y), Value::Decimal),
        });
    }
    match (a, b) {
        (Value::Quantity(x), Value::Quantity(y)) => Ok(or_null(x.checked_mul(y), Value::Quantity)),
        (Value::Quantity(q), n) | (n, Value::Quantity(q)) if n.as_decimal().is_some() => {
            Ok(n.as_decimal().map_or(Value::Null, |factor| scale(q, factor)))
        }
        _ => Err(EvalError::unsupported("*", &[a.type_name(), b.type_name()])),
    }
}

/// `/` always yields a Decimal (or a Quantity)
pub fn divide(a: &Value, b: &Value) -> EvalResult<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    if let (Some(x), Some(y)) = (a.as_decimal(), b.as_decimal()) {
        return Ok(or_null(x.checked_div(y), |d| Value::Decimal(d.round_dp(DECIMAL_DIGITS).normalize())));
    }
    match (a, b) {
        (Value::Quantity(x), Value::Quantity(y)) => Ok(or_null(x.checked_div(y), Value::Quantity)),
        (Value::Quantity(q), n) if n.as_decimal().is_some() => Ok(match n.as_decimal() {
            Some(d) if !d.is_zero() => or_null(q.value.checked_div(d), |v| Value::quantity(v, q.unit.clone())),
            _ => Value::Null,
        }),
        _ => Err(EvalError::unsupported("/", &[a.type_name(), b.type_name()])),
    }
}

/// `div`: division truncated toward zero
pub fn truncated_divide(a: &Value, b: &Value) -> EvalResult<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    match numeric_pair(a, b) {
        Some(Numeric::Integer(x, y)) => Ok(or_null(x.checked_div(y), Value::Integer)),
        Some(Numeric::Long(x, y)) => Ok(or_null(x.checked_div(y), Value::Long)),
        Some(Numeric::Decimal(x, y)) => Ok(or_null(x.checked_div(y), |d| Value::Decimal(d.trunc()))),
        None => Err(EvalError::unsupported("div", &[a.type_name(), b.type_name()])),
    }
}

/// `mod`: remainder with the sign of the dividend
pub fn modulo(a: &Value, b: &Value) -> EvalResult<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    match numeric_pair(a, b) {
        Some(Numeric::Integer(x, y)) => Ok(or_null(x.checked_rem(y), Value::Integer)),
        Some(Numeric::Long(x, y)) => Ok(or_null(x.checked_rem(y), Value::Long)),
        Some(Numeric::Decimal(x, y)) => Ok(or_null(x.checked_rem(y), Value::Decimal)),
        None => Err(EvalError::unsupported("mod", &[a.type_name(), b.type_name()])),
    }
}

/// `^`. A negative integer exponent gives a Decimal.
pub fn power(a: &Value, b: &Value) -> EvalResult<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    match numeric_pair(a, b) {
        Some(Numeric::Integer(x, y)) => Ok(match u32::try_from(y) {
            Ok(exp) => or_null(x.checked_pow(exp), Value::Integer),
            Err(_) => or_null(Decimal::from(x).checked_powi(i64::from(y)), decimal_result),
        }),
        Some(Numeric::Long(x, y)) => Ok(match u32::try_from(y) {
            Ok(exp) => or_null(x.checked_pow(exp), Value::Long),
            Err(_) => or_null(Decimal::from(x).checked_powi(y), decimal_result),
        }),
        Some(Numeric::Decimal(x, y)) => Ok(if y.fract().is_zero() {
            or_null(y.to_i64().and_then(|exp| x.checked_powi(exp)), decimal_result)
        } else {
            or_null(x.checked_powd(y), decimal_result)
        }),
        None => Err(EvalError::unsupported("^", &[a.type_name(), b.type_name()])),
    }
}

fn decimal_result(d: Decimal) -> Value {
    Value::Decimal(d.round_dp(DECIMAL_DIGITS).normalize())
}

pub fn negate(a: &Value) -> EvalResult<Value> {
    Ok(match a {
        Value::Null => Value::Null,
        Value::Integer(i) => or_null(i.checked_neg(), Value::Integer),
        Value::Long(l) => or_null(l.checked_neg(), Value::Long),
        Value::Decimal(d) => Value::Decimal(-*d),
        Value::Quantity(q) => Value::Quantity(q.negate()),
        other => return Err(EvalError::unsupported("-", &[other.type_name()])),
    })
}

/// Unary `+`
pub fn plus(a: &Value) -> EvalResult<Value> {
    match a {
        Value::Null | Value::Integer(_) | Value::Long(_) | Value::Decimal(_) | Value::Quantity(_) => Ok(a.clone()),
        other => Err(EvalError::unsupported("+", &[other.type_name()])),
    }
}

pub fn successor(a: &Value) -> EvalResult<Value> {
    match a {
        Value::Null => Ok(Value::Null),
        v if v.as_decimal().is_some() || matches!(v, Value::Quantity(_)) || is_temporal(v) => {
            Ok(v.successor().unwrap_or_default())
        }
        other => Err(EvalError::unsupported("successor", &[other.type_name()])),
    }
}

pub fn predecessor(a: &Value) -> EvalResult<Value> {
    match a {
        Value::Null => Ok(Value::Null),
        v if v.as_decimal().is_some() || matches!(v, Value::Quantity(_)) || is_temporal(v) => {
            Ok(v.predecessor().unwrap_or_default())
        }
        other => Err(EvalError::unsupported("predecessor", &[other.type_name()])),
    }
}

// === Math functions ===

pub fn abs(a: &Value) -> EvalResult<Value> {
    Ok(match a {
        Value::Null => Value::Null,
        Value::Integer(i) => or_null(i.checked_abs(), Value::Integer),
        Value::Long(l) => or_null(l.checked_abs(), Value::Long),
        Value::Decimal(d) => Value::Decimal(d.abs()),
        Value::Quantity(q) => Value::quantity(q.value.abs(), q.unit.clone()),
        other => return Err(EvalError::unsupported("Abs", &[other.type_name()])),
    })
}

fn integral(a: &Value, name: &str, f: impl FnOnce(Decimal) -> Decimal) -> EvalResult<Value> {
    match a {
        Value::Null => Ok(Value::Null),
        Value::Integer(_) | Value::Long(_) => Ok(a.clone()),
        Value::Decimal(d) => Ok(f(*d).to_i32().map_or(Value::Null, Value::Integer)),
        other => Err(EvalError::unsupported(name, &[other.type_name()])),
    }
}

pub fn ceiling(a: &Value) -> EvalResult<Value> {
    integral(a, "Ceiling", |d| d.ceil())
}

pub fn floor(a: &Value) -> EvalResult<Value> {
    integral(a, "Floor", |d| d.floor())
}

pub fn truncate(a: &Value) -> EvalResult<Value> {
    integral(a, "Truncate", |d| d.trunc())
}

/// Half rounds away from zero; `precision` is the number of decimal places
pub fn round(a: &Value, precision: Option<&Value>) -> EvalResult<Value> {
    let places = match precision {
        None | Some(Value::Null) => 0,
        Some(p) => p
            .as_i64()
            .and_then(|n| u32::try_from(n).ok())
            .ok_or_else(|| EvalError::type_error("Round", "precision must be a non-negative Integer"))?,
    };
    match a {
        Value::Null => Ok(Value::Null),
        v => match v.as_decimal() {
            Some(d) => Ok(Value::Decimal(d.round_dp_with_strategy(places, RoundingStrategy::MidpointAwayFromZero))),
            None => Err(EvalError::unsupported("Round", &[v.type_name()])),
        },
    }
}

fn decimal_fn(a: &Value, name: &str, f: impl FnOnce(Decimal) -> Option<Decimal>) -> EvalResult<Value> {
    match a {
        Value::Null => Ok(Value::Null),
        v => match v.as_decimal() {
            Some(d) => Ok(or_null(f(d), decimal_result)),
            None => Err(EvalError::unsupported(name, &[v.type_name()])),
        },
    }
}

pub fn sqrt(a: &Value) -> EvalResult<Value> {
    decimal_fn(a, "Sqrt", |d| d.sqrt())
}

pub fn ln(a: &Value) -> EvalResult<Value> {
    decimal_fn(a, "Ln", |d| if d > Decimal::ZERO { d.checked_ln() } else { None })
}

pub fn exp(a: &Value) -> EvalResult<Value> {
    decimal_fn(a, "Exp", |d| d.checked_exp())
}

/// Logarithm of `a` to `base`
pub fn log(a: &Value, base: &Value) -> EvalResult<Value> {
    if base.is_null() {
        return Ok(Value::Null);
    }
    let base = base
        .as_decimal()
        .ok_or_else(|| EvalError::unsupported("Log", &[a.type_name(), base.type_name()]))?;
    decimal_fn(a, "Log", |d| {
        if d <= Decimal::ZERO || base <= Decimal::ZERO || base == Decimal::ONE {
            return None;
        }
        d.checked_ln()?.checked_div(base.checked_ln()?)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use medql_types::Date;
    use rstest::rstest;

    fn dec(s: &str) -> Value {
        Value::Decimal(s.parse().unwrap_or_default())
    }

    #[rstest]
    #[case(Value::Integer(1), Value::Integer(2), Value::Integer(3))]
    #[case(Value::Integer(1), Value::Long(2), Value::Long(3))]
    #[case(Value::Integer(1), dec("0.5"), dec("1.5"))]
    #[case(Value::Integer(i32::MAX), Value::Integer(1), Value::Null)]
    #[case(Value::string("ab"), Value::string("c"), Value::string("abc"))]
    #[case(Value::Null, Value::Integer(1), Value::Null)]
    fn test_add(#[case] a: Value, #[case] b: Value, #[case] expected: Value) {
        assert_eq!(add(&a, &b).ok(), Some(expected));
    }

    #[test]
    fn test_add_type_error() {
        assert!(add(&Value::Integer(1), &Value::Boolean(true)).is_err());
    }

    #[test]
    fn test_date_plus_duration() {
        let date = Value::Date(Date::ymd(2024, 1, 31).unwrap_or(Date::MIN));
        let month = Value::quantity(Decimal::ONE, "month");
        assert_eq!(
            add(&date, &month).ok(),
            Some(Value::Date(Date::ymd(2024, 2, 29).unwrap_or(Date::MIN)))
        );
        assert!(add(&date, &Value::quantity(Decimal::ONE, "mg")).is_err());
    }

    #[rstest]
    #[case(Value::Integer(10), Value::Integer(4), dec("2.5"))]
    #[case(Value::Integer(1), Value::Integer(0), Value::Null)]
    #[case(Value::Integer(1), Value::Integer(3), dec("0.33333333"))]
    fn test_divide(#[case] a: Value, #[case] b: Value, #[case] expected: Value) {
        assert_eq!(divide(&a, &b).ok(), Some(expected));
    }

    #[test]
    fn test_div_and_mod() {
        assert_eq!(truncated_divide(&Value::Integer(-7), &Value::Integer(2)).ok(), Some(Value::Integer(-3)));
        assert_eq!(modulo(&Value::Integer(-7), &Value::Integer(2)).ok(), Some(Value::Integer(-1)));
        assert_eq!(modulo(&Value::Integer(7), &Value::Integer(0)).ok(), Some(Value::Null));
    }

    #[test]
    fn test_power() {
        assert_eq!(power(&Value::Integer(2), &Value::Integer(10)).ok(), Some(Value::Integer(1024)));
        assert_eq!(power(&Value::Integer(2), &Value::Integer(-1)).ok(), Some(dec("0.5")));
        assert_eq!(power(&Value::Integer(2), &Value::Integer(40)).ok(), Some(Value::Null));
    }

    #[test]
    fn test_math_functions() {
        assert_eq!(sqrt(&Value::Integer(16)).ok(), Some(dec("4")));
        assert_eq!(sqrt(&Value::Integer(-1)).ok(), Some(Value::Null));
        assert_eq!(ln(&Value::Integer(0)).ok(), Some(Value::Null));
        assert_eq!(floor(&dec("-1.5")).ok(), Some(Value::Integer(-2)));
        assert_eq!(ceiling(&dec("1.1")).ok(), Some(Value::Integer(2)));
        assert_eq!(round(&dec("2.345"), Some(&Value::Integer(2))).ok(), Some(dec("2.35")));
        assert_eq!(abs(&Value::Integer(-3)).ok(), Some(Value::Integer(3)));
    }
}
