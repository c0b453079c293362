//! Equality, equivalence and ordering
//!
//! `equals` is type-sensitive and three-valued; `equivalent` always answers.
//! Before either runs, operands of related types are brought to a common
//! representation: numbers widen to Decimal, a Date meets a DateTime as a
//! DateTime, and strings or JSON shapes are read as the temporal, coded or
//! quantity value they are compared against.

use crate::error::{ValueError, ValueResult};
use crate::temporal::{Date, DateTime, Precision, Time};
use crate::value::{Interval, Value};
use rust_decimal::Decimal;
use std::borrow::Cow;
use std::cmp::Ordering;

fn is_numeric(v: &Value) -> bool {
    matches!(v, Value::Integer(_) | Value::Long(_) | Value::Decimal(_))
}

fn parse_like<'a>(s: &str, like: &Value) -> Option<Cow<'a, Value>> {
    let parsed = match like {
        Value::Date(_) => Date::parse(s)
            .map(Value::Date)
            .or_else(|| DateTime::parse(s).map(Value::DateTime))?,
        Value::DateTime(_) => DateTime::parse(s).map(Value::DateTime)?,
        Value::Time(_) => Time::parse(s).map(Value::Time)?,
        _ => return None,
    };
    Some(Cow::Owned(parsed))
}

fn promote_one<'a>(v: &'a Value, other: &Value) -> Cow<'a, Value> {
    match (v, other) {
        (Value::String(s), _) => parse_like(s, other).unwrap_or(Cow::Borrowed(v)),
        (Value::Date(d), Value::DateTime(_)) => Cow::Owned(Value::DateTime(d.to_datetime())),
        (Value::Tuple(_), Value::Quantity(_)) => v.as_quantity().map_or(Cow::Borrowed(v), |q| Cow::Owned(Value::Quantity(q))),
        (Value::Tuple(_), Value::Code(_)) => v.as_code().map_or(Cow::Borrowed(v), |c| Cow::Owned(Value::Code(c))),
        (Value::Tuple(_), Value::Concept(_)) => v.as_concept().map_or(Cow::Borrowed(v), |c| Cow::Owned(Value::Concept(c))),
        _ => Cow::Borrowed(v),
    }
}

/// Bring two operands to a common representation where one exists
pub fn promote<'a>(a: &'a Value, b: &'a Value) -> (Cow<'a, Value>, Cow<'a, Value>) {
    let a2 = promote_one(a, b);
    let b2 = promote_one(b, &a2);
    // A string promoted to Date may now need to become a DateTime
    if let (Value::Date(d), Value::DateTime(_)) = (&*a2, &*b2) {
        let widened = Value::DateTime(d.to_datetime());
        return (Cow::Owned(widened), b2);
    }
    (a2, b2)
}

/// Conjunction over three-valued results: any `false` wins, then any Null
fn all3(results: impl IntoIterator<Item = Option<bool>>) -> Option<bool> {
    let mut unknown = false;
    for r in results {
        match r {
            Some(false) => return Some(false),
            None => unknown = true,
            Some(true) => {}
        }
    }
    if unknown { None } else { Some(true) }
}

/// `=`: Null when either side is Null or the comparison is indeterminate
pub fn equals(a: &Value, b: &Value) -> Option<bool> {
    if a.is_null() || b.is_null() {
        return None;
    }
    let (a, b) = promote(a, b);
    match (&*a, &*b) {
        (x, y) if is_numeric(x) && is_numeric(y) => Some(x.as_decimal() == y.as_decimal()),
        (Value::Boolean(x), Value::Boolean(y)) => Some(x == y),
        (Value::String(x), Value::String(y)) => Some(x == y),
        (Value::Date(x), Value::Date(y)) => x.compare(y).map(Ordering::is_eq),
        (Value::DateTime(x), Value::DateTime(y)) => x.compare(y).map(Ordering::is_eq),
        (Value::Time(x), Value::Time(y)) => x.compare(y).map(Ordering::is_eq),
        (Value::Quantity(x), Value::Quantity(y)) => x.compare(y).map(Ordering::is_eq),
        (Value::Ratio(x), Value::Ratio(y)) => all3([
            equals(&Value::Quantity(x.numerator.clone()), &Value::Quantity(y.numerator.clone())),
            equals(&Value::Quantity(x.denominator.clone()), &Value::Quantity(y.denominator.clone())),
        ]),
        (Value::Code(x), Value::Code(y)) => Some(x.code == y.code && x.system == y.system && x.version == y.version),
        (Value::Concept(x), Value::Concept(y)) => Some(
            x.codes.len() == y.codes.len()
                && x.codes.iter().zip(&y.codes).all(|(c, d)| c.code == d.code && c.system == d.system && c.version == d.version),
        ),
        (Value::List(x), Value::List(y)) => {
            if x.len() != y.len() {
                return Some(false);
            }
            all3(x.iter().zip(y).map(|(l, r)| equals(l, r)))
        }
        (Value::Tuple(x), Value::Tuple(y)) => {
            if x.len() != y.len() || x.keys().any(|k| !y.contains_key(k)) {
                return Some(false);
            }
            all3(x.iter().map(|(k, v)| match (v, &y[k]) {
                (Value::Null, Value::Null) => Some(true),
                (l, r) => equals(l, r),
            }))
        }
        (Value::Interval(x), Value::Interval(y)) => interval_equals(x, y),
        _ => Some(false),
    }
}

/// Open bounds of discrete point types are moved inward so that
/// `Interval[1, 5]` and `Interval[1, 6)` compare equal
fn normalized(i: &Interval) -> (Value, bool, Value, bool) {
    let low = if !i.low_closed && !i.low.is_null() {
        i.low.successor().map_or(((*i.low).clone(), false), |v| (v, true))
    } else {
        ((*i.low).clone(), i.low_closed)
    };
    let high = if !i.high_closed && !i.high.is_null() {
        i.high.predecessor().map_or(((*i.high).clone(), false), |v| (v, true))
    } else {
        ((*i.high).clone(), i.high_closed)
    };
    (low.0, low.1, high.0, high.1)
}

fn bound_equals(a: &Value, a_closed: bool, b: &Value, b_closed: bool) -> Option<bool> {
    match (a.is_null(), b.is_null()) {
        // Unbounded on both sides
        (true, true) if !a_closed && !b_closed => Some(true),
        _ if a_closed != b_closed && !a.is_null() && !b.is_null() => Some(false),
        _ => equals(a, b),
    }
}

fn interval_equals(x: &Interval, y: &Interval) -> Option<bool> {
    let (xl, xlc, xh, xhc) = normalized(x);
    let (yl, ylc, yh, yhc) = normalized(y);
    all3([bound_equals(&xl, xlc, &yl, ylc), bound_equals(&xh, xhc, &yh, yhc)])
}

/// Lower-case with runs of whitespace collapsed to one space
fn normalize_text(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ").to_lowercase()
}

/// Decimals are equivalent when equal at the precision of the less precise one
fn decimal_equivalent(a: Decimal, b: Decimal) -> bool {
    let scale = a.scale().min(b.scale());
    a.round_dp(scale) == b.round_dp(scale)
}

/// `~`: never Null. Two Nulls are equivalent, Null and non-Null are not.
pub fn equivalent(a: &Value, b: &Value) -> bool {
    match (a.is_null(), b.is_null()) {
        (true, true) => return true,
        (true, false) | (false, true) => return false,
        (false, false) => {}
    }
    let (a, b) = promote(a, b);
    match (&*a, &*b) {
        (x, y) if is_numeric(x) && is_numeric(y) => match (x.as_decimal(), y.as_decimal()) {
            (Some(l), Some(r)) => decimal_equivalent(l, r),
            _ => false,
        },
        (Value::Boolean(x), Value::Boolean(y)) => x == y,
        (Value::String(x), Value::String(y)) => normalize_text(x) == normalize_text(y),
        (Value::Date(x), Value::Date(y)) => x.compare(y) == Some(Ordering::Equal),
        (Value::DateTime(x), Value::DateTime(y)) => x.compare(y) == Some(Ordering::Equal),
        (Value::Time(x), Value::Time(y)) => x.compare(y) == Some(Ordering::Equal),
        (Value::Quantity(x), Value::Quantity(y)) => y
            .convert_to(&x.unit)
            .is_some_and(|y| decimal_equivalent(x.value, y.value)),
        (Value::Ratio(x), Value::Ratio(y)) => x.equivalent(y),
        (Value::Code(x), Value::Code(y)) => x.is_equivalent(y),
        (Value::Code(c), Value::Concept(k)) | (Value::Concept(k), Value::Code(c)) => k.contains_equivalent(c),
        (Value::Concept(x), Value::Concept(y)) => x.is_equivalent(y),
        (Value::List(x), Value::List(y)) => x.len() == y.len() && x.iter().zip(y).all(|(l, r)| equivalent(l, r)),
        (Value::Tuple(x), Value::Tuple(y)) => {
            x.len() == y.len() && x.iter().all(|(k, v)| y.get(k).is_some_and(|w| equivalent(v, w)))
        }
        (Value::Interval(x), Value::Interval(y)) => {
            let (xl, xlc, xh, xhc) = normalized(x);
            let (yl, ylc, yh, yhc) = normalized(y);
            xlc == ylc && xhc == yhc && equivalent(&xl, &yl) && equivalent(&xh, &yh)
        }
        _ => false,
    }
}

/// Ordering for relational operators. `Ok(None)` is Null (a Null operand,
/// unconvertible units or indeterminate precision); values with no defined
/// ordering between them are an error.
pub fn compare(a: &Value, b: &Value) -> ValueResult<Option<Ordering>> {
    compare_with(a, b, None)
}

/// As [`compare`], considering temporal components only down to `precision`
pub fn compare_at(a: &Value, b: &Value, precision: Precision) -> ValueResult<Option<Ordering>> {
    compare_with(a, b, Some(precision))
}

fn compare_with(a: &Value, b: &Value, precision: Option<Precision>) -> ValueResult<Option<Ordering>> {
    if a.is_null() || b.is_null() {
        return Ok(None);
    }
    let (a, b) = promote(a, b);
    Ok(match (&*a, &*b) {
        (x, y) if is_numeric(x) && is_numeric(y) => match (x.as_decimal(), y.as_decimal()) {
            (Some(l), Some(r)) => Some(l.cmp(&r)),
            _ => None,
        },
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Boolean(x), Value::Boolean(y)) => Some(x.cmp(y)),
        (Value::Date(x), Value::Date(y)) => match precision {
            Some(p) => x.compare_at(y, p),
            None => x.compare(y),
        },
        (Value::DateTime(x), Value::DateTime(y)) => match precision {
            Some(p) => x.compare_at(y, p),
            None => x.compare(y),
        },
        (Value::Time(x), Value::Time(y)) => match precision {
            Some(p) => x.compare_at(y, p),
            None => x.compare(y),
        },
        (Value::Quantity(x), Value::Quantity(y)) => x.compare(y),
        (x, y) => return Err(ValueError::incomparable(x.type_name(), y.type_name())),
    })
}
