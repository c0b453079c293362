//! Interval operators
//!
//! Every relation is computed on closed-normalized bounds: an open bound
//! moves one step inward (`Interval[1, 5)` starts at 1 and ends at 4), an
//! open Null bound is the minimum or maximum of the point type and a closed
//! Null bound is unknown. A point operand takes part as the unit interval
//! `[p, p]`, so `p during I` and `I includes p` share one implementation.
//!
//! `meets` accepts two intervals that share a closed boundary point
//! (`Interval[1, 5] meets Interval[5, 10]`) as well as two intervals that
//! are adjacent without a gap (`Interval[1, 4] meets Interval[5, 10]`).

use super::logical::{and3, or3};
use super::{arithmetic, boolean, singleton};
use crate::context::EvaluationContext;
use crate::engine::Engine;
use crate::error::{EvalError, EvalResult};
use medql_ast::{IntervalOp, IntervalOpExpr, WithinExpr};
use medql_types::coercion::{max_value, min_value};
use medql_types::{Interval, Precision, Quantity, Value, ValueType, compare, compare_at, equals};
use rust_decimal::Decimal;
use std::borrow::Cow;
use std::cmp::Ordering;

/// Upper bound on the number of points `expand` produces
pub const MAX_EXPAND_POINTS: usize = 10_000;

/// A normalized bound; `None` when unknown
type Bound = Option<Value>;

fn point_type(i: &Interval) -> Option<ValueType> {
    i.point_type().map(ValueType::from_name)
}

/// First point of the interval
pub fn start(i: &Interval) -> Bound {
    if i.low.is_null() {
        return if i.low_closed {
            None
        } else {
            point_type(i).and_then(|ty| min_value(&ty))
        };
    }
    if i.low_closed {
        Some((*i.low).clone())
    } else {
        Some(i.low.successor().unwrap_or_else(|| (*i.low).clone()))
    }
}

/// Last point of the interval
pub fn end(i: &Interval) -> Bound {
    if i.high.is_null() {
        return if i.high_closed {
            None
        } else {
            point_type(i).and_then(|ty| max_value(&ty))
        };
    }
    if i.high_closed {
        Some((*i.high).clone())
    } else {
        Some(i.high.predecessor().unwrap_or_else(|| (*i.high).clone()))
    }
}

fn cmp(a: &Bound, b: &Bound, precision: Option<Precision>) -> EvalResult<Option<Ordering>> {
    match (a, b) {
        (Some(x), Some(y)) => Ok(match precision {
            Some(p) => compare_at(x, y, p)?,
            None => compare(x, y)?,
        }),
        _ => Ok(None),
    }
}

fn lt(a: &Bound, b: &Bound, p: Option<Precision>) -> EvalResult<Option<bool>> {
    Ok(cmp(a, b, p)?.map(Ordering::is_lt))
}

fn le(a: &Bound, b: &Bound, p: Option<Precision>) -> EvalResult<Option<bool>> {
    Ok(cmp(a, b, p)?.map(Ordering::is_le))
}

fn eq(a: &Bound, b: &Bound, p: Option<Precision>) -> EvalResult<Option<bool>> {
    Ok(cmp(a, b, p)?.map(Ordering::is_eq))
}

fn gt(a: &Bound, b: &Bound, p: Option<Precision>) -> EvalResult<Option<bool>> {
    lt(b, a, p)
}

fn ge(a: &Bound, b: &Bound, p: Option<Precision>) -> EvalResult<Option<bool>> {
    le(b, a, p)
}

fn unit_interval(value: &Value) -> Cow<'_, Interval> {
    match value {
        Value::Interval(i) => Cow::Borrowed(i),
        point => Cow::Owned(Interval::closed(point.clone(), point.clone())),
    }
}

/// `I contains p`, `p in I`
pub fn contains_point(i: &Interval, point: &Value, p: Option<Precision>) -> EvalResult<Value> {
    if point.is_null() {
        return Ok(Value::Null);
    }
    let point = Some(point.clone());
    Ok(boolean(and3(le(&start(i), &point, p)?, le(&point, &end(i), p)?)))
}

fn includes(a: &Interval, b: &Interval, p: Option<Precision>) -> EvalResult<Option<bool>> {
    Ok(and3(le(&start(a), &start(b), p)?, ge(&end(a), &end(b), p)?))
}

fn properly_includes(a: &Interval, b: &Interval, p: Option<Precision>) -> EvalResult<Option<bool>> {
    let strictly = or3(lt(&start(a), &start(b), p)?, gt(&end(a), &end(b), p)?);
    Ok(and3(includes(a, b, p)?, strictly))
}

fn overlaps(a: &Interval, b: &Interval, p: Option<Precision>) -> EvalResult<Option<bool>> {
    Ok(and3(le(&start(a), &end(b), p)?, le(&start(b), &end(a), p)?))
}

fn meets_before(a: &Interval, b: &Interval, p: Option<Precision>) -> EvalResult<Option<bool>> {
    let touching = match (a.high.is_null(), b.low.is_null()) {
        (false, false) if a.high_closed || b.low_closed => {
            eq(&Some((*a.high).clone()), &Some((*b.low).clone()), p)?
        }
        (false, false) => Some(false),
        _ => None,
    };
    let adjacent = match end(a) {
        Some(e) => eq(&e.successor(), &start(b), p)?,
        None => None,
    };
    Ok(or3(touching, adjacent))
}

fn relate_intervals(op: IntervalOp, a: &Interval, b: &Interval, p: Option<Precision>) -> EvalResult<Option<bool>> {
    let (sa, ea, sb, eb) = (start(a), end(a), start(b), end(b));
    Ok(match op {
        IntervalOp::SameAs => and3(eq(&sa, &sb, p)?, eq(&ea, &eb, p)?),
        IntervalOp::SameOrBefore => le(&ea, &sb, p)?,
        IntervalOp::SameOrAfter => ge(&sa, &eb, p)?,
        IntervalOp::Before => lt(&ea, &sb, p)?,
        IntervalOp::After => gt(&sa, &eb, p)?,
        IntervalOp::Meets => or3(meets_before(a, b, p)?, meets_before(b, a, p)?),
        IntervalOp::MeetsBefore => meets_before(a, b, p)?,
        IntervalOp::MeetsAfter => meets_before(b, a, p)?,
        IntervalOp::Overlaps => overlaps(a, b, p)?,
        IntervalOp::OverlapsBefore => and3(overlaps(a, b, p)?, lt(&sa, &sb, p)?),
        IntervalOp::OverlapsAfter => and3(overlaps(a, b, p)?, gt(&ea, &eb, p)?),
        IntervalOp::Starts => and3(eq(&sa, &sb, p)?, le(&ea, &eb, p)?),
        IntervalOp::Ends => and3(eq(&ea, &eb, p)?, ge(&sa, &sb, p)?),
        IntervalOp::Includes => includes(a, b, p)?,
        IntervalOp::During | IntervalOp::IncludedIn => includes(b, a, p)?,
        IntervalOp::ProperlyIncludes => properly_includes(a, b, p)?,
        IntervalOp::ProperlyIncludedIn => properly_includes(b, a, p)?,
    })
}

fn relate_points(op: IntervalOp, a: &Value, b: &Value, p: Option<Precision>) -> EvalResult<Option<Option<bool>>> {
    let (a, b) = (Some(a.clone()), Some(b.clone()));
    Ok(Some(match op {
        IntervalOp::SameAs => eq(&a, &b, p)?,
        IntervalOp::SameOrBefore => le(&a, &b, p)?,
        IntervalOp::SameOrAfter => ge(&a, &b, p)?,
        IntervalOp::Before => lt(&a, &b, p)?,
        IntervalOp::After => gt(&a, &b, p)?,
        _ => return Ok(None),
    }))
}

fn is_inclusion(op: IntervalOp) -> bool {
    matches!(
        op,
        IntervalOp::Includes
            | IntervalOp::IncludedIn
            | IntervalOp::During
            | IntervalOp::ProperlyIncludes
            | IntervalOp::ProperlyIncludedIn
    )
}

/// Apply a timing relation to two operands, each a point, an interval or,
/// for the inclusion relations, a list
pub fn relate(op: IntervalOp, left: Value, right: Value, p: Option<Precision>) -> EvalResult<Value> {
    if is_inclusion(op) && (matches!(left, Value::List(_)) || matches!(right, Value::List(_))) {
        return super::list::relate_lists(op, &left, &right);
    }
    let left = singleton(left, op.keyword())?;
    let right = singleton(right, op.keyword())?;
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    let both_points = !matches!(left, Value::Interval(_)) && !matches!(right, Value::Interval(_));
    if both_points {
        if let Some(result) = relate_points(op, &left, &right, p)? {
            return Ok(boolean(result));
        }
    }
    Ok(boolean(relate_intervals(op, &unit_interval(&left), &unit_interval(&right), p)?))
}

fn bound_value(bound: Bound) -> Value {
    bound.unwrap_or_default()
}

pub fn start_of(value: &Value) -> EvalResult<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Interval(i) => Ok(bound_value(start(i))),
        other => Err(EvalError::unsupported("start of", &[other.type_name()])),
    }
}

pub fn end_of(value: &Value) -> EvalResult<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Interval(i) => Ok(bound_value(end(i))),
        other => Err(EvalError::unsupported("end of", &[other.type_name()])),
    }
}

fn require_interval<'a>(value: &'a Value, operator: &str) -> EvalResult<Option<&'a Interval>> {
    match value {
        Value::Null => Ok(None),
        Value::Interval(i) => Ok(Some(i)),
        other => Err(EvalError::unsupported(operator, &[other.type_name()])),
    }
}

/// Distance between the bounds of a numeric or quantity interval
pub fn width(value: &Value) -> EvalResult<Value> {
    let Some(i) = require_interval(value, "width of")? else {
        return Ok(Value::Null);
    };
    if matches!(i.point_type(), Some("Date" | "DateTime" | "Time")) {
        return Err(EvalError::unsupported("width of", &["Interval<temporal>"]));
    }
    match (start(i), end(i)) {
        (Some(s), Some(e)) => arithmetic::subtract(&e, &s),
        _ => Ok(Value::Null),
    }
}

/// Number of points in the interval: the width plus one step
pub fn size(value: &Value) -> EvalResult<Value> {
    let Some(i) = require_interval(value, "size of")? else {
        return Ok(Value::Null);
    };
    if matches!(i.point_type(), Some("Date" | "DateTime" | "Time")) {
        return Err(EvalError::unsupported("size of", &["Interval<temporal>"]));
    }
    match (start(i), end(i).and_then(|e| e.successor())) {
        (Some(s), Some(after)) => arithmetic::subtract(&after, &s),
        _ => Ok(Value::Null),
    }
}

/// The single point of a unit interval
pub fn point_from(value: &Value) -> EvalResult<Value> {
    let Some(i) = require_interval(value, "point from")? else {
        return Ok(Value::Null);
    };
    let (s, e) = (start(i), end(i));
    match eq(&s, &e, None)? {
        Some(true) => Ok(bound_value(s)),
        Some(false) => Err(EvalError::cardinality(format!("point from requires a unit interval, got {i}"))),
        None => Ok(Value::Null),
    }
}

fn min_bound(a: Bound, b: Bound) -> EvalResult<Bound> {
    Ok(match cmp(&a, &b, None)? {
        Some(Ordering::Greater) => b,
        Some(_) => a,
        None => None,
    })
}

fn max_bound(a: Bound, b: Bound) -> EvalResult<Bound> {
    Ok(match cmp(&a, &b, None)? {
        Some(Ordering::Less) => b,
        Some(_) => a,
        None => None,
    })
}

fn closed(low: Bound, high: Bound) -> Value {
    Value::Interval(Interval::closed(bound_value(low), bound_value(high)))
}

/// Union of two intervals; Null unless they overlap or meet
pub fn union(a: &Interval, b: &Interval) -> EvalResult<Value> {
    let joined = or3(overlaps(a, b, None)?, relate_intervals(IntervalOp::Meets, a, b, None)?);
    if joined != Some(true) {
        return Ok(Value::Null);
    }
    Ok(closed(min_bound(start(a), start(b))?, max_bound(end(a), end(b))?))
}

pub fn intersect(a: &Interval, b: &Interval) -> EvalResult<Value> {
    if overlaps(a, b, None)? != Some(true) {
        return Ok(Value::Null);
    }
    Ok(closed(max_bound(start(a), start(b))?, min_bound(end(a), end(b))?))
}

/// `a except b`. Null when the result would not be a single interval.
pub fn except(a: &Interval, b: &Interval) -> EvalResult<Value> {
    match overlaps(a, b, None)? {
        Some(false) => return Ok(Value::Interval(a.clone())),
        None => return Ok(Value::Null),
        Some(true) => {}
    }
    if includes(b, a, None)? == Some(true) {
        return Ok(Value::Null);
    }
    let (sa, ea, sb, eb) = (start(a), end(a), start(b), end(b));
    let starts_later = lt(&sa, &sb, None)?;
    let ends_earlier = gt(&ea, &eb, None)?;
    Ok(match (starts_later, ends_earlier) {
        (Some(true), Some(true)) => Value::Null,
        (Some(true), Some(false)) => closed(sa, sb.and_then(|v| v.predecessor())),
        (Some(false), Some(true)) => closed(eb.and_then(|v| v.successor()), ea),
        _ => Value::Null,
    })
}

fn precision_of_per(per: Option<&Value>) -> Option<Precision> {
    match per {
        Some(Value::Quantity(q)) => q.temporal_unit().map(|u| u.precision()),
        _ => None,
    }
}

/// Merge overlapping and adjacent intervals, ordered by start
pub fn collapse(list: &Value, per: Option<&Value>) -> EvalResult<Value> {
    if list.is_null() {
        return Ok(Value::Null);
    }
    let precision = precision_of_per(per);
    let mut bounds: Vec<(Bound, Bound)> = Vec::new();
    for item in list.as_list().unwrap_or(std::slice::from_ref(list)) {
        if let Some(i) = require_interval(item, "collapse")? {
            bounds.push((start(i), end(i)));
        }
    }
    bounds.sort_by(|x, y| match (&x.0, &y.0) {
        (Some(a), Some(b)) => compare(a, b).ok().flatten().unwrap_or(Ordering::Equal),
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (None, None) => Ordering::Equal,
    });

    let mut merged: Vec<(Bound, Bound)> = Vec::new();
    for (s, e) in bounds {
        if let Some((_, last_end)) = merged.last_mut() {
            let reach = last_end.as_ref().and_then(Value::successor);
            if le(&s, &reach, precision)? == Some(true) {
                let extended = max_bound(last_end.clone(), e)?;
                *last_end = extended;
                continue;
            }
        }
        merged.push((s, e));
    }
    Ok(Value::List(merged.into_iter().map(|(s, e)| closed(s, e)).collect()))
}

fn default_step(point: &Value) -> Option<Quantity> {
    let keyword = match point {
        Value::Date(d) => d.precision().keyword(),
        Value::DateTime(dt) => dt.precision().keyword(),
        Value::Time(t) => t.precision().keyword(),
        Value::Quantity(q) => return Some(Quantity::new(Decimal::ONE, q.unit.clone())),
        _ => return Some(Quantity::unitless(Decimal::ONE)),
    };
    Some(Quantity::new(Decimal::ONE, keyword))
}

fn step(point: &Value, per: &Quantity) -> EvalResult<Value> {
    match point {
        Value::Integer(_) | Value::Long(_) if per.value.fract().is_zero() => {
            let amount = per.value.trunc().try_into().map_or(Value::Null, Value::Long);
            let next = arithmetic::add(point, &amount)?;
            Ok(match (point, next) {
                (Value::Integer(_), Value::Long(n)) => i32::try_from(n).map_or(Value::Null, Value::Integer),
                (_, next) => next,
            })
        }
        Value::Integer(_) | Value::Long(_) | Value::Decimal(_) => arithmetic::add(point, &Value::Decimal(per.value)),
        _ => arithmetic::add(point, &Value::Quantity(per.clone())),
    }
}

fn points(i: &Interval, per: Option<&Quantity>) -> EvalResult<Option<Vec<Value>>> {
    let (Some(first), Some(last)) = (start(i), end(i)) else {
        return Ok(None);
    };
    let per = match per.cloned().or_else(|| default_step(&first)) {
        Some(q) if q.value > Decimal::ZERO => q,
        _ => return Ok(None),
    };
    let last = Some(last);
    let mut out = Vec::new();
    let mut current = first;
    while le(&Some(current.clone()), &last, None)? == Some(true) {
        if out.len() >= MAX_EXPAND_POINTS {
            return Err(EvalError::evaluation(format!(
                "expand would produce more than {MAX_EXPAND_POINTS} points"
            )));
        }
        let next = step(&current, &per)?;
        out.push(current);
        if next.is_null() {
            break;
        }
        current = next;
    }
    Ok(Some(out))
}

/// Points of an interval, or unit intervals of every point of a list of
/// intervals, `per` step apart
pub fn expand(value: &Value, per: Option<&Value>) -> EvalResult<Value> {
    let per = match per {
        None | Some(Value::Null) => None,
        Some(Value::Quantity(q)) => Some(q.clone()),
        Some(n) => n.as_decimal().map(Quantity::unitless),
    };
    match value {
        Value::Null => Ok(Value::Null),
        Value::Interval(i) => Ok(points(i, per.as_ref())?.map_or(Value::Null, Value::List)),
        Value::List(items) => {
            let mut out: Vec<Value> = Vec::new();
            for item in items {
                let Some(i) = require_interval(item, "expand")? else { continue };
                for p in points(i, per.as_ref())?.unwrap_or_default() {
                    let unit = Value::Interval(Interval::closed(p.clone(), p));
                    if !out.iter().any(|seen| equals(seen, &unit) == Some(true)) {
                        out.push(unit);
                    }
                }
            }
            Ok(Value::List(out))
        }
        other => Err(EvalError::unsupported("expand", &[other.type_name()])),
    }
}

/// `a within q of b`: `a` lies in `b` widened by `q` on both sides
pub fn within(a: Value, q: &Quantity, b: Value, proper: bool) -> EvalResult<Value> {
    if a.is_null() || b.is_null() {
        return Ok(Value::Null);
    }
    let target = unit_interval(&b);
    let numeric = start(&target).or_else(|| end(&target)).is_some_and(|v| v.as_decimal().is_some());
    let amount = if numeric {
        Value::Decimal(q.value)
    } else {
        Value::Quantity(q.clone())
    };
    let low = match start(&target) {
        Some(s) => arithmetic::subtract(&s, &amount)?,
        None => Value::Null,
    };
    let high = match end(&target) {
        Some(e) => arithmetic::add(&e, &amount)?,
        None => Value::Null,
    };
    let range = Interval::new(low, high, !proper, !proper);
    let op = if proper { IntervalOp::ProperlyIncludedIn } else { IntervalOp::IncludedIn };
    match a {
        Value::Interval(i) => Ok(boolean(relate_intervals(op, &i, &range, None)?)),
        point => contains_point(&range, &point, None),
    }
}

impl Engine {
    pub fn eval_interval_op(&self, expr: &IntervalOpExpr, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        let left = self.evaluate(&expr.left, ctx)?;
        let right = self.evaluate(&expr.right, ctx)?;
        relate(expr.op, left, right, expr.precision.map(Precision::from_ast))
    }

    pub fn eval_within(&self, expr: &WithinExpr, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        let left = singleton(self.evaluate(&expr.left, ctx)?, "within")?;
        let right = singleton(self.evaluate(&expr.right, ctx)?, "within")?;
        let quantity = Quantity::new(expr.quantity.value, expr.quantity.unit.clone());
        within(left, &quantity, right, expr.proper)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn iv(low: i32, high: i32) -> Value {
        Value::Interval(Interval::closed(Value::Integer(low), Value::Integer(high)))
    }

    fn interval(value: &Value) -> &Interval {
        match value {
            Value::Interval(i) => i,
            _ => panic!("not an interval"),
        }
    }

    #[rstest]
    #[case(IntervalOp::Overlaps, iv(1, 5), iv(3, 8), Value::Boolean(true))]
    #[case(IntervalOp::Before, iv(1, 5), iv(6, 8), Value::Boolean(true))]
    #[case(IntervalOp::Meets, iv(1, 5), iv(5, 10), Value::Boolean(true))]
    #[case(IntervalOp::Meets, iv(1, 4), iv(5, 10), Value::Boolean(true))]
    #[case(IntervalOp::Meets, iv(1, 3), iv(5, 10), Value::Boolean(false))]
    #[case(IntervalOp::During, Value::Integer(5), iv(1, 10), Value::Boolean(true))]
    #[case(IntervalOp::Includes, iv(1, 10), iv(2, 3), Value::Boolean(true))]
    #[case(IntervalOp::ProperlyIncludes, iv(1, 10), iv(1, 10), Value::Boolean(false))]
    #[case(IntervalOp::Starts, iv(1, 3), iv(1, 10), Value::Boolean(true))]
    #[case(IntervalOp::Ends, iv(8, 10), iv(1, 10), Value::Boolean(true))]
    #[case(IntervalOp::Before, Value::Integer(1), Value::Integer(2), Value::Boolean(true))]
    #[case(IntervalOp::After, Value::Null, iv(1, 2), Value::Null)]
    fn test_relations(#[case] op: IntervalOp, #[case] a: Value, #[case] b: Value, #[case] expected: Value) {
        assert_eq!(relate(op, a, b, None).ok(), Some(expected));
    }

    #[test]
    fn test_open_bounds_are_normalized() {
        let half_open = Interval::new(Value::Integer(1), Value::Integer(10), true, false);
        assert_eq!(contains_point(&half_open, &Value::Integer(10), None).ok(), Some(Value::Boolean(false)));
        assert_eq!(contains_point(&half_open, &Value::Integer(9), None).ok(), Some(Value::Boolean(true)));
        assert_eq!(end_of(&Value::Interval(half_open)).ok(), Some(Value::Integer(9)));
    }

    #[test]
    fn test_unknown_bound() {
        let unknown_end = Interval::new(Value::Integer(1), Value::Null, true, true);
        assert_eq!(contains_point(&unknown_end, &Value::Integer(5), None).ok(), Some(Value::Null));
        let unbounded = Interval::new(Value::Integer(1), Value::Null, true, false);
        assert_eq!(contains_point(&unbounded, &Value::Integer(5), None).ok(), Some(Value::Boolean(true)));
    }

    #[test]
    fn test_width_size_point() {
        assert_eq!(width(&iv(2, 5)).ok(), Some(Value::Integer(3)));
        assert_eq!(size(&iv(2, 5)).ok(), Some(Value::Integer(4)));
        assert_eq!(point_from(&iv(4, 4)).ok(), Some(Value::Integer(4)));
        assert!(point_from(&iv(4, 5)).is_err());
    }

    #[test]
    fn test_set_operations() {
        assert_eq!(union(interval(&iv(1, 5)), interval(&iv(6, 9))).ok(), Some(iv(1, 9)));
        assert_eq!(union(interval(&iv(1, 5)), interval(&iv(7, 9))).ok(), Some(Value::Null));
        assert_eq!(intersect(interval(&iv(1, 5)), interval(&iv(3, 9))).ok(), Some(iv(3, 5)));
        assert_eq!(except(interval(&iv(1, 10)), interval(&iv(5, 12))).ok(), Some(iv(1, 4)));
        assert_eq!(except(interval(&iv(1, 10)), interval(&iv(4, 6))).ok(), Some(Value::Null));
    }

    #[test]
    fn test_collapse() {
        let list = Value::List(vec![iv(5, 8), iv(1, 3), iv(4, 4), iv(10, 12)]);
        assert_eq!(collapse(&list, None).ok(), Some(Value::List(vec![iv(1, 8), iv(10, 12)])));
    }

    #[test]
    fn test_expand() {
        assert_eq!(
            expand(&iv(1, 3), None).ok(),
            Some(Value::List(vec![Value::Integer(1), Value::Integer(2), Value::Integer(3)]))
        );
        let per_two = Value::Quantity(Quantity::unitless(Decimal::from(2)));
        assert_eq!(
            expand(&iv(1, 5), Some(&per_two)).ok(),
            Some(Value::List(vec![Value::Integer(1), Value::Integer(3), Value::Integer(5)]))
        );
        let big = Value::Interval(Interval::closed(Value::Integer(0), Value::Integer(1_000_000)));
        assert!(expand(&big, None).is_err());
    }

    #[test]
    fn test_within() {
        let q = Quantity::unitless(Decimal::from(2));
        assert_eq!(
            within(Value::Integer(7), &q, Value::Integer(5), false).ok(),
            Some(Value::Boolean(true))
        );
        assert_eq!(
            within(Value::Integer(7), &q, Value::Integer(5), true).ok(),
            Some(Value::Boolean(false))
        );
    }
}
