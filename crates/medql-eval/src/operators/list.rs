//! List operators
//!
//! Membership and the set operators (`union`, `intersect`, `except`,
//! `distinct`) use equality with Nulls considered equal to each other.
//! `union` removes duplicates; `combine` keeps them.

use super::{integer_or_long, items};
use crate::error::{EvalError, EvalResult};
use medql_ast::IntervalOp;
use medql_types::{Value, equals};

/// Equality as used by the set operators: Nulls match each other
pub fn same(a: &Value, b: &Value) -> bool {
    match (a.is_null(), b.is_null()) {
        (true, true) => true,
        (false, false) => equals(a, b) == Some(true),
        _ => false,
    }
}

fn contains_same(list: &[Value], item: &Value) -> bool {
    list.iter().any(|v| same(v, item))
}

fn dedupe(values: impl IntoIterator<Item = Value>) -> Vec<Value> {
    let mut out: Vec<Value> = Vec::new();
    for v in values {
        if !contains_same(&out, &v) {
            out.push(v);
        }
    }
    out
}

pub fn distinct(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        other => Value::List(dedupe(items(other.clone()))),
    }
}

pub fn is_distinct(value: &Value) -> Value {
    let all = items(value.clone());
    Value::Boolean(dedupe(all.iter().cloned()).len() == all.len())
}

/// True when the list has at least one non-Null item
pub fn exists(value: &Value) -> Value {
    Value::Boolean(items(value.clone()).iter().any(|v| !v.is_null()))
}

pub fn empty(value: &Value) -> Value {
    Value::Boolean(items(value.clone()).is_empty())
}

/// One level of nesting removed
pub fn flatten(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        other => Value::List(items(other.clone()).into_iter().flat_map(Value::into_collection).collect()),
    }
}

pub fn first(value: &Value) -> Value {
    items(value.clone()).into_iter().next().unwrap_or_default()
}

pub fn last(value: &Value) -> Value {
    items(value.clone()).pop().unwrap_or_default()
}

pub fn tail(value: &Value) -> Value {
    Value::List(items(value.clone()).into_iter().skip(1).collect())
}

fn count_arg(n: &Value, operator: &str) -> EvalResult<usize> {
    match n {
        Value::Null => Ok(0),
        other => other
            .as_i64()
            .map(|n| usize::try_from(n).unwrap_or(0))
            .ok_or_else(|| EvalError::type_error(operator, format!("expected Integer, got {}", other.type_name()))),
    }
}

pub fn skip(value: &Value, n: &Value) -> EvalResult<Value> {
    let n = count_arg(n, "skip")?;
    Ok(Value::List(items(value.clone()).into_iter().skip(n).collect()))
}

pub fn take(value: &Value, n: &Value) -> EvalResult<Value> {
    let n = count_arg(n, "take")?;
    Ok(Value::List(items(value.clone()).into_iter().take(n).collect()))
}

/// The only item, Null for an empty list, a cardinality error otherwise
pub fn single(value: &Value) -> EvalResult<Value> {
    let mut all = items(value.clone());
    match all.len() {
        0 => Ok(Value::Null),
        1 => Ok(all.swap_remove(0)),
        n => Err(EvalError::cardinality(format!("expected a single item, got {n}"))),
    }
}

/// Item at a zero-based index; Null out of range. Strings index characters.
pub fn element_at(source: &Value, index: &Value) -> EvalResult<Value> {
    if source.is_null() || index.is_null() {
        return Ok(Value::Null);
    }
    let i = index
        .as_i64()
        .ok_or_else(|| EvalError::type_error("[]", format!("index must be an Integer, got {}", index.type_name())))?;
    let Ok(i) = usize::try_from(i) else {
        return Ok(Value::Null);
    };
    Ok(match source {
        Value::List(items) => items.get(i).cloned().unwrap_or_default(),
        Value::String(s) => s.chars().nth(i).map_or(Value::Null, |c| Value::String(c.to_string())),
        other if i == 0 => other.clone(),
        _ => Value::Null,
    })
}

/// Zero-based position of the first equal item, -1 when absent
pub fn index_of(list: &Value, item: &Value) -> Value {
    if list.is_null() || item.is_null() {
        return Value::Null;
    }
    items(list.clone())
        .iter()
        .position(|v| equals(v, item) == Some(true))
        .map_or(Value::Integer(-1), |i| integer_or_long(i64::try_from(i).unwrap_or(i64::MAX)))
}

/// `item in list`. A Null item is in a list that holds a Null.
pub fn in_list(item: &Value, list: &Value) -> Value {
    if list.is_null() {
        return Value::Boolean(false);
    }
    let list = items(list.clone());
    Value::Boolean(contains_same(&list, item))
}

/// Every item of `sub` is in `sup`
pub fn subset_of(sub: &Value, sup: &Value) -> Value {
    if sub.is_null() || sup.is_null() {
        return Value::Null;
    }
    let sup = items(sup.clone());
    Value::Boolean(items(sub.clone()).iter().all(|v| contains_same(&sup, v)))
}

pub fn superset_of(sup: &Value, sub: &Value) -> Value {
    subset_of(sub, sup)
}

/// Concatenation, duplicates kept
pub fn combine(a: &Value, b: &Value) -> Value {
    let mut out = items(a.clone());
    out.extend(items(b.clone()));
    Value::List(out)
}

pub fn union(a: &Value, b: &Value) -> Value {
    let mut all = items(a.clone());
    all.extend(items(b.clone()));
    Value::List(dedupe(all))
}

pub fn intersect(a: &Value, b: &Value) -> Value {
    if a.is_null() || b.is_null() {
        return Value::Null;
    }
    let right = items(b.clone());
    Value::List(dedupe(items(a.clone()).into_iter().filter(|v| contains_same(&right, v))))
}

pub fn except(a: &Value, b: &Value) -> Value {
    if a.is_null() {
        return Value::Null;
    }
    let right = items(b.clone());
    Value::List(dedupe(items(a.clone()).into_iter().filter(|v| !contains_same(&right, v))))
}

/// Inclusion relations between lists, or between a list and an item
pub fn relate_lists(op: IntervalOp, left: &Value, right: &Value) -> EvalResult<Value> {
    let includes = |sup: &Value, sub: &Value| match sub {
        Value::List(_) => subset_of(sub, sup),
        item => in_list(item, sup),
    };
    let proper = |sup: &Value, sub: &Value| {
        let larger = dedupe(items(sup.clone())).len() > dedupe(items(sub.clone())).len();
        match includes(sup, sub) {
            Value::Boolean(b) => Value::Boolean(b && larger),
            other => other,
        }
    };
    if left.is_null() || right.is_null() {
        return Ok(Value::Null);
    }
    Ok(match op {
        IntervalOp::Includes => includes(left, right),
        IntervalOp::IncludedIn | IntervalOp::During => includes(right, left),
        IntervalOp::ProperlyIncludes => proper(left, right),
        IntervalOp::ProperlyIncludedIn => proper(right, left),
        other => return Err(EvalError::unsupported(other.keyword(), &["List", "List"])),
    })
}

fn booleans(value: &Value, operator: &str) -> EvalResult<Vec<Option<bool>>> {
    items(value.clone())
        .iter()
        .map(|v| super::condition(v, operator))
        .collect()
}

/// `allTrue()`: true for an empty list; Nulls are ignored
pub fn all_true(value: &Value) -> EvalResult<Value> {
    Ok(Value::Boolean(booleans(value, "AllTrue")?.into_iter().flatten().all(|b| b)))
}

pub fn any_true(value: &Value) -> EvalResult<Value> {
    Ok(Value::Boolean(booleans(value, "AnyTrue")?.into_iter().flatten().any(|b| b)))
}

pub fn all_false(value: &Value) -> EvalResult<Value> {
    Ok(Value::Boolean(booleans(value, "allFalse")?.into_iter().flatten().all(|b| !b)))
}

pub fn any_false(value: &Value) -> EvalResult<Value> {
    Ok(Value::Boolean(booleans(value, "anyFalse")?.into_iter().flatten().any(|b| !b)))
}

/// Direct child elements of every tuple in the input
pub fn children(value: &Value) -> Value {
    let mut out = Vec::new();
    for item in items(value.clone()) {
        if let Value::Tuple(t) = item {
            for child in t.into_values() {
                out.extend(child.into_collection());
            }
        }
    }
    Value::List(out)
}

/// All nested elements, depth first
pub fn descendants(value: &Value) -> Value {
    let mut out = Vec::new();
    let mut frontier = items(children(value));
    while !frontier.is_empty() {
        let next = items(children(&Value::List(frontier.clone())));
        out.extend(frontier);
        frontier = next;
    }
    Value::List(out)
}

/// `SingletonFrom` / `singleton from`
pub fn singleton_from(value: &Value) -> EvalResult<Value> {
    single(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ints(values: &[i32]) -> Value {
        Value::List(values.iter().map(|i| Value::Integer(*i)).collect())
    }

    #[test]
    fn test_positional() {
        assert_eq!(first(&ints(&[])), Value::Null);
        assert_eq!(last(&ints(&[1, 2, 3])), Value::Integer(3));
        assert_eq!(tail(&ints(&[1, 2, 3])), ints(&[2, 3]));
        assert_eq!(skip(&ints(&[1, 2, 3]), &Value::Integer(2)).ok(), Some(ints(&[3])));
        assert_eq!(take(&ints(&[1, 2, 3]), &Value::Integer(2)).ok(), Some(ints(&[1, 2])));
        assert_eq!(element_at(&ints(&[4, 5]), &Value::Integer(1)).ok(), Some(Value::Integer(5)));
        assert_eq!(element_at(&ints(&[4, 5]), &Value::Integer(7)).ok(), Some(Value::Null));
    }

    #[test]
    fn test_single() {
        assert_eq!(single(&ints(&[])).ok(), Some(Value::Null));
        assert!(matches!(single(&ints(&[1, 2])), Err(EvalError::Cardinality { .. })));
    }

    #[test]
    fn test_set_operations() {
        assert_eq!(union(&ints(&[1, 2, 2]), &ints(&[2, 3])), ints(&[1, 2, 3]));
        assert_eq!(combine(&ints(&[1, 2]), &ints(&[2])), ints(&[1, 2, 2]));
        assert_eq!(intersect(&ints(&[1, 2, 3]), &ints(&[3, 2])), ints(&[2, 3]));
        assert_eq!(except(&ints(&[1, 2, 3]), &ints(&[2])), ints(&[1, 3]));
        assert_eq!(distinct(&Value::List(vec![Value::Null, Value::Null])), Value::List(vec![Value::Null]));
    }

    #[test]
    fn test_membership() {
        assert_eq!(in_list(&Value::Integer(2), &ints(&[1, 2])), Value::Boolean(true));
        assert_eq!(in_list(&Value::Null, &ints(&[1, 2])), Value::Boolean(false));
        assert_eq!(in_list(&Value::Null, &Value::List(vec![Value::Null])), Value::Boolean(true));
        assert_eq!(index_of(&ints(&[5, 6]), &Value::Integer(6)), Value::Integer(1));
        assert_eq!(
            relate_lists(IntervalOp::ProperlyIncludes, &ints(&[1, 2, 3]), &ints(&[1, 2])).ok(),
            Some(Value::Boolean(true))
        );
    }

    #[test]
    fn test_exists_ignores_nulls() {
        assert_eq!(exists(&Value::List(vec![Value::Null])), Value::Boolean(false));
        assert_eq!(exists(&Value::Integer(1)), Value::Boolean(true));
    }

    #[test]
    fn test_descendants() {
        let tree = Value::tuple([("a", Value::tuple([("b", Value::Integer(1))]))]);
        assert_eq!(children(&tree), Value::List(vec![Value::tuple([("b", Value::Integer(1))])]));
        assert_eq!(descendants(&tree).as_list().map(<[Value]>::len), Some(2));
    }
}
