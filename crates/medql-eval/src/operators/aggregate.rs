//! Aggregate functions
//!
//! Every aggregate ignores Null items. Over an empty (or all-Null) list the
//! result is Null, except `Count`, which is 0.

use super::{arithmetic, items};
use crate::error::{EvalError, EvalResult};
use medql_types::{Quantity, Value, compare, equals};
use rust_decimal::{Decimal, MathematicalOps};
use std::cmp::Ordering;

fn present(list: &Value) -> Vec<Value> {
    items(list.clone()).into_iter().filter(|v| !v.is_null()).collect()
}

/// Decimal magnitudes of numeric or quantity items, with the shared unit
fn magnitudes(values: &[Value], operator: &str) -> EvalResult<(Vec<Decimal>, Option<String>)> {
    let mut unit: Option<String> = None;
    let mut out = Vec::with_capacity(values.len());
    for v in values {
        match v {
            Value::Quantity(q) => {
                let q = match &unit {
                    Some(u) => q.convert_to(u).ok_or_else(|| {
                        EvalError::type_error(operator, format!("incompatible units '{}' and '{u}'", q.unit))
                    })?,
                    None => {
                        unit = Some(q.unit.clone());
                        q.clone()
                    }
                };
                out.push(q.value);
            }
            other => out.push(other.as_decimal().ok_or_else(|| {
                EvalError::type_error(operator, format!("expected a number, got {}", other.type_name()))
            })?),
        }
    }
    Ok((out, unit))
}

fn with_unit(value: Decimal, unit: Option<String>) -> Value {
    match unit {
        Some(unit) => Value::Quantity(Quantity::new(value, unit)),
        None => Value::Decimal(value.normalize()),
    }
}

pub fn count(list: &Value) -> Value {
    Value::Integer(i32::try_from(present(list).len()).unwrap_or(i32::MAX))
}

pub fn sum(list: &Value) -> EvalResult<Value> {
    let values = present(list);
    let Some((first, rest)) = values.split_first() else {
        return Ok(Value::Null);
    };
    rest.iter().try_fold(first.clone(), |acc, v| arithmetic::add(&acc, v))
}

pub fn product(list: &Value) -> EvalResult<Value> {
    let values = present(list);
    let Some((first, rest)) = values.split_first() else {
        return Ok(Value::Null);
    };
    rest.iter().try_fold(first.clone(), |acc, v| arithmetic::multiply(&acc, v))
}

fn extreme(list: &Value, keep: Ordering) -> EvalResult<Value> {
    let mut best: Option<Value> = None;
    for v in present(list) {
        best = Some(match best {
            None => v,
            Some(current) => match compare(&v, &current)? {
                Some(ord) if ord == keep => v,
                _ => current,
            },
        });
    }
    Ok(best.unwrap_or_default())
}

pub fn min(list: &Value) -> EvalResult<Value> {
    extreme(list, Ordering::Less)
}

pub fn max(list: &Value) -> EvalResult<Value> {
    extreme(list, Ordering::Greater)
}

pub fn avg(list: &Value) -> EvalResult<Value> {
    let values = present(list);
    if values.is_empty() {
        return Ok(Value::Null);
    }
    let total = sum(list)?;
    arithmetic::divide(&total, &Value::Decimal(Decimal::from(values.len())))
}

pub fn median(list: &Value) -> EvalResult<Value> {
    let values = present(list);
    if values.is_empty() {
        return Ok(Value::Null);
    }
    let (mut numbers, unit) = magnitudes(&values, "Median")?;
    numbers.sort();
    let mid = numbers.len() / 2;
    let value = if numbers.len() % 2 == 0 {
        (numbers[mid - 1] + numbers[mid]) / Decimal::TWO
    } else {
        numbers[mid]
    };
    Ok(with_unit(value, unit))
}

/// Most frequent item; the earliest one wins a tie
pub fn mode(list: &Value) -> Value {
    let mut counts: Vec<(Value, usize)> = Vec::new();
    for v in present(list) {
        match counts.iter_mut().find(|(seen, _)| equals(seen, &v) == Some(true)) {
            Some((_, n)) => *n += 1,
            None => counts.push((v, 1)),
        }
    }
    let best = counts.iter().map(|(_, n)| *n).max().unwrap_or(0);
    counts.into_iter().find(|(_, n)| *n == best).map(|(v, _)| v).unwrap_or_default()
}

fn variance_of(list: &Value, population: bool, operator: &str) -> EvalResult<Option<(Decimal, Option<String>)>> {
    let values = present(list);
    let (numbers, unit) = magnitudes(&values, operator)?;
    let n = numbers.len();
    if n == 0 || (!population && n < 2) {
        return Ok(None);
    }
    let mean = numbers.iter().sum::<Decimal>() / Decimal::from(n);
    let squares: Decimal = numbers.iter().map(|x| (x - mean) * (x - mean)).sum();
    let divisor = if population { n } else { n - 1 };
    Ok(Some((squares / Decimal::from(divisor), unit)))
}

pub fn variance(list: &Value) -> EvalResult<Value> {
    Ok(variance_of(list, false, "Variance")?.map_or(Value::Null, |(v, _)| Value::Decimal(v.round_dp(8).normalize())))
}

pub fn population_variance(list: &Value) -> EvalResult<Value> {
    Ok(variance_of(list, true, "PopulationVariance")?
        .map_or(Value::Null, |(v, _)| Value::Decimal(v.round_dp(8).normalize())))
}

fn deviation(variance: Option<(Decimal, Option<String>)>) -> Value {
    variance
        .and_then(|(v, unit)| v.sqrt().map(|d| with_unit(d.round_dp(8), unit)))
        .unwrap_or_default()
}

pub fn std_dev(list: &Value) -> EvalResult<Value> {
    Ok(deviation(variance_of(list, false, "StdDev")?))
}

pub fn population_std_dev(list: &Value) -> EvalResult<Value> {
    Ok(deviation(variance_of(list, true, "PopulationStdDev")?))
}

/// n-th root of the product of n items
pub fn geometric_mean(list: &Value) -> EvalResult<Value> {
    let values = present(list);
    let (numbers, _) = magnitudes(&values, "GeometricMean")?;
    if numbers.is_empty() {
        return Ok(Value::Null);
    }
    let Some(total) = numbers.iter().try_fold(Decimal::ONE, |acc, x| acc.checked_mul(*x)) else {
        return Ok(Value::Null);
    };
    if total.is_sign_negative() {
        return Ok(Value::Null);
    }
    let exponent = Decimal::ONE / Decimal::from(numbers.len());
    Ok(total
        .checked_powd(exponent)
        .map_or(Value::Null, |d| Value::Decimal(d.round_dp(8).normalize())))
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn ints(values: &[i32]) -> Value {
        Value::List(values.iter().map(|i| Value::Integer(*i)).collect())
    }

    #[test]
    fn test_sum_and_count() {
        assert_eq!(sum(&ints(&[1, 2, 3, 4, 5])).ok(), Some(Value::Integer(15)));
        assert_eq!(sum(&ints(&[])).ok(), Some(Value::Null));
        assert_eq!(count(&Value::List(vec![Value::Integer(1), Value::Null])), Value::Integer(1));
        assert_eq!(count(&Value::Null), Value::Integer(0));
    }

    #[test]
    fn test_extremes() {
        assert_eq!(min(&ints(&[3, 1, 2])).ok(), Some(Value::Integer(1)));
        assert_eq!(max(&ints(&[3, 1, 2])).ok(), Some(Value::Integer(3)));
        assert_eq!(max(&Value::List(vec![Value::Null])).ok(), Some(Value::Null));
    }

    #[test]
    fn test_averages() {
        assert_eq!(avg(&ints(&[1, 2, 3, 4])).ok(), Some(Value::Decimal(Decimal::new(25, 1))));
        assert_eq!(median(&ints(&[5, 1, 3])).ok(), Some(Value::Decimal(Decimal::from(3))));
        assert_eq!(median(&ints(&[4, 1, 3, 2])).ok(), Some(Value::Decimal(Decimal::new(25, 1))));
        assert_eq!(mode(&ints(&[1, 2, 2, 3, 3])), Value::Integer(2));
    }

    #[test]
    fn test_spread() {
        let values = ints(&[1, 2, 3, 4, 5]);
        assert_eq!(variance(&values).ok(), Some(Value::Decimal(Decimal::new(25, 1))));
        assert_eq!(population_variance(&values).ok(), Some(Value::Decimal(Decimal::from(2))));
        assert_eq!(variance(&ints(&[1])).ok(), Some(Value::Null));
        assert!(matches!(std_dev(&values), Ok(Value::Decimal(_))));
    }

    #[test]
    fn test_product_and_geometric_mean() {
        assert_eq!(product(&ints(&[2, 3, 4])).ok(), Some(Value::Integer(24)));
        assert!(matches!(geometric_mean(&ints(&[2, 8])), Ok(Value::Decimal(_))));
    }

    #[test]
    fn test_quantities_keep_their_unit() {
        let values = Value::List(vec![
            Value::quantity(Decimal::from(1), "mg"),
            Value::quantity(Decimal::from(3), "mg"),
        ]);
        assert_eq!(median(&values).ok(), Some(Value::quantity(Decimal::from(2), "mg")));
        assert!(min(&Value::List(vec![Value::Integer(1), Value::string("a")])).is_err());
    }
}
