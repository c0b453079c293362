//! Operator implementations, organised by category:
//! - Arithmetic (`+`, `-`, `*`, `/`, `div`, `mod`, `^`, math functions)
//! - Comparison (`=`, `~`, `<`, `between`)
//! - Logical (`and`, `or`, `xor`, `implies`, `not`, null tests)
//! - String (`&`, substring search, regular expressions)
//! - DateTime (constructors, duration and difference, components)
//! - Interval (timing relations, `collapse`, `expand`, set operations)
//! - List (membership, set operations, positional access)
//! - Aggregate (`Sum`, `Avg`, `Median`, ...)
//! - Type operators (`is`, `as`, `convert`, `minimum`, `maximum`)
//! - Clinical (value set membership, retrieve, ages)
//!
//! Operators that need the engine are methods in `impl Engine` blocks; the
//! value-level parts are free functions that the built-in function table
//! reuses.

pub mod aggregate;
pub mod arithmetic;
pub mod clinical;
pub mod comparison;
pub mod datetime;
pub mod interval;
pub mod list;
pub mod logical;
pub mod string;
pub mod type_ops;

use crate::error::{EvalError, EvalResult};
use medql_types::Value;

/// Reduce an operand to a single item. Arithmetic and relational operators
/// accept a one-item collection in place of the item itself; an empty
/// collection is Null.
pub fn singleton(value: Value, operator: &str) -> EvalResult<Value> {
    match value {
        Value::List(mut items) => match items.len() {
            0 => Ok(Value::Null),
            1 => Ok(items.swap_remove(0)),
            n => Err(EvalError::cardinality(format!(
                "{operator} expects a single item, got a collection of {n}"
            ))),
        },
        other => Ok(other),
    }
}

/// Interpret a value as a condition: true, false or unknown (`None`)
pub fn condition(value: &Value, operator: &str) -> EvalResult<Option<bool>> {
    match value {
        Value::Boolean(b) => Ok(Some(*b)),
        Value::Null => Ok(None),
        Value::List(items) => match items.as_slice() {
            [] => Ok(None),
            [single] => condition(single, operator),
            _ => Err(EvalError::cardinality(format!(
                "{operator} expects a single Boolean, got a collection of {}",
                items.len()
            ))),
        },
        other => Err(EvalError::type_error(
            operator,
            format!("expected Boolean, got {}", other.type_name()),
        )),
    }
}

/// Items of a list argument; Null is the empty list and any other value a
/// one-item list
pub fn items(value: Value) -> Vec<Value> {
    value.into_collection()
}

pub(crate) fn boolean(result: Option<bool>) -> Value {
    result.map_or(Value::Null, Value::Boolean)
}

/// Integer result of an i64 computation, widened to Long when it does not fit
pub(crate) fn integer_or_long(n: i64) -> Value {
    i32::try_from(n).map_or(Value::Long(n), Value::Integer)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_singleton() {
        assert_eq!(singleton(Value::List(vec![]), "+").ok(), Some(Value::Null));
        assert_eq!(singleton(Value::List(vec![Value::Integer(4)]), "+").ok(), Some(Value::Integer(4)));
        let err = singleton(Value::List(vec![Value::Integer(1), Value::Integer(2)]), "+").err();
        assert!(matches!(err, Some(EvalError::Cardinality { .. })));
    }

    #[test]
    fn test_condition() {
        assert_eq!(condition(&Value::Boolean(true), "where").ok(), Some(Some(true)));
        assert_eq!(condition(&Value::List(vec![]), "where").ok(), Some(None));
        assert!(condition(&Value::Integer(1), "where").is_err());
    }
}
