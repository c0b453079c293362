//! Logical operators
//!
//! `and`, `or`, `xor`, `implies`, `not`, `is null`, `is true`, `is false`
//! and `Coalesce`. All follow three-valued logic, with Null as unknown.
//! `and`, `or` and `implies` do not evaluate their right operand when the
//! left one already decides the result.

use super::{boolean, condition};
use crate::context::EvaluationContext;
use crate::engine::Engine;
use crate::error::EvalResult;
use medql_ast::BinaryOpExpr;
use medql_types::Value;

/// Truth table:
/// | A     | B     | A and B |
/// |-------|-------|---------|
/// | true  | true  | true    |
/// | true  | false | false   |
/// | true  | null  | null    |
/// | false | any   | false   |
/// | null  | true  | null    |
/// | null  | false | false   |
/// | null  | null  | null    |
pub fn and3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

/// Truth table:
/// | A     | B     | A or B |
/// |-------|-------|--------|
/// | true  | any   | true   |
/// | false | true  | true   |
/// | false | false | false  |
/// | false | null  | null   |
/// | null  | true  | true   |
/// | null  | false | null   |
/// | null  | null  | null   |
pub fn or3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

/// Null if either side is Null, otherwise exclusive or
pub fn xor3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    Some(a? != b?)
}

/// Truth table:
/// | A     | B     | A implies B |
/// |-------|-------|-------------|
/// | true  | true  | true        |
/// | true  | false | false       |
/// | true  | null  | null        |
/// | false | any   | true        |
/// | null  | true  | true        |
/// | null  | false | null        |
/// | null  | null  | null        |
pub fn implies3(a: Option<bool>, b: Option<bool>) -> Option<bool> {
    match (a, b) {
        (Some(false), _) | (_, Some(true)) => Some(true),
        (Some(true), Some(false)) => Some(false),
        _ => None,
    }
}

pub fn not3(a: Option<bool>) -> Option<bool> {
    a.map(|b| !b)
}

/// First non-Null argument. A single list argument is searched instead.
pub fn coalesce(args: &[Value]) -> Value {
    let candidates = match args {
        [Value::List(items)] => items.as_slice(),
        _ => args,
    };
    candidates.iter().find(|v| !v.is_null()).cloned().unwrap_or_default()
}

impl Engine {
    pub fn eval_and(&self, expr: &BinaryOpExpr, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        let left = condition(&self.evaluate(&expr.left, ctx)?, "and")?;
        if left == Some(false) {
            return Ok(Value::Boolean(false));
        }
        let right = condition(&self.evaluate(&expr.right, ctx)?, "and")?;
        Ok(boolean(and3(left, right)))
    }

    pub fn eval_or(&self, expr: &BinaryOpExpr, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        let left = condition(&self.evaluate(&expr.left, ctx)?, "or")?;
        if left == Some(true) {
            return Ok(Value::Boolean(true));
        }
        let right = condition(&self.evaluate(&expr.right, ctx)?, "or")?;
        Ok(boolean(or3(left, right)))
    }

    pub fn eval_xor(&self, expr: &BinaryOpExpr, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        let left = condition(&self.evaluate(&expr.left, ctx)?, "xor")?;
        let right = condition(&self.evaluate(&expr.right, ctx)?, "xor")?;
        Ok(boolean(xor3(left, right)))
    }

    pub fn eval_implies(&self, expr: &BinaryOpExpr, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        let left = condition(&self.evaluate(&expr.left, ctx)?, "implies")?;
        if left == Some(false) {
            return Ok(Value::Boolean(true));
        }
        let right = condition(&self.evaluate(&expr.right, ctx)?, "implies")?;
        Ok(boolean(implies3(left, right)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    const T: Option<bool> = Some(true);
    const F: Option<bool> = Some(false);
    const N: Option<bool> = None;

    #[rstest]
    #[case(T, T, T)]
    #[case(T, F, F)]
    #[case(T, N, N)]
    #[case(F, N, F)]
    #[case(N, F, F)]
    #[case(N, N, N)]
    fn test_and(#[case] a: Option<bool>, #[case] b: Option<bool>, #[case] expected: Option<bool>) {
        assert_eq!(and3(a, b), expected);
    }

    #[rstest]
    #[case(T, N, T)]
    #[case(F, F, F)]
    #[case(F, N, N)]
    #[case(N, T, T)]
    fn test_or(#[case] a: Option<bool>, #[case] b: Option<bool>, #[case] expected: Option<bool>) {
        assert_eq!(or3(a, b), expected);
    }

    #[rstest]
    #[case(F, N, T)]
    #[case(T, F, F)]
    #[case(N, T, T)]
    #[case(N, F, N)]
    fn test_implies(#[case] a: Option<bool>, #[case] b: Option<bool>, #[case] expected: Option<bool>) {
        assert_eq!(implies3(a, b), expected);
    }

    #[test]
    fn test_xor_and_not() {
        assert_eq!(xor3(T, F), T);
        assert_eq!(xor3(T, N), N);
        assert_eq!(not3(N), N);
        assert_eq!(not3(F), T);
    }

    #[test]
    fn test_coalesce() {
        assert_eq!(coalesce(&[Value::Null, Value::Integer(2), Value::Integer(3)]), Value::Integer(2));
        assert_eq!(coalesce(&[Value::List(vec![Value::Null, Value::string("a")])]), Value::string("a"));
        assert_eq!(coalesce(&[Value::Null]), Value::Null);
    }
}
