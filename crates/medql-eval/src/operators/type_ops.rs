//! Type operators: `is`, `as`, `cast .. as`, `convert`, `minimum`, `maximum`
//! and the `ofType()` filter

use super::{items, singleton};
use crate::context::EvaluationContext;
use crate::engine::Engine;
use crate::error::{EvalError, EvalResult};
use medql_ast::{ConvertExpr, ConvertTarget, TypeCastExpr, TypeSpecifier, TypeTestExpr};
use medql_types::coercion::{max_value, min_value};
use medql_types::{Value, ValueType, cast, convert, is_type};

/// `X is T`; Null is not an instance of anything
pub fn is(value: &Value, ty: &ValueType) -> Value {
    Value::Boolean(is_type(value, ty))
}

/// `X as T`. The lenient form gives Null on a mismatch, the strict form
/// (`cast X as T`) an invalid cast error.
pub fn as_type(value: &Value, ty: &ValueType, strict: bool) -> EvalResult<Value> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match cast(value, ty) {
        Some(v) => Ok(v),
        None if strict => Err(EvalError::InvalidCast {
            from: value.type_name().to_string(),
            to: ty.to_string(),
        }),
        None => Ok(Value::Null),
    }
}

/// Items of the input that are of type `ty`
pub fn of_type(value: &Value, ty: &ValueType) -> Value {
    Value::List(
        items(value.clone())
            .into_iter()
            .filter_map(|v| cast(&v, ty))
            .collect(),
    )
}

/// `convert X to 'unit'`; Null when the units are not commensurable
pub fn convert_unit(value: &Value, unit: &str) -> EvalResult<Value> {
    match value {
        Value::Null => Ok(Value::Null),
        Value::Quantity(q) => Ok(q.convert_to(unit).map_or(Value::Null, Value::Quantity)),
        other => Err(EvalError::unsupported("convert", &[other.type_name(), "String"])),
    }
}

fn bound(ty: &TypeSpecifier, maximum: bool) -> EvalResult<Value> {
    let resolved = ValueType::from_specifier(ty);
    let value = if maximum { max_value(&resolved) } else { min_value(&resolved) };
    value.ok_or_else(|| {
        let operator = if maximum { "maximum" } else { "minimum" };
        EvalError::type_error(operator, format!("{ty} has no {operator} value"))
    })
}

impl Engine {
    pub fn eval_is(&self, expr: &TypeTestExpr, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        let operand = singleton(self.evaluate(&expr.operand, ctx)?, "is")?;
        Ok(is(&operand, &ValueType::from_specifier(&expr.type_specifier)))
    }

    pub fn eval_as(&self, expr: &TypeCastExpr, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        let ty = ValueType::from_specifier(&expr.type_specifier);
        let operand = self.evaluate(&expr.operand, ctx)?;
        // a list is cast as a whole when the target is a list type
        let operand = if matches!(ty, ValueType::List(_)) { operand } else { singleton(operand, "as")? };
        as_type(&operand, &ty, expr.strict)
    }

    pub fn eval_convert(&self, expr: &ConvertExpr, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        let operand = singleton(self.evaluate(&expr.operand, ctx)?, "convert")?;
        match &expr.target {
            ConvertTarget::Type(spec) => Ok(convert(&operand, &ValueType::from_specifier(spec))),
            ConvertTarget::Unit(unit) => convert_unit(&operand, unit),
        }
    }

    pub fn eval_min_value(&self, ty: &TypeSpecifier) -> EvalResult<Value> {
        bound(ty, false)
    }

    pub fn eval_max_value(&self, ty: &TypeSpecifier) -> EvalResult<Value> {
        bound(ty, true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rust_decimal::Decimal;

    #[test]
    fn test_is_and_as() {
        assert_eq!(is(&Value::Integer(1), &ValueType::Integer), Value::Boolean(true));
        assert_eq!(is(&Value::Null, &ValueType::Integer), Value::Boolean(false));
        assert_eq!(as_type(&Value::Integer(1), &ValueType::String, false).ok(), Some(Value::Null));
        assert!(matches!(
            as_type(&Value::Integer(1), &ValueType::String, true),
            Err(EvalError::InvalidCast { .. })
        ));
    }

    #[test]
    fn test_of_type_filters() {
        let mixed = Value::List(vec![Value::Integer(1), Value::string("a"), Value::Integer(2)]);
        assert_eq!(of_type(&mixed, &ValueType::Integer), Value::List(vec![Value::Integer(1), Value::Integer(2)]));
    }

    #[test]
    fn test_convert_unit() {
        let grams = convert_unit(&Value::quantity(Decimal::from(5000), "mg"), "g").ok();
        assert_eq!(grams, Some(Value::quantity(Decimal::from(5), "g")));
        assert_eq!(convert_unit(&Value::quantity(Decimal::ONE, "mg"), "m").ok(), Some(Value::Null));
    }

    #[test]
    fn test_bounds() {
        assert_eq!(bound(&TypeSpecifier::named("Integer"), true).ok(), Some(Value::Integer(i32::MAX)));
        assert!(bound(&TypeSpecifier::named("String"), false).is_err());
    }
}
