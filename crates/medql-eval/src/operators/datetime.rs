//! Date and time operators
//!
//! Constructors (`Date`, `DateTime`, `Time`), `duration in ... between`,
//! `difference in ... between` and component extraction. `Now()`,
//! `Today()` and `TimeOfDay()` read the evaluation timestamp fixed in the
//! context, so they are stable for a whole evaluation.

use super::{integer_or_long, singleton};
use crate::context::EvaluationContext;
use crate::engine::Engine;
use crate::error::{EvalError, EvalResult};
use medql_ast::{DateTimeComponent, DateTimeComponentExpr, TemporalBetweenExpr};
use medql_types::equality::promote;
use medql_types::{Date, DateTime, Precision, TemporalUnit, Time, Value};
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;

/// Whole `unit`s between two values. With `difference` set, boundaries
/// crossed are counted instead of whole periods elapsed.
pub fn between(low: &Value, high: &Value, unit: TemporalUnit, difference: bool) -> EvalResult<Value> {
    if low.is_null() || high.is_null() {
        return Ok(Value::Null);
    }
    let (low, high) = promote(low, high);
    let result = match (&*low, &*high) {
        (Value::Date(a), Value::Date(b)) => {
            if difference {
                a.difference_between(b, unit)
            } else {
                a.duration_between(b, unit)
            }
        }
        (Value::DateTime(a), Value::DateTime(b)) => {
            if difference {
                a.difference_between(b, unit)
            } else {
                a.duration_between(b, unit)
            }
        }
        (Value::Time(a), Value::Time(b)) => {
            if difference {
                a.difference_between(b, unit)
            } else {
                a.duration_between(b, unit)
            }
        }
        (a, b) => {
            let operator = if difference { "difference between" } else { "duration between" };
            return Err(EvalError::unsupported(operator, &[a.type_name(), b.type_name()]));
        }
    };
    Ok(result.map_or(Value::Null, integer_or_long))
}

fn precision_of(component: DateTimeComponent) -> Option<Precision> {
    Some(match component {
        DateTimeComponent::Year => Precision::Year,
        DateTimeComponent::Month => Precision::Month,
        DateTimeComponent::Day => Precision::Day,
        DateTimeComponent::Hour => Precision::Hour,
        DateTimeComponent::Minute => Precision::Minute,
        DateTimeComponent::Second => Precision::Second,
        DateTimeComponent::Millisecond => Precision::Millisecond,
        DateTimeComponent::Date | DateTimeComponent::Time | DateTimeComponent::TimezoneOffset => return None,
    })
}

/// `year from X`, `date from X`, `timezoneoffset from X`, ...
pub fn component(value: &Value, component: DateTimeComponent) -> EvalResult<Value> {
    let from_integer = |n: Option<i64>| n.map_or(Value::Null, integer_or_long);
    Ok(match value {
        Value::Null => Value::Null,
        Value::Date(d) => match component {
            DateTimeComponent::Date => value.clone(),
            c => from_integer(precision_of(c).filter(|p| *p <= Precision::Day).and_then(|p| d.component(p))),
        },
        Value::DateTime(dt) => match component {
            DateTimeComponent::Date => Value::Date(dt.date()),
            DateTimeComponent::Time => dt.time().map_or(Value::Null, Value::Time),
            DateTimeComponent::TimezoneOffset => dt
                .offset
                .map_or(Value::Null, |minutes| Value::Decimal(Decimal::from(minutes) / Decimal::from(60))),
            c => from_integer(precision_of(c).and_then(|p| dt.component(p))),
        },
        Value::Time(t) => match component {
            DateTimeComponent::Time => value.clone(),
            c => from_integer(precision_of(c).filter(|p| *p >= Precision::Hour).and_then(|p| t.component(p))),
        },
        other => {
            return Err(EvalError::type_error(
                "component",
                format!("cannot extract a component from {}", other.type_name()),
            ));
        }
    })
}

/// Leading non-Null integer arguments; a Null ends the precision
fn parts(args: &[Value], name: &str) -> EvalResult<Vec<i64>> {
    let mut parts = Vec::with_capacity(args.len());
    for arg in args {
        if arg.is_null() {
            break;
        }
        parts.push(
            arg.as_i64()
                .ok_or_else(|| EvalError::type_error(name, format!("expected Integer, got {}", arg.type_name())))?,
        );
    }
    Ok(parts)
}

fn invalid(name: &str, args: &[Value]) -> EvalError {
    let shown: Vec<String> = args.iter().map(ToString::to_string).collect();
    EvalError::evaluation(format!("{name}({}) is not a valid value", shown.join(", ")))
}

/// `Date(year [, month [, day]])`
pub fn date(args: &[Value]) -> EvalResult<Value> {
    let parts = parts(args, "Date")?;
    let Some(year) = parts.first() else {
        return Ok(Value::Null);
    };
    let year = i32::try_from(*year).map_err(|_| invalid("Date", args))?;
    let month = parts.get(1).map(|m| u8::try_from(*m)).transpose().map_err(|_| invalid("Date", args))?;
    let day = parts.get(2).map(|d| u8::try_from(*d)).transpose().map_err(|_| invalid("Date", args))?;
    Date::new(year, month, day).map(Value::Date).ok_or_else(|| invalid("Date", args))
}

/// `DateTime(year, month, day, hour, minute, second, millisecond, offset)`;
/// the offset is in hours
pub fn datetime(args: &[Value]) -> EvalResult<Value> {
    let (components, offset) = if args.len() == 8 { (&args[..7], args.get(7)) } else { (args, None) };
    let parts = parts(components, "DateTime")?;
    if parts.is_empty() {
        return Ok(Value::Null);
    }
    let offset = match offset {
        None | Some(Value::Null) => None,
        Some(hours) => {
            let hours = hours
                .as_decimal()
                .ok_or_else(|| EvalError::type_error("DateTime", "timezone offset must be a Decimal"))?;
            Some((hours * Decimal::from(60)).round().to_i16().ok_or_else(|| invalid("DateTime", args))?)
        }
    };
    DateTime::from_parts(&parts, offset)
        .map(Value::DateTime)
        .ok_or_else(|| invalid("DateTime", args))
}

/// `Time(hour [, minute [, second [, millisecond]]])`
pub fn time(args: &[Value]) -> EvalResult<Value> {
    let parts = parts(args, "Time")?;
    if parts.is_empty() {
        return Ok(Value::Null);
    }
    Time::from_parts(&parts).map(Value::Time).ok_or_else(|| invalid("Time", args))
}

impl Engine {
    pub fn eval_temporal_between(
        &self,
        expr: &TemporalBetweenExpr,
        difference: bool,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<Value> {
        let low = singleton(self.evaluate(&expr.low, ctx)?, "between")?;
        let high = singleton(self.evaluate(&expr.high, ctx)?, "between")?;
        between(&low, &high, TemporalUnit::from_ast(expr.precision), difference)
    }

    pub fn eval_component(&self, expr: &DateTimeComponentExpr, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        let operand = singleton(self.evaluate(&expr.operand, ctx)?, expr.component.keyword())?;
        component(&operand, expr.component)
    }
}
