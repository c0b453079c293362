//! Runtime types, type tests and conversions
//!
//! `ValueType` is the resolved form of a type specifier. Model types that are
//! not system types (resources, FHIR complex types) are carried by name and
//! tested against the `resourceType` element or the shape of the tuple.

use crate::quantity::Quantity;
use crate::temporal::{Date, DateTime, Time};
use crate::value::{Code, Concept, Value};
use medql_ast::{NamedTypeSpecifier, TypeSpecifier};
use regex::Regex;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum ValueType {
    Any,
    Boolean,
    Integer,
    Long,
    Decimal,
    String,
    Date,
    DateTime,
    Time,
    Quantity,
    Ratio,
    Code,
    Concept,
    List(Box<ValueType>),
    Interval(Box<ValueType>),
    /// Element names; types of elements are not checked at runtime
    Tuple(Vec<String>),
    /// A model type such as `Patient` or `Observation`
    Model(String),
    Choice(Vec<ValueType>),
}

impl ValueType {
    /// Resolve a type name, case-sensitively. FHIR primitive spellings map
    /// onto the system type they are represented by.
    pub fn from_name(name: &str) -> Self {
        match name {
            "Any" => Self::Any,
            "Boolean" | "boolean" => Self::Boolean,
            "Integer" | "integer" | "positiveInt" | "unsignedInt" => Self::Integer,
            "Long" | "integer64" => Self::Long,
            "Decimal" | "decimal" => Self::Decimal,
            "String" | "string" | "code" | "id" | "uri" | "url" | "canonical" | "markdown" | "oid" | "uuid"
            | "base64Binary" => Self::String,
            "Date" | "date" => Self::Date,
            "DateTime" | "dateTime" | "instant" => Self::DateTime,
            "Time" | "time" => Self::Time,
            "Quantity" | "Age" | "Duration" | "SimpleQuantity" | "Distance" | "Count" => Self::Quantity,
            "Ratio" => Self::Ratio,
            "Code" | "Coding" => Self::Code,
            "Concept" | "CodeableConcept" => Self::Concept,
            other => Self::Model(other.to_string()),
        }
    }

    pub fn from_specifier(spec: &TypeSpecifier) -> Self {
        match spec {
            TypeSpecifier::Named(NamedTypeSpecifier { name, .. }) => Self::from_name(name),
            TypeSpecifier::List(inner) => Self::List(Box::new(Self::from_specifier(inner))),
            TypeSpecifier::Interval(inner) => Self::Interval(Box::new(Self::from_specifier(inner))),
            TypeSpecifier::Tuple(elements) => Self::Tuple(elements.iter().map(|e| e.name.clone()).collect()),
            TypeSpecifier::Choice(types) => Self::Choice(types.iter().map(Self::from_specifier).collect()),
        }
    }

    pub fn is_numeric(&self) -> bool {
        matches!(self, Self::Integer | Self::Long | Self::Decimal)
    }
}

impl fmt::Display for ValueType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::List(inner) => write!(f, "List<{inner}>"),
            Self::Interval(inner) => write!(f, "Interval<{inner}>"),
            Self::Tuple(names) => write!(f, "Tuple {{ {} }}", names.join(", ")),
            Self::Model(name) => f.write_str(name),
            Self::Choice(types) => {
                let names: Vec<String> = types.iter().map(ToString::to_string).collect();
                write!(f, "Choice<{}>", names.join(", "))
            }
            other => write!(f, "{other:?}"),
        }
    }
}

/// `value is T`. Null is never an instance of any type.
pub fn is_type(value: &Value, ty: &ValueType) -> bool {
    match (value, ty) {
        (Value::Null, _) => false,
        (_, ValueType::Any) => true,
        (_, ValueType::Choice(types)) => types.iter().any(|t| is_type(value, t)),
        (Value::Boolean(_), ValueType::Boolean)
        | (Value::Integer(_), ValueType::Integer)
        | (Value::Long(_), ValueType::Long)
        | (Value::Decimal(_), ValueType::Decimal)
        | (Value::String(_), ValueType::String)
        | (Value::Date(_), ValueType::Date)
        | (Value::DateTime(_), ValueType::DateTime)
        | (Value::Time(_), ValueType::Time)
        | (Value::Quantity(_), ValueType::Quantity)
        | (Value::Ratio(_), ValueType::Ratio)
        | (Value::Code(_), ValueType::Code)
        | (Value::Concept(_), ValueType::Concept) => true,
        (Value::List(items), ValueType::List(inner)) => items.iter().all(|v| v.is_null() || is_type(v, inner)),
        (Value::Interval(i), ValueType::Interval(inner)) => {
            [&*i.low, &*i.high].into_iter().all(|v| v.is_null() || is_type(v, inner))
        }
        (Value::Tuple(t), ValueType::Tuple(names)) => names.iter().all(|n| t.contains_key(n)),
        (Value::Tuple(t), ValueType::Model(name)) => {
            t.get("resourceType").and_then(Value::as_str) == Some(name.as_str())
        }
        (Value::Tuple(_), ValueType::Quantity) => value.as_quantity().is_some() && value.get("value").is_some(),
        (Value::Tuple(t), ValueType::Code) => t.contains_key("code") && t.contains_key("system"),
        (Value::Tuple(t), ValueType::Concept) => t.contains_key("coding"),
        _ => false,
    }
}

/// `value as T`: the value itself when it is a `T`, a JSON shape read as
/// `T`, otherwise `None`
pub fn cast(value: &Value, ty: &ValueType) -> Option<Value> {
    if !is_type(value, ty) {
        return None;
    }
    Some(match (value, ty) {
        (Value::Tuple(_), ValueType::Quantity) => Value::Quantity(value.as_quantity()?),
        (Value::Tuple(_), ValueType::Code) => Value::Code(value.as_code()?),
        (Value::Tuple(_), ValueType::Concept) => Value::Concept(value.as_concept()?),
        _ => value.clone(),
    })
}

/// Implicit conversion toward `ty`; Null when no implicit path exists
pub fn coerce(value: &Value, ty: &ValueType) -> Value {
    if value.is_null() {
        return Value::Null;
    }
    if let Some(v) = cast(value, ty) {
        return v;
    }
    let coerced = match (value, ty) {
        (Value::Integer(i), ValueType::Long) => Some(Value::Long(i64::from(*i))),
        (Value::Integer(_) | Value::Long(_), ValueType::Decimal) => value.as_decimal().map(Value::Decimal),
        (Value::Integer(_) | Value::Long(_) | Value::Decimal(_), ValueType::Quantity) => {
            value.as_decimal().map(|d| Value::Quantity(Quantity::unitless(d)))
        }
        (Value::Date(d), ValueType::DateTime) => Some(Value::DateTime(d.to_datetime())),
        (Value::Code(c), ValueType::Concept) => Some(Value::Concept(Concept::from_code(c.clone()))),
        (Value::String(s), ValueType::Date) => Date::parse(s).map(Value::Date),
        (Value::String(s), ValueType::DateTime) => DateTime::parse(s).map(Value::DateTime),
        (Value::String(s), ValueType::Time) => Time::parse(s).map(Value::Time),
        (Value::List(items), ValueType::List(inner)) => Some(Value::List(items.iter().map(|v| coerce(v, inner)).collect())),
        _ => None,
    };
    coerced.unwrap_or(Value::Null)
}

/// Explicit conversion (`convert X to T`, `ToX()`); Null when not convertible
pub fn convert(value: &Value, ty: &ValueType) -> Value {
    let converted = match ty {
        ValueType::Boolean => to_boolean(value),
        ValueType::Integer => to_integer(value),
        ValueType::Long => to_long(value),
        ValueType::Decimal => to_decimal(value),
        ValueType::String => to_string(value),
        ValueType::Date => to_date(value),
        ValueType::DateTime => to_datetime(value),
        ValueType::Time => to_time(value),
        ValueType::Quantity => to_quantity(value),
        ValueType::Concept => to_concept(value),
        other => cast(value, other),
    };
    converted.unwrap_or(Value::Null)
}

static DECIMAL_RE: LazyLock<Option<Regex>> = LazyLock::new(|| Regex::new(r"^[+-]?\d+(\.\d+)?$").ok());

static QUANTITY_RE: LazyLock<Option<Regex>> =
    LazyLock::new(|| Regex::new(r"^([+-]?\d+(?:\.\d+)?)\s*(?:'([^']+)'|([A-Za-z][A-Za-z0-9_\[\]/.%]*))?$").ok());

pub fn to_boolean(value: &Value) -> Option<Value> {
    let b = match value {
        Value::Boolean(b) => *b,
        Value::Integer(1) | Value::Long(1) => true,
        Value::Integer(0) | Value::Long(0) => false,
        Value::Decimal(d) if *d == Decimal::ONE => true,
        Value::Decimal(d) if d.is_zero() => false,
        Value::String(s) => match s.to_lowercase().as_str() {
            "true" | "t" | "yes" | "y" | "1" | "1.0" => true,
            "false" | "f" | "no" | "n" | "0" | "0.0" => false,
            _ => return None,
        },
        _ => return None,
    };
    Some(Value::Boolean(b))
}

pub fn to_integer(value: &Value) -> Option<Value> {
    match value {
        Value::Integer(_) => Some(value.clone()),
        Value::Long(l) => i32::try_from(*l).ok().map(Value::Integer),
        Value::Boolean(b) => Some(Value::Integer(i32::from(*b))),
        Value::String(s) => {
            let s = s.trim();
            let digits = s.strip_prefix(['+', '-']).unwrap_or(s);
            if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
                return None;
            }
            s.parse::<i32>().ok().map(Value::Integer)
        }
        _ => None,
    }
}

pub fn to_long(value: &Value) -> Option<Value> {
    match value {
        Value::Integer(i) => Some(Value::Long(i64::from(*i))),
        Value::Long(_) => Some(value.clone()),
        Value::Boolean(b) => Some(Value::Long(i64::from(*b))),
        Value::String(s) => s.trim().parse::<i64>().ok().map(Value::Long),
        _ => None,
    }
}

pub fn to_decimal(value: &Value) -> Option<Value> {
    match value {
        Value::Integer(_) | Value::Long(_) | Value::Decimal(_) => value.as_decimal().map(Value::Decimal),
        Value::Boolean(b) => Some(Value::Decimal(if *b { Decimal::ONE } else { Decimal::ZERO })),
        Value::String(s) => {
            let s = s.trim();
            let re = DECIMAL_RE.as_ref()?;
            if !re.is_match(s) {
                return None;
            }
            Decimal::from_str(s).ok().map(Value::Decimal)
        }
        _ => None,
    }
}

pub fn to_string(value: &Value) -> Option<Value> {
    let s = match value {
        Value::Null | Value::List(_) | Value::Tuple(_) | Value::Interval(_) | Value::Concept(_) => return None,
        Value::String(s) => s.clone(),
        Value::Boolean(b) => b.to_string(),
        Value::Integer(i) => i.to_string(),
        Value::Long(l) => l.to_string(),
        Value::Decimal(d) => d.to_string(),
        Value::Date(d) => d.to_string(),
        Value::DateTime(dt) => dt.to_string(),
        Value::Time(t) => t.to_string(),
        Value::Quantity(q) => format!("{} '{}'", q.value, q.unit),
        Value::Ratio(r) => format!("{} '{}':{} '{}'", r.numerator.value, r.numerator.unit, r.denominator.value, r.denominator.unit),
        Value::Code(c) => c.code.clone(),
    };
    Some(Value::String(s))
}

pub fn to_date(value: &Value) -> Option<Value> {
    match value {
        Value::Date(_) => Some(value.clone()),
        Value::DateTime(dt) => Some(Value::Date(dt.date())),
        Value::String(s) => Date::parse(s)
            .or_else(|| DateTime::parse(s).map(|dt| dt.date()))
            .map(Value::Date),
        _ => None,
    }
}

pub fn to_datetime(value: &Value) -> Option<Value> {
    match value {
        Value::DateTime(_) => Some(value.clone()),
        Value::Date(d) => Some(Value::DateTime(d.to_datetime())),
        Value::String(s) => DateTime::parse(s).map(Value::DateTime),
        _ => None,
    }
}

pub fn to_time(value: &Value) -> Option<Value> {
    match value {
        Value::Time(_) => Some(value.clone()),
        Value::DateTime(dt) => dt.time().map(Value::Time),
        Value::String(s) => Time::parse(s).map(Value::Time),
        _ => None,
    }
}

pub fn to_quantity(value: &Value) -> Option<Value> {
    match value {
        Value::Quantity(_) => Some(value.clone()),
        Value::Integer(_) | Value::Long(_) | Value::Decimal(_) => {
            value.as_decimal().map(|d| Value::Quantity(Quantity::unitless(d)))
        }
        Value::Tuple(_) => value.as_quantity().map(Value::Quantity),
        Value::String(s) => {
            let caps = QUANTITY_RE.as_ref()?.captures(s.trim())?;
            let number = Decimal::from_str(caps.get(1)?.as_str()).ok()?;
            let unit = caps.get(2).or_else(|| caps.get(3)).map_or("1", |m| m.as_str());
            Some(Value::Quantity(Quantity::new(number, unit)))
        }
        _ => None,
    }
}

pub fn to_concept(value: &Value) -> Option<Value> {
    match value {
        Value::List(items) => {
            let codes: Option<Vec<Code>> = items.iter().filter(|v| !v.is_null()).map(Value::as_code).collect();
            Some(Value::Concept(Concept::new(codes?, None)))
        }
        other => other.as_concept().map(Value::Concept),
    }
}

/// Whether `convert` would succeed; backs the `convertsTo*` functions
pub fn converts_to(value: &Value, ty: &ValueType) -> Option<bool> {
    if value.is_null() {
        return None;
    }
    Some(!convert(value, ty).is_null())
}

/// `minimum T`
pub fn min_value(ty: &ValueType) -> Option<Value> {
    Some(match ty {
        ValueType::Integer => Value::Integer(i32::MIN),
        ValueType::Long => Value::Long(i64::MIN),
        ValueType::Decimal => Value::Decimal(Decimal::new(-99_999_999_999_999_999, 8)),
        ValueType::Date => Value::Date(Date::MIN),
        ValueType::DateTime => Value::DateTime(DateTime::MIN),
        ValueType::Time => Value::Time(Time::MIN),
        _ => return None,
    })
}

/// `maximum T`
pub fn max_value(ty: &ValueType) -> Option<Value> {
    Some(match ty {
        ValueType::Integer => Value::Integer(i32::MAX),
        ValueType::Long => Value::Long(i64::MAX),
        ValueType::Decimal => Value::Decimal(Decimal::new(99_999_999_999_999_999, 8)),
        ValueType::Date => Value::Date(Date::MAX),
        ValueType::DateTime => Value::DateTime(DateTime::MAX),
        ValueType::Time => Value::Time(Time::MAX),
        _ => return None,
    })
}

/// Truncating Decimal to Integer conversion used by integer-valued math
pub fn decimal_to_integer(d: Decimal) -> Option<Value> {
    d.trunc().to_i32().map(Value::Integer)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Value::string("42"), ValueType::Integer, Value::Integer(42))]
    #[case(Value::string("4.2x"), ValueType::Decimal, Value::Null)]
    #[case(Value::string("yes"), ValueType::Boolean, Value::Boolean(true))]
    #[case(Value::Integer(3), ValueType::Decimal, Value::Decimal(Decimal::from(3)))]
    #[case(Value::string("5 'mg'"), ValueType::Quantity, Value::quantity(Decimal::from(5), "mg"))]
    #[case(Value::string("2024-03-01T10:00:00Z"), ValueType::Date, Value::Date(Date::ymd(2024, 3, 1).unwrap()))]
    #[case(Value::Decimal(Decimal::new(15, 1)), ValueType::String, Value::string("1.5"))]
    fn test_convert(#[case] value: Value, #[case] ty: ValueType, #[case] expected: Value) {
        assert_eq!(convert(&value, &ty), expected);
    }

    #[test]
    fn test_is_type_on_resources() {
        let patient = Value::from_json(&serde_json::json!({ "resourceType": "Patient", "id": "p1" }));
        assert!(is_type(&patient, &ValueType::from_name("Patient")));
        assert!(!is_type(&patient, &ValueType::from_name("Observation")));
        assert!(!is_type(&Value::Null, &ValueType::Any));
        assert!(!is_type(&Value::Integer(1), &ValueType::Decimal));
    }

    #[test]
    fn test_coerce_promotes_implicitly() {
        assert_eq!(coerce(&Value::Integer(1), &ValueType::Long), Value::Long(1));
        assert_eq!(coerce(&Value::string("abc"), &ValueType::Integer), Value::Null);
        let code = Code::new("1", "s");
        assert_eq!(
            coerce(&Value::Code(code.clone()), &ValueType::Concept),
            Value::Concept(Concept::from_code(code))
        );
    }
}
