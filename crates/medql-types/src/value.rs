//! Runtime values
//!
//! `Value` is what every expression evaluates to. Resources from a data
//! source arrive as JSON and are held as tuples and lists; the helpers at the
//! bottom of this module recognise the common clinical shapes (codings,
//! codeable concepts, quantities) inside such trees.

use crate::quantity::{Quantity, Ratio};
use crate::temporal::{Date, DateTime, Time};
use indexmap::IndexMap;
use medql_ast::Literal;
use rust_decimal::Decimal;
use rust_decimal::prelude::{FromPrimitive, ToPrimitive};
use serde::{Deserialize, Serialize};
use serde_json::json;
use smallvec::SmallVec;
use std::fmt;
use std::str::FromStr;

/// Ordered name to value map
pub type Tuple = IndexMap<String, Value>;

#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// Absence of information
    #[default]
    Null,
    Boolean(bool),
    Integer(i32),
    Long(i64),
    Decimal(Decimal),
    String(String),
    Date(Date),
    DateTime(DateTime),
    Time(Time),
    Quantity(Quantity),
    Ratio(Ratio),
    Code(Code),
    Concept(Concept),
    /// Ordered, may contain duplicates
    List(Vec<Value>),
    Tuple(Tuple),
    Interval(Interval),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    pub fn is_true(&self) -> bool {
        matches!(self, Self::Boolean(true))
    }

    pub fn is_false(&self) -> bool {
        matches!(self, Self::Boolean(false))
    }

    pub fn string(value: impl Into<String>) -> Self {
        Self::String(value.into())
    }

    pub fn decimal(value: Decimal) -> Self {
        Self::Decimal(value)
    }

    pub fn quantity(value: Decimal, unit: impl Into<String>) -> Self {
        Self::Quantity(Quantity::new(value, unit))
    }

    pub fn tuple<K: Into<String>>(elements: impl IntoIterator<Item = (K, Value)>) -> Self {
        Self::Tuple(elements.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Boolean for true/false, `None` for Null or non-Boolean values
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Self::List(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_tuple(&self) -> Option<&Tuple> {
        match self {
            Self::Tuple(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_interval(&self) -> Option<&Interval> {
        match self {
            Self::Interval(i) => Some(i),
            _ => None,
        }
    }

    /// Integer, Long or Decimal widened to Decimal
    pub fn as_decimal(&self) -> Option<Decimal> {
        match self {
            Self::Integer(i) => Some(Decimal::from(*i)),
            Self::Long(l) => Some(Decimal::from(*l)),
            Self::Decimal(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(i64::from(*i)),
            Self::Long(l) => Some(*l),
            _ => None,
        }
    }

    /// Next value of an ordered type. Decimals step by 10^-8, quantities by
    /// one unit of their magnitude type, temporals by one unit of their
    /// precision. `None` past the maximum or for unordered types.
    pub fn successor(&self) -> Option<Value> {
        match self {
            Self::Integer(i) => i.checked_add(1).map(Self::Integer),
            Self::Long(l) => l.checked_add(1).map(Self::Long),
            Self::Decimal(d) => d.checked_add(DECIMAL_STEP).map(Self::Decimal),
            Self::Quantity(q) => q.value.checked_add(quantity_step(q.value)).map(|v| Self::quantity(v, q.unit.clone())),
            Self::Date(d) => d.successor().map(Self::Date),
            Self::DateTime(dt) => dt.successor().map(Self::DateTime),
            Self::Time(t) => t.successor().map(Self::Time),
            _ => None,
        }
    }

    pub fn predecessor(&self) -> Option<Value> {
        match self {
            Self::Integer(i) => i.checked_sub(1).map(Self::Integer),
            Self::Long(l) => l.checked_sub(1).map(Self::Long),
            Self::Decimal(d) => d.checked_sub(DECIMAL_STEP).map(Self::Decimal),
            Self::Quantity(q) => q.value.checked_sub(quantity_step(q.value)).map(|v| Self::quantity(v, q.unit.clone())),
            Self::Date(d) => d.predecessor().map(Self::Date),
            Self::DateTime(dt) => dt.predecessor().map(Self::DateTime),
            Self::Time(t) => t.predecessor().map(Self::Time),
            _ => None,
        }
    }

    /// Path-language view: Null is empty, a list is itself, anything else
    /// is a one-item collection
    pub fn into_collection(self) -> Vec<Value> {
        match self {
            Self::Null => Vec::new(),
            Self::List(items) => items,
            other => vec![other],
        }
    }

    /// Named element of a tuple, Null when absent
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.as_tuple().and_then(|t| t.get(name))
    }

    /// `resourceType` of a resource-shaped tuple
    pub fn resource_type(&self) -> Option<&str> {
        self.get("resourceType").and_then(Value::as_str)
    }

    /// Name of the runtime type, as used in error messages and `is` checks
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Null => "Null",
            Self::Boolean(_) => "Boolean",
            Self::Integer(_) => "Integer",
            Self::Long(_) => "Long",
            Self::Decimal(_) => "Decimal",
            Self::String(_) => "String",
            Self::Date(_) => "Date",
            Self::DateTime(_) => "DateTime",
            Self::Time(_) => "Time",
            Self::Quantity(_) => "Quantity",
            Self::Ratio(_) => "Ratio",
            Self::Code(_) => "Code",
            Self::Concept(_) => "Concept",
            Self::List(_) => "List",
            Self::Tuple(_) => "Tuple",
            Self::Interval(_) => "Interval",
        }
    }

    /// Recognise a coding: a `Code` or a tuple with `code` (and usually `system`)
    pub fn as_code(&self) -> Option<Code> {
        match self {
            Self::Code(c) => Some(c.clone()),
            Self::Tuple(t) => {
                let code = t.get("code")?.as_str()?;
                Some(Code {
                    code: code.to_string(),
                    system: t.get("system").and_then(Value::as_str).map(str::to_string),
                    version: t.get("version").and_then(Value::as_str).map(str::to_string),
                    display: t.get("display").and_then(Value::as_str).map(str::to_string),
                })
            }
            _ => None,
        }
    }

    /// Recognise a concept: `Concept`, `Code`, a codeable-concept tuple
    /// (`coding`) or a coding tuple
    pub fn as_concept(&self) -> Option<Concept> {
        match self {
            Self::Concept(c) => Some(c.clone()),
            Self::Code(c) => Some(Concept::from_code(c.clone())),
            Self::Tuple(t) if t.contains_key("coding") => {
                let codes = t
                    .get("coding")
                    .cloned()
                    .unwrap_or_default()
                    .into_collection()
                    .iter()
                    .filter_map(Value::as_code)
                    .collect();
                Some(Concept {
                    codes,
                    display: t.get("text").and_then(Value::as_str).map(str::to_string),
                })
            }
            Self::Tuple(_) => self.as_code().map(Concept::from_code),
            _ => None,
        }
    }

    /// Recognise a quantity: `Quantity` or a tuple with a numeric `value`
    /// and a `code` or `unit`
    pub fn as_quantity(&self) -> Option<Quantity> {
        match self {
            Self::Quantity(q) => Some(q.clone()),
            Self::Tuple(t) => {
                let value = t.get("value")?.as_decimal()?;
                let unit = t
                    .get("code")
                    .and_then(Value::as_str)
                    .or_else(|| t.get("unit").and_then(Value::as_str))
                    .unwrap_or("1");
                Some(Quantity::new(value, unit))
            }
            _ => None,
        }
    }

    /// Convert a JSON document into a value tree. Arrays become lists and
    /// objects become tuples; strings stay strings.
    pub fn from_json(json: &serde_json::Value) -> Self {
        match json {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Boolean(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    i32::try_from(i).map_or(Self::Long(i), Self::Integer)
                } else {
                    Decimal::from_str(&n.to_string())
                        .ok()
                        .or_else(|| n.as_f64().and_then(Decimal::from_f64))
                        .map_or(Self::Null, Self::Decimal)
                }
            }
            serde_json::Value::String(s) => Self::String(s.clone()),
            serde_json::Value::Array(items) => Self::List(items.iter().map(Self::from_json).collect()),
            serde_json::Value::Object(map) => {
                Self::Tuple(map.iter().map(|(k, v)| (k.clone(), Self::from_json(v))).collect())
            }
        }
    }

    /// JSON rendering used for result output
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Self::Null => serde_json::Value::Null,
            Self::Boolean(b) => json!(b),
            Self::Integer(i) => json!(i),
            Self::Long(l) => json!(l),
            Self::Decimal(d) => decimal_to_json(*d),
            Self::String(s) => json!(s),
            Self::Date(d) => json!(d.to_string()),
            Self::DateTime(dt) => json!(dt.to_string()),
            Self::Time(t) => json!(t.to_string()),
            Self::Quantity(q) => json!({ "value": decimal_to_json(q.value), "unit": q.unit }),
            Self::Ratio(r) => json!({
                "numerator": Self::Quantity(r.numerator.clone()).to_json(),
                "denominator": Self::Quantity(r.denominator.clone()).to_json(),
            }),
            Self::Code(c) => c.to_json(),
            Self::Concept(c) => {
                let mut obj = serde_json::Map::new();
                obj.insert("coding".into(), c.codes.iter().map(Code::to_json).collect());
                if let Some(display) = &c.display {
                    obj.insert("text".into(), json!(display));
                }
                serde_json::Value::Object(obj)
            }
            Self::List(items) => items.iter().map(Self::to_json).collect(),
            Self::Tuple(t) => serde_json::Value::Object(t.iter().map(|(k, v)| (k.clone(), v.to_json())).collect()),
            Self::Interval(i) => json!({
                "low": i.low.to_json(),
                "high": i.high.to_json(),
                "lowClosed": i.low_closed,
                "highClosed": i.high_closed,
            }),
        }
    }
}

const DECIMAL_STEP: Decimal = Decimal::from_parts(1, 0, 0, false, 8);

/// Integral quantities step by one, fractional ones by the decimal step
fn quantity_step(value: Decimal) -> Decimal {
    if value.scale() == 0 { Decimal::ONE } else { DECIMAL_STEP }
}

fn decimal_to_json(d: Decimal) -> serde_json::Value {
    d.to_f64()
        .and_then(serde_json::Number::from_f64)
        .map_or_else(|| json!(d.to_string()), serde_json::Value::Number)
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Self::Boolean(b)
    }
}

impl From<Option<bool>> for Value {
    fn from(b: Option<bool>) -> Self {
        b.map_or(Self::Null, Self::Boolean)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Self::Integer(i)
    }
}

impl From<i64> for Value {
    fn from(l: i64) -> Self {
        Self::Long(l)
    }
}

impl From<Decimal> for Value {
    fn from(d: Decimal) -> Self {
        Self::Decimal(d)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Self::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Self::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Self::List(items)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::Integer(i) => write!(f, "{i}"),
            Self::Long(l) => write!(f, "{l}L"),
            Self::Decimal(d) => {
                let s = d.to_string();
                if s.contains('.') { f.write_str(&s) } else { write!(f, "{s}.0") }
            }
            Self::String(s) => write!(f, "'{}'", s.replace('\\', "\\\\").replace('\'', "\\'")),
            Self::Date(d) => write!(f, "@{d}"),
            Self::DateTime(dt) => write!(f, "@{dt}"),
            Self::Time(t) => write!(f, "@T{t}"),
            Self::Quantity(q) => write!(f, "{q}"),
            Self::Ratio(r) => write!(f, "{r}"),
            Self::Code(c) => write!(f, "{c}"),
            Self::Concept(c) => write!(f, "{c}"),
            Self::List(items) => {
                f.write_str("{")?;
                for (i, item) in items.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("}")
            }
            Self::Tuple(t) => {
                f.write_str("Tuple { ")?;
                for (i, (name, value)) in t.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{name}: {value}")?;
                }
                f.write_str(" }")
            }
            Self::Interval(i) => write!(f, "{i}"),
        }
    }
}

/// A code from a code system
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Code {
    pub code: String,
    pub system: Option<String>,
    pub version: Option<String>,
    pub display: Option<String>,
}

impl Code {
    pub fn new(code: impl Into<String>, system: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            system: Some(system.into()),
            version: None,
            display: None,
        }
    }

    pub fn with_display(mut self, display: impl Into<String>) -> Self {
        self.display = Some(display.into());
        self
    }

    /// Same system and code; version and display are ignored
    pub fn is_equivalent(&self, other: &Self) -> bool {
        self.code == other.code && self.system == other.system
    }

    fn to_json(&self) -> serde_json::Value {
        let mut obj = serde_json::Map::new();
        if let Some(system) = &self.system {
            obj.insert("system".into(), json!(system));
        }
        if let Some(version) = &self.version {
            obj.insert("version".into(), json!(version));
        }
        obj.insert("code".into(), json!(self.code));
        if let Some(display) = &self.display {
            obj.insert("display".into(), json!(display));
        }
        serde_json::Value::Object(obj)
    }
}

impl fmt::Display for Code {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Code '{}'", self.code)?;
        if let Some(system) = &self.system {
            write!(f, " from '{system}'")?;
        }
        if let Some(display) = &self.display {
            write!(f, " display '{display}'")?;
        }
        Ok(())
    }
}

/// A set of codes naming the same clinical idea
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Concept {
    pub codes: SmallVec<[Code; 2]>,
    pub display: Option<String>,
}

impl Concept {
    pub fn new(codes: impl IntoIterator<Item = Code>, display: Option<String>) -> Self {
        Self {
            codes: codes.into_iter().collect(),
            display,
        }
    }

    pub fn from_code(code: Code) -> Self {
        let display = code.display.clone();
        Self {
            codes: smallvec::smallvec![code],
            display,
        }
    }

    pub fn contains_equivalent(&self, code: &Code) -> bool {
        self.codes.iter().any(|c| c.is_equivalent(code))
    }

    /// Concepts are equivalent when they share at least one code
    pub fn is_equivalent(&self, other: &Self) -> bool {
        self.codes.iter().any(|c| other.contains_equivalent(c))
    }
}

impl fmt::Display for Concept {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Concept { ")?;
        for (i, code) in self.codes.iter().enumerate() {
            if i > 0 {
                f.write_str(", ")?;
            }
            write!(f, "{code}")?;
        }
        f.write_str(" }")?;
        if let Some(display) = &self.display {
            write!(f, " display '{display}'")?;
        }
        Ok(())
    }
}

/// `Interval[low, high]` with independent closedness. A Null bound on an
/// open side is unbounded; a Null bound on a closed side is unknown.
#[derive(Debug, Clone, PartialEq)]
pub struct Interval {
    pub low: Box<Value>,
    pub high: Box<Value>,
    pub low_closed: bool,
    pub high_closed: bool,
}

impl Interval {
    pub fn new(low: Value, high: Value, low_closed: bool, high_closed: bool) -> Self {
        Self {
            low: Box::new(low),
            high: Box::new(high),
            low_closed,
            high_closed,
        }
    }

    pub fn closed(low: Value, high: Value) -> Self {
        Self::new(low, high, true, true)
    }

    /// Type of the bounds, taken from whichever bound is present
    pub fn point_type(&self) -> Option<&'static str> {
        [&*self.low, &*self.high].into_iter().find(|v| !v.is_null()).map(Value::type_name)
    }
}

impl fmt::Display for Interval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Interval{}{}, {}{}",
            if self.low_closed { '[' } else { '(' },
            self.low,
            self.high,
            if self.high_closed { ']' } else { ')' }
        )
    }
}

/// Runtime value of a literal node. `None` when a date or time literal names
/// an instant that does not exist (`@2023-02-30`).
pub fn literal_value(lit: &Literal) -> Option<Value> {
    Some(match lit {
        Literal::Null => Value::Null,
        Literal::Boolean(b) => Value::Boolean(*b),
        Literal::Integer(i) => Value::Integer(*i),
        Literal::Long(l) => Value::Long(*l),
        Literal::Decimal(d) => Value::Decimal(*d),
        Literal::String(s) => Value::String(s.clone()),
        Literal::Date(d) => Value::Date(Date::new(d.year, d.month, d.day)?),
        Literal::DateTime(dt) => {
            let mut parts = vec![i64::from(dt.date.year)];
            parts.extend(dt.date.month.map(i64::from));
            parts.extend(dt.date.day.map(i64::from));
            if let Some(t) = &dt.time {
                parts.push(i64::from(t.hour));
                parts.extend(t.minute.map(i64::from));
                parts.extend(t.second.map(i64::from));
                parts.extend(t.millisecond.map(i64::from));
            }
            Value::DateTime(DateTime::from_parts(&parts, dt.offset_minutes)?)
        }
        Literal::Time(t) => {
            let mut parts = vec![i64::from(t.hour)];
            parts.extend(t.minute.map(i64::from));
            parts.extend(t.second.map(i64::from));
            parts.extend(t.millisecond.map(i64::from));
            Value::Time(Time::from_parts(&parts)?)
        }
        Literal::Quantity(q) => Value::Quantity(Quantity::new(q.value, q.unit.clone())),
        Literal::Ratio(r) => Value::Ratio(Ratio::new(
            Quantity::new(r.numerator.value, r.numerator.unit.clone()),
            Quantity::new(r.denominator.value, r.denominator.unit.clone()),
        )),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_json_round_trip_preserves_shape() {
        let json = json!({
            "resourceType": "Observation",
            "code": { "coding": [{ "system": "http://loinc.org", "code": "8480-6" }] },
            "valueQuantity": { "value": 120.5, "unit": "mm[Hg]" },
            "count": 3
        });
        let value = Value::from_json(&json);
        assert_eq!(value.resource_type(), Some("Observation"));
        assert_eq!(value.get("count"), Some(&Value::Integer(3)));
        let concept = value.get("code").and_then(Value::as_concept).unwrap();
        assert_eq!(concept.codes[0], Code::new("8480-6", "http://loinc.org"));
        let quantity = value.get("valueQuantity").and_then(Value::as_quantity).unwrap();
        assert_eq!(quantity.unit, "mm[Hg]");
        assert_eq!(value.to_json(), json);
    }

    #[test]
    fn test_display() {
        assert_eq!(Value::Decimal(Decimal::from(3)).to_string(), "3.0");
        assert_eq!(Value::List(vec![Value::Integer(1), Value::string("a")]).to_string(), "{1, 'a'}");
        let interval = Interval::new(Value::Integer(1), Value::Integer(5), true, false);
        assert_eq!(interval.to_string(), "Interval[1, 5)");
    }

    #[test]
    fn test_into_collection() {
        assert!(Value::Null.into_collection().is_empty());
        assert_eq!(Value::Integer(1).into_collection(), vec![Value::Integer(1)]);
    }
}
