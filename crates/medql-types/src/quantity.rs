//! Quantities, ratios and the unit conversion table
//!
//! Conversion goes through a base unit per dimension: `base = (v + pre) * f`.
//! Linear units have `pre = 0`; temperatures are affine. Calendar durations
//! (`year`, `month`) form their own dimension so that `1 year = 12 months`
//! holds without pretending a month has a fixed length.

use crate::temporal::TemporalUnit;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
enum Dimension {
    Dimensionless,
    Mass,
    Volume,
    Length,
    Time,
    CalendarTime,
    Amount,
    Temperature,
}

#[derive(Debug, Clone, Copy)]
struct UnitDef {
    dimension: Dimension,
    factor: Decimal,
    pre: Decimal,
}

const fn linear(dimension: Dimension, factor: Decimal) -> UnitDef {
    UnitDef {
        dimension,
        factor,
        pre: Decimal::ZERO,
    }
}

static UNITS: LazyLock<HashMap<&'static str, UnitDef>> = LazyLock::new(|| {
    use Dimension::*;
    let d = Decimal::new;
    let mut table = HashMap::new();
    let mut add = |names: &[&'static str], def: UnitDef| {
        for name in names {
            table.insert(*name, def);
        }
    };

    add(&["1"], linear(Dimensionless, d(1, 0)));
    add(&["%"], linear(Dimensionless, d(1, 2)));

    add(&["kg"], linear(Mass, d(1000, 0)));
    add(&["g"], linear(Mass, d(1, 0)));
    add(&["mg"], linear(Mass, d(1, 3)));
    add(&["ug", "mcg"], linear(Mass, d(1, 6)));
    add(&["ng"], linear(Mass, d(1, 9)));
    add(&["[lb_av]", "lb"], linear(Mass, d(45_359_237, 5)));
    add(&["[oz_av]", "oz"], linear(Mass, d(28_349_523_125, 9)));

    add(&["L", "l"], linear(Volume, d(1, 0)));
    add(&["dL", "dl"], linear(Volume, d(1, 1)));
    add(&["cL", "cl"], linear(Volume, d(1, 2)));
    add(&["mL", "ml"], linear(Volume, d(1, 3)));
    add(&["uL", "ul"], linear(Volume, d(1, 6)));

    add(&["km"], linear(Length, d(1000, 0)));
    add(&["m"], linear(Length, d(1, 0)));
    add(&["cm"], linear(Length, d(1, 2)));
    add(&["mm"], linear(Length, d(1, 3)));
    add(&["um"], linear(Length, d(1, 6)));
    add(&["[in_i]", "in"], linear(Length, d(254, 4)));
    add(&["[ft_i]", "ft"], linear(Length, d(3048, 4)));

    add(&["ms", "millisecond", "milliseconds"], linear(Time, d(1, 3)));
    add(&["s", "second", "seconds"], linear(Time, d(1, 0)));
    add(&["min", "minute", "minutes"], linear(Time, d(60, 0)));
    add(&["h", "hour", "hours"], linear(Time, d(3600, 0)));
    add(&["d", "day", "days"], linear(Time, d(86_400, 0)));
    add(&["wk", "week", "weeks"], linear(Time, d(604_800, 0)));
    add(&["mo"], linear(Time, d(2_629_800, 0)));
    add(&["a"], linear(Time, d(31_557_600, 0)));

    add(&["month", "months"], linear(CalendarTime, d(1, 0)));
    add(&["year", "years"], linear(CalendarTime, d(12, 0)));

    add(&["mol"], linear(Amount, d(1, 0)));
    add(&["mmol"], linear(Amount, d(1, 3)));
    add(&["umol"], linear(Amount, d(1, 6)));

    add(&["K"], linear(Temperature, d(1, 0)));
    add(
        &["Cel"],
        UnitDef {
            dimension: Temperature,
            factor: d(1, 0),
            pre: d(27315, 2),
        },
    );
    add(
        &["[degF]"],
        UnitDef {
            dimension: Temperature,
            factor: d(5, 0) / d(9, 0),
            pre: d(45967, 2),
        },
    );
    table
});

/// Resolved unit: a numerator dimension over an optional denominator
#[derive(Debug, Clone, Copy)]
struct Resolved {
    dimension: (Dimension, Option<Dimension>),
    factor: Decimal,
    pre: Decimal,
}

/// Strip UCUM annotations (`{beats}/min` is `1/min`)
fn strip_annotations(unit: &str) -> String {
    let mut out = String::with_capacity(unit.len());
    let mut depth = 0usize;
    for c in unit.chars() {
        match c {
            '{' => depth += 1,
            '}' => depth = depth.saturating_sub(1),
            _ if depth == 0 => out.push(c),
            _ => {}
        }
    }
    if out.is_empty() { "1".to_string() } else { out }
}

fn resolve(unit: &str) -> Option<Resolved> {
    let unit = strip_annotations(unit.trim());
    if let Some(def) = UNITS.get(unit.as_str()) {
        return Some(Resolved {
            dimension: (def.dimension, None),
            factor: def.factor,
            pre: def.pre,
        });
    }
    let (num, den) = unit.split_once('/')?;
    let num = if num.is_empty() { "1" } else { num };
    let (n, d) = (UNITS.get(num)?, UNITS.get(den)?);
    if n.pre != Decimal::ZERO || d.pre != Decimal::ZERO || d.factor.is_zero() {
        return None;
    }
    Some(Resolved {
        dimension: (n.dimension, Some(d.dimension)),
        factor: n.factor / d.factor,
        pre: Decimal::ZERO,
    })
}

/// Duration keywords written without quotes (`3 days`)
pub fn is_duration_keyword(unit: &str) -> bool {
    matches!(
        unit.trim_end_matches('s'),
        "year" | "month" | "week" | "day" | "hour" | "minute" | "second" | "millisecond"
    )
}

fn is_unity(unit: &str) -> bool {
    unit.is_empty() || unit == "1"
}

/// Convert a magnitude between two units, `None` when the units are not
/// commensurable
pub fn convert_value(value: Decimal, from: &str, to: &str) -> Option<Decimal> {
    if from == to || (is_unity(from) && is_unity(to)) {
        return Some(value);
    }
    let (src, dst) = (resolve(from)?, resolve(to)?);
    if src.dimension != dst.dimension {
        return None;
    }
    let base = value.checked_add(src.pre)?.checked_mul(src.factor)?;
    base.checked_div(dst.factor)?.checked_sub(dst.pre).map(|v| v.normalize())
}

/// Whether two units can be converted into each other
pub fn units_compatible(a: &str, b: &str) -> bool {
    convert_value(Decimal::ONE, a, b).is_some()
}

/// A decimal magnitude with a unit. Unitless quantities carry the unit `1`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Quantity {
    pub value: Decimal,
    pub unit: String,
}

impl Quantity {
    pub fn new(value: Decimal, unit: impl Into<String>) -> Self {
        let unit = unit.into();
        Self {
            value,
            unit: if unit.is_empty() { "1".to_string() } else { unit },
        }
    }

    pub fn unitless(value: Decimal) -> Self {
        Self::new(value, "1")
    }

    pub fn is_unitless(&self) -> bool {
        is_unity(&self.unit)
    }

    /// `convert(quantity, targetUnit)`; `None` for unconvertible pairs
    pub fn convert_to(&self, unit: &str) -> Option<Self> {
        convert_value(self.value, &self.unit, unit).map(|value| Self::new(value, unit))
    }

    /// Duration unit when the quantity can be applied to a date or time
    pub fn temporal_unit(&self) -> Option<TemporalUnit> {
        TemporalUnit::parse(&self.unit)
    }

    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        let other = other.convert_to(&self.unit)?;
        Some(self.value.cmp(&other.value))
    }

    pub fn checked_add(&self, other: &Self) -> Option<Self> {
        let other = other.convert_to(&self.unit)?;
        Some(Self::new(self.value.checked_add(other.value)?, self.unit.clone()))
    }

    pub fn checked_sub(&self, other: &Self) -> Option<Self> {
        let other = other.convert_to(&self.unit)?;
        Some(Self::new(self.value.checked_sub(other.value)?, self.unit.clone()))
    }

    pub fn checked_mul(&self, other: &Self) -> Option<Self> {
        let value = self.value.checked_mul(other.value)?;
        let unit = match (self.is_unitless(), other.is_unitless()) {
            (true, _) => other.unit.clone(),
            (false, true) => self.unit.clone(),
            (false, false) => format!("{}.{}", self.unit, other.unit),
        };
        Some(Self::new(value, unit))
    }

    pub fn checked_div(&self, other: &Self) -> Option<Self> {
        if other.is_unitless() {
            return Some(Self::new(self.value.checked_div(other.value)?, self.unit.clone()));
        }
        if let Some(converted) = other.convert_to(&self.unit) {
            return Some(Self::unitless(self.value.checked_div(converted.value)?));
        }
        let unit = if self.is_unitless() {
            format!("1/{}", other.unit)
        } else {
            format!("{}/{}", self.unit, other.unit)
        };
        Some(Self::new(self.value.checked_div(other.value)?, unit))
    }

    pub fn negate(&self) -> Self {
        Self::new(-self.value, self.unit.clone())
    }
}

impl fmt::Display for Quantity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if is_duration_keyword(&self.unit) {
            write!(f, "{} {}", self.value, self.unit)
        } else {
            write!(f, "{} '{}'", self.value, self.unit)
        }
    }
}

/// `numerator : denominator`
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Ratio {
    pub numerator: Quantity,
    pub denominator: Quantity,
}

impl Ratio {
    pub fn new(numerator: Quantity, denominator: Quantity) -> Self {
        Self {
            numerator,
            denominator,
        }
    }

    /// Ratios are equal when their cross products agree
    pub fn equivalent(&self, other: &Self) -> bool {
        let left = self.numerator.checked_mul(&other.denominator);
        let right = other.numerator.checked_mul(&self.denominator);
        match (left, right) {
            (Some(l), Some(r)) => l.compare(&r) == Some(Ordering::Equal),
            _ => false,
        }
    }
}

impl fmt::Display for Ratio {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.numerator, self.denominator)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::str::FromStr;

    fn dec(s: &str) -> Decimal {
        Decimal::from_str(s).unwrap()
    }

    #[rstest]
    #[case("1", "g", "mg", Some("1000"))]
    #[case("2.5", "kg", "g", Some("2500"))]
    #[case("100", "mg/dL", "g/L", Some("1"))]
    #[case("1", "year", "months", Some("12"))]
    #[case("2", "wk", "days", Some("14"))]
    #[case("1", "g", "mL", None)]
    #[case("1", "year", "d", None)]
    fn test_linear_conversion(#[case] value: &str, #[case] from: &str, #[case] to: &str, #[case] expected: Option<&str>) {
        assert_eq!(convert_value(dec(value), from, to), expected.map(dec));
    }

    #[test]
    fn test_temperature_is_affine() {
        assert_eq!(convert_value(dec("100"), "Cel", "K"), Some(dec("373.15")));
        assert_eq!(convert_value(dec("0"), "Cel", "K"), Some(dec("273.15")));
        let f = convert_value(dec("212"), "[degF]", "Cel").unwrap();
        assert_eq!(f.round_dp(6), dec("100"));
    }

    #[test]
    fn test_arithmetic_units() {
        let a = Quantity::new(dec("2"), "m");
        let b = Quantity::new(dec("50"), "cm");
        assert_eq!(a.checked_add(&b), Some(Quantity::new(dec("2.5"), "m")));
        assert_eq!(a.checked_mul(&a).map(|q| q.unit), Some("m.m".to_string()));
        assert_eq!(a.checked_div(&b), Some(Quantity::unitless(dec("4"))));
        assert_eq!(a.checked_add(&Quantity::new(dec("1"), "g")), None);
    }

    #[test]
    fn test_annotations_are_ignored() {
        assert!(units_compatible("{beats}/min", "1/min"));
        assert_eq!(Quantity::new(dec("1"), "g").compare(&Quantity::new(dec("999"), "mg")), Some(Ordering::Greater));
    }
}
