//! Literal nodes

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Literal {
    Null,
    Boolean(bool),
    Integer(i32),
    /// Suffixed with `L` in source
    Long(i64),
    Decimal(Decimal),
    String(String),
    Date(DateLiteral),
    DateTime(DateTimeLiteral),
    Time(TimeLiteral),
    Quantity(QuantityLiteral),
    Ratio(RatioLiteral),
}

/// `@YYYY[-MM[-DD]]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateLiteral {
    pub year: i32,
    pub month: Option<u8>,
    pub day: Option<u8>,
}

impl DateLiteral {
    pub fn new(year: i32, month: Option<u8>, day: Option<u8>) -> Self {
        Self { year, month, day }
    }
}

impl fmt::Display for DateLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:04}", self.year)?;
        if let Some(m) = self.month {
            write!(f, "-{m:02}")?;
            if let Some(d) = self.day {
                write!(f, "-{d:02}")?;
            }
        }
        Ok(())
    }
}

/// `@T[hh[:mm[:ss[.fff]]]]`, also the time part of a date-time literal
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeLiteral {
    pub hour: u8,
    pub minute: Option<u8>,
    pub second: Option<u8>,
    pub millisecond: Option<u16>,
}

impl fmt::Display for TimeLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}", self.hour)?;
        if let Some(m) = self.minute {
            write!(f, ":{m:02}")?;
            if let Some(s) = self.second {
                write!(f, ":{s:02}")?;
                if let Some(ms) = self.millisecond {
                    write!(f, ".{ms:03}")?;
                }
            }
        }
        Ok(())
    }
}

/// `@YYYY-MM-DDThh:mm:ss.fff(Z|+hh:mm)`; the time part may be absent (`@2024-01T`)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateTimeLiteral {
    pub date: DateLiteral,
    pub time: Option<TimeLiteral>,
    /// Offset from UTC in minutes
    pub offset_minutes: Option<i16>,
}

impl fmt::Display for DateTimeLiteral {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}T", self.date)?;
        if let Some(t) = &self.time {
            write!(f, "{t}")?;
        }
        if let Some(offset) = self.offset_minutes {
            if offset == 0 {
                write!(f, "Z")?;
            } else {
                let sign = if offset < 0 { '-' } else { '+' };
                let abs = offset.unsigned_abs();
                write!(f, "{sign}{:02}:{:02}", abs / 60, abs % 60)?;
            }
        }
        Ok(())
    }
}

/// A number followed by a unit: `5 'mg'` or `3 days`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantityLiteral {
    pub value: Decimal,
    pub unit: String,
}

/// `1 'mg':10 'mL'`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RatioLiteral {
    pub numerator: QuantityLiteral,
    pub denominator: QuantityLiteral,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_datetime_display() {
        let lit = DateTimeLiteral {
            date: DateLiteral::new(2024, Some(3), Some(9)),
            time: Some(TimeLiteral {
                hour: 7,
                minute: Some(5),
                second: None,
                millisecond: None,
            }),
            offset_minutes: Some(-330),
        };
        assert_eq!(lit.to_string(), "2024-03-09T07:05-05:30");
    }

    #[test]
    fn test_partial_date_display() {
        assert_eq!(DateLiteral::new(2024, Some(1), None).to_string(), "2024-01");
    }
}
