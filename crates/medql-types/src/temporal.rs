//! Partial-precision dates, date-times and times
//!
//! A temporal value is specified down to some precision and every component
//! finer than that is absent. Comparisons only look at components both sides
//! carry; when one side stops before the other and everything up to that
//! point is equal the answer is unknown (`None`).
//!
//! Duration arithmetic distinguishes calendar units (years, months), which
//! are applied component-wise with end-of-month clamping, from fixed units
//! (weeks down to milliseconds), which are plain offsets.

use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime, Timelike};
use medql_ast::TemporalPrecision;
use rust_decimal::Decimal;
use rust_decimal::prelude::ToPrimitive;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Precision {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

impl Precision {
    pub const ALL: [Precision; 7] = [
        Self::Year,
        Self::Month,
        Self::Day,
        Self::Hour,
        Self::Minute,
        Self::Second,
        Self::Millisecond,
    ];

    pub const fn index(self) -> usize {
        self as usize
    }

    pub fn from_index(i: usize) -> Option<Self> {
        Self::ALL.get(i).copied()
    }

    /// Weeks have no component of their own and map to days
    pub fn from_ast(p: TemporalPrecision) -> Self {
        match p {
            TemporalPrecision::Year => Self::Year,
            TemporalPrecision::Month => Self::Month,
            TemporalPrecision::Week | TemporalPrecision::Day => Self::Day,
            TemporalPrecision::Hour => Self::Hour,
            TemporalPrecision::Minute => Self::Minute,
            TemporalPrecision::Second => Self::Second,
            TemporalPrecision::Millisecond => Self::Millisecond,
        }
    }

    pub const fn keyword(self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Month => "month",
            Self::Day => "day",
            Self::Hour => "hour",
            Self::Minute => "minute",
            Self::Second => "second",
            Self::Millisecond => "millisecond",
        }
    }
}

impl fmt::Display for Precision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// Unit of a duration applied to a temporal value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TemporalUnit {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

impl TemporalUnit {
    /// Accepts duration keywords and their UCUM spellings
    pub fn parse(unit: &str) -> Option<Self> {
        Some(match unit {
            "year" | "years" | "a" => Self::Year,
            "month" | "months" | "mo" => Self::Month,
            "week" | "weeks" | "wk" => Self::Week,
            "day" | "days" | "d" => Self::Day,
            "hour" | "hours" | "h" => Self::Hour,
            "minute" | "minutes" | "min" => Self::Minute,
            "second" | "seconds" | "s" => Self::Second,
            "millisecond" | "milliseconds" | "ms" => Self::Millisecond,
            _ => return None,
        })
    }

    pub fn from_ast(p: TemporalPrecision) -> Self {
        match p {
            TemporalPrecision::Year => Self::Year,
            TemporalPrecision::Month => Self::Month,
            TemporalPrecision::Week => Self::Week,
            TemporalPrecision::Day => Self::Day,
            TemporalPrecision::Hour => Self::Hour,
            TemporalPrecision::Minute => Self::Minute,
            TemporalPrecision::Second => Self::Second,
            TemporalPrecision::Millisecond => Self::Millisecond,
        }
    }

    /// Component the unit is applied to
    pub const fn precision(self) -> Precision {
        match self {
            Self::Year => Precision::Year,
            Self::Month => Precision::Month,
            Self::Week | Self::Day => Precision::Day,
            Self::Hour => Precision::Hour,
            Self::Minute => Precision::Minute,
            Self::Second => Precision::Second,
            Self::Millisecond => Precision::Millisecond,
        }
    }

    pub const fn is_calendar(self) -> bool {
        matches!(self, Self::Year | Self::Month)
    }

    /// Length in milliseconds of fixed units
    const fn fixed_millis(self) -> Option<i64> {
        match self {
            Self::Year | Self::Month => None,
            Self::Week => Some(7 * 86_400_000),
            Self::Day => Some(86_400_000),
            Self::Hour => Some(3_600_000),
            Self::Minute => Some(60_000),
            Self::Second => Some(1_000),
            Self::Millisecond => Some(1),
        }
    }

    /// Plural keyword used when printing durations
    pub const fn plural(self) -> &'static str {
        match self {
            Self::Year => "years",
            Self::Month => "months",
            Self::Week => "weeks",
            Self::Day => "days",
            Self::Hour => "hours",
            Self::Minute => "minutes",
            Self::Second => "seconds",
            Self::Millisecond => "milliseconds",
        }
    }
}

/// How many units of the next finer precision fit in each precision. Used
/// only to truncate a fine duration onto a coarse value (`@2024-01 + 45 days`).
const DOWNSCALE: [i64; 6] = [12, 30, 24, 60, 60, 1000];

/// Component vector, year through millisecond
pub(crate) type Fields = [Option<i64>; 7];

pub(crate) fn days_in_month(year: i32, month: u32) -> u32 {
    match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        2 if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 => 29,
        2 => 28,
        _ => 0,
    }
}

fn precision_of(fields: &Fields) -> Precision {
    let count = fields.iter().take_while(|f| f.is_some()).count();
    Precision::from_index(count.saturating_sub(1)).unwrap_or(Precision::Year)
}

fn fields_valid(fields: &Fields) -> bool {
    let limits: [(i64, i64); 7] = [(1, 9999), (1, 12), (1, 31), (0, 23), (0, 59), (0, 59), (0, 999)];
    let mut seen_gap = false;
    for (i, field) in fields.iter().enumerate() {
        match field {
            Some(v) => {
                if seen_gap || *v < limits[i].0 || *v > limits[i].1 {
                    return false;
                }
            }
            None => seen_gap = true,
        }
    }
    match (fields[0], fields[1], fields[2]) {
        (Some(y), Some(m), Some(d)) => d <= i64::from(days_in_month(y as i32, m as u32)),
        _ => true,
    }
}

/// Compare component-wise; `None` when one side runs out of components first
fn compare_fields(a: &Fields, b: &Fields, range: std::ops::Range<usize>) -> Option<Ordering> {
    for i in range {
        match (a[i], b[i]) {
            (Some(x), Some(y)) if x != y => return Some(x.cmp(&y)),
            (Some(_), Some(_)) => {}
            (None, None) => return Some(Ordering::Equal),
            _ => return None,
        }
    }
    Some(Ordering::Equal)
}

/// Compare only the components up to and including `precision`
fn compare_fields_at(a: &Fields, b: &Fields, range: std::ops::Range<usize>) -> Option<Ordering> {
    for i in range {
        match (a[i], b[i]) {
            (Some(x), Some(y)) if x != y => return Some(x.cmp(&y)),
            (Some(_), Some(_)) => {}
            _ => return None,
        }
    }
    Some(Ordering::Equal)
}

fn to_naive(fields: &Fields) -> Option<NaiveDateTime> {
    let date = NaiveDate::from_ymd_opt(
        fields[0]? as i32,
        fields[1].unwrap_or(1) as u32,
        fields[2].unwrap_or(1) as u32,
    )?;
    let time = NaiveTime::from_hms_milli_opt(
        fields[3].unwrap_or(0) as u32,
        fields[4].unwrap_or(0) as u32,
        fields[5].unwrap_or(0) as u32,
        fields[6].unwrap_or(0) as u32,
    )?;
    Some(NaiveDateTime::new(date, time))
}

fn from_naive(dt: &NaiveDateTime, precision: Precision) -> Fields {
    let all = [
        Some(i64::from(dt.year())),
        Some(i64::from(dt.month())),
        Some(i64::from(dt.day())),
        Some(i64::from(dt.hour())),
        Some(i64::from(dt.minute())),
        Some(i64::from(dt.second())),
        Some(i64::from(dt.nanosecond() / 1_000_000)),
    ];
    let mut out = [None; 7];
    out[..=precision.index()].copy_from_slice(&all[..=precision.index()]);
    out
}

/// Shift a duration expressed in `unit` onto a value of `precision`,
/// truncating when the unit is finer than the value
fn scale_to_precision(amount: i64, unit: TemporalUnit, precision: Precision) -> Option<(i64, TemporalUnit)> {
    let (mut amount, unit) = match unit {
        TemporalUnit::Week => (amount.checked_mul(7)?, TemporalUnit::Day),
        other => (amount, other),
    };
    let mut idx = unit.precision().index();
    if idx <= precision.index() {
        return Some((amount, unit));
    }
    while idx > precision.index() {
        amount /= DOWNSCALE[idx - 1];
        idx -= 1;
    }
    let unit = match Precision::from_index(idx).unwrap_or(Precision::Year) {
        Precision::Year => TemporalUnit::Year,
        Precision::Month => TemporalUnit::Month,
        Precision::Day => TemporalUnit::Day,
        Precision::Hour => TemporalUnit::Hour,
        Precision::Minute => TemporalUnit::Minute,
        Precision::Second => TemporalUnit::Second,
        Precision::Millisecond => TemporalUnit::Millisecond,
    };
    Some((amount, unit))
}

/// Split a decimal amount into a whole number of units, moving to
/// milliseconds for fractional seconds
fn whole_amount(amount: Decimal, unit: TemporalUnit) -> Option<(i64, TemporalUnit)> {
    if unit == TemporalUnit::Second && amount.fract() != Decimal::ZERO {
        return (amount * Decimal::from(1000)).trunc().to_i64().map(|a| (a, TemporalUnit::Millisecond));
    }
    amount.trunc().to_i64().map(|a| (a, unit))
}

fn add_to_fields(fields: &Fields, amount: Decimal, unit: TemporalUnit) -> Option<Fields> {
    let precision = precision_of(fields);
    let (whole, unit) = whole_amount(amount, unit)?;
    let (whole, unit) = scale_to_precision(whole, unit, precision)?;
    if whole == 0 {
        return Some(*fields);
    }
    let result = match unit {
        TemporalUnit::Year | TemporalUnit::Month => {
            let year = fields[0]?;
            let month = fields[1].unwrap_or(1);
            let months = if unit == TemporalUnit::Year { whole.checked_mul(12)? } else { whole };
            let total = (year * 12 + month - 1).checked_add(months)?;
            let new_year = total.div_euclid(12);
            let new_month = total.rem_euclid(12) + 1;
            let mut out = *fields;
            let year_index = i32::try_from(new_year).ok()?;
            out[0] = Some(new_year);
            if fields[1].is_some() {
                out[1] = Some(new_month);
            }
            if let Some(day) = fields[2] {
                let max_day = i64::from(days_in_month(year_index, new_month as u32));
                out[2] = Some(day.min(max_day));
            }
            out
        }
        _ => {
            let millis = whole.checked_mul(unit.fixed_millis()?)?;
            let dt = to_naive(fields)?.checked_add_signed(Duration::try_milliseconds(millis)?)?;
            from_naive(&dt, precision)
        }
    };
    fields_valid(&result).then_some(result)
}

/// Whole calendar months from `a` to `b`, not counting a partial last month
fn whole_months_between(a: &Fields, b: &Fields) -> Option<i64> {
    let (y1, y2) = (a[0]?, b[0]?);
    let (m1, m2) = (a[1].unwrap_or(1), b[1].unwrap_or(1));
    let mut months = y2.checked_mul(12)?.checked_add(m2)?.checked_sub(y1.checked_mul(12)?.checked_add(m1)?)?;
    let rest = compare_rest(a, b, 2);
    if months > 0 && rest == Ordering::Greater {
        months -= 1;
    } else if months < 0 && rest == Ordering::Less {
        months += 1;
    }
    Some(months)
}

/// Compare the components from `from` on, treating absent ones as their minimum
fn compare_rest(a: &Fields, b: &Fields, from: usize) -> Ordering {
    let minimum = [1, 1, 1, 0, 0, 0, 0];
    for i in from..7 {
        let x = a[i].unwrap_or(minimum[i]);
        let y = b[i].unwrap_or(minimum[i]);
        if x != y {
            return x.cmp(&y);
        }
    }
    Ordering::Equal
}

fn duration_between_fields(a: &Fields, b: &Fields, unit: TemporalUnit) -> Option<i64> {
    let needed = unit.precision().index();
    if a[needed].is_none() || b[needed].is_none() {
        return None;
    }
    match unit {
        TemporalUnit::Year => whole_months_between(a, b).map(|m| m / 12),
        TemporalUnit::Month => whole_months_between(a, b),
        _ => {
            let per = unit.fixed_millis()?;
            let diff = to_naive(b)?.signed_duration_since(to_naive(a)?).num_milliseconds();
            Some(diff / per)
        }
    }
}

fn truncate_fields(fields: &Fields, precision: Precision) -> Fields {
    let mut out = *fields;
    for f in out.iter_mut().skip(precision.index() + 1) {
        *f = None;
    }
    out
}

fn difference_between_fields(a: &Fields, b: &Fields, unit: TemporalUnit) -> Option<i64> {
    let precision = unit.precision();
    let needed = precision.index();
    if a[needed].is_none() || b[needed].is_none() {
        return None;
    }
    let (ta, tb) = (truncate_fields(a, precision), truncate_fields(b, precision));
    match unit {
        TemporalUnit::Year => Some(tb[0]? - ta[0]?),
        TemporalUnit::Month => Some((tb[0]? * 12 + tb[1]?) - (ta[0]? * 12 + ta[1]?)),
        _ => {
            let per = unit.fixed_millis()?;
            let diff = to_naive(&tb)?.signed_duration_since(to_naive(&ta)?).num_milliseconds();
            Some(diff.div_euclid(per))
        }
    }
}

/// Parse `YYYY[-MM[-DD]][T[hh[:mm[:ss[.fff]]]][Z|(+|-)hh:mm]]`
///
/// Returns the fields, the offset in minutes and whether a `T` was present.
fn parse_iso(s: &str) -> Option<(Fields, Option<i16>, bool)> {
    let bytes = s.as_bytes();
    let mut pos = 0;
    let mut fields: Fields = [None; 7];

    let digits = |pos: &mut usize, n: usize| -> Option<i64> {
        let end = *pos + n;
        let chunk = s.get(*pos..end)?;
        if !chunk.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        *pos = end;
        chunk.parse().ok()
    };

    fields[0] = Some(digits(&mut pos, 4)?);
    if bytes.get(pos) == Some(&b'-') {
        pos += 1;
        fields[1] = Some(digits(&mut pos, 2)?);
        if bytes.get(pos) == Some(&b'-') {
            pos += 1;
            fields[2] = Some(digits(&mut pos, 2)?);
        }
    }

    let mut has_t = false;
    if bytes.get(pos) == Some(&b'T') {
        has_t = true;
        pos += 1;
        if bytes.get(pos).is_some_and(u8::is_ascii_digit) {
            fields[2]?;
            fields[3] = Some(digits(&mut pos, 2)?);
            if bytes.get(pos) == Some(&b':') {
                pos += 1;
                fields[4] = Some(digits(&mut pos, 2)?);
                if bytes.get(pos) == Some(&b':') {
                    pos += 1;
                    fields[5] = Some(digits(&mut pos, 2)?);
                    if bytes.get(pos) == Some(&b'.') {
                        pos += 1;
                        let start = pos;
                        while bytes.get(pos).is_some_and(u8::is_ascii_digit) {
                            pos += 1;
                        }
                        let frac = s.get(start..pos)?;
                        if frac.is_empty() {
                            return None;
                        }
                        let padded = format!("{:0<3}", &frac[..frac.len().min(3)]);
                        fields[6] = Some(padded.parse().ok()?);
                    }
                }
            }
        }
    }

    let offset = match bytes.get(pos) {
        Some(b'Z') => {
            pos += 1;
            Some(0)
        }
        Some(sign @ (b'+' | b'-')) if has_t => {
            let negative = *sign == b'-';
            pos += 1;
            let hours = digits(&mut pos, 2)?;
            if bytes.get(pos) != Some(&b':') {
                return None;
            }
            pos += 1;
            let minutes = digits(&mut pos, 2)?;
            let total = (hours * 60 + minutes) as i16;
            Some(if negative { -total } else { total })
        }
        _ => None,
    };

    (pos == s.len() && fields_valid(&fields)).then_some((fields, offset, has_t))
}

fn write_fields(f: &mut fmt::Formatter<'_>, fields: &Fields, from: usize) -> fmt::Result {
    let seps = ["", "-", "-", "T", ":", ":", "."];
    let widths = [4, 2, 2, 2, 2, 2, 3];
    for i in from..7 {
        let Some(v) = fields[i] else { break };
        if i != from {
            f.write_str(seps[i])?;
        }
        write!(f, "{:0width$}", v, width = widths[i])?;
    }
    Ok(())
}

/// A calendar date at year, month or day precision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Date {
    pub year: i32,
    pub month: Option<u8>,
    pub day: Option<u8>,
}

impl Date {
    pub const MIN: Date = Date {
        year: 1,
        month: Some(1),
        day: Some(1),
    };
    pub const MAX: Date = Date {
        year: 9999,
        month: Some(12),
        day: Some(31),
    };

    /// Validating constructor
    pub fn new(year: i32, month: Option<u8>, day: Option<u8>) -> Option<Self> {
        let date = Self { year, month, day };
        fields_valid(&date.fields()).then_some(date)
    }

    pub fn ymd(year: i32, month: u8, day: u8) -> Option<Self> {
        Self::new(year, Some(month), Some(day))
    }

    pub fn parse(s: &str) -> Option<Self> {
        let (fields, offset, has_t) = parse_iso(s)?;
        if has_t || offset.is_some() {
            return None;
        }
        Some(Self::from_fields(&fields))
    }

    pub fn precision(&self) -> Precision {
        precision_of(&self.fields())
    }

    pub(crate) fn fields(&self) -> Fields {
        [
            Some(i64::from(self.year)),
            self.month.map(i64::from),
            self.day.map(i64::from),
            None,
            None,
            None,
            None,
        ]
    }

    fn from_fields(fields: &Fields) -> Self {
        Self {
            year: fields[0].unwrap_or(1) as i32,
            month: fields[1].map(|v| v as u8),
            day: fields[2].map(|v| v as u8),
        }
    }

    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        compare_fields(&self.fields(), &other.fields(), 0..3)
    }

    pub fn compare_at(&self, other: &Self, precision: Precision) -> Option<Ordering> {
        if precision > Precision::Day {
            return self.compare(other);
        }
        compare_fields_at(&self.fields(), &other.fields(), 0..precision.index() + 1)
    }

    pub fn add(&self, amount: Decimal, unit: TemporalUnit) -> Option<Self> {
        if !unit.is_calendar() && unit.precision() > Precision::Day && self.precision() == Precision::Day {
            // Sub-day durations cannot move a date
            let (whole, unit) = scale_to_precision(whole_amount(amount, unit)?.0, unit, Precision::Day)?;
            return self.add(Decimal::from(whole), unit);
        }
        add_to_fields(&self.fields(), amount, unit).map(|f| Self::from_fields(&f))
    }

    pub fn duration_between(&self, other: &Self, unit: TemporalUnit) -> Option<i64> {
        duration_between_fields(&self.fields(), &other.fields(), unit)
    }

    pub fn difference_between(&self, other: &Self, unit: TemporalUnit) -> Option<i64> {
        difference_between_fields(&self.fields(), &other.fields(), unit)
    }

    pub fn component(&self, precision: Precision) -> Option<i64> {
        self.fields().get(precision.index()).copied().flatten()
    }

    pub fn truncate(&self, precision: Precision) -> Self {
        Self::from_fields(&truncate_fields(&self.fields(), precision))
    }

    /// A date-time at the same precision with no offset
    pub fn to_datetime(&self) -> DateTime {
        DateTime::from_fields(&self.fields(), None)
    }

    /// One unit of this value's precision later
    pub fn successor(&self) -> Option<Self> {
        self.add(Decimal::ONE, precision_unit(self.precision()))
    }

    pub fn predecessor(&self) -> Option<Self> {
        self.add(Decimal::NEGATIVE_ONE, precision_unit(self.precision()))
    }
}

fn precision_unit(p: Precision) -> TemporalUnit {
    match p {
        Precision::Year => TemporalUnit::Year,
        Precision::Month => TemporalUnit::Month,
        Precision::Day => TemporalUnit::Day,
        Precision::Hour => TemporalUnit::Hour,
        Precision::Minute => TemporalUnit::Minute,
        Precision::Second => TemporalUnit::Second,
        Precision::Millisecond => TemporalUnit::Millisecond,
    }
}

impl fmt::Display for Date {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_fields(f, &self.fields(), 0)
    }
}

/// A date-time at any precision with an optional UTC offset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DateTime {
    pub year: i32,
    pub month: Option<u8>,
    pub day: Option<u8>,
    pub hour: Option<u8>,
    pub minute: Option<u8>,
    pub second: Option<u8>,
    pub millisecond: Option<u16>,
    /// Minutes east of UTC
    pub offset: Option<i16>,
}

impl DateTime {
    pub const MIN: DateTime = DateTime {
        year: 1,
        month: Some(1),
        day: Some(1),
        hour: Some(0),
        minute: Some(0),
        second: Some(0),
        millisecond: Some(0),
        offset: None,
    };
    pub const MAX: DateTime = DateTime {
        year: 9999,
        month: Some(12),
        day: Some(31),
        hour: Some(23),
        minute: Some(59),
        second: Some(59),
        millisecond: Some(999),
        offset: None,
    };

    /// Validating constructor from a component vector (year first)
    pub fn from_parts(parts: &[i64], offset: Option<i16>) -> Option<Self> {
        if parts.is_empty() || parts.len() > 7 {
            return None;
        }
        let mut fields: Fields = [None; 7];
        for (slot, v) in fields.iter_mut().zip(parts) {
            *slot = Some(*v);
        }
        fields_valid(&fields).then(|| Self::from_fields(&fields, offset))
    }

    pub fn parse(s: &str) -> Option<Self> {
        let (fields, offset, _) = parse_iso(s)?;
        Some(Self::from_fields(&fields, offset))
    }

    /// Current wall-clock time with the local offset, to the millisecond
    pub fn now() -> Self {
        let local = chrono::Local::now();
        let offset = (local.offset().local_minus_utc() / 60) as i16;
        let fields = from_naive(&local.naive_local(), Precision::Millisecond);
        Self::from_fields(&fields, Some(offset))
    }

    pub(crate) fn fields(&self) -> Fields {
        [
            Some(i64::from(self.year)),
            self.month.map(i64::from),
            self.day.map(i64::from),
            self.hour.map(i64::from),
            self.minute.map(i64::from),
            self.second.map(i64::from),
            self.millisecond.map(i64::from),
        ]
    }

    pub(crate) fn from_fields(fields: &Fields, offset: Option<i16>) -> Self {
        Self {
            year: fields[0].unwrap_or(1) as i32,
            month: fields[1].map(|v| v as u8),
            day: fields[2].map(|v| v as u8),
            hour: fields[3].map(|v| v as u8),
            minute: fields[4].map(|v| v as u8),
            second: fields[5].map(|v| v as u8),
            millisecond: fields[6].map(|v| v as u16),
            offset,
        }
    }

    pub fn precision(&self) -> Precision {
        precision_of(&self.fields())
    }

    pub fn date(&self) -> Date {
        Date {
            year: self.year,
            month: self.month,
            day: self.day,
        }
    }

    pub fn time(&self) -> Option<Time> {
        Some(Time {
            hour: self.hour?,
            minute: self.minute,
            second: self.second,
            millisecond: self.millisecond,
        })
    }

    /// The same instant expressed at offset zero. Values without an offset or
    /// without an hour component are returned unchanged.
    pub fn to_utc(&self) -> Self {
        let Some(offset) = self.offset else { return *self };
        if offset == 0 || self.hour.is_none() {
            return *self;
        }
        let fields = self.fields();
        match to_naive(&fields)
            .and_then(|dt| dt.checked_sub_signed(Duration::minutes(i64::from(offset))))
        {
            Some(dt) => Self::from_fields(&from_naive(&dt, self.precision()), Some(0)),
            None => *self,
        }
    }

    /// Bring two values onto a common offset when both declare one
    fn aligned(&self, other: &Self) -> (Fields, Fields) {
        match (self.offset, other.offset) {
            (Some(a), Some(b)) if a != b => (self.to_utc().fields(), other.to_utc().fields()),
            _ => (self.fields(), other.fields()),
        }
    }

    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        let (a, b) = self.aligned(other);
        compare_fields(&a, &b, 0..7)
    }

    pub fn compare_at(&self, other: &Self, precision: Precision) -> Option<Ordering> {
        let (a, b) = self.aligned(other);
        compare_fields_at(&a, &b, 0..precision.index() + 1)
    }

    pub fn add(&self, amount: Decimal, unit: TemporalUnit) -> Option<Self> {
        add_to_fields(&self.fields(), amount, unit).map(|f| Self::from_fields(&f, self.offset))
    }

    pub fn duration_between(&self, other: &Self, unit: TemporalUnit) -> Option<i64> {
        let (a, b) = self.aligned(other);
        duration_between_fields(&a, &b, unit)
    }

    pub fn difference_between(&self, other: &Self, unit: TemporalUnit) -> Option<i64> {
        let (a, b) = self.aligned(other);
        difference_between_fields(&a, &b, unit)
    }

    pub fn component(&self, precision: Precision) -> Option<i64> {
        self.fields().get(precision.index()).copied().flatten()
    }

    pub fn truncate(&self, precision: Precision) -> Self {
        Self::from_fields(&truncate_fields(&self.fields(), precision), self.offset)
    }

    pub fn successor(&self) -> Option<Self> {
        self.add(Decimal::ONE, precision_unit(self.precision()))
    }

    pub fn predecessor(&self) -> Option<Self> {
        self.add(Decimal::NEGATIVE_ONE, precision_unit(self.precision()))
    }
}

impl fmt::Display for DateTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let fields = self.fields();
        write_fields(f, &fields, 0)?;
        if self.hour.is_none() {
            f.write_str("T")?;
        }
        if let Some(offset) = self.offset {
            if offset == 0 {
                f.write_str("Z")?;
            } else {
                let sign = if offset < 0 { '-' } else { '+' };
                let abs = offset.unsigned_abs();
                write!(f, "{sign}{:02}:{:02}", abs / 60, abs % 60)?;
            }
        }
        Ok(())
    }
}

/// A time of day at hour precision or finer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Time {
    pub hour: u8,
    pub minute: Option<u8>,
    pub second: Option<u8>,
    pub millisecond: Option<u16>,
}

impl Time {
    pub const MIN: Time = Time {
        hour: 0,
        minute: Some(0),
        second: Some(0),
        millisecond: Some(0),
    };
    pub const MAX: Time = Time {
        hour: 23,
        minute: Some(59),
        second: Some(59),
        millisecond: Some(999),
    };

    pub fn from_parts(parts: &[i64]) -> Option<Self> {
        if parts.is_empty() || parts.len() > 4 {
            return None;
        }
        let mut fields: Fields = [Some(2000), Some(1), Some(1), None, None, None, None];
        for (slot, v) in fields[3..].iter_mut().zip(parts) {
            *slot = Some(*v);
        }
        fields_valid(&fields).then(|| Self::from_fields(&fields))
    }

    /// Accepts `hh[:mm[:ss[.fff]]]`, optionally prefixed with `T`
    pub fn parse(s: &str) -> Option<Self> {
        let s = s.strip_prefix('T').unwrap_or(s);
        let (fields, offset, _) = parse_iso(&format!("2000-01-01T{s}"))?;
        if offset.is_some() {
            return None;
        }
        fields[3]?;
        Some(Self::from_fields(&fields))
    }

    /// Fields anchored on an arbitrary fixed day so time arithmetic can
    /// reuse the date-time machinery
    fn fields(&self) -> Fields {
        [
            Some(2000),
            Some(1),
            Some(1),
            Some(i64::from(self.hour)),
            self.minute.map(i64::from),
            self.second.map(i64::from),
            self.millisecond.map(i64::from),
        ]
    }

    fn from_fields(fields: &Fields) -> Self {
        Self {
            hour: fields[3].unwrap_or(0) as u8,
            minute: fields[4].map(|v| v as u8),
            second: fields[5].map(|v| v as u8),
            millisecond: fields[6].map(|v| v as u16),
        }
    }

    pub fn precision(&self) -> Precision {
        precision_of(&self.fields())
    }

    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        compare_fields(&self.fields(), &other.fields(), 3..7)
    }

    pub fn compare_at(&self, other: &Self, precision: Precision) -> Option<Ordering> {
        if precision < Precision::Hour {
            return Some(Ordering::Equal);
        }
        compare_fields_at(&self.fields(), &other.fields(), 3..precision.index() + 1)
    }

    /// Time arithmetic wraps around midnight
    pub fn add(&self, amount: Decimal, unit: TemporalUnit) -> Option<Self> {
        if unit.precision() < Precision::Hour {
            return None;
        }
        let (whole, unit) = whole_amount(amount, unit)?;
        let (whole, unit) = scale_to_precision(whole, unit, self.precision())?;
        let millis = whole.checked_mul(unit.fixed_millis()?)?.rem_euclid(86_400_000);
        let base = to_naive(&self.fields())?;
        let shifted = base.checked_add_signed(Duration::try_milliseconds(millis)?)?;
        let mut fields = from_naive(&shifted, self.precision());
        fields[0] = Some(2000);
        fields[1] = Some(1);
        fields[2] = Some(1);
        Some(Self::from_fields(&fields))
    }

    pub fn duration_between(&self, other: &Self, unit: TemporalUnit) -> Option<i64> {
        if unit.precision() < Precision::Hour {
            return None;
        }
        duration_between_fields(&self.fields(), &other.fields(), unit)
    }

    pub fn difference_between(&self, other: &Self, unit: TemporalUnit) -> Option<i64> {
        if unit.precision() < Precision::Hour {
            return None;
        }
        difference_between_fields(&self.fields(), &other.fields(), unit)
    }

    pub fn component(&self, precision: Precision) -> Option<i64> {
        if precision < Precision::Hour {
            return None;
        }
        self.fields()[precision.index()]
    }

    pub fn truncate(&self, precision: Precision) -> Self {
        Self::from_fields(&truncate_fields(&self.fields(), precision.max(Precision::Hour)))
    }

    pub fn successor(&self) -> Option<Self> {
        (*self != Self::MAX).then(|| self.add(Decimal::ONE, precision_unit(self.precision()))).flatten()
    }

    pub fn predecessor(&self) -> Option<Self> {
        (*self != Self::MIN).then(|| self.add(Decimal::NEGATIVE_ONE, precision_unit(self.precision()))).flatten()
    }
}

impl fmt::Display for Time {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_fields(f, &self.fields(), 3)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dec(v: i64) -> Decimal {
        Decimal::from(v)
    }

    fn date(s: &str) -> Date {
        Date::parse(s).unwrap()
    }

    fn dt(s: &str) -> DateTime {
        DateTime::parse(s).unwrap()
    }

    #[test]
    fn test_parse_and_display() {
        assert_eq!(date("2024-02-29").to_string(), "2024-02-29");
        assert_eq!(date("2024").precision(), Precision::Year);
        assert!(Date::parse("2023-02-29").is_none());
        assert!(Date::parse("2024-13").is_none());
        assert_eq!(dt("2024-01-15T10:30:00.5Z").millisecond, Some(500));
        assert_eq!(dt("2024-01-15T10:30+05:30").offset, Some(330));
        assert_eq!(dt("2024-01-15T10:30:00.000Z").to_string(), "2024-01-15T10:30:00.000Z");
        assert_eq!(dt("2024-01").to_string(), "2024-01T");
        assert_eq!(Time::parse("T14:30").map(|t| t.to_string()), Some("14:30".to_string()));
    }

    #[test]
    fn test_precision_aware_comparison() {
        assert_eq!(date("2023").compare(&date("2024-01")), Some(Ordering::Less));
        assert_eq!(date("2024").compare(&date("2024-01")), None);
        assert_eq!(date("2024-01").compare(&date("2024-01")), Some(Ordering::Equal));
        assert_eq!(date("2024-02-01").compare(&date("2024-01")), Some(Ordering::Greater));
    }

    #[test]
    fn test_compare_at_precision() {
        let a = dt("2024-01-15T10:00:00");
        let b = dt("2024-01-15T23:59:59");
        assert_eq!(a.compare_at(&b, Precision::Day), Some(Ordering::Equal));
        assert_eq!(a.compare_at(&b, Precision::Hour), Some(Ordering::Less));
        assert_eq!(date("2024-01").compare_at(&date("2024-01-15"), Precision::Day), None);
    }

    #[test]
    fn test_offsets_normalised_before_comparing() {
        let a = dt("2024-01-15T10:00:00+02:00");
        let b = dt("2024-01-15T08:00:00Z");
        assert_eq!(a.compare(&b), Some(Ordering::Equal));
    }

    #[test]
    fn test_calendar_arithmetic_clamps_end_of_month() {
        assert_eq!(date("2024-01-31").add(dec(1), TemporalUnit::Month), Some(date("2024-02-29")));
        assert_eq!(date("2023-01-31").add(dec(1), TemporalUnit::Month), Some(date("2023-02-28")));
        assert_eq!(date("2024-02-29").add(dec(1), TemporalUnit::Year), Some(date("2025-02-28")));
        assert_eq!(date("2024-03-31").add(dec(-1), TemporalUnit::Month), Some(date("2024-02-29")));
    }

    #[test]
    fn test_fixed_arithmetic() {
        assert_eq!(date("2024-02-28").add(dec(2), TemporalUnit::Day), Some(date("2024-03-01")));
        assert_eq!(date("2024-01-01").add(dec(2), TemporalUnit::Week), Some(date("2024-01-15")));
        assert_eq!(
            dt("2024-01-01T23:30:00").add(dec(45), TemporalUnit::Minute),
            Some(dt("2024-01-02T00:15:00"))
        );
        assert_eq!(date("2024-01").add(dec(45), TemporalUnit::Day), Some(date("2024-02")));
        assert_eq!(Time::parse("23:00").and_then(|t| t.add(dec(2), TemporalUnit::Hour)), Time::parse("01:00"));
    }

    #[rstest::rstest]
    #[case(999_999_999_999_999_999, TemporalUnit::Year)]
    #[case(i64::MAX, TemporalUnit::Month)]
    #[case(-i64::MAX, TemporalUnit::Month)]
    #[case(2_000_000_000_000_000_000, TemporalUnit::Week)]
    #[case(i64::MAX, TemporalUnit::Day)]
    fn test_arithmetic_past_the_range_is_empty(#[case] amount: i64, #[case] unit: TemporalUnit) {
        assert_eq!(date("2024-01-01").add(dec(amount), unit), None);
        assert_eq!(dt("2024-01-01T00:00:00").add(dec(amount), unit), None);
    }

    #[test]
    fn test_arithmetic_at_the_calendar_edge() {
        assert_eq!(date("9999-12-31").add(dec(1), TemporalUnit::Day), None);
        assert_eq!(date("0001-01-01").add(dec(-1), TemporalUnit::Month), None);
        assert_eq!(date("9999-12-30").add(dec(1), TemporalUnit::Day), Some(date("9999-12-31")));
    }

    #[test]
    fn test_duration_between() {
        let birth = date("1990-06-15");
        assert_eq!(birth.duration_between(&date("2024-06-14"), TemporalUnit::Year), Some(33));
        assert_eq!(birth.duration_between(&date("2024-06-15"), TemporalUnit::Year), Some(34));
        assert_eq!(date("2024-01-31").duration_between(&date("2024-02-29"), TemporalUnit::Month), Some(0));
        assert_eq!(date("2024-01-01").duration_between(&date("2024-03-01"), TemporalUnit::Day), Some(60));
        assert_eq!(date("2024").duration_between(&date("2024-03-01"), TemporalUnit::Day), None);
    }

    #[test]
    fn test_difference_between_counts_boundaries() {
        let a = dt("2023-12-31T23:59:00");
        let b = dt("2024-01-01T00:01:00");
        assert_eq!(a.difference_between(&b, TemporalUnit::Year), Some(1));
        assert_eq!(a.duration_between(&b, TemporalUnit::Year), Some(0));
        assert_eq!(a.difference_between(&b, TemporalUnit::Day), Some(1));
    }

    #[test]
    fn test_successor_and_predecessor() {
        assert_eq!(date("2024-12-31").successor(), Some(date("2025-01-01")));
        assert_eq!(date("2024-03").predecessor(), Some(date("2024-02")));
        assert_eq!(Time::MAX.successor(), None);
    }
}
