//! Runtime value model for medql
//!
//! - [`Value`]: the tagged union every expression evaluates to
//! - [`temporal`]: partial-precision dates and times with calendar arithmetic
//! - [`quantity`]: quantities and the unit conversion table
//! - [`equality`]: three-valued equality, equivalence and ordering
//! - [`coercion`]: runtime types, type tests and conversions

pub mod coercion;
pub mod equality;
pub mod error;
pub mod quantity;
pub mod temporal;
pub mod value;

pub use coercion::{ValueType, cast, coerce, convert, is_type};
pub use equality::{compare, compare_at, equals, equivalent};
pub use error::{ValueError, ValueResult};
pub use quantity::{Quantity, Ratio};
pub use temporal::{Date, DateTime, Precision, TemporalUnit, Time};
pub use value::{Code, Concept, Interval, Tuple, Value, literal_value};
