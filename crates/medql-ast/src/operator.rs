//! Operators with precedence and surface spelling

use serde::{Deserialize, Serialize};

/// Binary operators, grouped by binding strength (weakest first)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    // 1, right-associative
    Implies,

    // 2
    Or,
    Xor,

    // 3
    And,

    // 4
    In,
    Contains,

    // 5
    Equal,
    NotEqual,
    Equivalent,
    NotEquivalent,

    // 6
    Less,
    LessOrEqual,
    Greater,
    GreaterOrEqual,

    // 7
    Union,
    Intersect,
    Except,

    // 8
    Add,
    Subtract,
    Concatenate,

    // 9
    Multiply,
    Divide,
    TruncatedDivide,
    Modulo,

    // 10, right-associative
    Power,
}

impl BinaryOp {
    /// Precedence level, higher binds tighter
    pub const fn precedence(&self) -> u8 {
        match self {
            Self::Implies => 1,
            Self::Or | Self::Xor => 2,
            Self::And => 3,
            Self::In | Self::Contains => 4,
            Self::Equal | Self::NotEqual | Self::Equivalent | Self::NotEquivalent => 5,
            Self::Less | Self::LessOrEqual | Self::Greater | Self::GreaterOrEqual => 6,
            Self::Union | Self::Intersect | Self::Except => 7,
            Self::Add | Self::Subtract | Self::Concatenate => 8,
            Self::Multiply | Self::Divide | Self::TruncatedDivide | Self::Modulo => 9,
            Self::Power => 10,
        }
    }

    pub const fn is_right_associative(&self) -> bool {
        matches!(self, Self::Implies | Self::Power)
    }

    pub const fn is_logical(&self) -> bool {
        matches!(self, Self::And | Self::Or | Self::Xor | Self::Implies)
    }

    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::Implies => "implies",
            Self::Or => "or",
            Self::Xor => "xor",
            Self::And => "and",
            Self::In => "in",
            Self::Contains => "contains",
            Self::Equal => "=",
            Self::NotEqual => "!=",
            Self::Equivalent => "~",
            Self::NotEquivalent => "!~",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::Union => "union",
            Self::Intersect => "intersect",
            Self::Except => "except",
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Concatenate => "&",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::TruncatedDivide => "div",
            Self::Modulo => "mod",
            Self::Power => "^",
        }
    }

    /// Node name used by the interchange format
    pub const fn node_name(&self) -> &'static str {
        match self {
            Self::Implies => "Implies",
            Self::Or => "Or",
            Self::Xor => "Xor",
            Self::And => "And",
            Self::In => "In",
            Self::Contains => "Contains",
            Self::Equal => "Equal",
            Self::NotEqual => "NotEqual",
            Self::Equivalent => "Equivalent",
            Self::NotEquivalent => "NotEquivalent",
            Self::Less => "Less",
            Self::LessOrEqual => "LessOrEqual",
            Self::Greater => "Greater",
            Self::GreaterOrEqual => "GreaterOrEqual",
            Self::Union => "Union",
            Self::Intersect => "Intersect",
            Self::Except => "Except",
            Self::Add => "Add",
            Self::Subtract => "Subtract",
            Self::Concatenate => "Concatenate",
            Self::Multiply => "Multiply",
            Self::Divide => "Divide",
            Self::TruncatedDivide => "TruncatedDivide",
            Self::Modulo => "Modulo",
            Self::Power => "Power",
        }
    }

    pub const ALL: [BinaryOp; 25] = [
        Self::Implies,
        Self::Or,
        Self::Xor,
        Self::And,
        Self::In,
        Self::Contains,
        Self::Equal,
        Self::NotEqual,
        Self::Equivalent,
        Self::NotEquivalent,
        Self::Less,
        Self::LessOrEqual,
        Self::Greater,
        Self::GreaterOrEqual,
        Self::Union,
        Self::Intersect,
        Self::Except,
        Self::Add,
        Self::Subtract,
        Self::Concatenate,
        Self::Multiply,
        Self::Divide,
        Self::TruncatedDivide,
        Self::Modulo,
        Self::Power,
    ];

    pub fn from_node_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.node_name() == name)
    }
}

/// Prefix operators and keyword-phrase operators taking one operand
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum UnaryOp {
    Not,
    Plus,
    Negate,
    Exists,
    Distinct,
    Flatten,
    Collapse,
    Expand,
    SingletonFrom,
    PointFrom,
    Start,
    End,
    Width,
    Size,
    Predecessor,
    Successor,
    IsNull,
    IsTrue,
    IsFalse,
}

impl UnaryOp {
    pub const fn keyword(&self) -> &'static str {
        match self {
            Self::Not => "not",
            Self::Plus => "+",
            Self::Negate => "-",
            Self::Exists => "exists",
            Self::Distinct => "distinct",
            Self::Flatten => "flatten",
            Self::Collapse => "collapse",
            Self::Expand => "expand",
            Self::SingletonFrom => "singleton from",
            Self::PointFrom => "point from",
            Self::Start => "start of",
            Self::End => "end of",
            Self::Width => "width of",
            Self::Size => "size of",
            Self::Predecessor => "predecessor of",
            Self::Successor => "successor of",
            Self::IsNull => "is null",
            Self::IsTrue => "is true",
            Self::IsFalse => "is false",
        }
    }

    pub const fn node_name(&self) -> &'static str {
        match self {
            Self::Not => "Not",
            Self::Plus => "Positive",
            Self::Negate => "Negate",
            Self::Exists => "Exists",
            Self::Distinct => "Distinct",
            Self::Flatten => "Flatten",
            Self::Collapse => "Collapse",
            Self::Expand => "Expand",
            Self::SingletonFrom => "SingletonFrom",
            Self::PointFrom => "PointFrom",
            Self::Start => "Start",
            Self::End => "End",
            Self::Width => "Width",
            Self::Size => "Size",
            Self::Predecessor => "Predecessor",
            Self::Successor => "Successor",
            Self::IsNull => "IsNull",
            Self::IsTrue => "IsTrue",
            Self::IsFalse => "IsFalse",
        }
    }

    pub const ALL: [UnaryOp; 19] = [
        Self::Not,
        Self::Plus,
        Self::Negate,
        Self::Exists,
        Self::Distinct,
        Self::Flatten,
        Self::Collapse,
        Self::Expand,
        Self::SingletonFrom,
        Self::PointFrom,
        Self::Start,
        Self::End,
        Self::Width,
        Self::Size,
        Self::Predecessor,
        Self::Successor,
        Self::IsNull,
        Self::IsTrue,
        Self::IsFalse,
    ];

    pub fn from_node_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.node_name() == name)
    }
}

/// Timing and interval relationship operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IntervalOp {
    SameAs,
    SameOrBefore,
    SameOrAfter,
    Before,
    After,
    Meets,
    MeetsBefore,
    MeetsAfter,
    Overlaps,
    OverlapsBefore,
    OverlapsAfter,
    Starts,
    Ends,
    During,
    Includes,
    ProperlyIncludes,
    IncludedIn,
    ProperlyIncludedIn,
}

impl IntervalOp {
    pub const fn keyword(&self) -> &'static str {
        match self {
            Self::SameAs => "same as",
            Self::SameOrBefore => "same or before",
            Self::SameOrAfter => "same or after",
            Self::Before => "before",
            Self::After => "after",
            Self::Meets => "meets",
            Self::MeetsBefore => "meets before",
            Self::MeetsAfter => "meets after",
            Self::Overlaps => "overlaps",
            Self::OverlapsBefore => "overlaps before",
            Self::OverlapsAfter => "overlaps after",
            Self::Starts => "starts",
            Self::Ends => "ends",
            Self::During => "during",
            Self::Includes => "includes",
            Self::ProperlyIncludes => "properly includes",
            Self::IncludedIn => "included in",
            Self::ProperlyIncludedIn => "properly included in",
        }
    }

    pub const fn node_name(&self) -> &'static str {
        match self {
            Self::SameAs => "SameAs",
            Self::SameOrBefore => "SameOrBefore",
            Self::SameOrAfter => "SameOrAfter",
            Self::Before => "Before",
            Self::After => "After",
            Self::Meets => "Meets",
            Self::MeetsBefore => "MeetsBefore",
            Self::MeetsAfter => "MeetsAfter",
            Self::Overlaps => "Overlaps",
            Self::OverlapsBefore => "OverlapsBefore",
            Self::OverlapsAfter => "OverlapsAfter",
            Self::Starts => "Starts",
            Self::Ends => "Ends",
            Self::During => "During",
            Self::Includes => "Includes",
            Self::ProperlyIncludes => "ProperIncludes",
            Self::IncludedIn => "IncludedIn",
            Self::ProperlyIncludedIn => "ProperIncludedIn",
        }
    }

    pub const ALL: [IntervalOp; 18] = [
        Self::SameAs,
        Self::SameOrBefore,
        Self::SameOrAfter,
        Self::Before,
        Self::After,
        Self::Meets,
        Self::MeetsBefore,
        Self::MeetsAfter,
        Self::Overlaps,
        Self::OverlapsBefore,
        Self::OverlapsAfter,
        Self::Starts,
        Self::Ends,
        Self::During,
        Self::Includes,
        Self::ProperlyIncludes,
        Self::IncludedIn,
        Self::ProperlyIncludedIn,
    ];

    pub fn from_node_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|op| op.node_name() == name)
    }
}

/// Date/time precision named in timing phrases, component extraction and
/// duration calculations
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum TemporalPrecision {
    Year,
    Month,
    Week,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
}

impl TemporalPrecision {
    /// Accepts singular and plural spellings
    pub fn from_keyword(s: &str) -> Option<Self> {
        match s {
            "year" | "years" => Some(Self::Year),
            "month" | "months" => Some(Self::Month),
            "week" | "weeks" => Some(Self::Week),
            "day" | "days" => Some(Self::Day),
            "hour" | "hours" => Some(Self::Hour),
            "minute" | "minutes" => Some(Self::Minute),
            "second" | "seconds" => Some(Self::Second),
            "millisecond" | "milliseconds" => Some(Self::Millisecond),
            _ => None,
        }
    }

    pub const fn keyword(&self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Month => "month",
            Self::Week => "week",
            Self::Day => "day",
            Self::Hour => "hour",
            Self::Minute => "minute",
            Self::Second => "second",
            Self::Millisecond => "millisecond",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_precedence_order() {
        assert!(BinaryOp::Power.precedence() > BinaryOp::Multiply.precedence());
        assert!(BinaryOp::Multiply.precedence() > BinaryOp::Add.precedence());
        assert!(BinaryOp::Union.precedence() > BinaryOp::Less.precedence());
        assert!(BinaryOp::Less.precedence() > BinaryOp::Equal.precedence());
        assert!(BinaryOp::And.precedence() > BinaryOp::Or.precedence());
        assert!(BinaryOp::Or.precedence() > BinaryOp::Implies.precedence());
    }

    #[test]
    fn test_node_names_round_trip() {
        for op in BinaryOp::ALL {
            assert_eq!(BinaryOp::from_node_name(op.node_name()), Some(op));
        }
        for op in UnaryOp::ALL {
            assert_eq!(UnaryOp::from_node_name(op.node_name()), Some(op));
        }
        for op in IntervalOp::ALL {
            assert_eq!(IntervalOp::from_node_name(op.node_name()), Some(op));
        }
    }

    #[test]
    fn test_precision_keywords() {
        assert_eq!(TemporalPrecision::from_keyword("days"), Some(TemporalPrecision::Day));
        assert_eq!(TemporalPrecision::from_keyword("fortnight"), None);
    }
}
