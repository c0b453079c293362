//! Expression nodes

use crate::{
    BinaryOp, BoxExpr, Identifier, IntervalOp, Literal, NamedTypeSpecifier, OptBoxExpr,
    QuantityLiteral, Query, Retrieve, Spanned, TemporalPrecision, TypeSpecifier, UnaryOp,
};

/// Every expression form of both grammars
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),

    // References
    /// Definition, parameter, alias, let, operand, terminology name or,
    /// in path expressions, a property of the focus
    IdentifierRef(Identifier),
    /// `source.name`
    Property(PropertyAccess),
    /// `%resource`, `%context`, `%"name"`
    ExternalConstant(String),
    /// `$this`, `$index`, `$total`
    Iteration(IterationVar),

    // Operators
    BinaryOp(BinaryOpExpr),
    UnaryOp(UnaryOpExpr),
    IntervalOp(IntervalOpExpr),
    /// `X [properly] within 3 days of Y`
    Within(WithinExpr),
    /// `X [properly] between A and B`
    Between(BetweenExpr),

    // Types
    Is(TypeTestExpr),
    As(TypeCastExpr),
    Convert(ConvertExpr),
    MinValue(TypeSpecifier),
    MaxValue(TypeSpecifier),

    // Conditionals
    If(IfExpr),
    Case(CaseExpr),

    // Selectors
    List(ListExpr),
    Tuple(TupleExpr),
    Instance(InstanceExpr),
    Interval(IntervalExpr),
    Code(CodeSelector),
    Concept(ConceptSelector),

    Indexer(IndexerExpr),
    FunctionRef(FunctionRefExpr),

    // Date/time
    DurationBetween(TemporalBetweenExpr),
    DifferenceBetween(TemporalBetweenExpr),
    DateTimeComponent(DateTimeComponentExpr),

    Query(Box<Query>),
    Retrieve(Box<Retrieve>),

    /// Placeholder left behind by error recovery
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IterationVar {
    This,
    Index,
    Total,
}

impl IterationVar {
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::This => "$this",
            Self::Index => "$index",
            Self::Total => "$total",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PropertyAccess {
    pub source: BoxExpr,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOpExpr {
    pub op: BinaryOp,
    pub left: BoxExpr,
    pub right: BoxExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnaryOpExpr {
    pub op: UnaryOp,
    pub operand: BoxExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntervalOpExpr {
    pub op: IntervalOp,
    pub left: BoxExpr,
    pub right: BoxExpr,
    pub precision: Option<TemporalPrecision>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WithinExpr {
    pub left: BoxExpr,
    pub quantity: QuantityLiteral,
    pub right: BoxExpr,
    pub proper: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct BetweenExpr {
    pub operand: BoxExpr,
    pub low: BoxExpr,
    pub high: BoxExpr,
    pub proper: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TypeTestExpr {
    pub operand: BoxExpr,
    pub type_specifier: TypeSpecifier,
}

/// `X as T` (lenient: Null when the runtime type differs) or
/// `cast X as T` (strict: a type error when it differs)
#[derive(Debug, Clone, PartialEq)]
pub struct TypeCastExpr {
    pub operand: BoxExpr,
    pub type_specifier: TypeSpecifier,
    pub strict: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConvertTarget {
    Type(TypeSpecifier),
    /// `convert 5 'mg' to 'g'`
    Unit(String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConvertExpr {
    pub operand: BoxExpr,
    pub target: ConvertTarget,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IfExpr {
    pub condition: BoxExpr,
    pub then_expr: BoxExpr,
    pub else_expr: BoxExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CaseItem {
    pub when: Spanned<Expression>,
    pub then: Spanned<Expression>,
}

/// `case [comparand] when .. then .. else .. end`
#[derive(Debug, Clone, PartialEq)]
pub struct CaseExpr {
    pub comparand: OptBoxExpr,
    pub items: Vec<CaseItem>,
    pub else_expr: BoxExpr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ListExpr {
    pub element_type: Option<TypeSpecifier>,
    pub elements: Vec<Spanned<Expression>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TupleElement {
    pub name: String,
    pub value: Spanned<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TupleExpr {
    pub elements: Vec<TupleElement>,
}

/// `Code { code: '1', system: 'x' }`
#[derive(Debug, Clone, PartialEq)]
pub struct InstanceExpr {
    pub class_type: NamedTypeSpecifier,
    pub elements: Vec<TupleElement>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IntervalExpr {
    pub low: BoxExpr,
    pub high: BoxExpr,
    pub low_closed: bool,
    pub high_closed: bool,
}

/// `Code '8480-6' from "LOINC" display 'Systolic'`
#[derive(Debug, Clone, PartialEq)]
pub struct CodeSelector {
    pub code: String,
    /// Name of a declared code system
    pub system: String,
    pub display: Option<String>,
}

/// `Concept { Code .., "Declared Code" } display '..'`
#[derive(Debug, Clone, PartialEq)]
pub struct ConceptSelector {
    pub codes: Vec<Spanned<Expression>>,
    pub display: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IndexerExpr {
    pub source: BoxExpr,
    pub index: BoxExpr,
}

/// A call. `receiver` is the left side of an invocation (`x.where(..)`,
/// `Lib.Func(..)`), absent for a plain call (`Sum(x)`).
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionRefExpr {
    pub receiver: OptBoxExpr,
    pub name: String,
    pub arguments: Vec<Spanned<Expression>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TemporalBetweenExpr {
    pub precision: TemporalPrecision,
    pub low: BoxExpr,
    pub high: BoxExpr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DateTimeComponent {
    Year,
    Month,
    Day,
    Hour,
    Minute,
    Second,
    Millisecond,
    Date,
    Time,
    TimezoneOffset,
}

impl DateTimeComponent {
    pub fn from_keyword(s: &str) -> Option<Self> {
        Some(match s {
            "year" => Self::Year,
            "month" => Self::Month,
            "day" => Self::Day,
            "hour" => Self::Hour,
            "minute" => Self::Minute,
            "second" => Self::Second,
            "millisecond" => Self::Millisecond,
            "date" => Self::Date,
            "time" => Self::Time,
            "timezoneoffset" => Self::TimezoneOffset,
            _ => return None,
        })
    }

    pub const fn keyword(&self) -> &'static str {
        match self {
            Self::Year => "year",
            Self::Month => "month",
            Self::Day => "day",
            Self::Hour => "hour",
            Self::Minute => "minute",
            Self::Second => "second",
            Self::Millisecond => "millisecond",
            Self::Date => "date",
            Self::Time => "time",
            Self::TimezoneOffset => "timezoneoffset",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct DateTimeComponentExpr {
    pub component: DateTimeComponent,
    pub operand: BoxExpr,
}

impl Expression {
    pub fn boxed(self, span: crate::Span) -> BoxExpr {
        Box::new(Spanned::new(self, span))
    }

    /// Direct sub-expressions in evaluation order
    pub fn children(&self) -> Vec<&Spanned<Expression>> {
        match self {
            Self::Literal(_)
            | Self::IdentifierRef(_)
            | Self::ExternalConstant(_)
            | Self::Iteration(_)
            | Self::MinValue(_)
            | Self::MaxValue(_)
            | Self::Code(_)
            | Self::Error => Vec::new(),
            Self::Property(p) => vec![&*p.source],
            Self::BinaryOp(b) => vec![&*b.left, &*b.right],
            Self::UnaryOp(u) => vec![&*u.operand],
            Self::IntervalOp(i) => vec![&*i.left, &*i.right],
            Self::Within(w) => vec![&*w.left, &*w.right],
            Self::Between(b) => vec![&*b.operand, &*b.low, &*b.high],
            Self::Is(t) => vec![&*t.operand],
            Self::As(t) => vec![&*t.operand],
            Self::Convert(c) => vec![&*c.operand],
            Self::If(i) => vec![&*i.condition, &*i.then_expr, &*i.else_expr],
            Self::Case(c) => {
                let mut out: Vec<&Spanned<Expression>> = c.comparand.iter().map(|b| &**b).collect();
                for item in &c.items {
                    out.push(&item.when);
                    out.push(&item.then);
                }
                out.push(&c.else_expr);
                out
            }
            Self::List(l) => l.elements.iter().collect(),
            Self::Tuple(t) => t.elements.iter().map(|e| &e.value).collect(),
            Self::Instance(i) => i.elements.iter().map(|e| &e.value).collect(),
            Self::Interval(i) => vec![&*i.low, &*i.high],
            Self::Concept(c) => c.codes.iter().collect(),
            Self::Indexer(i) => vec![&*i.source, &*i.index],
            Self::FunctionRef(f) => {
                let mut out: Vec<&Spanned<Expression>> = f.receiver.iter().map(|b| &**b).collect();
                out.extend(f.arguments.iter());
                out
            }
            Self::DurationBetween(d) | Self::DifferenceBetween(d) => vec![&*d.low, &*d.high],
            Self::DateTimeComponent(d) => vec![&*d.operand],
            Self::Query(q) => q.children(),
            Self::Retrieve(r) => r.codes.iter().chain(r.date_range.iter()).collect(),
        }
    }

    /// Constructs that only the library grammar may produce
    pub fn is_library_only(&self) -> bool {
        matches!(
            self,
            Self::Query(_)
                | Self::Retrieve(_)
                | Self::IntervalOp(_)
                | Self::Within(_)
                | Self::Between(_)
                | Self::If(_)
                | Self::Case(_)
                | Self::Interval(_)
                | Self::Instance(_)
                | Self::Tuple(_)
                | Self::Code(_)
                | Self::Concept(_)
                | Self::Convert(_)
                | Self::MinValue(_)
                | Self::MaxValue(_)
                | Self::DurationBetween(_)
                | Self::DifferenceBetween(_)
                | Self::DateTimeComponent(_)
        )
    }

    /// Short human-readable name of the node kind
    pub fn kind_name(&self) -> &'static str {
        match self {
            Self::Literal(_) => "literal",
            Self::IdentifierRef(_) => "identifier",
            Self::Property(_) => "property access",
            Self::ExternalConstant(_) => "external constant",
            Self::Iteration(_) => "iteration variable",
            Self::BinaryOp(_) => "binary operator",
            Self::UnaryOp(_) => "unary operator",
            Self::IntervalOp(_) => "timing phrase",
            Self::Within(_) => "within",
            Self::Between(_) => "between",
            Self::Is(_) => "type test",
            Self::As(_) => "type cast",
            Self::Convert(_) => "convert",
            Self::MinValue(_) => "minimum",
            Self::MaxValue(_) => "maximum",
            Self::If(_) => "if",
            Self::Case(_) => "case",
            Self::List(_) => "list selector",
            Self::Tuple(_) => "tuple selector",
            Self::Instance(_) => "instance selector",
            Self::Interval(_) => "interval selector",
            Self::Code(_) => "code selector",
            Self::Concept(_) => "concept selector",
            Self::Indexer(_) => "indexer",
            Self::FunctionRef(_) => "function call",
            Self::DurationBetween(_) => "duration between",
            Self::DifferenceBetween(_) => "difference between",
            Self::DateTimeComponent(_) => "component extraction",
            Self::Query(_) => "query",
            Self::Retrieve(_) => "retrieve",
            Self::Error => "error",
        }
    }
}
