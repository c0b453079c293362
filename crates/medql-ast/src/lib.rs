//! Abstract syntax tree for medql
//!
//! One tree type serves both surface grammars (path expressions and
//! libraries) as well as the JSON interchange format. Nodes are immutable
//! once built and every expression carries the span it was parsed from.

mod expression;
mod library;
mod literal;
mod operator;
mod query;
mod types;

pub use expression::*;
pub use library::*;
pub use literal::*;
pub use operator::*;
pub use query::*;
pub use types::*;

pub use medql_diagnostics::Span;

/// A node with source span information
pub type Spanned<T> = medql_diagnostics::Spanned<T>;

pub type BoxExpr = Box<Spanned<Expression>>;

pub type OptBoxExpr = Option<Box<Spanned<Expression>>>;

/// A plain or delimited (`"quoted"` / `` `backticked` ``) identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Identifier {
    pub name: String,
    pub quoted: bool,
}

impl Identifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quoted: false,
        }
    }

    pub fn quoted(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            quoted: true,
        }
    }
}

impl From<&str> for Identifier {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccessModifier {
    #[default]
    Public,
    Private,
}

/// Walk an expression tree depth-first, parents before children
pub fn walk<'a>(expr: &'a Spanned<Expression>, visit: &mut dyn FnMut(&'a Spanned<Expression>)) {
    visit(expr);
    for child in expr.children() {
        walk(child, visit);
    }
}
