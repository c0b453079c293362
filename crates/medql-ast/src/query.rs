//! Query and retrieve nodes
//!
//! Clause order in source is fixed: sources, `let`, `with`/`without`,
//! `where`, then `return` or `aggregate`, then `sort`.

use crate::{Expression, NamedTypeSpecifier, Spanned};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub sources: Vec<QuerySource>,
    pub lets: Vec<LetClause>,
    pub relationships: Vec<RelationshipClause>,
    pub where_clause: Option<Spanned<Expression>>,
    pub return_clause: Option<ReturnClause>,
    pub aggregate_clause: Option<AggregateClause>,
    pub sort_clause: Option<SortClause>,
}

impl Query {
    /// A query over one aliased source with no clauses
    pub fn single(source: Spanned<Expression>, alias: impl Into<String>) -> Self {
        Self {
            sources: vec![QuerySource {
                expression: source,
                alias: alias.into(),
            }],
            lets: Vec::new(),
            relationships: Vec::new(),
            where_clause: None,
            return_clause: None,
            aggregate_clause: None,
            sort_clause: None,
        }
    }

    pub fn is_single_source(&self) -> bool {
        self.sources.len() == 1
    }

    pub(crate) fn children(&self) -> Vec<&Spanned<Expression>> {
        let mut out: Vec<&Spanned<Expression>> = self.sources.iter().map(|s| &s.expression).collect();
        out.extend(self.lets.iter().map(|l| &l.expression));
        for rel in &self.relationships {
            out.push(&rel.source.expression);
            out.push(&rel.such_that);
        }
        out.extend(self.where_clause.iter());
        if let Some(ret) = &self.return_clause {
            out.push(&ret.expression);
        }
        if let Some(agg) = &self.aggregate_clause {
            out.extend(agg.starting.iter());
            out.push(&agg.expression);
        }
        if let Some(sort) = &self.sort_clause {
            out.extend(sort.items.iter().filter_map(|i| i.expression.as_ref()));
        }
        out
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct QuerySource {
    pub expression: Spanned<Expression>,
    pub alias: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LetClause {
    pub identifier: String,
    pub expression: Spanned<Expression>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum RelationshipKind {
    /// Semi-join
    With,
    /// Anti-join
    Without,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelationshipClause {
    pub kind: RelationshipKind,
    pub source: QuerySource,
    pub such_that: Spanned<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReturnClause {
    pub distinct: bool,
    /// `return all`; same behaviour as the default
    pub all: bool,
    pub expression: Spanned<Expression>,
}

/// `aggregate [distinct] Acc starting <seed>: <expr>`
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateClause {
    pub distinct: bool,
    pub identifier: String,
    pub starting: Option<Spanned<Expression>>,
    pub expression: Spanned<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SortClause {
    pub items: Vec<SortItem>,
}

/// One sort key. Without an expression the result element itself is the key
/// (`sort asc`).
#[derive(Debug, Clone, PartialEq)]
pub struct SortItem {
    pub expression: Option<Spanned<Expression>>,
    pub direction: SortDirection,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum SortDirection {
    #[default]
    Ascending,
    Descending,
}

/// How the codes of a retrieve are matched against `code_path`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodeComparator {
    In,
    Equal,
    Equivalent,
}

impl CodeComparator {
    pub const fn symbol(&self) -> &'static str {
        match self {
            Self::In => "in",
            Self::Equal => "=",
            Self::Equivalent => "~",
        }
    }
}

/// `[Condition: code in "Diabetes"]`
#[derive(Debug, Clone, PartialEq)]
pub struct Retrieve {
    pub data_type: NamedTypeSpecifier,
    pub code_path: Option<String>,
    pub code_comparator: Option<CodeComparator>,
    /// A value set reference, code, concept or list of codes
    pub codes: Option<Spanned<Expression>>,
    pub date_path: Option<String>,
    pub date_range: Option<Spanned<Expression>>,
}

impl Retrieve {
    pub fn of_type(data_type: impl AsRef<str>) -> Self {
        Self {
            data_type: NamedTypeSpecifier::from(data_type.as_ref()),
            code_path: None,
            code_comparator: None,
            codes: None,
            date_path: None,
            date_range: None,
        }
    }
}
