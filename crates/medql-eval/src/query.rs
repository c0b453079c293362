//! Query evaluation
//!
//! A query runs over the cartesian product of its sources. Each row binds
//! every alias; `let` clauses extend the row in order, then relationship
//! clauses and `where` filter it, `return` or `aggregate` shape the result
//! and `sort` orders it.
//!
//! A query over a single non-list source yields a single value (or Null)
//! rather than a list.

use crate::context::{EvaluationContext, IterationFrame};
use crate::engine::Engine;
use crate::error::EvalResult;
use crate::operators::{condition, items, list};
use indexmap::IndexMap;
use medql_ast::{Query, RelationshipKind, SortClause, SortDirection};
use medql_types::{Value, compare};
use std::cmp::Ordering;

type Row = IndexMap<String, Value>;

impl Engine {
    pub fn eval_query(&self, query: &Query, ctx: &mut EvaluationContext) -> EvalResult<Value> {
        let (rows, singular) = self.source_rows(query, ctx)?;

        let mut kept: Vec<Row> = Vec::with_capacity(rows.len());
        for row in rows {
            ctx.push_scope();
            let result = self.filter_row(query, row, ctx);
            ctx.pop_scope();
            if let Some(row) = result? {
                kept.push(row);
            }
        }

        if let Some(aggregate) = &query.aggregate_clause {
            if let Some(sort) = &query.sort_clause {
                let keyed = kept.into_iter().map(|row| {
                    let value = row_value(query, &row);
                    (row, value)
                });
                kept = self.sort_results(sort, keyed.collect(), ctx)?.into_iter().map(|(row, _)| row).collect();
            }
            let mut total = match &aggregate.starting {
                Some(start) => self.evaluate(start, ctx)?,
                None => Value::Null,
            };
            let mut seen: Vec<Value> = Vec::new();
            for row in kept {
                if aggregate.distinct {
                    let key = row_value(query, &row);
                    if seen.iter().any(|s| list::same(s, &key)) {
                        continue;
                    }
                    seen.push(key);
                }
                ctx.push_scope();
                bind_row(ctx, &row);
                ctx.bind(aggregate.identifier.clone(), total);
                let result = self.evaluate(&aggregate.expression, ctx);
                ctx.pop_scope();
                total = result?;
            }
            return Ok(total);
        }

        let mut results: Vec<(Row, Value)> = Vec::with_capacity(kept.len());
        for row in kept {
            let value = match &query.return_clause {
                Some(ret) => {
                    ctx.push_scope();
                    bind_row(ctx, &row);
                    let result = self.evaluate(&ret.expression, ctx);
                    ctx.pop_scope();
                    result?
                }
                None => row_value(query, &row),
            };
            results.push((row, value));
        }

        if query.return_clause.as_ref().is_some_and(|r| r.distinct) {
            let mut unique: Vec<(Row, Value)> = Vec::with_capacity(results.len());
            for (row, value) in results {
                if !unique.iter().any(|(_, v)| list::same(v, &value)) {
                    unique.push((row, value));
                }
            }
            results = unique;
        }

        if let Some(sort) = &query.sort_clause {
            results = self.sort_results(sort, results, ctx)?;
        }

        let values: Vec<Value> = results.into_iter().map(|(_, v)| v).collect();
        if singular {
            return Ok(values.into_iter().next().unwrap_or_default());
        }
        Ok(Value::List(values))
    }

    /// Rows of the cartesian product of the sources, and whether the query
    /// has a single non-list source
    fn source_rows(&self, query: &Query, ctx: &mut EvaluationContext) -> EvalResult<(Vec<Row>, bool)> {
        let mut rows: Vec<Row> = vec![Row::new()];
        let mut singular = query.sources.len() == 1;
        for source in &query.sources {
            let value = self.evaluate(&source.expression, ctx)?;
            if !matches!(value, Value::List(_)) {
                singular &= !value.is_null();
            } else {
                singular = false;
            }
            let values = items(value);
            let mut next = Vec::with_capacity(rows.len() * values.len());
            for row in &rows {
                for value in &values {
                    let mut extended = row.clone();
                    extended.insert(source.alias.clone(), value.clone());
                    next.push(extended);
                }
            }
            rows = next;
        }
        Ok((rows, singular))
    }

    /// Apply `let`, `with`/`without` and `where` to one row. The caller
    /// owns the scope the row is bound in.
    fn filter_row(&self, query: &Query, mut row: Row, ctx: &mut EvaluationContext) -> EvalResult<Option<Row>> {
        bind_row(ctx, &row);
        for binding in &query.lets {
            let value = self.evaluate(&binding.expression, ctx)?;
            ctx.bind(binding.identifier.clone(), value.clone());
            row.insert(binding.identifier.clone(), value);
        }

        for relationship in &query.relationships {
            let related = items(self.evaluate(&relationship.source.expression, ctx)?);
            let mut matched = false;
            for candidate in related {
                ctx.push_scope();
                ctx.bind(relationship.source.alias.clone(), candidate);
                let result = self.evaluate(&relationship.such_that, ctx);
                ctx.pop_scope();
                if condition(&result?, "such that")? == Some(true) {
                    matched = true;
                    break;
                }
            }
            let keep = match relationship.kind {
                RelationshipKind::With => matched,
                RelationshipKind::Without => !matched,
            };
            if !keep {
                return Ok(None);
            }
        }

        if let Some(filter) = &query.where_clause {
            let test = self.evaluate(filter, ctx)?;
            if condition(&test, "where")? != Some(true) {
                return Ok(None);
            }
        }
        Ok(Some(row))
    }

    /// Stable sort; Nulls last, incomparable keys keep their order
    fn sort_results(
        &self,
        sort: &SortClause,
        results: Vec<(Row, Value)>,
        ctx: &mut EvaluationContext,
    ) -> EvalResult<Vec<(Row, Value)>> {
        let mut keyed: Vec<(Vec<Value>, (Row, Value))> = Vec::with_capacity(results.len());
        for (row, value) in results {
            let mut keys = Vec::with_capacity(sort.items.len());
            for item in &sort.items {
                let key = match &item.expression {
                    Some(expr) => {
                        ctx.push_scope();
                        bind_row(ctx, &row);
                        ctx.push_frame(IterationFrame::focus(value.clone()));
                        let result = self.evaluate(expr, ctx);
                        ctx.pop_frame();
                        ctx.pop_scope();
                        result?
                    }
                    None => value.clone(),
                };
                keys.push(key);
            }
            keyed.push((keys, (row, value)));
        }

        keyed.sort_by(|(a, _), (b, _)| {
            sort.items
                .iter()
                .zip(a.iter().zip(b))
                .map(|(item, (x, y))| order_keys(x, y, item.direction))
                .find(|ord| *ord != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        Ok(keyed.into_iter().map(|(_, result)| result).collect())
    }
}

/// Nulls go last in either direction
fn order_keys(a: &Value, b: &Value, direction: SortDirection) -> Ordering {
    match (a.is_null(), b.is_null()) {
        (true, true) => Ordering::Equal,
        (true, false) => Ordering::Greater,
        (false, true) => Ordering::Less,
        (false, false) => {
            let ord = compare(a, b).ok().flatten().unwrap_or(Ordering::Equal);
            match direction {
                SortDirection::Ascending => ord,
                SortDirection::Descending => ord.reverse(),
            }
        }
    }
}

fn bind_row(ctx: &mut EvaluationContext, row: &Row) {
    for (name, value) in row {
        ctx.bind(name.clone(), value.clone());
    }
}

/// Default result of a row: the sole source's item, or a tuple of all aliases
fn row_value(query: &Query, row: &Row) -> Value {
    if let [source] = query.sources.as_slice() {
        return row.get(&source.alias).cloned().unwrap_or_default();
    }
    Value::Tuple(
        query
            .sources
            .iter()
            .map(|s| (s.alias.clone(), row.get(&s.alias).cloned().unwrap_or_default()))
            .collect(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    fn eval(source: &str) -> Value {
        Engine::new()
            .evaluate_source(source, &mut EvaluationContext::new())
            .unwrap_or_else(|e| panic!("{source}: {e}"))
    }

    fn ints(values: &[i32]) -> Value {
        Value::List(values.iter().map(|i| Value::Integer(*i)).collect())
    }

    #[test]
    fn test_where_and_return() {
        assert_eq!(eval("({1, 2, 3, 4, 5}) X where X > 2 return X * 2"), ints(&[6, 8, 10]));
    }

    #[test]
    fn test_return_keeps_duplicates() {
        assert_eq!(eval("({1, 2, 3}) X return X div 2"), ints(&[0, 1, 1]));
        assert_eq!(eval("({1, 2, 3}) X return distinct X div 2"), ints(&[0, 1]));
    }

    #[test]
    fn test_sort() {
        assert_eq!(eval("({3, 1, 2}) X sort desc"), ints(&[3, 2, 1]));
        assert_eq!(eval("({3, null, 1}) X sort asc"), Value::List(vec![
            Value::Integer(1),
            Value::Integer(3),
            Value::Null
        ]));
    }

    #[rstest]
    #[case("({3, null, 1}) X sort desc", "{3, 1, null}")]
    #[case("({3, null, 1}) X sort asc", "{1, 3, null}")]
    #[case(
        "({ Tuple { a: 1 }, Tuple { a: null }, Tuple { a: 3 } }) X sort by a desc",
        "{Tuple { a: 3 }, Tuple { a: 1 }, Tuple { a: null }}"
    )]
    #[case(
        "({ Tuple { a: null }, Tuple { a: 2 }, Tuple { a: 1 } }) X sort by a asc",
        "{Tuple { a: 1 }, Tuple { a: 2 }, Tuple { a: null }}"
    )]
    fn test_sort_puts_nulls_last(#[case] source: &str, #[case] expected: &str) {
        assert_eq!(eval(source).to_string(), expected);
    }

    #[test]
    fn test_singular_source() {
        assert_eq!(eval("(5) X return X + 1"), Value::Integer(6));
        assert_eq!(eval("(5) X where X > 10"), Value::Null);
    }

    #[test]
    fn test_aggregate() {
        assert_eq!(eval("({1, 2, 3}) X aggregate A starting 0: A + X"), Value::Integer(6));
        assert_eq!(eval("({1, 1, 2}) X aggregate distinct A starting 0: A + X"), Value::Integer(3));
    }

    #[test]
    fn test_aggregate_folds_in_sort_order() {
        assert_eq!(
            eval("({3, 1, 2}) X aggregate A starting '': A & ToString(X) sort asc"),
            Value::string("123")
        );
        assert_eq!(
            eval("({3, 1, 2}) X aggregate A starting '': A & ToString(X) sort desc"),
            Value::string("321")
        );
        assert_eq!(eval("({3, 1, 2}) X aggregate A starting '': A & ToString(X)"), Value::string("312"));
    }

    #[test]
    fn test_multi_source_and_relationships() {
        let pairs = eval("from ({1, 2}) A, ({10, 20}) B return A + B");
        assert_eq!(pairs, ints(&[11, 21, 12, 22]));
        assert_eq!(eval("({1, 2, 3}) X with ({2, 3}) Y such that X = Y"), ints(&[2, 3]));
        assert_eq!(eval("({1, 2, 3}) X without ({2, 3}) Y such that X = Y"), ints(&[1]));
    }

    #[test]
    fn test_let() {
        assert_eq!(eval("({1, 2}) X let Y: X * 10 return Y + X"), ints(&[11, 22]));
    }
}
