//! Expression grammar
//!
//! Recursive descent with one function per precedence level, loosest first:
//!
//! | Level | Operators |
//! |-------|-----------|
//! | implies | `implies` (right-associative) |
//! | or | `or`, `xor` |
//! | and | `and` |
//! | membership | `in`, `contains` |
//! | equality | `=`, `!=`, `~`, `!~` |
//! | interval operator | timing phrases, `within`, `between` |
//! | relational | `<`, `<=`, `>`, `>=` |
//! | union | `\|`, `union`, `intersect`, `except` |
//! | type | `is`, `as`, `is null` |
//! | additive | `+`, `-`, `&` |
//! | multiplicative | `*`, `/`, `div`, `mod` |
//! | power | `^` (right-associative) |
//! | unary | `-`, `+`, and in libraries the keyword prefixes |
//! | postfix | `.member`, `.call()`, `[index]` |
//!
//! A leading `-` is always unary; a `-` after a complete operand is always
//! the binary operator.

use crate::lexer::TokenKind;
use crate::parser::{Parsed, Parser, is_hard_keyword};
use medql_ast::{
    BetweenExpr, BinaryOp, BinaryOpExpr, CaseExpr, CaseItem, CodeSelector, ConceptSelector, ConvertExpr, ConvertTarget,
    DateTimeComponent, DateTimeComponentExpr, Expression, FunctionRefExpr, IfExpr, IndexerExpr, InstanceExpr,
    IntervalExpr, IntervalOp, IntervalOpExpr, IterationVar, LetClause, ListExpr, Literal, NamedTypeSpecifier,
    PropertyAccess, QuantityLiteral, Query, QuerySource, RatioLiteral, RelationshipClause, RelationshipKind, Retrieve,
    ReturnClause, AggregateClause, CodeComparator, SortClause, SortDirection, SortItem, Spanned, TemporalBetweenExpr,
    TemporalPrecision, TupleElement, TupleElementType, TupleExpr, TypeCastExpr, TypeSpecifier, TypeTestExpr, UnaryOp,
    UnaryOpExpr, WithinExpr,
};
use medql_diagnostics::{MQL0004, MQL0009, MQL0010, MQL0011, MQL0013, Span};
use rust_decimal::Decimal;
use std::str::FromStr;

type Expr = Spanned<Expression>;

const CLAUSE_KEYWORDS: [&str; 7] = ["let", "with", "without", "where", "return", "aggregate", "sort"];

/// Words that may follow `starts`/`ends`/`occurs` to begin a timing phrase
const TIMING_WORDS: [&str; 11] = [
    "same", "before", "after", "on", "during", "within", "properly", "meets", "overlaps", "includes", "included",
];

fn binary(op: BinaryOp, left: Expr, right: Expr, span: Span) -> Expr {
    Spanned::new(
        Expression::BinaryOp(BinaryOpExpr {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }),
        span,
    )
}

fn unary(op: UnaryOp, operand: Expr, span: Span) -> Expr {
    Spanned::new(
        Expression::UnaryOp(UnaryOpExpr {
            op,
            operand: Box::new(operand),
        }),
        span,
    )
}

/// `-` applied to a numeric literal folds into the literal
fn negate(operand: Expr, span: Span) -> Expr {
    let folded = match &operand.inner {
        Expression::Literal(Literal::Integer(i)) => i.checked_neg().map(Literal::Integer),
        Expression::Literal(Literal::Long(l)) => l.checked_neg().map(Literal::Long),
        Expression::Literal(Literal::Decimal(d)) => Some(Literal::Decimal(-*d)),
        Expression::Literal(Literal::Quantity(q)) => Some(Literal::Quantity(QuantityLiteral {
            value: -q.value,
            unit: q.unit.clone(),
        })),
        _ => None,
    };
    match folded {
        Some(lit) => Spanned::new(Expression::Literal(lit), span),
        None => unary(UnaryOp::Negate, operand, span),
    }
}

fn precision_keyword(word: Option<&str>) -> Option<TemporalPrecision> {
    word.and_then(TemporalPrecision::from_keyword)
}

/// What a `{` opens
enum Brace {
    Any,
    Tuple,
    List(Option<TypeSpecifier>),
}

/// A parsed timing phrase awaiting its right operand
enum Timing {
    Relation(IntervalOp, Option<TemporalPrecision>),
    Within(QuantityLiteral, bool),
    Between(bool),
}

impl Parser<'_> {
    /// Entry point for a full expression. In the library grammar this is
    /// also where queries start.
    pub(crate) fn expression(&mut self) -> Parsed<Expr> {
        self.enter()?;
        let result = if self.is_library() {
            self.query_or_expression()
        } else {
            self.implies_expression()
        };
        self.leave();
        result
    }

    fn query_or_expression(&mut self) -> Parsed<Expr> {
        let start = self.start();
        if self.eat_keyword("from") {
            let mut sources = vec![self.aliased_source()?];
            while self.eat_symbol(",") {
                sources.push(self.aliased_source()?);
            }
            return self.query_expression(start, sources);
        }
        match self.source_extent() {
            Some(n) if self.alias_at(n) => {
                let source = self.aliased_source()?;
                self.query_expression(start, vec![source])
            }
            _ => self.implies_expression(),
        }
    }

    /// Number of tokens making up a query source at the cursor: a bracketed
    /// group or a qualified identifier
    fn source_extent(&self) -> Option<usize> {
        match self.kind() {
            TokenKind::Symbol(open @ ("[" | "(" | "{")) => {
                let close = match *open {
                    "[" => "]",
                    "(" => ")",
                    _ => "}",
                };
                let mut depth = 0usize;
                let mut n = 0;
                loop {
                    match &self.peek_at(n).kind {
                        TokenKind::Eof => return None,
                        TokenKind::Symbol(s) if s == open => depth += 1,
                        TokenKind::Symbol(s) if *s == close => {
                            depth -= 1;
                            if depth == 0 {
                                return Some(n + 1);
                            }
                        }
                        _ => {}
                    }
                    n += 1;
                }
            }
            TokenKind::Ident(word) if is_hard_keyword(word) => None,
            TokenKind::Ident(_) | TokenKind::QuotedIdent(_) => {
                let mut n = 1;
                while self.symbol_at(n, ".")
                    && matches!(self.peek_at(n + 1).kind, TokenKind::Ident(_) | TokenKind::QuotedIdent(_))
                {
                    n += 2;
                }
                Some(n)
            }
            _ => None,
        }
    }

    fn query_source(&mut self) -> Parsed<Expr> {
        let start = self.start();
        match self.kind() {
            TokenKind::Symbol("[" | "(" | "{") => self.atom(),
            TokenKind::Ident(_) | TokenKind::QuotedIdent(_) => {
                let id = self.identifier()?;
                let mut expr = Spanned::new(Expression::IdentifierRef(id), self.span_from(start));
                while self.at_symbol(".")
                    && matches!(self.peek_at(1).kind, TokenKind::Ident(_) | TokenKind::QuotedIdent(_))
                {
                    self.bump();
                    let name = self.name()?;
                    expr = Spanned::new(
                        Expression::Property(PropertyAccess {
                            source: Box::new(expr),
                            name,
                        }),
                        self.span_from(start),
                    );
                }
                Ok(expr)
            }
            _ => Err(self.unexpected(MQL0013, "a query source")),
        }
    }

    fn aliased_source(&mut self) -> Parsed<QuerySource> {
        let expression = self.query_source()?;
        if !self.alias_at(0) {
            return Err(self.unexpected(MQL0013, "a query alias"));
        }
        let alias = self.name()?;
        Ok(QuerySource { expression, alias })
    }

    /// Clauses after the sources, in their fixed order
    fn query_expression(&mut self, start: usize, sources: Vec<QuerySource>) -> Parsed<Expr> {
        let mut query = Query {
            sources,
            lets: Vec::new(),
            relationships: Vec::new(),
            where_clause: None,
            return_clause: None,
            aggregate_clause: None,
            sort_clause: None,
        };

        if self.eat_keyword("let") {
            loop {
                let identifier = self.name()?;
                self.expect_symbol(":")?;
                let expression = self.expression()?;
                query.lets.push(LetClause { identifier, expression });
                if !self.eat_symbol(",") {
                    break;
                }
            }
        }

        while self.at_keyword("with") || self.at_keyword("without") {
            let kind = if self.eat_keyword("with") {
                RelationshipKind::With
            } else {
                self.bump();
                RelationshipKind::Without
            };
            let source = self.aliased_source()?;
            self.expect_keyword("such")?;
            self.expect_keyword("that")?;
            let such_that = self.expression()?;
            query.relationships.push(RelationshipClause { kind, source, such_that });
        }

        if self.eat_keyword("where") {
            query.where_clause = Some(self.expression()?);
        }

        if self.eat_keyword("return") {
            let distinct = self.eat_keyword("distinct");
            let all = !distinct && self.eat_keyword("all");
            let expression = self.expression()?;
            query.return_clause = Some(ReturnClause {
                distinct,
                all,
                expression,
            });
        } else if self.eat_keyword("aggregate") {
            let distinct = self.eat_keyword("distinct");
            if !distinct {
                self.eat_keyword("all");
            }
            let identifier = self.name()?;
            let starting = if self.eat_keyword("starting") {
                let saved = std::mem::replace(&mut self.ratios, false);
                let seed = self.type_expression();
                self.ratios = saved;
                Some(seed?)
            } else {
                None
            };
            self.expect_symbol(":")?;
            let expression = self.expression()?;
            query.aggregate_clause = Some(AggregateClause {
                distinct,
                identifier,
                starting,
                expression,
            });
        }

        if self.eat_keyword("sort") {
            query.sort_clause = Some(self.sort_clause()?);
        }

        if let Some(word) = self.word().filter(|w| CLAUSE_KEYWORDS.contains(w)) {
            let message = format!("'{word}' clause is out of order; clauses run let, with/without, where, return/aggregate, sort");
            return Err(self.error_at(MQL0013, message, self.peek().span));
        }

        Ok(Spanned::new(Expression::Query(Box::new(query)), self.span_from(start)))
    }

    fn sort_direction(&mut self) -> Option<SortDirection> {
        let direction = match self.word()? {
            "asc" | "ascending" => SortDirection::Ascending,
            "desc" | "descending" => SortDirection::Descending,
            _ => return None,
        };
        self.bump();
        Some(direction)
    }

    fn sort_clause(&mut self) -> Parsed<SortClause> {
        if let Some(direction) = self.sort_direction() {
            return Ok(SortClause {
                items: vec![SortItem {
                    expression: None,
                    direction,
                }],
            });
        }
        self.expect_keyword("by")?;
        let mut items = Vec::new();
        loop {
            let expression = self.expression()?;
            let direction = self.sort_direction().unwrap_or_default();
            items.push(SortItem {
                expression: Some(expression),
                direction,
            });
            if !self.eat_symbol(",") {
                break;
            }
        }
        Ok(SortClause { items })
    }

    fn implies_expression(&mut self) -> Parsed<Expr> {
        let start = self.start();
        let left = self.or_expression()?;
        if self.eat_keyword("implies") {
            self.enter()?;
            let right = self.implies_expression();
            self.leave();
            return Ok(binary(BinaryOp::Implies, left, right?, self.span_from(start)));
        }
        Ok(left)
    }

    fn or_expression(&mut self) -> Parsed<Expr> {
        let start = self.start();
        let mut left = self.and_expression()?;
        loop {
            let op = match self.word() {
                Some("or") => BinaryOp::Or,
                Some("xor") => BinaryOp::Xor,
                _ => break,
            };
            self.bump();
            let right = self.and_expression()?;
            left = binary(op, left, right, self.span_from(start));
        }
        Ok(left)
    }

    fn and_expression(&mut self) -> Parsed<Expr> {
        let start = self.start();
        let mut left = self.membership_expression()?;
        while self.eat_keyword("and") {
            let right = self.membership_expression()?;
            left = binary(BinaryOp::And, left, right, self.span_from(start));
        }
        Ok(left)
    }

    /// `in` and `contains`; with a precision (`in day of`) they become the
    /// point/interval timing relations
    fn membership_expression(&mut self) -> Parsed<Expr> {
        let start = self.start();
        let mut left = self.equality_expression()?;
        loop {
            let (op, timed) = match self.word() {
                Some("in") => (BinaryOp::In, IntervalOp::During),
                Some("contains") => (BinaryOp::Contains, IntervalOp::Includes),
                _ => break,
            };
            self.bump();
            let precision = self.precision_of();
            let right = self.equality_expression()?;
            let span = self.span_from(start);
            left = match precision {
                Some(precision) => Spanned::new(
                    Expression::IntervalOp(IntervalOpExpr {
                        op: timed,
                        left: Box::new(left),
                        right: Box::new(right),
                        precision: Some(precision),
                    }),
                    span,
                ),
                None => binary(op, left, right, span),
            };
        }
        Ok(left)
    }

    fn equality_expression(&mut self) -> Parsed<Expr> {
        let start = self.start();
        let mut left = self.interval_operator_expression()?;
        loop {
            let op = match self.kind() {
                TokenKind::Symbol("=") => BinaryOp::Equal,
                TokenKind::Symbol("!=") => BinaryOp::NotEqual,
                TokenKind::Symbol("~") => BinaryOp::Equivalent,
                TokenKind::Symbol("!~") => BinaryOp::NotEquivalent,
                _ => break,
            };
            self.bump();
            let right = self.interval_operator_expression()?;
            left = binary(op, left, right, self.span_from(start));
        }
        Ok(left)
    }

    fn interval_operator_expression(&mut self) -> Parsed<Expr> {
        let start = self.start();
        let mut left = self.relational_expression()?;
        while let Some((boundary, timing)) = self.timing_phrase()? {
            if let Some(op) = boundary {
                let span = left.span;
                left = unary(op, left, span);
            }
            let node = match timing {
                Timing::Relation(op, precision) => {
                    let right = self.relational_expression()?;
                    Expression::IntervalOp(IntervalOpExpr {
                        op,
                        left: Box::new(left),
                        right: Box::new(right),
                        precision,
                    })
                }
                Timing::Within(quantity, proper) => {
                    let right = self.relational_expression()?;
                    Expression::Within(WithinExpr {
                        left: Box::new(left),
                        quantity,
                        right: Box::new(right),
                        proper,
                    })
                }
                Timing::Between(proper) => {
                    let low = self.type_expression()?;
                    self.expect_keyword("and")?;
                    let high = self.type_expression()?;
                    Expression::Between(BetweenExpr {
                        operand: Box::new(left),
                        low: Box::new(low),
                        high: Box::new(high),
                        proper,
                    })
                }
            };
            left = Spanned::new(node, self.span_from(start));
        }
        Ok(left)
    }

    /// `<precision> of`, consumed only when both words are present
    fn precision_of(&mut self) -> Option<TemporalPrecision> {
        let precision = precision_keyword(self.word())?;
        if !self.keyword_at(1, "of") {
            return None;
        }
        self.bump();
        self.bump();
        Some(precision)
    }

    /// Recognise a timing phrase at the cursor. Nothing is consumed when the
    /// cursor is not at one.
    fn timing_phrase(&mut self) -> Parsed<Option<(Option<UnaryOp>, Timing)>> {
        let Some(first) = self.word() else { return Ok(None) };
        let mut boundary = None;
        let mut committed = false;
        if matches!(first, "starts" | "ends" | "occurs") && self.word_at(1).is_some_and(|w| TIMING_WORDS.contains(&w)) {
            boundary = match first {
                "starts" => Some(UnaryOp::Start),
                "ends" => Some(UnaryOp::End),
                _ => None,
            };
            self.bump();
            committed = true;
        }
        let proper = self.eat_keyword("properly");
        committed |= proper;

        let Some(word) = self.word().map(str::to_string) else {
            return if committed { Err(self.unexpected(MQL0009, "a timing phrase")) } else { Ok(None) };
        };
        let timing = match word.as_str() {
            "same" => {
                self.bump();
                let precision = precision_keyword(self.word());
                if precision.is_some() {
                    self.bump();
                }
                let op = if self.eat_keyword("as") {
                    IntervalOp::SameAs
                } else {
                    self.expect_keyword("or")?;
                    if self.eat_keyword("before") {
                        IntervalOp::SameOrBefore
                    } else {
                        self.expect_keyword("after")?;
                        IntervalOp::SameOrAfter
                    }
                };
                Timing::Relation(op, precision)
            }
            "on" if self.keyword_at(1, "or") => {
                self.bump();
                self.bump();
                let op = if self.eat_keyword("before") {
                    IntervalOp::SameOrBefore
                } else {
                    self.expect_keyword("after")?;
                    IntervalOp::SameOrAfter
                };
                Timing::Relation(op, self.precision_of())
            }
            "before" | "after" => {
                self.bump();
                let before = word == "before";
                let op = if self.at_keywords(&["or", "on"]) {
                    self.bump();
                    self.bump();
                    if before { IntervalOp::SameOrBefore } else { IntervalOp::SameOrAfter }
                } else if before {
                    IntervalOp::Before
                } else {
                    IntervalOp::After
                };
                Timing::Relation(op, self.precision_of())
            }
            "meets" | "overlaps" => {
                self.bump();
                let meets = word == "meets";
                let op = match (meets, self.word()) {
                    (true, Some("before")) => Some(IntervalOp::MeetsBefore),
                    (true, Some("after")) => Some(IntervalOp::MeetsAfter),
                    (false, Some("before")) => Some(IntervalOp::OverlapsBefore),
                    (false, Some("after")) => Some(IntervalOp::OverlapsAfter),
                    _ => None,
                };
                let op = match op {
                    Some(op) => {
                        self.bump();
                        op
                    }
                    None if meets => IntervalOp::Meets,
                    None => IntervalOp::Overlaps,
                };
                Timing::Relation(op, self.precision_of())
            }
            "starts" => {
                self.bump();
                Timing::Relation(IntervalOp::Starts, self.precision_of())
            }
            "ends" => {
                self.bump();
                Timing::Relation(IntervalOp::Ends, self.precision_of())
            }
            "during" => {
                self.bump();
                let op = if proper { IntervalOp::ProperlyIncludedIn } else { IntervalOp::During };
                Timing::Relation(op, self.precision_of())
            }
            "includes" => {
                self.bump();
                let op = if proper { IntervalOp::ProperlyIncludes } else { IntervalOp::Includes };
                Timing::Relation(op, self.precision_of())
            }
            "included" if self.keyword_at(1, "in") => {
                self.bump();
                self.bump();
                let op = if proper { IntervalOp::ProperlyIncludedIn } else { IntervalOp::IncludedIn };
                Timing::Relation(op, self.precision_of())
            }
            "within" => {
                self.bump();
                let quantity = self.quantity_literal()?;
                self.expect_keyword("of")?;
                Timing::Within(quantity, proper)
            }
            "between" => {
                self.bump();
                Timing::Between(proper)
            }
            _ if committed => return Err(self.unexpected(MQL0009, "a timing phrase")),
            _ => return Ok(None),
        };
        Ok(Some((boundary, timing)))
    }

    fn relational_expression(&mut self) -> Parsed<Expr> {
        let start = self.start();
        let mut left = self.union_expression()?;
        loop {
            let op = match self.kind() {
                TokenKind::Symbol("<") => BinaryOp::Less,
                TokenKind::Symbol("<=") => BinaryOp::LessOrEqual,
                TokenKind::Symbol(">") => BinaryOp::Greater,
                TokenKind::Symbol(">=") => BinaryOp::GreaterOrEqual,
                _ => break,
            };
            self.bump();
            let right = self.union_expression()?;
            left = binary(op, left, right, self.span_from(start));
        }
        Ok(left)
    }

    fn union_expression(&mut self) -> Parsed<Expr> {
        let start = self.start();
        let mut left = self.type_expression()?;
        loop {
            let op = match self.kind() {
                TokenKind::Symbol("|") => BinaryOp::Union,
                TokenKind::Ident(w) if w == "union" => BinaryOp::Union,
                TokenKind::Ident(w) if w == "intersect" => BinaryOp::Intersect,
                TokenKind::Ident(w) if w == "except" => BinaryOp::Except,
                _ => break,
            };
            self.bump();
            let right = self.type_expression()?;
            left = binary(op, left, right, self.span_from(start));
        }
        Ok(left)
    }

    /// `is T`, `as T`, `is [not] null`, `is true`, `is false`
    fn type_expression(&mut self) -> Parsed<Expr> {
        let start = self.start();
        let mut expr = self.additive_expression()?;
        loop {
            if self.eat_keyword("is") {
                let negated = self.at_keywords(&["not", "null"]);
                if negated {
                    self.bump();
                }
                let test = match self.word() {
                    Some("null") => Some(UnaryOp::IsNull),
                    Some("true") if !negated => Some(UnaryOp::IsTrue),
                    Some("false") if !negated => Some(UnaryOp::IsFalse),
                    _ => None,
                };
                expr = match test {
                    Some(op) => {
                        self.bump();
                        let span = self.span_from(start);
                        let test = unary(op, expr, span);
                        if negated { unary(UnaryOp::Not, test, span) } else { test }
                    }
                    None => {
                        let type_specifier = self.type_specifier()?;
                        Spanned::new(
                            Expression::Is(TypeTestExpr {
                                operand: Box::new(expr),
                                type_specifier,
                            }),
                            self.span_from(start),
                        )
                    }
                };
            } else if self.eat_keyword("as") {
                let type_specifier = self.type_specifier()?;
                expr = Spanned::new(
                    Expression::As(TypeCastExpr {
                        operand: Box::new(expr),
                        type_specifier,
                        strict: false,
                    }),
                    self.span_from(start),
                );
            } else {
                return Ok(expr);
            }
        }
    }

    fn additive_expression(&mut self) -> Parsed<Expr> {
        let start = self.start();
        let mut left = self.multiplicative_expression()?;
        loop {
            let op = match self.kind() {
                TokenKind::Symbol("+") => BinaryOp::Add,
                TokenKind::Symbol("-") => BinaryOp::Subtract,
                TokenKind::Symbol("&") => BinaryOp::Concatenate,
                _ => break,
            };
            self.bump();
            let right = self.multiplicative_expression()?;
            left = binary(op, left, right, self.span_from(start));
        }
        Ok(left)
    }

    fn multiplicative_expression(&mut self) -> Parsed<Expr> {
        let start = self.start();
        let mut left = self.power_expression()?;
        loop {
            let op = match self.kind() {
                TokenKind::Symbol("*") => BinaryOp::Multiply,
                TokenKind::Symbol("/") => BinaryOp::Divide,
                TokenKind::Ident(w) if w == "div" => BinaryOp::TruncatedDivide,
                TokenKind::Ident(w) if w == "mod" => BinaryOp::Modulo,
                _ => break,
            };
            self.bump();
            let right = self.power_expression()?;
            left = binary(op, left, right, self.span_from(start));
        }
        Ok(left)
    }

    fn power_expression(&mut self) -> Parsed<Expr> {
        let start = self.start();
        let base = self.unary_expression()?;
        if self.eat_symbol("^") {
            self.enter()?;
            let exponent = self.power_expression();
            self.leave();
            return Ok(binary(BinaryOp::Power, base, exponent?, self.span_from(start)));
        }
        Ok(base)
    }

    /// Parse a prefix operand one level deeper
    fn operand(&mut self) -> Parsed<Expr> {
        self.enter()?;
        let operand = self.unary_expression();
        self.leave();
        operand
    }

    fn unary_expression(&mut self) -> Parsed<Expr> {
        let start = self.start();
        if self.at_symbol("-") || self.at_symbol("+") {
            let minus = self.at_symbol("-");
            self.bump();
            if minus {
                if let Some(literal) = self.negative_literal(start)? {
                    return Ok(literal);
                }
            }
            let operand = self.operand()?;
            let span = self.span_from(start);
            return Ok(if minus {
                negate(operand, span)
            } else {
                unary(UnaryOp::Plus, operand, span)
            });
        }
        if self.is_library() {
            if let Some(expr) = self.prefix_expression(start)? {
                return Ok(expr);
            }
        }
        self.postfix_expression()
    }

    /// A bare integer or long after `-` is read as one negative literal, so
    /// the most negative values of each type can be written
    fn negative_literal(&mut self, start: usize) -> Parsed<Option<Expr>> {
        let (digits, long) = match &self.peek().kind {
            TokenKind::Number(text) if !text.contains('.') => (text.clone(), false),
            TokenKind::Long(text) => (text.clone(), true),
            _ => return Ok(None),
        };
        let continues = match &self.peek_at(1).kind {
            TokenKind::Symbol(s) => matches!(*s, "." | "[" | ":"),
            TokenKind::Str(_) => true,
            TokenKind::Ident(w) => TemporalPrecision::from_keyword(w).is_some(),
            _ => false,
        };
        if continues {
            return Ok(None);
        }
        self.bump();
        let span = self.span_from(start);
        let text = format!("-{digits}");
        let lit = if long {
            Literal::Long(text.parse::<i64>().map_err(|_| {
                self.error_at(MQL0004, format!("long literal {text}L is out of range"), span)
            })?)
        } else {
            Literal::Integer(text.parse::<i32>().map_err(|_| {
                self.error_at(MQL0004, format!("integer literal {text} is out of range"), span)
            })?)
        };
        Ok(Some(Spanned::new(Expression::Literal(lit), span)))
    }

    /// Token at `n` can begin an operand
    fn operand_at(&self, n: usize) -> bool {
        match &self.peek_at(n).kind {
            TokenKind::Eof => false,
            TokenKind::Symbol(s) => matches!(*s, "(" | "[" | "{" | "-" | "+"),
            _ => true,
        }
    }

    /// Keyword prefix forms of the library grammar
    fn prefix_expression(&mut self, start: usize) -> Parsed<Option<Expr>> {
        let Some(word) = self.word().map(str::to_string) else { return Ok(None) };

        let simple = match word.as_str() {
            "not" => Some((UnaryOp::Not, 1)),
            "exists" => Some((UnaryOp::Exists, 1)),
            "distinct" => Some((UnaryOp::Distinct, 1)),
            "flatten" => Some((UnaryOp::Flatten, 1)),
            "collapse" => Some((UnaryOp::Collapse, 1)),
            "expand" => Some((UnaryOp::Expand, 1)),
            "singleton" if self.keyword_at(1, "from") => Some((UnaryOp::SingletonFrom, 2)),
            "point" if self.keyword_at(1, "from") => Some((UnaryOp::PointFrom, 2)),
            "start" if self.keyword_at(1, "of") => Some((UnaryOp::Start, 2)),
            "end" if self.keyword_at(1, "of") => Some((UnaryOp::End, 2)),
            "width" if self.keyword_at(1, "of") => Some((UnaryOp::Width, 2)),
            "size" if self.keyword_at(1, "of") => Some((UnaryOp::Size, 2)),
            "predecessor" if self.keyword_at(1, "of") => Some((UnaryOp::Predecessor, 2)),
            "successor" if self.keyword_at(1, "of") => Some((UnaryOp::Successor, 2)),
            _ => None,
        };
        if let Some((op, words)) = simple {
            if !self.operand_at(words) {
                return Ok(None);
            }
            for _ in 0..words {
                self.bump();
            }
            let operand = self.operand()?;
            return Ok(Some(unary(op, operand, self.span_from(start))));
        }

        if let Some(component) = DateTimeComponent::from_keyword(&word) {
            if self.keyword_at(1, "from") && self.operand_at(2) {
                self.bump();
                self.bump();
                let operand = self.operand()?;
                let node = Expression::DateTimeComponent(DateTimeComponentExpr {
                    component,
                    operand: Box::new(operand),
                });
                return Ok(Some(Spanned::new(node, self.span_from(start))));
            }
        }

        let expr = match word.as_str() {
            "minimum" | "maximum" if matches!(self.peek_at(1).kind, TokenKind::Ident(_) | TokenKind::QuotedIdent(_)) => {
                self.bump();
                let type_specifier = self.type_specifier()?;
                if word == "minimum" {
                    Expression::MinValue(type_specifier)
                } else {
                    Expression::MaxValue(type_specifier)
                }
            }
            "cast" if self.operand_at(1) => {
                self.bump();
                let operand = self.operand()?;
                self.expect_keyword("as")?;
                let type_specifier = self.type_specifier()?;
                Expression::As(TypeCastExpr {
                    operand: Box::new(operand),
                    type_specifier,
                    strict: true,
                })
            }
            "convert" if self.operand_at(1) => {
                self.bump();
                let operand = self.operand()?;
                self.expect_keyword("to")?;
                let target = match self.kind().clone() {
                    TokenKind::Str(unit) => {
                        self.bump();
                        ConvertTarget::Unit(unit)
                    }
                    _ => ConvertTarget::Type(self.type_specifier()?),
                };
                Expression::Convert(ConvertExpr {
                    operand: Box::new(operand),
                    target,
                })
            }
            "duration" | "difference" if self.keyword_at(1, "in") && precision_keyword(self.word_at(2)).is_some() => {
                self.bump();
                self.bump();
                let precision = precision_keyword(self.word()).unwrap_or(TemporalPrecision::Day);
                self.bump();
                let between = self.temporal_between(precision)?;
                if word == "duration" {
                    Expression::DurationBetween(between)
                } else {
                    Expression::DifferenceBetween(between)
                }
            }
            _ => match precision_keyword(Some(&word)) {
                Some(precision) if self.keyword_at(1, "between") => {
                    self.bump();
                    self.bump();
                    let low = self.type_expression()?;
                    self.expect_keyword("and")?;
                    let high = self.type_expression()?;
                    Expression::DurationBetween(TemporalBetweenExpr {
                        precision,
                        low: Box::new(low),
                        high: Box::new(high),
                    })
                }
                _ => return Ok(None),
            },
        };
        Ok(Some(Spanned::new(expr, self.span_from(start))))
    }

    /// `between A and B`, or `of X` meaning the bounds of interval `X`
    fn temporal_between(&mut self, precision: TemporalPrecision) -> Parsed<TemporalBetweenExpr> {
        if self.eat_keyword("between") {
            let low = self.type_expression()?;
            self.expect_keyword("and")?;
            let high = self.type_expression()?;
            return Ok(TemporalBetweenExpr {
                precision,
                low: Box::new(low),
                high: Box::new(high),
            });
        }
        self.expect_keyword("of")?;
        let interval = self.operand()?;
        let span = interval.span;
        Ok(TemporalBetweenExpr {
            precision,
            low: Box::new(unary(UnaryOp::Start, interval.clone(), span)),
            high: Box::new(unary(UnaryOp::End, interval, span)),
        })
    }

    fn postfix_expression(&mut self) -> Parsed<Expr> {
        let start = self.start();
        let mut expr = self.atom()?;
        loop {
            if self.eat_symbol(".") {
                let name = self.name()?;
                expr = if self.at_symbol("(") {
                    let arguments = self.arguments()?;
                    Spanned::new(
                        Expression::FunctionRef(FunctionRefExpr {
                            receiver: Some(Box::new(expr)),
                            name,
                            arguments,
                        }),
                        self.span_from(start),
                    )
                } else {
                    Spanned::new(
                        Expression::Property(PropertyAccess {
                            source: Box::new(expr),
                            name,
                        }),
                        self.span_from(start),
                    )
                };
            } else if self.eat_symbol("[") {
                let index = self.expression()?;
                self.expect_symbol("]")?;
                expr = Spanned::new(
                    Expression::Indexer(IndexerExpr {
                        source: Box::new(expr),
                        index: Box::new(index),
                    }),
                    self.span_from(start),
                );
            } else {
                return Ok(expr);
            }
        }
    }

    fn arguments(&mut self) -> Parsed<Vec<Expr>> {
        self.expect_symbol("(")?;
        let mut arguments = Vec::new();
        if !self.at_symbol(")") {
            loop {
                arguments.push(self.expression()?);
                if !self.eat_symbol(",") {
                    break;
                }
            }
        }
        self.expect_symbol(")")?;
        Ok(arguments)
    }

    fn atom(&mut self) -> Parsed<Expr> {
        let start = self.start();
        let literal = |lit: Literal| Expression::Literal(lit);
        let node = match self.kind().clone() {
            TokenKind::Number(text) => {
                self.bump();
                return self.number_literal(&text, start);
            }
            TokenKind::Long(text) => {
                let token = self.bump();
                let value = text
                    .parse::<i64>()
                    .map_err(|_| self.error_at(MQL0004, format!("long literal {text}L is out of range"), token.span))?;
                literal(Literal::Long(value))
            }
            TokenKind::Str(s) => {
                self.bump();
                literal(Literal::String(s))
            }
            TokenKind::Date(d) => {
                self.bump();
                literal(Literal::Date(d))
            }
            TokenKind::DateTime(dt) => {
                self.bump();
                literal(Literal::DateTime(dt))
            }
            TokenKind::Time(t) => {
                self.bump();
                literal(Literal::Time(t))
            }
            TokenKind::Constant(name) => {
                self.bump();
                Expression::ExternalConstant(name)
            }
            TokenKind::Special(name) => {
                let token = self.bump();
                let var = match name.as_str() {
                    "this" => IterationVar::This,
                    "index" => IterationVar::Index,
                    "total" => IterationVar::Total,
                    _ => return Err(self.error_at(MQL0010, format!("unknown variable ${name}"), token.span)),
                };
                Expression::Iteration(var)
            }
            TokenKind::Symbol("(") => {
                self.bump();
                let inner = self.expression()?;
                self.expect_symbol(")")?;
                return Ok(Spanned::new(inner.inner, self.span_from(start)));
            }
            TokenKind::Symbol("{") => return self.brace_selector(start, Brace::Any),
            TokenKind::Symbol("[") => return self.retrieve(start),
            TokenKind::Ident(word) => return self.word_atom(&word, start),
            TokenKind::QuotedIdent(_) => {
                let id = self.identifier()?;
                if self.at_symbol("(") {
                    let arguments = self.arguments()?;
                    Expression::FunctionRef(FunctionRefExpr {
                        receiver: None,
                        name: id.name,
                        arguments,
                    })
                } else {
                    Expression::IdentifierRef(id)
                }
            }
            _ => return Err(self.unexpected(MQL0009, "an expression")),
        };
        Ok(Spanned::new(node, self.span_from(start)))
    }

    fn word_atom(&mut self, word: &str, start: usize) -> Parsed<Expr> {
        let next_is = |p: &Self, symbol: &str| p.symbol_at(1, symbol);
        let node = match word {
            "null" => {
                self.bump();
                Expression::Literal(Literal::Null)
            }
            "true" | "false" => {
                self.bump();
                Expression::Literal(Literal::Boolean(word == "true"))
            }
            "Interval" if next_is(self, "[") || next_is(self, "(") => return self.interval_selector(start),
            "if" if !next_is(self, "(") => return self.if_expression(start),
            "case" if !next_is(self, "(") => return self.case_expression(start),
            "Tuple" if next_is(self, "{") => {
                self.bump();
                return self.brace_selector(start, Brace::Tuple);
            }
            "List" if next_is(self, "<") || next_is(self, "{") => {
                self.bump();
                let element_type = if self.eat_symbol("<") {
                    let t = self.type_specifier()?;
                    self.expect_symbol(">")?;
                    Some(t)
                } else {
                    None
                };
                if !self.at_symbol("{") {
                    return Err(self.unexpected(MQL0009, "'{'"));
                }
                return self.brace_selector(start, Brace::List(element_type));
            }
            "Code" if matches!(self.peek_at(1).kind, TokenKind::Str(_)) => return self.code_selector(start),
            "Concept" if next_is(self, "{") => return self.concept_selector(start),
            _ if next_is(self, "(") => {
                let name = self.name()?;
                let arguments = self.arguments()?;
                Expression::FunctionRef(FunctionRefExpr {
                    receiver: None,
                    name,
                    arguments,
                })
            }
            _ if self.is_library() && self.at_instance_selector() => return self.instance_selector(start),
            _ if (self.is_library() && is_hard_keyword(word)) || is_path_operator(word) => {
                return Err(self.unexpected(MQL0009, "an expression"));
            }
            _ => Expression::IdentifierRef(self.identifier()?),
        };
        Ok(Spanned::new(node, self.span_from(start)))
    }

    fn number_literal(&mut self, text: &str, start: usize) -> Parsed<Expr> {
        let span = self.span_from(start);
        let value = Decimal::from_str(text)
            .map_err(|_| self.error_at(MQL0004, format!("invalid number {text}"), span))?;

        if let Some(unit) = self.unit() {
            let numerator = QuantityLiteral { value, unit };
            return self.maybe_ratio(numerator, start);
        }
        if self.ratios && self.at_symbol(":") && matches!(self.peek_at(1).kind, TokenKind::Number(_)) {
            let numerator = QuantityLiteral {
                value,
                unit: "1".to_string(),
            };
            return self.maybe_ratio(numerator, start);
        }

        let lit = if text.contains('.') {
            Literal::Decimal(value)
        } else {
            Literal::Integer(text.parse::<i32>().map_err(|_| {
                self.error_at(MQL0004, format!("integer literal {text} is out of range"), span)
            })?)
        };
        Ok(Spanned::new(Expression::Literal(lit), span))
    }

    /// Unit after a number: a string (`'mg'`) or a calendar keyword (`days`)
    fn unit(&mut self) -> Option<String> {
        let unit = match &self.peek().kind {
            TokenKind::Str(s) => s.clone(),
            TokenKind::Ident(w) if TemporalPrecision::from_keyword(w).is_some() => w.clone(),
            _ => return None,
        };
        self.bump();
        Some(unit)
    }

    fn maybe_ratio(&mut self, numerator: QuantityLiteral, start: usize) -> Parsed<Expr> {
        if self.ratios && self.at_symbol(":") && matches!(self.peek_at(1).kind, TokenKind::Number(_)) {
            self.bump();
            let denominator = self.quantity_literal()?;
            let ratio = RatioLiteral { numerator, denominator };
            return Ok(Spanned::new(Expression::Literal(Literal::Ratio(ratio)), self.span_from(start)));
        }
        Ok(Spanned::new(Expression::Literal(Literal::Quantity(numerator)), self.span_from(start)))
    }

    fn quantity_literal(&mut self) -> Parsed<QuantityLiteral> {
        let TokenKind::Number(text) = self.kind().clone() else {
            return Err(self.unexpected(MQL0009, "a quantity"));
        };
        let token = self.bump();
        let value = Decimal::from_str(&text)
            .map_err(|_| self.error_at(MQL0004, format!("invalid number {text}"), token.span))?;
        let unit = self.unit().unwrap_or_else(|| "1".to_string());
        Ok(QuantityLiteral { value, unit })
    }

    fn interval_selector(&mut self, start: usize) -> Parsed<Expr> {
        self.bump();
        let low_closed = if self.eat_symbol("[") {
            true
        } else {
            self.expect_symbol("(")?;
            false
        };
        let low = self.expression()?;
        self.expect_symbol(",")?;
        let high = self.expression()?;
        let high_closed = if self.eat_symbol("]") {
            true
        } else if self.eat_symbol(")") {
            false
        } else {
            return Err(self.unexpected(medql_diagnostics::MQL0008, "']' or ')'"));
        };
        Ok(Spanned::new(
            Expression::Interval(IntervalExpr {
                low: Box::new(low),
                high: Box::new(high),
                low_closed,
                high_closed,
            }),
            self.span_from(start),
        ))
    }

    fn if_expression(&mut self, start: usize) -> Parsed<Expr> {
        self.bump();
        let condition = self.expression()?;
        self.expect_keyword("then")?;
        let then_expr = self.expression()?;
        self.expect_keyword("else")?;
        let else_expr = self.expression()?;
        Ok(Spanned::new(
            Expression::If(IfExpr {
                condition: Box::new(condition),
                then_expr: Box::new(then_expr),
                else_expr: Box::new(else_expr),
            }),
            self.span_from(start),
        ))
    }

    fn case_expression(&mut self, start: usize) -> Parsed<Expr> {
        self.bump();
        let comparand = if self.at_keyword("when") {
            None
        } else {
            Some(Box::new(self.expression()?))
        };
        let mut items = Vec::new();
        while self.eat_keyword("when") {
            let when = self.expression()?;
            self.expect_keyword("then")?;
            let then = self.expression()?;
            items.push(CaseItem { when, then });
        }
        if items.is_empty() {
            return Err(self.unexpected(MQL0009, "'when'"));
        }
        self.expect_keyword("else")?;
        let else_expr = self.expression()?;
        self.expect_keyword("end")?;
        Ok(Spanned::new(
            Expression::Case(CaseExpr {
                comparand,
                items,
                else_expr: Box::new(else_expr),
            }),
            self.span_from(start),
        ))
    }

    /// `{ ... }`: a list, or in libraries a tuple when it opens with
    /// `name:` (or is `{ : }`)
    fn brace_selector(&mut self, start: usize, brace: Brace) -> Parsed<Expr> {
        self.expect_symbol("{")?;
        let tuple = match brace {
            Brace::Tuple => true,
            Brace::List(_) => false,
            Brace::Any => {
                self.is_library()
                    && (self.at_symbol(":")
                        || (matches!(self.kind(), TokenKind::Ident(_) | TokenKind::QuotedIdent(_))
                            && self.symbol_at(1, ":")))
            }
        };
        if tuple {
            let elements = if self.eat_symbol(":") || self.at_symbol("}") {
                Vec::new()
            } else {
                self.tuple_elements()?
            };
            self.expect_symbol("}")?;
            return Ok(Spanned::new(Expression::Tuple(TupleExpr { elements }), self.span_from(start)));
        }
        let mut elements = Vec::new();
        if !self.at_symbol("}") {
            loop {
                elements.push(self.expression()?);
                if !self.eat_symbol(",") {
                    break;
                }
            }
        }
        self.expect_symbol("}")?;
        Ok(Spanned::new(
            Expression::List(ListExpr {
                element_type: match brace {
                    Brace::List(element_type) => element_type,
                    _ => None,
                },
                elements,
            }),
            self.span_from(start),
        ))
    }

    fn tuple_elements(&mut self) -> Parsed<Vec<TupleElement>> {
        let mut elements = Vec::new();
        loop {
            let name = self.name()?;
            self.expect_symbol(":")?;
            let value = self.expression()?;
            elements.push(TupleElement { name, value });
            if !self.eat_symbol(",") {
                break;
            }
        }
        Ok(elements)
    }

    /// `Name {` or `Model.Name {` followed by `name:` or `}`
    fn at_instance_selector(&self) -> bool {
        let n = if self.symbol_at(1, ".") && matches!(self.peek_at(2).kind, TokenKind::Ident(_)) { 3 } else { 1 };
        self.symbol_at(n, "{")
            && (self.symbol_at(n + 1, "}")
                || (matches!(self.peek_at(n + 1).kind, TokenKind::Ident(_) | TokenKind::QuotedIdent(_))
                    && self.symbol_at(n + 2, ":")))
    }

    fn instance_selector(&mut self, start: usize) -> Parsed<Expr> {
        let class_type = self.named_type()?;
        self.expect_symbol("{")?;
        let elements = if self.at_symbol("}") { Vec::new() } else { self.tuple_elements()? };
        self.expect_symbol("}")?;
        Ok(Spanned::new(
            Expression::Instance(InstanceExpr { class_type, elements }),
            self.span_from(start),
        ))
    }

    fn display_clause(&mut self) -> Parsed<Option<String>> {
        if self.eat_keyword("display") {
            Ok(Some(self.string()?))
        } else {
            Ok(None)
        }
    }

    fn code_selector(&mut self, start: usize) -> Parsed<Expr> {
        self.bump();
        let code = self.string()?;
        self.expect_keyword("from")?;
        let system = self.qualified_name()?;
        let display = self.display_clause()?;
        Ok(Spanned::new(
            Expression::Code(CodeSelector { code, system, display }),
            self.span_from(start),
        ))
    }

    fn concept_selector(&mut self, start: usize) -> Parsed<Expr> {
        self.bump();
        self.expect_symbol("{")?;
        let mut codes = Vec::new();
        loop {
            codes.push(self.expression()?);
            if !self.eat_symbol(",") {
                break;
            }
        }
        self.expect_symbol("}")?;
        let display = self.display_clause()?;
        Ok(Spanned::new(
            Expression::Concept(ConceptSelector { codes, display }),
            self.span_from(start),
        ))
    }

    /// `[Type]`, `[Type: terminology]` or `[Type: path in terminology]`
    fn retrieve(&mut self, start: usize) -> Parsed<Expr> {
        self.bump();
        if !self.at_identifier() {
            return Err(self.unexpected(medql_diagnostics::MQL0014, "a resource type"));
        }
        let data_type = self.named_type()?;
        let mut retrieve = Retrieve {
            data_type,
            code_path: None,
            code_comparator: None,
            codes: None,
            date_path: None,
            date_range: None,
        };
        if self.eat_symbol(":") {
            if let Some(n) = self.code_path_extent() {
                let mut path = self.name()?;
                for _ in (1..n).step_by(2) {
                    self.expect_symbol(".")?;
                    path.push('.');
                    path.push_str(&self.name()?);
                }
                retrieve.code_path = Some(path);
                retrieve.code_comparator = Some(match self.bump().kind {
                    TokenKind::Symbol("=") => CodeComparator::Equal,
                    TokenKind::Symbol("~") => CodeComparator::Equivalent,
                    _ => CodeComparator::In,
                });
            }
            retrieve.codes = Some(self.expression()?);
        }
        self.expect_symbol("]")?;
        Ok(Spanned::new(Expression::Retrieve(Box::new(retrieve)), self.span_from(start)))
    }

    /// Tokens in a `path in` prefix of a retrieve filter, if there is one
    fn code_path_extent(&self) -> Option<usize> {
        if !matches!(self.kind(), TokenKind::Ident(_) | TokenKind::QuotedIdent(_)) {
            return None;
        }
        let mut n = 1;
        while self.symbol_at(n, ".") && matches!(self.peek_at(n + 1).kind, TokenKind::Ident(_)) {
            n += 2;
        }
        let comparator = self.keyword_at(n, "in") || self.symbol_at(n, "=") || self.symbol_at(n, "~");
        comparator.then_some(n)
    }

    fn named_type(&mut self) -> Parsed<NamedTypeSpecifier> {
        let first = self.name()?;
        if self.at_symbol(".") && matches!(self.peek_at(1).kind, TokenKind::Ident(_) | TokenKind::QuotedIdent(_)) {
            self.bump();
            let name = self.name()?;
            return Ok(NamedTypeSpecifier {
                namespace: Some(first),
                name,
            });
        }
        Ok(NamedTypeSpecifier {
            namespace: None,
            name: first,
        })
    }

    pub(crate) fn type_specifier(&mut self) -> Parsed<TypeSpecifier> {
        let generic = self.symbol_at(1, "<");
        match self.word() {
            Some("List") if generic => {
                self.bump();
                self.bump();
                let element = self.type_specifier()?;
                self.expect_symbol(">")?;
                Ok(TypeSpecifier::list(element))
            }
            Some("Interval") if generic => {
                self.bump();
                self.bump();
                let point = self.type_specifier()?;
                self.expect_symbol(">")?;
                Ok(TypeSpecifier::interval(point))
            }
            Some("Choice") if generic => {
                self.bump();
                self.bump();
                let mut choices = vec![self.type_specifier()?];
                while self.eat_symbol(",") {
                    choices.push(self.type_specifier()?);
                }
                self.expect_symbol(">")?;
                Ok(TypeSpecifier::Choice(choices))
            }
            Some("Tuple") if self.symbol_at(1, "{") => {
                self.bump();
                self.bump();
                let mut elements = Vec::new();
                if !self.at_symbol("}") {
                    loop {
                        let name = self.name()?;
                        let element_type = self.type_specifier()?;
                        elements.push(TupleElementType { name, element_type });
                        if !self.eat_symbol(",") {
                            break;
                        }
                    }
                }
                self.expect_symbol("}")?;
                Ok(TypeSpecifier::Tuple(elements))
            }
            _ if self.at_identifier() => Ok(TypeSpecifier::Named(self.named_type()?)),
            _ => Err(self.unexpected(MQL0011, "a type")),
        }
    }
}

/// Operator words of the path grammar
fn is_path_operator(word: &str) -> bool {
    matches!(word, "and" | "or" | "xor" | "implies" | "div" | "mod" | "in" | "contains" | "is" | "as")
}
