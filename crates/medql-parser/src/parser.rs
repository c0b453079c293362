//! Token cursor shared by the expression and library grammars

use crate::lexer::{Token, TokenKind};
use crate::ParseMode;
use medql_ast::Identifier;
use medql_diagnostics::{ErrorCode, MQL0001, MQL0002, MQL0008, MQL0010, MQL0017, Span, SyntaxError};

pub(crate) type Parsed<T> = Result<T, SyntaxError>;

/// Nesting limit for parenthesised and prefix expressions, sized for a
/// 2 MiB thread stack
const MAX_NESTING: usize = 64;

/// Words that end an expression or introduce a clause; they are never taken
/// as a query alias or a bare identifier reference
const RESERVED: &[&str] = &[
    "after", "aggregate", "all", "and", "as", "asc", "ascending", "before", "between", "by", "called", "case",
    "cast", "codesystem", "codesystems", "collapse", "contains", "context", "convert", "default", "define", "desc",
    "descending", "display", "distinct", "div", "during", "else", "end", "ends", "except", "exists", "expand",
    "external", "false", "flatten", "fluent", "from", "function", "if", "implies", "in", "include", "includes",
    "included", "intersect", "is", "let", "library", "maximum", "meets", "minimum", "mod", "not", "null", "occurs",
    "of", "on", "or", "overlaps", "parameter", "private", "properly", "public", "return", "returns", "same",
    "singleton", "sort", "starting", "starts", "such", "that", "then", "to", "true", "union", "using", "valueset",
    "version", "when", "where", "with", "within", "without", "xor",
];

/// Declaration keywords a recovering parser resynchronises on
const DECLARATION_KEYWORDS: &[&str] = &[
    "library", "using", "include", "parameter", "codesystem", "valueset", "code", "concept", "context", "define",
    "private", "public",
];

/// Reserved words that may still be used as a bare name
const SOFT_KEYWORDS: &[&str] = &[
    "all", "called", "codesystems", "default", "display", "external", "fluent", "function", "occurs", "returns",
    "starting", "version",
];

pub(crate) fn is_reserved(word: &str) -> bool {
    RESERVED.contains(&word)
}

/// Reserved words that can never stand alone as an identifier reference
pub(crate) fn is_hard_keyword(word: &str) -> bool {
    is_reserved(word) && !SOFT_KEYWORDS.contains(&word)
}

pub(crate) struct Parser<'s> {
    pub(crate) source: &'s str,
    tokens: Vec<Token>,
    pos: usize,
    pub(crate) errors: Vec<SyntaxError>,
    pub(crate) mode: ParseMode,
    pub(crate) depth: usize,
    /// Cleared while parsing an aggregate seed, where `1: ...` is not a ratio
    pub(crate) ratios: bool,
}

impl<'s> Parser<'s> {
    pub(crate) fn new(source: &'s str, tokens: Vec<Token>, mode: ParseMode) -> Self {
        Self {
            source,
            tokens,
            pos: 0,
            errors: Vec::new(),
            mode,
            depth: 0,
            ratios: true,
        }
    }

    pub(crate) fn is_library(&self) -> bool {
        self.mode == ParseMode::Library
    }

    pub(crate) fn peek(&self) -> &Token {
        self.peek_at(0)
    }

    /// Token `n` positions ahead; `Eof` past the end
    pub(crate) fn peek_at(&self, n: usize) -> &Token {
        let last = self.tokens.len().saturating_sub(1);
        &self.tokens[(self.pos + n).min(last)]
    }

    pub(crate) fn kind(&self) -> &TokenKind {
        &self.peek().kind
    }

    pub(crate) fn at_eof(&self) -> bool {
        matches!(self.kind(), TokenKind::Eof)
    }

    pub(crate) fn bump(&mut self) -> Token {
        let token = self.peek().clone();
        if !self.at_eof() {
            self.pos += 1;
        }
        token
    }

    /// Start of the current token
    pub(crate) fn start(&self) -> usize {
        self.peek().span.start
    }

    /// Span from `start` to the end of the last consumed token
    pub(crate) fn span_from(&self, start: usize) -> Span {
        let end = if self.pos == 0 {
            start
        } else {
            self.tokens[self.pos - 1].span.end
        };
        Span::new(start, end.max(start))
    }

    pub(crate) fn at_symbol(&self, symbol: &str) -> bool {
        self.symbol_at(0, symbol)
    }

    pub(crate) fn symbol_at(&self, n: usize, symbol: &str) -> bool {
        matches!(&self.peek_at(n).kind, TokenKind::Symbol(s) if *s == symbol)
    }

    pub(crate) fn eat_symbol(&mut self, symbol: &str) -> bool {
        if self.at_symbol(symbol) {
            self.bump();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_symbol(&mut self, symbol: &str) -> Parsed<Span> {
        if self.at_symbol(symbol) {
            Ok(self.bump().span)
        } else {
            let code = if matches!(symbol, ")" | "]" | "}" | ">") { MQL0008 } else { MQL0001 };
            Err(self.unexpected(code, &format!("'{symbol}'")))
        }
    }

    /// Plain identifier token spelled `word` (keywords are case-sensitive)
    pub(crate) fn keyword_at(&self, n: usize, word: &str) -> bool {
        matches!(&self.peek_at(n).kind, TokenKind::Ident(s) if s == word)
    }

    pub(crate) fn at_keyword(&self, word: &str) -> bool {
        self.keyword_at(0, word)
    }

    /// Sequence of keywords starting at the current token
    pub(crate) fn at_keywords(&self, words: &[&str]) -> bool {
        words.iter().enumerate().all(|(i, w)| self.keyword_at(i, w))
    }

    pub(crate) fn eat_keyword(&mut self, word: &str) -> bool {
        if self.at_keyword(word) {
            self.bump();
            true
        } else {
            false
        }
    }

    pub(crate) fn expect_keyword(&mut self, word: &str) -> Parsed<Span> {
        if self.at_keyword(word) {
            Ok(self.bump().span)
        } else {
            Err(self.unexpected(MQL0001, &format!("'{word}'")))
        }
    }

    /// Name of the current token when it is a plain word
    pub(crate) fn word(&self) -> Option<&str> {
        self.word_at(0)
    }

    pub(crate) fn word_at(&self, n: usize) -> Option<&str> {
        match &self.peek_at(n).kind {
            TokenKind::Ident(s) => Some(s),
            _ => None,
        }
    }

    /// Identifier usable as a name: any word or a delimited identifier
    pub(crate) fn at_identifier(&self) -> bool {
        matches!(self.kind(), TokenKind::Ident(_) | TokenKind::QuotedIdent(_))
    }

    /// Identifier at `n` that may name a query alias
    pub(crate) fn alias_at(&self, n: usize) -> bool {
        match &self.peek_at(n).kind {
            TokenKind::Ident(s) => !is_reserved(s) && !self.declaration_at(n),
            TokenKind::QuotedIdent(_) => true,
            _ => false,
        }
    }

    pub(crate) fn identifier(&mut self) -> Parsed<Identifier> {
        match self.kind().clone() {
            TokenKind::Ident(name) => {
                self.bump();
                Ok(Identifier::new(name))
            }
            TokenKind::QuotedIdent(name) => {
                self.bump();
                Ok(Identifier::quoted(name))
            }
            _ => Err(self.unexpected(MQL0010, "an identifier")),
        }
    }

    pub(crate) fn name(&mut self) -> Parsed<String> {
        self.identifier().map(|id| id.name)
    }

    /// `name` or `Qualifier.name`
    pub(crate) fn qualified_name(&mut self) -> Parsed<String> {
        let mut name = self.name()?;
        while self.at_symbol(".") && matches!(self.peek_at(1).kind, TokenKind::Ident(_) | TokenKind::QuotedIdent(_)) {
            self.bump();
            name.push('.');
            name.push_str(&self.name()?);
        }
        Ok(name)
    }

    pub(crate) fn string(&mut self) -> Parsed<String> {
        match self.kind().clone() {
            TokenKind::Str(s) => {
                self.bump();
                Ok(s)
            }
            _ => Err(self.unexpected(MQL0001, "a string")),
        }
    }

    pub(crate) fn error_at(&self, code: ErrorCode, message: impl Into<String>, span: Span) -> SyntaxError {
        SyntaxError::at_span(code, message, span, self.source)
    }

    /// "expected X, found Y" at the current token
    pub(crate) fn unexpected(&self, code: ErrorCode, expected: &str) -> SyntaxError {
        let token = self.peek();
        if matches!(token.kind, TokenKind::Eof) {
            let code = if code == MQL0001 { MQL0002 } else { code };
            return self.error_at(code, format!("expected {expected}, found end of input"), token.span);
        }
        let found = describe(&token.kind);
        self.error_at(code, format!("expected {expected}, found {found}"), token.span)
    }

    /// Start of a library declaration; `code` and `concept` only count when
    /// followed by `name :`
    pub(crate) fn at_declaration(&self) -> bool {
        self.declaration_at(0)
    }

    fn declaration_at(&self, n: usize) -> bool {
        let Some(word) = self.word_at(n) else { return false };
        if !DECLARATION_KEYWORDS.contains(&word) {
            return false;
        }
        let index = self.pos + n;
        if index > 0 && matches!(&self.tokens[index - 1].kind, TokenKind::Symbol(".")) {
            return false;
        }
        match word {
            "code" | "concept" => {
                matches!(self.peek_at(n + 1).kind, TokenKind::Ident(_) | TokenKind::QuotedIdent(_))
                    && self.symbol_at(n + 2, ":")
            }
            _ => true,
        }
    }

    pub(crate) fn position(&self) -> usize {
        self.pos
    }

    /// Skip to the next declaration after a syntax error in the declaration
    /// that began at token `from`. Always makes progress.
    pub(crate) fn synchronize(&mut self, from: usize) {
        if self.pos == from {
            self.bump();
        }
        while !self.at_eof() && !self.at_declaration() {
            self.bump();
        }
    }

    pub(crate) fn enter(&mut self) -> Parsed<()> {
        if self.depth >= MAX_NESTING {
            return Err(self.error_at(
                MQL0017,
                format!("expression is nested more than {MAX_NESTING} levels deep"),
                self.peek().span,
            ));
        }
        self.depth += 1;
        Ok(())
    }

    pub(crate) fn leave(&mut self) {
        self.depth = self.depth.saturating_sub(1);
    }
}

fn describe(kind: &TokenKind) -> String {
    match kind {
        TokenKind::Ident(s) => format!("'{s}'"),
        TokenKind::QuotedIdent(s) => format!("identifier \"{s}\""),
        TokenKind::Str(s) => format!("string '{s}'"),
        TokenKind::Number(n) | TokenKind::Long(n) => format!("number {n}"),
        TokenKind::Date(d) => format!("date @{d}"),
        TokenKind::DateTime(d) => format!("date-time @{d}"),
        TokenKind::Time(t) => format!("time @T{t}"),
        TokenKind::Constant(c) => format!("%{c}"),
        TokenKind::Special(s) => format!("${s}"),
        TokenKind::Symbol(s) => format!("'{s}'"),
        TokenKind::Eof => "end of input".to_string(),
    }
}
