//! medql parser
//!
//! A winnow-based tokenizer feeds a hand-written recursive-descent parser
//! with precedence climbing. Two grammars share the expression productions:
//!
//! - the path grammar (`Patient.name.where(use = 'official').given`), a
//!   navigation-only subset;
//! - the library grammar, which adds declarations, named definitions,
//!   queries, retrieves, timing phrases and keyword operators.
//!
//! Parsing never stops at the first error. Every recoverable syntax error is
//! collected with its line and column.

mod expression;
mod lexer;
mod library;
mod parser;

pub use lexer::{Token, TokenKind, tokenize};

use medql_ast::{Expression, Library, Spanned};
use medql_diagnostics::{MQL0001, MQL0015, SyntaxError};
use parser::Parser;

/// Which surface grammar to accept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ParseMode {
    /// Navigation expressions only
    Path,
    /// Declarations, definitions and the full expression language
    #[default]
    Library,
}

/// Outcome of a best-effort parse: whatever could be built plus every error
#[derive(Debug, Clone)]
pub struct ParseResult {
    pub library: Library,
    pub errors: Vec<SyntaxError>,
}

impl ParseResult {
    pub fn is_success(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn into_result(self) -> Result<Library, Vec<SyntaxError>> {
        if self.errors.is_empty() {
            Ok(self.library)
        } else {
            Err(self.errors)
        }
    }
}

fn sorted(mut errors: Vec<SyntaxError>) -> Vec<SyntaxError> {
    errors.sort_by_key(|e| e.location.offset);
    errors
}

/// Parse a library, keeping the declarations that parsed cleanly even when
/// others did not
pub fn parse_partial(source: &str) -> ParseResult {
    let (tokens, mut errors) = tokenize(source);
    let mut parser = Parser::new(source, tokens, ParseMode::Library);
    let library = parser.library();
    errors.append(&mut parser.errors);
    log::trace!(
        "parsed library {:?}: {} statements, {} errors",
        library.name(),
        library.statements.len(),
        errors.len()
    );
    ParseResult {
        library,
        errors: sorted(errors),
    }
}

/// Parse library source text
pub fn parse_library(source: &str) -> Result<Library, Vec<SyntaxError>> {
    parse_partial(source).into_result()
}

/// Alias of [`parse_library`]
pub fn parse(source: &str) -> Result<Library, Vec<SyntaxError>> {
    parse_library(source)
}

fn parse_standalone(source: &str, mode: ParseMode) -> Result<Spanned<Expression>, Vec<SyntaxError>> {
    let (tokens, mut errors) = tokenize(source);
    let mut parser = Parser::new(source, tokens, mode);
    match parser.expression() {
        Ok(expr) => {
            if !parser.at_eof() {
                errors.push(parser.unexpected(MQL0001, "end of expression"));
            }
            errors.append(&mut parser.errors);
            if mode == ParseMode::Path {
                reject_library_constructs(&expr, source, &mut errors);
            }
            if errors.is_empty() { Ok(expr) } else { Err(sorted(errors)) }
        }
        Err(error) => {
            errors.push(error);
            errors.append(&mut parser.errors);
            Err(sorted(errors))
        }
    }
}

/// Parse a single expression of the library grammar
pub fn parse_expression(source: &str) -> Result<Spanned<Expression>, Vec<SyntaxError>> {
    parse_standalone(source, ParseMode::Library)
}

/// Parse a path expression
pub fn parse_path(source: &str) -> Result<Spanned<Expression>, Vec<SyntaxError>> {
    parse_standalone(source, ParseMode::Path)
}

/// Report the outermost library-only constructs in a path expression
fn reject_library_constructs(expr: &Spanned<Expression>, source: &str, errors: &mut Vec<SyntaxError>) {
    if expr.is_library_only() {
        errors.push(SyntaxError::at_span(
            MQL0015,
            format!("{} is not allowed in path expressions", expr.kind_name()),
            expr.span,
            source,
        ));
        return;
    }
    for child in expr.children() {
        reject_library_constructs(child, source, errors);
    }
}
