//! Tokenizer
//!
//! Each token kind is recognised by a small winnow parser; the driver loop
//! skips trivia, records an error for anything it cannot recognise and keeps
//! going so that one bad character does not hide later problems.
//!
//! Single quotes always delimit strings and double quotes (or backticks)
//! always delimit identifiers. The distinction is lexical.

use medql_ast::{DateLiteral, DateTimeLiteral, TimeLiteral};
use medql_diagnostics::{MQL0003, MQL0005, MQL0006, MQL0007, MQL0016, Span, SyntaxError};
use winnow::ModalResult;
use winnow::ascii::digit1;
use winnow::combinator::{alt, opt, preceded};
use winnow::prelude::*;
use winnow::token::{one_of, take_while};

pub(crate) type Input<'a> = &'a str;

pub(crate) type PResult<O> = ModalResult<O>;

#[derive(Debug, Clone, PartialEq)]
pub enum TokenKind {
    /// Bare word; keywords are recognised by the parser, not here
    Ident(String),
    /// `"delimited"` or `` `delimited` ``
    QuotedIdent(String),
    Str(String),
    /// Integer or decimal digits as written
    Number(String),
    /// Digits of a `123L` literal
    Long(String),
    Date(DateLiteral),
    DateTime(DateTimeLiteral),
    Time(TimeLiteral),
    /// `%name`
    Constant(String),
    /// `$this`, `$index`, `$total`
    Special(String),
    Symbol(&'static str),
    Eof,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Token {
    pub kind: TokenKind,
    pub span: Span,
}

/// Longest first so `<=` wins over `<`
const SYMBOLS: [&str; 24] = [
    "<=", ">=", "!=", "!~", "(", ")", "[", "]", "{", "}", ",", ".", ":", "+", "-", "*", "/", "^", "&", "|", "=", "~", "<", ">",
];

fn identifier(input: &mut Input<'_>) -> PResult<String> {
    (
        one_of(|c: char| c.is_alphabetic() || c == '_'),
        take_while(0.., |c: char| c.is_alphanumeric() || c == '_'),
    )
        .take()
        .map(str::to_string)
        .parse_next(input)
}

fn number(input: &mut Input<'_>) -> PResult<TokenKind> {
    let text = (digit1, opt(('.', digit1))).take().parse_next(input)?;
    let long = opt('L').parse_next(input)?;
    Ok(match long {
        Some(_) if !text.contains('.') => TokenKind::Long(text.to_string()),
        _ => TokenKind::Number(text.to_string()),
    })
}

fn two_digits(input: &mut Input<'_>) -> PResult<u8> {
    take_while(2, |c: char| c.is_ascii_digit())
        .try_map(str::parse::<u8>)
        .parse_next(input)
}

/// Fractional seconds: the first three digits are milliseconds, the rest
/// are dropped
fn fraction(input: &mut Input<'_>) -> PResult<u16> {
    preceded('.', digit1)
        .map(|digits: &str| {
            let padded = format!("{:0<3}", &digits[..digits.len().min(3)]);
            padded.parse::<u16>().unwrap_or_default()
        })
        .parse_next(input)
}

fn time_part(input: &mut Input<'_>) -> PResult<TimeLiteral> {
    let hour = two_digits(input)?;
    let minute = opt(preceded(':', two_digits)).parse_next(input)?;
    let second = if minute.is_some() {
        opt(preceded(':', two_digits)).parse_next(input)?
    } else {
        None
    };
    let millisecond = if second.is_some() { opt(fraction).parse_next(input)? } else { None };
    Ok(TimeLiteral {
        hour,
        minute,
        second,
        millisecond,
    })
}

fn offset(input: &mut Input<'_>) -> PResult<i16> {
    alt((
        'Z'.value(0i16),
        (one_of(['+', '-']), two_digits, ':', two_digits).map(|(sign, h, _, m)| {
            let total = i16::from(h) * 60 + i16::from(m);
            if sign == '-' { -total } else { total }
        }),
    ))
    .parse_next(input)
}

/// Everything after the `@`
fn temporal(input: &mut Input<'_>) -> PResult<TokenKind> {
    if opt('T').parse_next(input)?.is_some() {
        return time_part.map(TokenKind::Time).parse_next(input);
    }
    let year = take_while(4, |c: char| c.is_ascii_digit())
        .try_map(str::parse::<i32>)
        .parse_next(input)?;
    let month = opt(preceded('-', two_digits)).parse_next(input)?;
    let day = if month.is_some() { opt(preceded('-', two_digits)).parse_next(input)? } else { None };
    let date = DateLiteral::new(year, month, day);
    if opt('T').parse_next(input)?.is_none() {
        return Ok(TokenKind::Date(date));
    }
    let time = opt(time_part).parse_next(input)?;
    let offset_minutes = opt(offset).parse_next(input)?;
    Ok(TokenKind::DateTime(DateTimeLiteral {
        date,
        time,
        offset_minutes,
    }))
}

fn temporal_in_range(kind: &TokenKind) -> bool {
    let date_ok = |d: &DateLiteral| {
        d.month.is_none_or(|m| (1..=12).contains(&m)) && d.day.is_none_or(|day| (1..=31).contains(&day))
    };
    let time_ok = |t: &TimeLiteral| {
        t.hour < 24 && t.minute.is_none_or(|m| m < 60) && t.second.is_none_or(|s| s < 60)
    };
    match kind {
        TokenKind::Date(d) => date_ok(d),
        TokenKind::DateTime(dt) => date_ok(&dt.date) && dt.time.as_ref().is_none_or(time_ok),
        TokenKind::Time(t) => time_ok(t),
        _ => true,
    }
}

enum DelimitedError {
    Unterminated,
    BadEscape(usize),
}

/// Body of a quoted token starting just after the opening delimiter.
/// Returns the unescaped text and the number of bytes consumed including
/// the closing delimiter.
fn delimited(rest: &str, quote: char) -> Result<(String, usize), DelimitedError> {
    let mut out = String::new();
    let mut chars = rest.char_indices();
    while let Some((i, c)) = chars.next() {
        match c {
            c if c == quote => return Ok((out, i + c.len_utf8())),
            '\\' => {
                let Some((j, e)) = chars.next() else {
                    return Err(DelimitedError::Unterminated);
                };
                match e {
                    'n' => out.push('\n'),
                    't' => out.push('\t'),
                    'r' => out.push('\r'),
                    'f' => out.push('\u{c}'),
                    '\'' | '"' | '`' | '\\' | '/' => out.push(e),
                    'u' => {
                        let hex = rest.get(j + 1..j + 5).ok_or(DelimitedError::BadEscape(i))?;
                        let code = u32::from_str_radix(hex, 16).map_err(|_| DelimitedError::BadEscape(i))?;
                        out.push(char::from_u32(code).ok_or(DelimitedError::BadEscape(i))?);
                        for _ in 0..4 {
                            chars.next();
                        }
                    }
                    _ => return Err(DelimitedError::BadEscape(i)),
                }
            }
            c => out.push(c),
        }
    }
    Err(DelimitedError::Unterminated)
}

struct Lexer<'s> {
    source: &'s str,
    rest: &'s str,
    tokens: Vec<Token>,
    errors: Vec<SyntaxError>,
}

impl<'s> Lexer<'s> {
    fn offset(&self) -> usize {
        self.source.len() - self.rest.len()
    }

    fn error(&mut self, code: medql_diagnostics::ErrorCode, message: impl Into<String>, span: Span) {
        self.errors.push(SyntaxError::at_span(code, message, span, self.source));
    }

    fn push(&mut self, kind: TokenKind, start: usize) {
        let span = Span::new(start, self.offset());
        self.tokens.push(Token { kind, span });
    }

    fn advance(&mut self, bytes: usize) {
        self.rest = &self.rest[bytes.min(self.rest.len())..];
    }

    /// Whitespace, `//` and `/* */` comments
    fn skip_trivia(&mut self) {
        loop {
            let trimmed = self.rest.trim_start();
            self.rest = trimmed;
            if self.rest.starts_with("//") {
                let end = self.rest.find('\n').unwrap_or(self.rest.len());
                self.advance(end);
            } else if self.rest.starts_with("/*") {
                let start = self.offset();
                match self.rest[2..].find("*/") {
                    Some(end) => self.advance(end + 4),
                    None => {
                        self.error(MQL0016, "unterminated block comment", Span::new(start, self.source.len()));
                        self.rest = "";
                    }
                }
            } else {
                return;
            }
        }
    }

    /// Run a winnow parser on the remaining input, committing on success
    fn run<O>(&mut self, mut parser: impl FnMut(&mut Input<'s>) -> PResult<O>) -> Option<O> {
        let mut input = self.rest;
        let out = parser(&mut input).ok()?;
        self.rest = input;
        Some(out)
    }

    fn quoted(&mut self, quote: char, start: usize) -> Option<String> {
        match delimited(&self.rest[1..], quote) {
            Ok((text, consumed)) => {
                self.advance(1 + consumed);
                Some(text)
            }
            Err(DelimitedError::Unterminated) => {
                let what = if quote == '\'' { "string" } else { "identifier" };
                self.error(MQL0006, format!("unterminated {what}"), Span::new(start, self.source.len()));
                self.rest = "";
                None
            }
            Err(DelimitedError::BadEscape(at)) => {
                let pos = start + 1 + at;
                self.error(MQL0005, "invalid escape sequence", Span::new(pos, pos + 2));
                // Skip to the closing delimiter so the rest of the line still lexes
                let end = self.rest[1..].find(quote).map_or(self.rest.len(), |i| i + 2);
                self.advance(end);
                None
            }
        }
    }

    fn next_token(&mut self) {
        let start = self.offset();
        let Some(c) = self.rest.chars().next() else { return };
        match c {
            '\'' => {
                if let Some(s) = self.quoted('\'', start) {
                    self.push(TokenKind::Str(s), start);
                }
            }
            '"' | '`' => {
                if let Some(s) = self.quoted(c, start) {
                    self.push(TokenKind::QuotedIdent(s), start);
                }
            }
            '@' => {
                self.advance(1);
                match self.run(temporal) {
                    Some(kind) if temporal_in_range(&kind) => self.push(kind, start),
                    Some(_) => self.error(MQL0007, "date/time component out of range", Span::new(start, self.offset())),
                    None => {
                        let end = self.rest.find(|c: char| c.is_whitespace() || "(),]}".contains(c)).unwrap_or(self.rest.len());
                        self.advance(end);
                        self.error(MQL0007, "malformed date/time literal", Span::new(start, self.offset()));
                    }
                }
            }
            '%' => {
                self.advance(1);
                let name = match self.rest.chars().next() {
                    Some(q @ ('`' | '\'' | '"')) => self.quoted(q, start + 1),
                    _ => self.run(identifier),
                };
                match name {
                    Some(name) => self.push(TokenKind::Constant(name), start),
                    None => self.error(MQL0003, "expected a name after '%'", Span::new(start, start + 1)),
                }
            }
            '$' => {
                self.advance(1);
                match self.run(identifier) {
                    Some(name) => self.push(TokenKind::Special(name), start),
                    None => self.error(MQL0003, "expected a name after '$'", Span::new(start, start + 1)),
                }
            }
            c if c.is_ascii_digit() => {
                if let Some(kind) = self.run(number) {
                    self.push(kind, start);
                }
            }
            c if c.is_alphabetic() || c == '_' => {
                if let Some(name) = self.run(identifier) {
                    self.push(TokenKind::Ident(name), start);
                }
            }
            _ => match SYMBOLS.iter().copied().find(|s| self.rest.starts_with(s)) {
                Some(sym) => {
                    self.advance(sym.len());
                    self.push(TokenKind::Symbol(sym), start);
                }
                None => {
                    self.advance(c.len_utf8());
                    self.error(MQL0003, format!("unexpected character '{c}'"), Span::new(start, self.offset()));
                }
            },
        }
    }
}

/// Split `source` into tokens. The token list always ends with `Eof`;
/// errors for unrecognised input are returned alongside it.
pub fn tokenize(source: &str) -> (Vec<Token>, Vec<SyntaxError>) {
    let mut lexer = Lexer {
        source,
        rest: source,
        tokens: Vec::new(),
        errors: Vec::new(),
    };
    loop {
        lexer.skip_trivia();
        if lexer.rest.is_empty() {
            break;
        }
        lexer.next_token();
    }
    let end = source.len();
    lexer.tokens.push(Token {
        kind: TokenKind::Eof,
        span: Span::point(end),
    });
    (lexer.tokens, lexer.errors)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn kinds(source: &str) -> Vec<TokenKind> {
        let (tokens, errors) = tokenize(source);
        assert!(errors.is_empty(), "{errors:?}");
        tokens.into_iter().map(|t| t.kind).collect()
    }

    #[test]
    fn test_quotes_are_lexically_distinct() {
        assert_eq!(
            kinds(r#"'text' "Name" `other`"#),
            vec![
                TokenKind::Str("text".into()),
                TokenKind::QuotedIdent("Name".into()),
                TokenKind::QuotedIdent("other".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_numbers() {
        assert_eq!(
            kinds("1 2.50 10L"),
            vec![
                TokenKind::Number("1".into()),
                TokenKind::Number("2.50".into()),
                TokenKind::Long("10".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_member_access_after_integer() {
        // `1.toString()` must not lex `1.` as a decimal
        assert_eq!(kinds("1.toString")[..3], [
            TokenKind::Number("1".into()),
            TokenKind::Symbol("."),
            TokenKind::Ident("toString".into()),
        ]);
    }

    #[test]
    fn test_temporal_literals() {
        let toks = kinds("@2024-01-15 @2024-01T @T10:30 @2024-01-15T10:30:00.5+02:00");
        assert_eq!(toks[0], TokenKind::Date(DateLiteral::new(2024, Some(1), Some(15))));
        assert!(matches!(&toks[1], TokenKind::DateTime(dt) if dt.time.is_none()));
        assert!(matches!(&toks[2], TokenKind::Time(t) if t.hour == 10 && t.minute == Some(30)));
        match &toks[3] {
            TokenKind::DateTime(dt) => {
                assert_eq!(dt.offset_minutes, Some(120));
                assert_eq!(dt.time.and_then(|t| t.millisecond), Some(500));
            }
            other => panic!("expected date-time, got {other:?}"),
        }
    }

    #[test]
    fn test_comments_and_symbols() {
        assert_eq!(
            kinds("a <= b // trailing\n/* block */ != c"),
            vec![
                TokenKind::Ident("a".into()),
                TokenKind::Symbol("<="),
                TokenKind::Ident("b".into()),
                TokenKind::Symbol("!="),
                TokenKind::Ident("c".into()),
                TokenKind::Eof,
            ]
        );
    }

    #[test]
    fn test_errors_are_collected() {
        let (tokens, errors) = tokenize("1 # 2 \n 'open");
        assert_eq!(errors.len(), 2);
        assert_eq!(errors[0].location.line, 1);
        assert_eq!(errors[1].location.line, 2);
        assert!(tokens.iter().any(|t| t.kind == TokenKind::Number("2".into())));
    }

    #[test]
    fn test_escapes() {
        assert_eq!(kinds(r"'it\'s A'")[0], TokenKind::Str("it's A".into()));
    }
}
