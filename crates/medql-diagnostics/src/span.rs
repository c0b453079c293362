//! Source positions
//!
//! The lexer and parser work in byte offsets. A [`LineIndex`] built once per
//! source text turns those offsets into the 1-based line and character
//! column printed in diagnostics.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Byte range `start..end` of a token or syntax node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub struct Span {
    pub start: usize,
    pub end: usize,
}

impl Span {
    pub const fn new(start: usize, end: usize) -> Self {
        Self { start, end }
    }

    /// Empty span where a missing token was expected
    pub const fn point(offset: usize) -> Self {
        Self::new(offset, offset)
    }

    pub const fn len(&self) -> usize {
        self.end.saturating_sub(self.start)
    }

    pub const fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// Byte offset of the first character of every line in a source text
#[derive(Debug, Clone)]
pub struct LineIndex<'s> {
    source: &'s str,
    starts: Vec<usize>,
}

impl<'s> LineIndex<'s> {
    pub fn new(source: &'s str) -> Self {
        let starts = std::iter::once(0)
            .chain(source.match_indices('\n').map(|(at, _)| at + 1))
            .collect();
        Self { source, starts }
    }

    pub fn line_count(&self) -> usize {
        self.starts.len()
    }

    /// Line and column of `offset`, both 1-based. Columns count characters;
    /// offsets past the end land just after the last character.
    pub fn position(&self, offset: usize) -> (usize, usize) {
        let offset = offset.min(self.source.len());
        let line = self.starts.partition_point(|&start| start <= offset);
        let start = self.starts.get(line.saturating_sub(1)).copied().unwrap_or(0);
        let before = self
            .source
            .get(start..offset)
            .map_or(offset - start, |text| text.chars().count());
        (line, before + 1)
    }

    /// Text of a 1-based line without its line terminator
    pub fn line(&self, line: usize) -> Option<&'s str> {
        let start = *self.starts.get(line.checked_sub(1)?)?;
        let end = self.starts.get(line).map_or(self.source.len(), |next| next - 1);
        self.source.get(start..end).map(|text| text.trim_end_matches('\r'))
    }

    pub fn locate(&self, span: Span) -> SourceLocation {
        let (line, column) = self.position(span.start);
        SourceLocation::new(line, column, span.start, span.len())
    }
}

/// Where a diagnostic points: 1-based line and column plus the byte range
/// it underlines
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
    pub offset: usize,
    pub length: usize,
}

impl SourceLocation {
    pub const fn new(line: usize, column: usize, offset: usize, length: usize) -> Self {
        Self {
            line,
            column,
            offset,
            length,
        }
    }

    /// One-off resolution; build a [`LineIndex`] when locating many spans
    /// in the same text
    pub fn from_span(span: Span, source: &str) -> Self {
        LineIndex::new(source).locate(span)
    }
}

impl Default for SourceLocation {
    fn default() -> Self {
        Self::new(1, 1, 0, 0)
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// A syntax node and the text it was parsed from. Nodes loaded from the
/// interchange format or built in code carry an empty span at offset 0.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Spanned<T> {
    pub inner: T,
    pub span: Span,
}

impl<T> Spanned<T> {
    pub const fn new(inner: T, span: Span) -> Self {
        Self { inner, span }
    }

    pub fn synthetic(inner: T) -> Self {
        Self::new(inner, Span::default())
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Spanned<U> {
        Spanned::new(f(self.inner), self.span)
    }

    pub fn into_inner(self) -> T {
        self.inner
    }
}

impl<T> std::ops::Deref for Spanned<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.inner
    }
}

impl<T> std::ops::DerefMut for Spanned<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.inner
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use rstest::rstest;

    const LIBRARY: &str = "library Demo\r\ndefine \"Größe\": 1 +\n  2\n";

    #[rstest]
    #[case(0, (1, 1))]
    #[case(8, (1, 9))]
    #[case(14, (2, 1))]
    #[case(29, (2, 14))]
    #[case(38, (3, 3))]
    #[case(999, (4, 1))]
    fn test_position(#[case] offset: usize, #[case] expected: (usize, usize)) {
        assert_eq!(LineIndex::new(LIBRARY).position(offset), expected);
    }

    #[test]
    fn test_lines_drop_terminators() {
        let index = LineIndex::new(LIBRARY);
        assert_eq!(index.line_count(), 4);
        assert_eq!(index.line(1), Some("library Demo"));
        assert_eq!(index.line(3), Some("  2"));
        assert_eq!(index.line(4), Some(""));
        assert_eq!(index.line(0), None);
        assert_eq!(index.line(5), None);
    }

    #[test]
    fn test_locate_span() {
        let location = SourceLocation::from_span(Span::new(38, 39), LIBRARY);
        assert_eq!(location, SourceLocation::new(3, 3, 38, 1));
        assert_eq!(location.to_string(), "3:3");
        assert!(Span::point(5).is_empty());
    }
}
