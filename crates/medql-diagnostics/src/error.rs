//! Error and diagnostic types shared by the front ends

use crate::{ErrorCode, LineIndex, SourceLocation, Span};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Error,
    Warning,
    Info,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
            Severity::Info => write!(f, "info"),
        }
    }
}

/// A reportable message with an optional source position
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: ErrorCode,
    pub message: String,
    pub location: Option<SourceLocation>,
    pub help: Option<String>,
}

impl Diagnostic {
    pub fn error(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            code,
            message: message.into(),
            location: None,
            help: code.info().help.map(str::to_string),
        }
    }

    pub fn warning(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            ..Self::error(code, message)
        }
    }

    pub fn with_location(mut self, location: SourceLocation) -> Self {
        self.location = Some(location);
        self
    }

    pub fn with_span(self, span: Span, source: &str) -> Self {
        self.with_location(SourceLocation::from_span(span, source))
    }

    pub fn with_help(mut self, help: impl Into<String>) -> Self {
        self.help = Some(help.into());
        self
    }

    /// Render the diagnostic with the offending source line and a caret marker.
    pub fn render(&self, file_name: &str, source: &str) -> String {
        let mut out = String::new();
        let header = format!("{}[{}]: {}", self.severity, self.code, self.message);
        out.push_str(&paint_header(self.severity, &header));
        out.push('\n');
        if let Some(loc) = &self.location {
            out.push_str(&format!("  --> {}:{}:{}\n", file_name, loc.line, loc.column));
            if let Some(text) = LineIndex::new(source).line(loc.line) {
                let gutter = loc.line.to_string();
                let pad = " ".repeat(gutter.len());
                let marker = format!(
                    "{}{}",
                    " ".repeat(loc.column.saturating_sub(1)),
                    "^".repeat(loc.length.max(1))
                );
                out.push_str(&format!("{pad} |\n{gutter} | {text}\n{pad} | {}\n", paint_marker(&marker)));
            }
        }
        if let Some(help) = &self.help {
            out.push_str(&format!("  = help: {help}\n"));
        }
        out
    }
}

#[cfg(feature = "colored")]
fn paint_header(severity: Severity, text: &str) -> String {
    use colored::Colorize;
    match severity {
        Severity::Error => text.red().bold().to_string(),
        Severity::Warning => text.yellow().bold().to_string(),
        Severity::Info => text.blue().to_string(),
    }
}

#[cfg(not(feature = "colored"))]
fn paint_header(_severity: Severity, text: &str) -> String {
    text.to_string()
}

#[cfg(feature = "colored")]
fn paint_marker(text: &str) -> String {
    use colored::Colorize;
    text.red().to_string()
}

#[cfg(not(feature = "colored"))]
fn paint_marker(text: &str) -> String {
    text.to_string()
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} - {}", self.severity, self.code, self.message)?;
        if let Some(loc) = &self.location {
            write!(f, " at {loc}")?;
        }
        Ok(())
    }
}

/// A single parse-time error. Parsing continues after one is recorded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code}: {message} at {location}")]
pub struct SyntaxError {
    pub code: ErrorCode,
    pub message: String,
    pub location: SourceLocation,
}

impl SyntaxError {
    pub fn new(code: ErrorCode, message: impl Into<String>, location: SourceLocation) -> Self {
        Self {
            code,
            message: message.into(),
            location,
        }
    }

    pub fn at_span(code: ErrorCode, message: impl Into<String>, span: Span, source: &str) -> Self {
        Self::new(code, message, SourceLocation::from_span(span, source))
    }

    pub fn to_diagnostic(&self) -> Diagnostic {
        Diagnostic::error(self.code, self.message.clone()).with_location(self.location.clone())
    }
}

/// Top-level error for compiling, linking and loading libraries
#[derive(Debug, Clone, Error)]
pub enum MedqlError {
    #[error("{} syntax error(s); first: {}", .0.len(), first_message(.0))]
    Syntax(Vec<SyntaxError>),

    #[error("{code}: {message}")]
    Semantic { code: ErrorCode, message: String },

    #[error("{code}: {message} (at {path})")]
    Interchange {
        code: ErrorCode,
        message: String,
        path: String,
    },

    #[error("{code}: {message}")]
    System { code: ErrorCode, message: String },
}

fn first_message(errors: &[SyntaxError]) -> String {
    errors
        .first()
        .map(ToString::to_string)
        .unwrap_or_else(|| "none".to_string())
}

impl MedqlError {
    pub fn semantic(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::Semantic {
            code,
            message: message.into(),
        }
    }

    pub fn interchange(code: ErrorCode, message: impl Into<String>, path: impl Into<String>) -> Self {
        Self::Interchange {
            code,
            message: message.into(),
            path: path.into(),
        }
    }

    pub fn system(code: ErrorCode, message: impl Into<String>) -> Self {
        Self::System {
            code,
            message: message.into(),
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Syntax(errors) => errors
                .first()
                .map(|e| e.code)
                .unwrap_or(crate::MQL0001),
            Self::Semantic { code, .. } | Self::Interchange { code, .. } | Self::System { code, .. } => {
                *code
            }
        }
    }

    /// One diagnostic per underlying problem
    pub fn diagnostics(&self) -> Vec<Diagnostic> {
        match self {
            Self::Syntax(errors) => errors.iter().map(SyntaxError::to_diagnostic).collect(),
            Self::Interchange { code, message, path } => {
                vec![Diagnostic::error(*code, format!("{message} (at {path})"))]
            }
            Self::Semantic { code, message } | Self::System { code, message } => {
                vec![Diagnostic::error(*code, message.clone())]
            }
        }
    }
}

impl From<Vec<SyntaxError>> for MedqlError {
    fn from(errors: Vec<SyntaxError>) -> Self {
        Self::Syntax(errors)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{MQL0001, MQL0102};

    #[test]
    fn test_syntax_error_display() {
        let err = SyntaxError::at_span(MQL0001, "Unexpected ')'", Span::new(12, 13), "define X:\n  1 + )");
        assert_eq!(err.location.line, 2);
        assert_eq!(err.to_string(), "MQL0001: Unexpected ')' at 2:3");
    }

    #[test]
    fn test_multiple_syntax_errors() {
        let source = "a\nb";
        let err = MedqlError::from(vec![
            SyntaxError::at_span(MQL0001, "first", Span::point(0), source),
            SyntaxError::at_span(MQL0001, "second", Span::point(2), source),
        ]);
        assert_eq!(err.diagnostics().len(), 2);
        assert!(err.to_string().starts_with("2 syntax error(s)"));
    }

    #[test]
    fn test_render_points_at_column() {
        let source = "define X: 1 +";
        let diag = Diagnostic::error(MQL0001, "Expected expression").with_span(Span::new(13, 13), source);
        let rendered = diag.render("Test.cql", source);
        assert!(rendered.contains("Test.cql:1:14"));
        assert!(rendered.contains("define X: 1 +"));
    }

    #[test]
    fn test_semantic_error_code() {
        let err = MedqlError::semantic(MQL0102, "Circular include detected: A -> B -> A");
        assert_eq!(err.code(), MQL0102);
    }
}
