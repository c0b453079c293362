//! Structured error codes
//!
//! Ranges:
//! - MQL0001-MQL0099: syntax errors
//! - MQL0100-MQL0199: semantic and link errors (library resolution, duplicates)
//! - MQL0200-MQL0299: evaluation errors
//! - MQL0400-MQL0499: system and interchange errors

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ErrorCode(u16);

impl ErrorCode {
    pub const fn new(code: u16) -> Self {
        Self(code)
    }

    pub const fn code(&self) -> u16 {
        self.0
    }

    /// Static description for this code
    pub fn info(&self) -> &'static ErrorInfo {
        ERROR_INFO.get(&self.0).unwrap_or(&UNKNOWN_ERROR)
    }

    pub const fn is_syntax_error(&self) -> bool {
        self.0 >= 1 && self.0 < 100
    }

    pub const fn is_semantic_error(&self) -> bool {
        self.0 >= 100 && self.0 < 200
    }

    pub const fn is_evaluation_error(&self) -> bool {
        self.0 >= 200 && self.0 < 300
    }

    pub const fn is_system_error(&self) -> bool {
        self.0 >= 400 && self.0 < 500
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MQL{:04}", self.0)
    }
}

#[derive(Debug, Clone)]
pub struct ErrorInfo {
    pub description: &'static str,
    pub help: Option<&'static str>,
}

impl ErrorInfo {
    const fn new(description: &'static str) -> Self {
        Self {
            description,
            help: None,
        }
    }

    const fn with_help(mut self, help: &'static str) -> Self {
        self.help = Some(help);
        self
    }
}

static UNKNOWN_ERROR: ErrorInfo = ErrorInfo::new("Unknown error");

static ERROR_INFO: LazyLock<HashMap<u16, ErrorInfo>> = LazyLock::new(|| {
    let mut map = HashMap::new();

    // Syntax
    map.insert(1, ErrorInfo::new("Unexpected token"));
    map.insert(2, ErrorInfo::new("Unexpected end of input"));
    map.insert(3, ErrorInfo::new("Unexpected character"));
    map.insert(4, ErrorInfo::new("Invalid number literal"));
    map.insert(5, ErrorInfo::new("Invalid string escape sequence"));
    map.insert(6, ErrorInfo::new("Unterminated string or identifier"));
    map.insert(7, ErrorInfo::new("Invalid date/time literal"));
    map.insert(8, ErrorInfo::new("Missing closing delimiter"));
    map.insert(9, ErrorInfo::new("Expected expression"));
    map.insert(10, ErrorInfo::new("Expected identifier"));
    map.insert(11, ErrorInfo::new("Expected type specifier"));
    map.insert(12, ErrorInfo::new("Invalid declaration"));
    map.insert(13, ErrorInfo::new("Invalid query expression"));
    map.insert(14, ErrorInfo::new("Invalid retrieve expression"));
    map.insert(15, ErrorInfo::new("Construct not allowed in path expressions")
        .with_help("Queries, retrieves and timing phrases need the library grammar"));
    map.insert(16, ErrorInfo::new("Unterminated comment"));
    map.insert(17, ErrorInfo::new("Expression nested too deeply")
        .with_help("Split the expression into separate definitions"));

    // Semantic / link
    map.insert(100, ErrorInfo::new("Duplicate definition"));
    map.insert(101, ErrorInfo::new("Library not found")
        .with_help("Check the library search paths and the requested version"));
    map.insert(102, ErrorInfo::new("Circular include"));
    map.insert(103, ErrorInfo::new("Library version mismatch"));
    map.insert(104, ErrorInfo::new("Duplicate include alias"));

    // Evaluation
    map.insert(200, ErrorInfo::new("Evaluation failed"));
    map.insert(201, ErrorInfo::new("Undefined reference")
        .with_help("Check that the name is defined in this library or an included one"));
    map.insert(202, ErrorInfo::new("Undefined function"));
    map.insert(203, ErrorInfo::new("Type error"));
    map.insert(204, ErrorInfo::new("Cardinality error"));
    map.insert(205, ErrorInfo::new("Recursion limit exceeded"));
    map.insert(206, ErrorInfo::new("Data source failure"));
    map.insert(207, ErrorInfo::new("Plugin function failed"));
    map.insert(208, ErrorInfo::new("Invalid regular expression"));

    // System / interchange
    map.insert(400, ErrorInfo::new("Internal error"));
    map.insert(401, ErrorInfo::new("I/O error"));
    map.insert(402, ErrorInfo::new("Invalid interchange document"));
    map.insert(403, ErrorInfo::new("Missing interchange field"));
    map.insert(404, ErrorInfo::new("Unknown interchange node type"));

    map
});

// Syntax
pub const MQL0001: ErrorCode = ErrorCode::new(1);
pub const MQL0002: ErrorCode = ErrorCode::new(2);
pub const MQL0003: ErrorCode = ErrorCode::new(3);
pub const MQL0004: ErrorCode = ErrorCode::new(4);
pub const MQL0005: ErrorCode = ErrorCode::new(5);
pub const MQL0006: ErrorCode = ErrorCode::new(6);
pub const MQL0007: ErrorCode = ErrorCode::new(7);
pub const MQL0008: ErrorCode = ErrorCode::new(8);
pub const MQL0009: ErrorCode = ErrorCode::new(9);
pub const MQL0010: ErrorCode = ErrorCode::new(10);
pub const MQL0011: ErrorCode = ErrorCode::new(11);
pub const MQL0012: ErrorCode = ErrorCode::new(12);
pub const MQL0013: ErrorCode = ErrorCode::new(13);
pub const MQL0014: ErrorCode = ErrorCode::new(14);
pub const MQL0015: ErrorCode = ErrorCode::new(15);
pub const MQL0016: ErrorCode = ErrorCode::new(16);
pub const MQL0017: ErrorCode = ErrorCode::new(17);

// Semantic / link
pub const MQL0100: ErrorCode = ErrorCode::new(100);
pub const MQL0101: ErrorCode = ErrorCode::new(101);
pub const MQL0102: ErrorCode = ErrorCode::new(102);
pub const MQL0103: ErrorCode = ErrorCode::new(103);
pub const MQL0104: ErrorCode = ErrorCode::new(104);

// Evaluation
pub const MQL0200: ErrorCode = ErrorCode::new(200);
pub const MQL0201: ErrorCode = ErrorCode::new(201);
pub const MQL0202: ErrorCode = ErrorCode::new(202);
pub const MQL0203: ErrorCode = ErrorCode::new(203);
pub const MQL0204: ErrorCode = ErrorCode::new(204);
pub const MQL0205: ErrorCode = ErrorCode::new(205);
pub const MQL0206: ErrorCode = ErrorCode::new(206);
pub const MQL0207: ErrorCode = ErrorCode::new(207);
pub const MQL0208: ErrorCode = ErrorCode::new(208);

// System / interchange
pub const MQL0400: ErrorCode = ErrorCode::new(400);
pub const MQL0401: ErrorCode = ErrorCode::new(401);
pub const MQL0402: ErrorCode = ErrorCode::new(402);
pub const MQL0403: ErrorCode = ErrorCode::new(403);
pub const MQL0404: ErrorCode = ErrorCode::new(404);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_code_display() {
        assert_eq!(MQL0001.to_string(), "MQL0001");
        assert_eq!(MQL0205.to_string(), "MQL0205");
    }

    #[test]
    fn test_error_categories() {
        assert!(MQL0007.is_syntax_error());
        assert!(MQL0102.is_semantic_error());
        assert!(MQL0204.is_evaluation_error());
        assert!(MQL0403.is_system_error());
        assert!(!MQL0204.is_syntax_error());
    }

    #[test]
    fn test_error_info() {
        assert_eq!(MQL0102.info().description, "Circular include");
        assert_eq!(ErrorCode::new(999).info().description, "Unknown error");
    }
}
