//! Diagnostics for medql
//!
//! Spans, line/column resolution, numbered error codes and the error types
//! produced by the parser, the library linker and the interchange loader.

mod error;
mod error_code;
mod span;

pub use error::*;
pub use error_code::*;
pub use span::*;

/// Result type for compile and link operations
pub type Result<T> = std::result::Result<T, MedqlError>;
