//! medql: a clinical expression language for Rust
//!
//! This crate bundles the medql toolchain:
//! - Parsing path expressions and libraries
//! - Compiling libraries with include resolution
//! - JSON interchange output and input
//! - Evaluation against resources, subjects and data sources
//!
//! # Example
//!
//! ```
//! use serde_json::json;
//!
//! let patient = json!({
//!     "resourceType": "Patient",
//!     "name": [{ "given": ["Ada", "King"] }]
//! });
//! let given = medql::evaluate_path("name.given.first()", &patient).unwrap();
//! assert_eq!(given.to_string(), "{'Ada'}");
//! ```

pub use medql_ast as ast;
pub use medql_diagnostics as diagnostics;
pub use medql_elm as elm;
pub use medql_eval as eval;
pub use medql_parser as parser;
pub use medql_types as types;

pub use medql_ast::{Expression, Library};
pub use medql_diagnostics::{MedqlError, Result};
pub use medql_eval::{Engine, EvalError, EvalResult, EvaluationContext, LibraryManager};
pub use medql_parser::{parse_expression, parse_library, parse_path};
pub use medql_types::Value;

#[cfg(feature = "cli")]
pub mod cli;

/// Evaluate a path expression against a JSON resource
pub fn evaluate_path(expression: &str, resource: &serde_json::Value) -> EvalResult<Value> {
    Engine::new().evaluate_path(expression, &Value::from_json(resource))
}
