//! JSON interchange format for medql
//!
//! A second serialized form of the one medql AST. The printer maps a parsed
//! library or expression to a JSON node graph where every expression node
//! carries a `"type"` discriminator. The loader validates that graph and
//! rebuilds the AST, so an interchange document evaluates exactly like the
//! source text it was printed from.
//!
//! ```
//! use medql_ast::{Expression, Literal, Spanned};
//!
//! let expr = Spanned::synthetic(Expression::Literal(Literal::Integer(7)));
//! let json = medql_elm::expression_to_json(&expr);
//! let back = medql_elm::expression_from_json(&json).unwrap();
//! assert_eq!(back.inner, expr.inner);
//! ```

pub mod loader;
pub mod model;
pub mod printer;

pub use loader::{load_expression, load_library};
pub use model::*;
pub use printer::{print_expression, print_library};

use medql_ast::{Expression, Library, Spanned};
use medql_diagnostics::{MQL0400, MQL0402, MedqlError};
use serde_json::Value;

/// Library as an interchange JSON value
pub fn library_to_json(library: &Library) -> Result<Value, MedqlError> {
    serde_json::to_value(print_library(library)).map_err(|e| MedqlError::system(MQL0400, e.to_string()))
}

/// Library as interchange JSON text
pub fn library_to_string(library: &Library, pretty: bool) -> Result<String, MedqlError> {
    let document = print_library(library);
    let text = if pretty {
        serde_json::to_string_pretty(&document)
    } else {
        serde_json::to_string(&document)
    };
    text.map_err(|e| MedqlError::system(MQL0400, e.to_string()))
}

pub fn library_from_json(value: &Value) -> Result<Library, MedqlError> {
    load_library(value)
}

pub fn library_from_str(text: &str) -> Result<Library, MedqlError> {
    let value: Value = serde_json::from_str(text).map_err(|e| MedqlError::interchange(MQL0402, e.to_string(), "$"))?;
    load_library(&value)
}

pub fn expression_to_json(expr: &Spanned<Expression>) -> Value {
    print_expression(expr)
}

pub fn expression_from_json(value: &Value) -> Result<Spanned<Expression>, MedqlError> {
    load_expression(value, "$")
}
