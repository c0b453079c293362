//! Evaluation errors
//!
//! Anything that is merely absent or indeterminate evaluates to Null. The
//! variants here are the hard failures: unknown names, operands of the wrong
//! type, cardinality violations and failures of the evaluation machinery
//! itself (recursion limit, data source, plugins).

use crate::retrieve::DataSourceError;
use medql_diagnostics::{
    ErrorCode, MQL0200, MQL0201, MQL0202, MQL0203, MQL0204, MQL0205, MQL0206, MQL0207, MQL0208, MedqlError,
};
use medql_types::ValueError;
use std::fmt;
use thiserror::Error;

/// Result type for evaluation operations
pub type EvalResult<T> = Result<T, EvalError>;

/// Caller-facing classification of an [`EvalError`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Unknown definition, function, parameter or library
    Reference,
    /// Operand of a type the operator does not accept
    Type,
    /// A single item was required but the collection had several
    Cardinality,
    /// Recursion limit, data source or plugin failure and similar
    Evaluation,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Reference => "ReferenceError",
            Self::Type => "TypeError",
            Self::Cardinality => "CardinalityError",
            Self::Evaluation => "EvaluationError",
        })
    }
}

#[derive(Debug, Clone, Error)]
pub enum EvalError {
    #[error("Undefined reference: {name}")]
    UndefinedReference { name: String },

    #[error("Undefined function: {name} with {arity} argument(s)")]
    UndefinedFunction { name: String, arity: usize },

    #[error("Undefined library alias: {alias}")]
    UndefinedLibrary { alias: String },

    #[error("Type error in {operator}: {message}")]
    TypeError { operator: String, message: String },

    #[error("Cannot cast {from} to {to}")]
    InvalidCast { from: String, to: String },

    #[error("Cardinality error: {message}")]
    Cardinality { message: String },

    #[error("Recursion limit of {limit} exceeded ({what})")]
    RecursionLimit { limit: usize, what: &'static str },

    #[error("Circular reference to definition '{name}'")]
    CircularDefinition { name: String },

    #[error("Data source failure: {0}")]
    DataSource(#[from] DataSourceError),

    #[error("Plugin function '{name}' failed: {message}")]
    Plugin { name: String, message: String },

    #[error("Invalid regular expression '{pattern}': {message}")]
    InvalidRegex { pattern: String, message: String },

    #[error("{message}")]
    Message { code: String, message: String },

    #[error("{0}")]
    Compile(#[from] MedqlError),

    #[error("Evaluation failed: {message}")]
    Evaluation { message: String },

    #[error("in definition '{definition}': {source}")]
    InDefinition {
        definition: String,
        #[source]
        source: Box<EvalError>,
    },
}

impl EvalError {
    pub fn undefined_reference(name: impl Into<String>) -> Self {
        Self::UndefinedReference { name: name.into() }
    }

    pub fn undefined_function(name: impl Into<String>, arity: usize) -> Self {
        Self::UndefinedFunction {
            name: name.into(),
            arity,
        }
    }

    pub fn type_error(operator: impl Into<String>, message: impl Into<String>) -> Self {
        Self::TypeError {
            operator: operator.into(),
            message: message.into(),
        }
    }

    /// Operator applied to operands it has no overload for
    pub fn unsupported(operator: impl Into<String>, operands: &[&str]) -> Self {
        Self::type_error(operator, format!("not defined for ({})", operands.join(", ")))
    }

    pub fn cardinality(message: impl Into<String>) -> Self {
        Self::Cardinality {
            message: message.into(),
        }
    }

    pub fn evaluation(message: impl Into<String>) -> Self {
        Self::Evaluation {
            message: message.into(),
        }
    }

    pub fn plugin(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Plugin {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Attach the name of the definition being evaluated. Errors that
    /// already carry a definition keep the innermost one.
    pub fn in_definition(self, definition: impl Into<String>) -> Self {
        match self {
            Self::InDefinition { .. } => self,
            other => Self::InDefinition {
                definition: definition.into(),
                source: Box::new(other),
            },
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::UndefinedReference { .. } | Self::UndefinedFunction { .. } | Self::UndefinedLibrary { .. } => {
                ErrorKind::Reference
            }
            Self::TypeError { .. } | Self::InvalidCast { .. } => ErrorKind::Type,
            Self::Cardinality { .. } => ErrorKind::Cardinality,
            Self::InDefinition { source, .. } => source.kind(),
            Self::RecursionLimit { .. }
            | Self::CircularDefinition { .. }
            | Self::DataSource(_)
            | Self::Plugin { .. }
            | Self::InvalidRegex { .. }
            | Self::Message { .. }
            | Self::Compile(_)
            | Self::Evaluation { .. } => ErrorKind::Evaluation,
        }
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            Self::UndefinedReference { .. } | Self::UndefinedLibrary { .. } => MQL0201,
            Self::UndefinedFunction { .. } => MQL0202,
            Self::TypeError { .. } | Self::InvalidCast { .. } => MQL0203,
            Self::Cardinality { .. } => MQL0204,
            Self::RecursionLimit { .. } => MQL0205,
            Self::DataSource(_) => MQL0206,
            Self::Plugin { .. } => MQL0207,
            Self::InvalidRegex { .. } => MQL0208,
            Self::Compile(e) => e.code(),
            Self::InDefinition { source, .. } => source.code(),
            Self::CircularDefinition { .. } | Self::Message { .. } | Self::Evaluation { .. } => MQL0200,
        }
    }

    /// Name of the outermost definition the error was raised in
    pub fn definition(&self) -> Option<&str> {
        match self {
            Self::InDefinition { definition, .. } => Some(definition),
            _ => None,
        }
    }
}

impl From<ValueError> for EvalError {
    fn from(err: ValueError) -> Self {
        match err {
            ValueError::Incomparable { left, right } => {
                Self::type_error("comparison", format!("cannot compare {left} with {right}"))
            }
            ValueError::UnsupportedOperand { op, operand } => Self::unsupported(op, &[&operand]),
            ValueError::InvalidCast { from, to } => Self::InvalidCast { from, to },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_follows_wrapped_error() {
        let err = EvalError::cardinality("3 items").in_definition("Single Encounter");
        assert_eq!(err.kind(), ErrorKind::Cardinality);
        assert_eq!(err.code(), MQL0204);
        assert_eq!(err.definition(), Some("Single Encounter"));
        assert_eq!(err.to_string(), "in definition 'Single Encounter': Cardinality error: 3 items");
    }

    #[test]
    fn test_innermost_definition_is_kept() {
        let err = EvalError::undefined_reference("X").in_definition("Inner").in_definition("Outer");
        assert_eq!(err.definition(), Some("Inner"));
        assert_eq!(err.kind(), ErrorKind::Reference);
    }

    #[test]
    fn test_value_error_maps_to_type_error() {
        let err: EvalError = ValueError::incomparable("Integer", "String").into();
        assert_eq!(err.kind(), ErrorKind::Type);
    }

    #[test]
    fn test_recursion_limit_code() {
        let err = EvalError::RecursionLimit {
            limit: 4,
            what: "function calls",
        };
        assert_eq!(err.code(), MQL0205);
        assert_eq!(err.kind(), ErrorKind::Evaluation);
    }
}
