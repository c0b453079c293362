use thiserror::Error;

/// Errors raised by operations on values
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValueError {
    #[error("cannot compare {left} with {right}")]
    Incomparable { left: String, right: String },

    #[error("operator '{op}' is not defined for {operand}")]
    UnsupportedOperand { op: String, operand: String },

    #[error("cannot cast {from} to {to}")]
    InvalidCast { from: String, to: String },
}

impl ValueError {
    pub fn incomparable(left: &str, right: &str) -> Self {
        Self::Incomparable {
            left: left.to_string(),
            right: right.to_string(),
        }
    }

    pub fn unsupported(op: impl Into<String>, operand: &str) -> Self {
        Self::UnsupportedOperand {
            op: op.into(),
            operand: operand.to_string(),
        }
    }
}

pub type ValueResult<T> = std::result::Result<T, ValueError>;
