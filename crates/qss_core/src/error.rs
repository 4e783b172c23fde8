//! Error type for the integration core.
//!
//! Every failure inside the core is an invariant violation: the model is
//! mathematically inconsistent (or was driven out of protocol order) and the
//! run cannot meaningfully continue. Degenerate numerics such as a zero
//! leading coefficient are *not* errors; they surface as `f64::INFINITY`.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum QssError {
    #[error("invariant violation in `{variable}`: {detail}")]
    InvariantViolation { variable: String, detail: String },
}

impl QssError {
    pub fn invariant(variable: impl Into<String>, detail: impl Into<String>) -> Self {
        QssError::InvariantViolation {
            variable: variable.into(),
            detail: detail.into(),
        }
    }

    /// Name of the variable whose invariant failed.
    pub fn variable(&self) -> &str {
        match self {
            QssError::InvariantViolation { variable, .. } => variable,
        }
    }
}

pub type QssResult<T> = std::result::Result<T, QssError>;
