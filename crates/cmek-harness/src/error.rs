//! Harness error types.

use cmek_admin::AdminError;
use cmek_convergence::ConvergenceError;
use thiserror::Error;

/// Errors that end a scenario.
#[derive(Debug, Error)]
pub enum HarnessError {
    #[error("configuration error: {0}")]
    Config(String),

    #[error("admin error: {0}")]
    Admin(#[from] AdminError),

    #[error("convergence error: {0}")]
    Convergence(#[from] ConvergenceError),

    #[error("assertion failed: {0}")]
    Assertion(String),

    /// A call that must be rejected was accepted.
    #[error("unexpected success: {0}")]
    UnexpectedSuccess(String),

    /// Metadata the harness has no expectation for.
    #[error("unhandled encryption state: {0}")]
    UnhandledState(String),
}

pub type HarnessResult<T> = Result<T, HarnessError>;

/// Return an [`HarnessError::Assertion`] unless `cond` holds.
macro_rules! ensure {
    ($cond:expr, $($arg:tt)+) => {
        if !$cond {
            return Err($crate::error::HarnessError::Assertion(format!($($arg)+)));
        }
    };
}

pub(crate) use ensure;
