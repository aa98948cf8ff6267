//! Errors returned by the admin API.

use cmek_model::StatusCode;
use thiserror::Error;

/// Result type alias for admin calls.
pub type AdminResult<T> = Result<T, AdminError>;

/// Structured errors from the control plane.
///
/// The rendered message starts with the canonical code, the way the
/// server reports it (`FAILED_PRECONDITION: ...`).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum AdminError {
    #[error("NOT_FOUND: {0}")]
    NotFound(String),

    #[error("FAILED_PRECONDITION: {0}")]
    FailedPrecondition(String),

    #[error("ALREADY_EXISTS: {0}")]
    AlreadyExists(String),

    #[error("UNAVAILABLE: {0}")]
    Unavailable(String),

    #[error("{code}: {message}")]
    Api { code: StatusCode, message: String },
}

impl AdminError {
    pub fn invalid_argument(message: impl Into<String>) -> Self {
        Self::Api {
            code: StatusCode::InvalidArgument,
            message: message.into(),
        }
    }

    /// Canonical status code of this error.
    pub fn code(&self) -> StatusCode {
        match self {
            AdminError::NotFound(_) => StatusCode::NotFound,
            AdminError::FailedPrecondition(_) => StatusCode::FailedPrecondition,
            AdminError::AlreadyExists(_) => StatusCode::AlreadyExists,
            AdminError::Unavailable(_) => StatusCode::Unavailable,
            AdminError::Api { code, .. } => *code,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.code() == StatusCode::NotFound
    }

    pub fn is_failed_precondition(&self) -> bool {
        self.code() == StatusCode::FailedPrecondition
    }
}
