//! Convergence error types.

use thiserror::Error;

/// Errors raised while waiting for key status.
#[derive(Debug, Error)]
pub enum ConvergenceError {
    #[error("backoff schedule must have at least one step")]
    EmptySchedule,

    /// The schedule ran out before the status reached `OK`.
    #[error(
        "key status for table {table_id} on cluster {cluster_id} did not converge after {attempts} attempts"
    )]
    Timeout {
        table_id: String,
        cluster_id: String,
        attempts: usize,
    },

    /// The control plane reported a shape the poller has no rule for.
    #[error("unhandled encryption state: {0}")]
    UnhandledState(String),
}

pub type ConvergenceResult<T> = Result<T, ConvergenceError>;
