//! Backoff schedule between key-status fetches.

use std::time::Duration;

use crate::error::{ConvergenceError, ConvergenceResult};

/// Finite, ordered waits. Entry `i` is slept after attempt `i` fails,
/// except after the last attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackoffSchedule {
    steps: Vec<Duration>,
}

impl BackoffSchedule {
    /// Seconds between attempts. Key status has been seen to take about
    /// five minutes to populate.
    pub const DEFAULT_SECS: [u64; 8] = [5, 10, 50, 100, 150, 200, 250, 300];

    pub fn new(steps: Vec<Duration>) -> ConvergenceResult<Self> {
        if steps.is_empty() {
            return Err(ConvergenceError::EmptySchedule);
        }
        Ok(Self { steps })
    }

    pub fn from_secs(secs: &[u64]) -> ConvergenceResult<Self> {
        Self::new(secs.iter().copied().map(Duration::from_secs).collect())
    }

    /// Number of fetch attempts this schedule allows.
    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn get(&self, attempt: usize) -> Option<Duration> {
        self.steps.get(attempt).copied()
    }

    pub fn steps(&self) -> &[Duration] {
        &self.steps
    }
}

impl Default for BackoffSchedule {
    fn default() -> Self {
        Self {
            steps: Self::DEFAULT_SECS
                .iter()
                .copied()
                .map(Duration::from_secs)
                .collect(),
        }
    }
}
