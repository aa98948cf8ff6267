//! Convergence tracker: the key-status state machine.
//!
//! The tracker never touches the network or a clock. The poller feeds it
//! one observation per fetch and carries out the returned action.

use std::time::Duration;

use tracing::debug;

use cmek_model::StatusCode;

use crate::schedule::BackoffSchedule;

/// Convergence state of one (table, cluster) key status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConvergenceState {
    /// Status not yet seen as `OK`.
    Pending,
    /// Status seen as `OK`. Terminal.
    Converged,
}

/// Result of one fetch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Observation {
    /// The cluster's entry reported this status code.
    Status(StatusCode),
    /// The response had no entry for the cluster.
    Absent,
    /// The fetch itself failed with an API error.
    FetchFailed,
}

/// What the caller does next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NextAction {
    /// Converged; stop polling.
    Return,
    /// Wait, then fetch again.
    Sleep(Duration),
    /// Schedule exhausted without convergence.
    Fail,
}

/// Steps through a [`BackoffSchedule`] one observation at a time.
#[derive(Debug, Clone)]
pub struct ConvergenceTracker {
    schedule: BackoffSchedule,
    state: ConvergenceState,
    attempts: usize,
    exhausted: bool,
}

impl ConvergenceTracker {
    pub fn new(schedule: BackoffSchedule) -> Self {
        Self {
            schedule,
            state: ConvergenceState::Pending,
            attempts: 0,
            exhausted: false,
        }
    }

    pub fn state(&self) -> ConvergenceState {
        self.state
    }

    /// Observations consumed while pending.
    pub fn attempts(&self) -> usize {
        self.attempts
    }

    pub fn is_exhausted(&self) -> bool {
        self.exhausted
    }

    /// Record an observation and decide the next action.
    ///
    /// `Converged` and exhaustion are both sticky: later observations
    /// return `Return` or `Fail` again without consuming the schedule.
    pub fn step(&mut self, observation: Observation) -> NextAction {
        if self.state == ConvergenceState::Converged {
            return NextAction::Return;
        }
        if self.exhausted {
            return NextAction::Fail;
        }

        let index = self.attempts;
        self.attempts += 1;

        if observation == Observation::Status(StatusCode::Ok) {
            self.state = ConvergenceState::Converged;
            debug!(attempts = self.attempts, "key status converged");
            return NextAction::Return;
        }

        match self.schedule.get(index) {
            Some(delay) if self.attempts < self.schedule.len() => NextAction::Sleep(delay),
            _ => {
                self.exhausted = true;
                NextAction::Fail
            }
        }
    }
}
