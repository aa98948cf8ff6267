//! cmek-convergence: waits for a table's key status to converge.
//!
//! Right after a CMEK table is created, its per-cluster key status reads
//! `UNKNOWN` and only turns `OK` after an unbounded delay. This crate
//! polls the control plane on a finite backoff schedule until the status
//! is `OK` or the schedule runs out.
//!
//! # Components
//!
//! - **`schedule`**: the finite, ordered list of waits between attempts
//! - **`tracker`**: the `Pending` → `Converged` state machine; a pure
//!   `step(observation) -> NextAction` with no I/O and no clock
//! - **`poller`**: drives the tracker against an `AdminClient`, sleeping
//!   through an injected `Sleeper`
//!
//! ```text
//! fetch ──► step ──► Return            (status OK)
//!   ▲         ├────► Sleep(schedule[i]) (pending / fetch failed)
//!   └─────────┘└───► Fail              (last attempt, not OK)
//! ```

pub mod error;
pub mod poller;
pub mod schedule;
pub mod tracker;

pub use error::{ConvergenceError, ConvergenceResult};
pub use poller::{ConvergencePoller, PollOutcome, RecordingSleeper, Sleeper, TokioSleeper};
pub use schedule::BackoffSchedule;
pub use tracker::{ConvergenceState, ConvergenceTracker, NextAction, Observation};
