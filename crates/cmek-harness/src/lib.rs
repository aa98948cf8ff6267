//! cmek-harness: drives CMEK lifecycle scenarios against a control plane.
//!
//! Sequences resource creation (instance with CMEK clusters, table,
//! backup), waits for key-status convergence when asked to, and checks
//! the encryption metadata that comes back.
//!
//! # Architecture
//!
//! ```text
//! Harness
//!   ├── HarnessConfig (key, zones, wait toggle, backoff; read-only)
//!   ├── AdminClient (create / get / delete calls)
//!   ├── ConvergencePoller (optional wait for key status OK)
//!   └── Scenarios
//!       ├── instance-cluster → key reported per cluster, cross-region rejected
//!       ├── table            → one entry per cluster, transient or converged
//!       └── backup           → pinned version, status never tracked
//! ```
//!
//! Every scenario owns a uniquely named instance, so scenarios can run
//! concurrently (see [`run_suite`]). Teardown runs after every scenario,
//! whether it passed or not.

pub mod config;
pub mod error;
pub mod orchestrator;
pub mod scenario;

pub use config::HarnessConfig;
pub use error::{HarnessError, HarnessResult};
pub use orchestrator::{Harness, run_suite};
pub use scenario::{Findings, ScenarioIds, ScenarioKind, ScenarioReport, Verdict};
