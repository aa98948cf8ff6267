//! cmek-admin: the control-plane surface the harness drives.
//!
//! [`AdminClient`] is the set of create/get/delete calls for instances,
//! clusters, tables and backups. The harness only ever talks to this
//! trait; transport, authentication and request retries belong to the
//! implementation.
//!
//! [`InMemoryControlPlane`] implements the trait in process. It keeps the
//! server-side rules the harness asserts on (key region vs. cluster zone,
//! eventually consistent key status, pinned backup versions, cascading
//! instance deletion) and is what tests and the sandbox runner use.

pub mod client;
pub mod error;
pub mod memory;

pub use client::{AdminClient, BackupRequest};
pub use error::{AdminError, AdminResult};
pub use memory::InMemoryControlPlane;
