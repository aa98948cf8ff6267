//! cmek-model: encryption metadata model for the CMEK harness.
//!
//! Plain data types describing the four resource kinds the harness
//! touches (instance, cluster, table, backup) and the per-cluster
//! encryption metadata the control plane reports for them.
//!
//! # Encryption status shapes
//!
//! ```text
//! table, freshly created     UNKNOWN  version=""            "Key version is not yet known."
//! table, converged           OK       version="{key}/..."   ""
//! backup, always             UNKNOWN  version="{key}/..."   "Status of the associated key version is not tracked."
//! ```
//!
//! All types are `serde`-serializable so scenario reports can carry
//! observed metadata verbatim.

pub mod names;
pub mod types;

pub use names::{KmsKeyName, NameError};
pub use types::*;
