//! Domain types for instances, clusters, tables, backups and their
//! encryption metadata.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

/// Identifier of an instance (unique within a project).
pub type InstanceId = String;

/// Identifier of a cluster (unique within an instance).
pub type ClusterId = String;

/// Identifier of a table (unique within an instance).
pub type TableId = String;

/// Identifier of a backup (unique within a cluster).
pub type BackupId = String;

/// Per-cluster encryption metadata of a table, keyed by cluster id.
///
/// Every observed sequence has exactly one element, but the contract does
/// not promise that, so the sequence is kept.
pub type EncryptionInfoMap = BTreeMap<ClusterId, Vec<EncryptionInfo>>;

/// Status message of a table whose key version has not been reported yet.
pub const KEY_VERSION_NOT_YET_KNOWN: &str = "Key version is not yet known.";

/// Status message every backup carries: its pinned version is never tracked.
pub const KEY_VERSION_NOT_TRACKED: &str = "Status of the associated key version is not tracked.";

// ── Status ─────────────────────────────────────────────────────────

/// Canonical status codes reported alongside a key version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StatusCode {
    Ok,
    Cancelled,
    Unknown,
    InvalidArgument,
    DeadlineExceeded,
    NotFound,
    AlreadyExists,
    PermissionDenied,
    ResourceExhausted,
    FailedPrecondition,
    Aborted,
    OutOfRange,
    Unimplemented,
    Internal,
    Unavailable,
    DataLoss,
    Unauthenticated,
}

impl StatusCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            StatusCode::Ok => "OK",
            StatusCode::Cancelled => "CANCELLED",
            StatusCode::Unknown => "UNKNOWN",
            StatusCode::InvalidArgument => "INVALID_ARGUMENT",
            StatusCode::DeadlineExceeded => "DEADLINE_EXCEEDED",
            StatusCode::NotFound => "NOT_FOUND",
            StatusCode::AlreadyExists => "ALREADY_EXISTS",
            StatusCode::PermissionDenied => "PERMISSION_DENIED",
            StatusCode::ResourceExhausted => "RESOURCE_EXHAUSTED",
            StatusCode::FailedPrecondition => "FAILED_PRECONDITION",
            StatusCode::Aborted => "ABORTED",
            StatusCode::OutOfRange => "OUT_OF_RANGE",
            StatusCode::Unimplemented => "UNIMPLEMENTED",
            StatusCode::Internal => "INTERNAL",
            StatusCode::Unavailable => "UNAVAILABLE",
            StatusCode::DataLoss => "DATA_LOSS",
            StatusCode::Unauthenticated => "UNAUTHENTICATED",
        }
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status of a key version: a code plus a human-readable qualifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Status {
    pub code: StatusCode,
    pub message: String,
}

impl Status {
    pub fn new(code: StatusCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// `OK` with an empty message.
    pub fn ok() -> Self {
        Self::new(StatusCode::Ok, "")
    }

    pub fn is_ok(&self) -> bool {
        self.code == StatusCode::Ok
    }
}

// ── Encryption info ────────────────────────────────────────────────

/// How a resource is encrypted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EncryptionType {
    EncryptionTypeUnspecified,
    GoogleDefaultEncryption,
    CustomerManagedEncryption,
}

/// Encryption metadata for one cluster's copy of a table, or for a backup.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EncryptionInfo {
    pub encryption_type: EncryptionType,
    /// Full resource name of the key version in use. Empty while unknown.
    pub kms_key_version: String,
    pub status: Status,
}

/// What a table's encryption info says about key-status convergence.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum KeyStatusShape {
    /// `UNKNOWN`, no version yet, the "not yet known" message.
    Transient,
    /// `OK`, version under the configured key, empty message.
    Converged,
    /// `OK` or `UNKNOWN`, but the accompanying fields break the invariant.
    Malformed(String),
    /// A code the harness has no expectation for.
    Unhandled(StatusCode),
}

impl EncryptionInfo {
    /// A CMEK table entry whose key version has not been reported yet.
    pub fn pending() -> Self {
        Self {
            encryption_type: EncryptionType::CustomerManagedEncryption,
            kms_key_version: String::new(),
            status: Status::new(StatusCode::Unknown, KEY_VERSION_NOT_YET_KNOWN),
        }
    }

    /// A CMEK table entry after convergence.
    pub fn converged(kms_key_version: impl Into<String>) -> Self {
        Self {
            encryption_type: EncryptionType::CustomerManagedEncryption,
            kms_key_version: kms_key_version.into(),
            status: Status::ok(),
        }
    }

    /// A backup entry pinned to `kms_key_version`.
    pub fn pinned(kms_key_version: impl Into<String>) -> Self {
        Self {
            encryption_type: EncryptionType::CustomerManagedEncryption,
            kms_key_version: kms_key_version.into(),
            status: Status::new(StatusCode::Unknown, KEY_VERSION_NOT_TRACKED),
        }
    }

    pub fn is_customer_managed(&self) -> bool {
        self.encryption_type == EncryptionType::CustomerManagedEncryption
    }

    /// Classify a table observation against the configured key.
    pub fn classify(&self, kms_key_name: &str) -> KeyStatusShape {
        match self.status.code {
            StatusCode::Unknown => {
                if !self.kms_key_version.is_empty() {
                    KeyStatusShape::Malformed(format!(
                        "UNKNOWN status carries key version {:?}",
                        self.kms_key_version
                    ))
                } else if self.status.message != KEY_VERSION_NOT_YET_KNOWN {
                    KeyStatusShape::Malformed(format!(
                        "UNKNOWN status message is {:?}, expected {:?}",
                        self.status.message, KEY_VERSION_NOT_YET_KNOWN
                    ))
                } else {
                    KeyStatusShape::Transient
                }
            }
            StatusCode::Ok => {
                if !self.kms_key_version.starts_with(kms_key_name) {
                    KeyStatusShape::Malformed(format!(
                        "key version {:?} is not under key {kms_key_name}",
                        self.kms_key_version
                    ))
                } else if !self.status.message.is_empty() {
                    KeyStatusShape::Malformed(format!(
                        "OK status carries message {:?}",
                        self.status.message
                    ))
                } else {
                    KeyStatusShape::Converged
                }
            }
            other => KeyStatusShape::Unhandled(other),
        }
    }

    /// Whether this is a backup entry pinned under `kms_key_name`.
    ///
    /// Holds for the whole life of a backup; backups never converge.
    pub fn is_pinned_untracked(&self, kms_key_name: &str) -> bool {
        self.is_customer_managed()
            && self.status.code == StatusCode::Unknown
            && self.status.message == KEY_VERSION_NOT_TRACKED
            && !self.kms_key_version.is_empty()
            && self.kms_key_version.starts_with(kms_key_name)
    }
}

// ── Resources ──────────────────────────────────────────────────────

/// Storage medium of a cluster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StorageType {
    #[default]
    Ssd,
    Hdd,
}

/// Requested shape of a cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterSpec {
    pub id: ClusterId,
    pub zone: String,
    pub serve_nodes: u32,
    pub storage_type: StorageType,
    /// Key protecting the cluster. Immutable once the cluster exists.
    pub kms_key_name: Option<String>,
}

impl ClusterSpec {
    /// A cluster protected by `kms_key_name`.
    pub fn cmek(
        id: impl Into<String>,
        zone: impl Into<String>,
        serve_nodes: u32,
        storage_type: StorageType,
        kms_key_name: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            zone: zone.into(),
            serve_nodes,
            storage_type,
            kms_key_name: Some(kms_key_name.into()),
        }
    }
}

/// A cluster as reported by the control plane.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cluster {
    pub id: ClusterId,
    pub instance_id: InstanceId,
    pub zone: String,
    pub serve_nodes: u32,
    pub storage_type: StorageType,
    pub kms_key_name: Option<String>,
}

impl Cluster {
    pub fn from_spec(instance_id: &str, spec: &ClusterSpec) -> Self {
        Self {
            id: spec.id.clone(),
            instance_id: instance_id.to_string(),
            zone: spec.zone.clone(),
            serve_nodes: spec.serve_nodes,
            storage_type: spec.storage_type,
            kms_key_name: spec.kms_key_name.clone(),
        }
    }
}

/// A top-level container of clusters and tables.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Instance {
    pub id: InstanceId,
    pub clusters: Vec<ClusterId>,
    /// Unix timestamp (seconds) of creation.
    pub created_at: u64,
}

/// A table. Carries no key configuration; encryption comes from the
/// clusters of its instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Table {
    pub id: TableId,
    pub instance_id: InstanceId,
    pub column_families: Vec<String>,
    pub created_at: u64,
}

/// A backup of a table, living on one cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Backup {
    pub id: BackupId,
    pub cluster_id: ClusterId,
    pub source_table_id: TableId,
    /// Unix timestamp (seconds) after which the backup is deleted.
    pub expire_time: u64,
    /// Fixed when the backup is taken.
    pub encryption_info: EncryptionInfo,
}

/// Current unix time in seconds.
pub fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
