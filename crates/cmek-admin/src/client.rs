//! The admin client trait.

use async_trait::async_trait;

use cmek_model::{Backup, Cluster, ClusterSpec, EncryptionInfoMap, Instance, Table};

use crate::error::AdminResult;

/// Parameters of a backup creation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupRequest {
    pub cluster_id: String,
    pub backup_id: String,
    pub source_table_id: String,
    /// Unix timestamp (seconds). Must be in the future.
    pub expire_time: u64,
}

/// Create/get/delete calls against the control plane.
///
/// Every call completes (or fails) before returning; implementations
/// that front long-running operations wait for them.
#[async_trait]
pub trait AdminClient: Send + Sync {
    /// Create an instance together with its initial clusters.
    async fn create_instance(
        &self,
        instance_id: &str,
        clusters: &[ClusterSpec],
    ) -> AdminResult<Instance>;

    async fn get_cluster(&self, instance_id: &str, cluster_id: &str) -> AdminResult<Cluster>;

    /// Add a cluster to an existing instance.
    async fn create_cluster(&self, instance_id: &str, spec: &ClusterSpec) -> AdminResult<Cluster>;

    /// Delete an instance with all its clusters and tables.
    async fn delete_instance(&self, instance_id: &str) -> AdminResult<()>;

    async fn create_table(
        &self,
        instance_id: &str,
        table_id: &str,
        column_families: &[String],
    ) -> AdminResult<Table>;

    /// Per-cluster encryption metadata of a table, computed on every call.
    async fn get_encryption_info(
        &self,
        instance_id: &str,
        table_id: &str,
    ) -> AdminResult<EncryptionInfoMap>;

    async fn create_backup(&self, instance_id: &str, request: &BackupRequest)
    -> AdminResult<Backup>;

    async fn get_backup(
        &self,
        instance_id: &str,
        cluster_id: &str,
        backup_id: &str,
    ) -> AdminResult<Backup>;

    async fn delete_backup(
        &self,
        instance_id: &str,
        cluster_id: &str,
        backup_id: &str,
    ) -> AdminResult<()>;
}
