//! InMemoryControlPlane: an in-process control plane.
//!
//! Holds instances, clusters, tables and backups behind an
//! `Arc<RwLock<..>>`, so clones share state and can be handed to
//! concurrent scenarios.
//!
//! Key status of a table converges after a configurable number of
//! encryption-info reads rather than after wall-clock time, and a number
//! of transient `UNAVAILABLE` failures can be injected ahead of them.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::RwLock;
use tracing::{debug, info};

use cmek_model::names::location_name;
use cmek_model::*;

use crate::client::{AdminClient, BackupRequest};
use crate::error::{AdminError, AdminResult};

/// Primary version of every key; backups pin to it.
const PRIMARY_KEY_VERSION: u32 = 1;

/// Tunables of the simulated control plane.
#[derive(Debug, Clone, Copy, Default)]
struct PlaneBehavior {
    /// Encryption-info reads per table that still report `UNKNOWN`.
    convergence_reads: u32,
    /// `UNAVAILABLE` failures per table before any read succeeds.
    transient_failures: u32,
}

struct TableRecord {
    table: Table,
    /// Successful encryption-info reads so far.
    reads: u32,
    /// Remaining injected failures.
    failures_left: u32,
}

struct InstanceRecord {
    clusters: BTreeMap<ClusterId, Cluster>,
    tables: BTreeMap<TableId, TableRecord>,
    backups: BTreeMap<(ClusterId, BackupId), Backup>,
}

#[derive(Default)]
struct PlaneState {
    instances: BTreeMap<InstanceId, InstanceRecord>,
}

/// Thread-safe in-memory control plane.
#[derive(Clone)]
pub struct InMemoryControlPlane {
    project_id: String,
    behavior: PlaneBehavior,
    state: Arc<RwLock<PlaneState>>,
}

impl InMemoryControlPlane {
    /// Create an empty control plane for `project_id`.
    pub fn new(project_id: &str) -> Self {
        Self {
            project_id: project_id.to_string(),
            behavior: PlaneBehavior::default(),
            state: Arc::new(RwLock::new(PlaneState::default())),
        }
    }

    /// Tables report `UNKNOWN` for their first `reads` encryption-info reads.
    pub fn with_convergence_reads(mut self, reads: u32) -> Self {
        self.behavior.convergence_reads = reads;
        self
    }

    /// Each table fails its first `failures` encryption-info reads.
    pub fn with_transient_failures(mut self, failures: u32) -> Self {
        self.behavior.transient_failures = failures;
        self
    }

    /// Whether the instance currently exists.
    pub async fn has_instance(&self, instance_id: &str) -> bool {
        self.state.read().await.instances.contains_key(instance_id)
    }

    /// Whether the backup currently exists.
    pub async fn has_backup(&self, instance_id: &str, cluster_id: &str, backup_id: &str) -> bool {
        let state = self.state.read().await;
        state.instances.get(instance_id).is_some_and(|rec| {
            rec.backups
                .contains_key(&(cluster_id.to_string(), backup_id.to_string()))
        })
    }

    /// Number of instances currently alive.
    pub async fn instance_count(&self) -> usize {
        self.state.read().await.instances.len()
    }

    /// Reject a key that cannot protect a cluster in `spec.zone`.
    fn check_key_placement(&self, spec: &ClusterSpec) -> AdminResult<()> {
        let Some(key_name) = &spec.kms_key_name else {
            return Ok(());
        };
        let key = KmsKeyName::parse(key_name)
            .map_err(|e| AdminError::invalid_argument(e.to_string()))?;
        if key.covers_zone(&spec.zone) {
            return Ok(());
        }
        Err(AdminError::FailedPrecondition(format!(
            "Error in field 'cluster' : Error in field 'encryption_config.kms_key_name' : \
             CMEK key {key_name} cannot be used to protect a cluster in zone {}",
            location_name(&self.project_id, &spec.zone)
        )))
    }

    fn key_version_of(&self, cluster: &Cluster) -> Option<String> {
        let key = KmsKeyName::parse(cluster.kms_key_name.as_deref()?).ok()?;
        Some(key.version_name(PRIMARY_KEY_VERSION))
    }
}

fn instance_not_found(instance_id: &str) -> AdminError {
    AdminError::NotFound(format!("instance {instance_id} not found"))
}

fn google_default() -> EncryptionInfo {
    EncryptionInfo {
        encryption_type: EncryptionType::GoogleDefaultEncryption,
        kms_key_version: String::new(),
        status: Status::ok(),
    }
}

#[async_trait]
impl AdminClient for InMemoryControlPlane {
    async fn create_instance(
        &self,
        instance_id: &str,
        clusters: &[ClusterSpec],
    ) -> AdminResult<Instance> {
        if clusters.is_empty() {
            return Err(AdminError::invalid_argument(
                "an instance needs at least one cluster",
            ));
        }
        for spec in clusters {
            self.check_key_placement(spec)?;
        }

        let mut state = self.state.write().await;
        if state.instances.contains_key(instance_id) {
            return Err(AdminError::AlreadyExists(format!(
                "instance {instance_id} already exists"
            )));
        }

        let instance = Instance {
            id: instance_id.to_string(),
            clusters: clusters.iter().map(|c| c.id.clone()).collect(),
            created_at: epoch_secs(),
        };
        let record = InstanceRecord {
            clusters: clusters
                .iter()
                .map(|spec| (spec.id.clone(), Cluster::from_spec(instance_id, spec)))
                .collect(),
            tables: BTreeMap::new(),
            backups: BTreeMap::new(),
        };
        state.instances.insert(instance_id.to_string(), record);
        info!(%instance_id, clusters = clusters.len(), "instance created");
        Ok(instance)
    }

    async fn get_cluster(&self, instance_id: &str, cluster_id: &str) -> AdminResult<Cluster> {
        let state = self.state.read().await;
        let rec = state
            .instances
            .get(instance_id)
            .ok_or_else(|| instance_not_found(instance_id))?;
        rec.clusters.get(cluster_id).cloned().ok_or_else(|| {
            AdminError::NotFound(format!("cluster {instance_id}/{cluster_id} not found"))
        })
    }

    async fn create_cluster(&self, instance_id: &str, spec: &ClusterSpec) -> AdminResult<Cluster> {
        self.check_key_placement(spec)?;

        let mut state = self.state.write().await;
        let rec = state
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| instance_not_found(instance_id))?;
        if rec.clusters.contains_key(&spec.id) {
            return Err(AdminError::AlreadyExists(format!(
                "cluster {instance_id}/{} already exists",
                spec.id
            )));
        }

        let cluster = Cluster::from_spec(instance_id, spec);
        rec.clusters.insert(spec.id.clone(), cluster.clone());
        info!(%instance_id, cluster_id = %spec.id, zone = %spec.zone, "cluster created");
        Ok(cluster)
    }

    async fn delete_instance(&self, instance_id: &str) -> AdminResult<()> {
        let mut state = self.state.write().await;
        match state.instances.remove(instance_id) {
            Some(rec) => {
                info!(
                    %instance_id,
                    clusters = rec.clusters.len(),
                    tables = rec.tables.len(),
                    "instance deleted"
                );
                Ok(())
            }
            None => Err(instance_not_found(instance_id)),
        }
    }

    async fn create_table(
        &self,
        instance_id: &str,
        table_id: &str,
        column_families: &[String],
    ) -> AdminResult<Table> {
        let mut state = self.state.write().await;
        let rec = state
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| instance_not_found(instance_id))?;
        if rec.tables.contains_key(table_id) {
            return Err(AdminError::AlreadyExists(format!(
                "table {instance_id}/{table_id} already exists"
            )));
        }

        let table = Table {
            id: table_id.to_string(),
            instance_id: instance_id.to_string(),
            column_families: column_families.to_vec(),
            created_at: epoch_secs(),
        };
        rec.tables.insert(
            table_id.to_string(),
            TableRecord {
                table: table.clone(),
                reads: 0,
                failures_left: self.behavior.transient_failures,
            },
        );
        debug!(%instance_id, %table_id, "table created");
        Ok(table)
    }

    async fn get_encryption_info(
        &self,
        instance_id: &str,
        table_id: &str,
    ) -> AdminResult<EncryptionInfoMap> {
        let mut state = self.state.write().await;
        let rec = state
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| instance_not_found(instance_id))?;
        let table = rec.tables.get_mut(table_id).ok_or_else(|| {
            AdminError::NotFound(format!("table {instance_id}/{table_id} not found"))
        })?;

        if table.failures_left > 0 {
            table.failures_left -= 1;
            return Err(AdminError::Unavailable(format!(
                "encryption info for table {} is temporarily unavailable",
                table.table.id
            )));
        }

        table.reads += 1;
        let converged = table.reads > self.behavior.convergence_reads;

        let infos = rec
            .clusters
            .values()
            .map(|cluster| {
                let info = match self.key_version_of(cluster) {
                    Some(version) if converged => EncryptionInfo::converged(version),
                    Some(_) => EncryptionInfo::pending(),
                    None => google_default(),
                };
                (cluster.id.clone(), vec![info])
            })
            .collect();
        Ok(infos)
    }

    async fn create_backup(
        &self,
        instance_id: &str,
        request: &BackupRequest,
    ) -> AdminResult<Backup> {
        if request.expire_time <= epoch_secs() {
            return Err(AdminError::invalid_argument(
                "backup expire time must be in the future",
            ));
        }

        let mut state = self.state.write().await;
        let rec = state
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| instance_not_found(instance_id))?;
        let cluster = rec.clusters.get(&request.cluster_id).ok_or_else(|| {
            AdminError::NotFound(format!(
                "cluster {instance_id}/{} not found",
                request.cluster_id
            ))
        })?;
        if !rec.tables.contains_key(&request.source_table_id) {
            return Err(AdminError::NotFound(format!(
                "table {instance_id}/{} not found",
                request.source_table_id
            )));
        }

        let key = (request.cluster_id.clone(), request.backup_id.clone());
        if rec.backups.contains_key(&key) {
            return Err(AdminError::AlreadyExists(format!(
                "backup {}/{} already exists",
                request.cluster_id, request.backup_id
            )));
        }

        // Pinned to the key version that is primary right now.
        let encryption_info = match self.key_version_of(cluster) {
            Some(version) => EncryptionInfo::pinned(version),
            None => google_default(),
        };
        let backup = Backup {
            id: request.backup_id.clone(),
            cluster_id: request.cluster_id.clone(),
            source_table_id: request.source_table_id.clone(),
            expire_time: request.expire_time,
            encryption_info,
        };
        rec.backups.insert(key, backup.clone());
        info!(
            %instance_id,
            cluster_id = %request.cluster_id,
            backup_id = %request.backup_id,
            "backup created"
        );
        Ok(backup)
    }

    async fn get_backup(
        &self,
        instance_id: &str,
        cluster_id: &str,
        backup_id: &str,
    ) -> AdminResult<Backup> {
        let state = self.state.read().await;
        let rec = state
            .instances
            .get(instance_id)
            .ok_or_else(|| instance_not_found(instance_id))?;
        rec.backups
            .get(&(cluster_id.to_string(), backup_id.to_string()))
            .cloned()
            .ok_or_else(|| {
                AdminError::NotFound(format!("backup {cluster_id}/{backup_id} not found"))
            })
    }

    async fn delete_backup(
        &self,
        instance_id: &str,
        cluster_id: &str,
        backup_id: &str,
    ) -> AdminResult<()> {
        let mut state = self.state.write().await;
        let rec = state
            .instances
            .get_mut(instance_id)
            .ok_or_else(|| instance_not_found(instance_id))?;
        match rec
            .backups
            .remove(&(cluster_id.to_string(), backup_id.to_string()))
        {
            Some(_) => {
                debug!(%instance_id, %cluster_id, %backup_id, "backup deleted");
                Ok(())
            }
            None => Err(AdminError::NotFound(format!(
                "backup {cluster_id}/{backup_id} not found"
            ))),
        }
    }
}
