//! Lifecycle orchestrator: runs scenarios against an admin client.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, error, info, warn};

use cmek_admin::{AdminClient, BackupRequest};
use cmek_convergence::{ConvergencePoller, Sleeper};
use cmek_model::names::location_name;
use cmek_model::*;

use crate::config::HarnessConfig;
use crate::error::{HarnessError, HarnessResult, ensure};
use crate::scenario::{COLUMN_FAMILY, Findings, ScenarioIds, ScenarioKind, ScenarioReport, Verdict};

/// Message the control plane gives when `kms_key_name` cannot protect a
/// cluster in `zone`.
pub fn expected_rejection(project_id: &str, kms_key_name: &str, zone: &str) -> String {
    format!(
        "FAILED_PRECONDITION: Error in field 'cluster' : \
         Error in field 'encryption_config.kms_key_name' : \
         CMEK key {kms_key_name} cannot be used to protect a cluster in zone {}",
        location_name(project_id, zone)
    )
}

/// Runs CMEK scenarios with one configuration and one client.
pub struct Harness<C: ?Sized> {
    config: Arc<HarnessConfig>,
    client: Arc<C>,
    poller: ConvergencePoller,
}

impl<C> Harness<C>
where
    C: AdminClient + ?Sized,
{
    /// Validate `config` and build a harness around `client`.
    pub fn new(
        config: HarnessConfig,
        client: Arc<C>,
        sleeper: Arc<dyn Sleeper>,
    ) -> HarnessResult<Self> {
        config.validate()?;
        let poller = ConvergencePoller::new(config.schedule()?, sleeper);
        Ok(Self {
            config: Arc::new(config),
            client,
            poller,
        })
    }

    /// Run `kind` under freshly generated resource ids.
    pub async fn run(&self, kind: ScenarioKind) -> ScenarioReport {
        let ids = ScenarioIds::new(&self.config.instance_prefix, kind, epoch_secs());
        self.run_with_ids(kind, &ids).await
    }

    /// Run `kind` under `ids`, then tear down whatever it created.
    pub async fn run_with_ids(&self, kind: ScenarioKind, ids: &ScenarioIds) -> ScenarioReport {
        let started = Instant::now();
        info!(scenario = %kind, instance_id = %ids.instance_id, "scenario started");

        let mut findings = Findings::default();
        let result = match kind {
            ScenarioKind::InstanceCluster => self.instance_and_cluster(ids, &mut findings).await,
            ScenarioKind::Table => self.table(ids, &mut findings).await,
            ScenarioKind::Backup => self.backup(ids, &mut findings).await,
        };

        self.teardown(ids).await;

        let verdict = match result {
            Ok(()) => {
                info!(scenario = %kind, instance_id = %ids.instance_id, "scenario passed");
                Verdict::Passed
            }
            Err(err) => {
                error!(scenario = %kind, instance_id = %ids.instance_id, error = %err, "scenario failed");
                Verdict::Failed {
                    reason: err.to_string(),
                }
            }
        };

        ScenarioReport {
            scenario: kind,
            instance_id: ids.instance_id.clone(),
            verdict,
            findings,
            duration_ms: u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Clusters created with the key in its region report that key; a
    /// cluster outside the region is refused.
    pub async fn instance_and_cluster(
        &self,
        ids: &ScenarioIds,
        findings: &mut Findings,
    ) -> HarnessResult<()> {
        let config = &self.config;

        self.client
            .create_instance(
                &ids.instance_id,
                &[self.cmek_cluster(&ids.cluster_id, &config.primary_zone)],
            )
            .await?;
        self.expect_cluster_key(&ids.instance_id, &ids.cluster_id)
            .await?;

        self.client
            .create_cluster(
                &ids.instance_id,
                &self.cmek_cluster(&ids.second_cluster_id, &config.primary_region_second_zone),
            )
            .await?;
        self.expect_cluster_key(&ids.instance_id, &ids.second_cluster_id)
            .await?;

        let rejected = self.cmek_cluster(&ids.rejected_cluster_id, &config.secondary_zone);
        match self.client.create_cluster(&ids.instance_id, &rejected).await {
            Ok(cluster) => Err(HarnessError::UnexpectedSuccess(format!(
                "cluster {} in zone {} was created with key {}",
                cluster.id, cluster.zone, config.kms_key_name
            ))),
            Err(err) if err.is_failed_precondition() => {
                let message = err.to_string();
                findings.rejection = Some(message.clone());
                let expected =
                    expected_rejection(&config.project_id, &config.kms_key_name, &config.secondary_zone);
                ensure!(
                    message.contains(&expected),
                    "rejection {message:?} does not contain {expected:?}"
                );
                debug!(zone = %config.secondary_zone, "cross-region cluster rejected");
                Ok(())
            }
            Err(err) => Err(err.into()),
        }
    }

    /// A table inherits the key from every cluster of its instance.
    pub async fn table(&self, ids: &ScenarioIds, findings: &mut Findings) -> HarnessResult<()> {
        let config = &self.config;
        let clusters = [
            self.cmek_cluster(&ids.cluster_id, &config.primary_zone),
            self.cmek_cluster(&ids.second_cluster_id, &config.primary_region_second_zone),
        ];

        self.client
            .create_instance(&ids.instance_id, &clusters)
            .await?;
        self.client
            .create_table(&ids.instance_id, &ids.table_id, &[COLUMN_FAMILY.to_string()])
            .await?;

        if config.wait_for_key_status {
            let outcome = self
                .poller
                .wait_for_key_status(
                    self.client.as_ref(),
                    &ids.instance_id,
                    &ids.table_id,
                    &ids.cluster_id,
                )
                .await?;
            findings.poll_attempts = Some(outcome.attempts);
        }

        let infos = self
            .client
            .get_encryption_info(&ids.instance_id, &ids.table_id)
            .await?;
        findings.cluster_entries = Some(infos.len());
        ensure!(
            infos.len() == clusters.len(),
            "expected {} encryption entries (one per cluster), got {}",
            clusters.len(),
            infos.len()
        );
        for (cluster_id, entries) in &infos {
            if entries.len() != 1 {
                return Err(HarnessError::UnhandledState(format!(
                    "cluster {cluster_id} reported {} encryption infos",
                    entries.len()
                )));
            }
        }

        let info = infos
            .get(&ids.cluster_id)
            .and_then(|entries| entries.first())
            .ok_or_else(|| {
                HarnessError::Assertion(format!("no encryption info for cluster {}", ids.cluster_id))
            })?;
        findings.encryption_info = Some(info.clone());

        ensure!(
            info.is_customer_managed(),
            "table encryption type is {:?}",
            info.encryption_type
        );
        self.check_table_status(info)
    }

    /// A backup is pinned to a key version whose status is never tracked.
    pub async fn backup(&self, ids: &ScenarioIds, findings: &mut Findings) -> HarnessResult<()> {
        let config = &self.config;

        self.client
            .create_instance(
                &ids.instance_id,
                &[self.cmek_cluster(&ids.cluster_id, &config.primary_zone)],
            )
            .await?;
        self.client
            .create_table(&ids.instance_id, &ids.table_id, &[COLUMN_FAMILY.to_string()])
            .await?;

        let expire_time = epoch_secs()
            .checked_add(config.backup_ttl().as_secs())
            .ok_or_else(|| {
                HarnessError::Config(format!(
                    "backup_ttl_secs {} overflows the backup expire time",
                    config.backup_ttl_secs
                ))
            })?;
        let request = BackupRequest {
            cluster_id: ids.cluster_id.clone(),
            backup_id: ids.backup_id.clone(),
            source_table_id: ids.table_id.clone(),
            expire_time,
        };
        self.client
            .create_backup(&ids.instance_id, &request)
            .await?;

        let backup = self
            .client
            .get_backup(&ids.instance_id, &ids.cluster_id, &ids.backup_id)
            .await?;
        let info = &backup.encryption_info;
        findings.encryption_info = Some(info.clone());

        ensure!(
            info.is_pinned_untracked(&config.kms_key_name),
            "backup is not pinned under key {}: type {:?}, version {:?}, status {} {:?}",
            config.kms_key_name,
            info.encryption_type,
            info.kms_key_version,
            info.status.code,
            info.status.message
        );
        Ok(())
    }

    /// Delete the backup and the instance. Missing resources are fine;
    /// other failures are logged and ignored.
    pub async fn teardown(&self, ids: &ScenarioIds) {
        match self
            .client
            .delete_backup(&ids.instance_id, &ids.cluster_id, &ids.backup_id)
            .await
        {
            Ok(()) => debug!(backup_id = %ids.backup_id, "backup deleted"),
            Err(err) if err.is_not_found() => {}
            Err(err) => warn!(backup_id = %ids.backup_id, error = %err, "backup cleanup failed"),
        }

        match self.client.delete_instance(&ids.instance_id).await {
            Ok(()) => debug!(instance_id = %ids.instance_id, "instance deleted"),
            Err(err) if err.is_not_found() => {}
            Err(err) => {
                warn!(instance_id = %ids.instance_id, error = %err, "instance cleanup failed")
            }
        }
    }

    fn cmek_cluster(&self, cluster_id: &str, zone: &str) -> ClusterSpec {
        ClusterSpec::cmek(
            cluster_id,
            zone,
            self.config.serve_nodes,
            self.config.storage_type,
            self.config.kms_key_name.as_str(),
        )
    }

    async fn expect_cluster_key(&self, instance_id: &str, cluster_id: &str) -> HarnessResult<()> {
        let cluster = self.client.get_cluster(instance_id, cluster_id).await?;
        ensure!(
            cluster.kms_key_name.as_deref() == Some(self.config.kms_key_name.as_str()),
            "cluster {cluster_id} reports key {:?}, expected {}",
            cluster.kms_key_name,
            self.config.kms_key_name
        );
        Ok(())
    }

    fn check_table_status(&self, info: &EncryptionInfo) -> HarnessResult<()> {
        match info.classify(&self.config.kms_key_name) {
            KeyStatusShape::Unhandled(code) => Err(HarnessError::UnhandledState(format!(
                "table key status {code}: {:?}",
                info.status.message
            ))),
            _ if self.config.wait_for_key_status && !info.status.is_ok() => {
                Err(HarnessError::Assertion(format!(
                    "key status is {} after waiting for convergence",
                    info.status.code
                )))
            }
            KeyStatusShape::Malformed(reason) => Err(HarnessError::Assertion(reason)),
            KeyStatusShape::Transient => {
                info!("table key version not yet known");
                Ok(())
            }
            KeyStatusShape::Converged => {
                info!(kms_key_version = %info.kms_key_version, "table key status converged");
                Ok(())
            }
        }
    }
}

/// Run each scenario on its own task and collect the reports in order.
pub async fn run_suite<C>(harness: Arc<Harness<C>>, kinds: &[ScenarioKind]) -> Vec<ScenarioReport>
where
    C: AdminClient + ?Sized + 'static,
{
    let handles: Vec<_> = kinds
        .iter()
        .map(|&kind| {
            let harness = Arc::clone(&harness);
            (kind, tokio::spawn(async move { harness.run(kind).await }))
        })
        .collect();

    let mut reports = Vec::with_capacity(handles.len());
    for (kind, handle) in handles {
        match handle.await {
            Ok(report) => reports.push(report),
            Err(err) => {
                error!(scenario = %kind, error = %err, "scenario task aborted");
                reports.push(ScenarioReport {
                    scenario: kind,
                    instance_id: String::new(),
                    verdict: Verdict::Failed {
                        reason: format!("scenario task aborted: {err}"),
                    },
                    findings: Findings::default(),
                    duration_ms: 0,
                });
            }
        }
    }
    reports
}

#[cfg(test)]
mod tests {
    use cmek_admin::InMemoryControlPlane;
    use cmek_convergence::RecordingSleeper;

    use super::*;

    const KEY: &str = "projects/p/locations/us-central1/keyRings/r/cryptoKeys/k";

    fn harness(plane: InMemoryControlPlane, wait: bool) -> Harness<InMemoryControlPlane> {
        let mut config = HarnessConfig::scaffold("p", KEY);
        config.wait_for_key_status = wait;
        Harness::new(config, Arc::new(plane), Arc::new(RecordingSleeper::new())).unwrap()
    }

    #[test]
    fn expected_rejection_names_key_and_zone() {
        let msg = expected_rejection("p", KEY, "us-east1-b");
        assert!(msg.starts_with("FAILED_PRECONDITION: Error in field 'cluster'"));
        assert!(msg.contains("'encryption_config.kms_key_name'"));
        assert!(msg.contains(KEY));
        assert!(msg.ends_with("projects/p/locations/us-east1-b"));
    }

    #[test]
    fn new_rejects_invalid_config() {
        let mut config = HarnessConfig::scaffold("p", KEY);
        config.kms_key_name.clear();
        let result = Harness::new(
            config,
            Arc::new(InMemoryControlPlane::new("p")),
            Arc::new(RecordingSleeper::new()),
        );
        assert!(matches!(result, Err(HarnessError::Config(_))));
    }

    #[test]
    fn transient_status_passes_without_wait() {
        let h = harness(InMemoryControlPlane::new("p"), false);
        h.check_table_status(&EncryptionInfo::pending()).unwrap();
    }

    #[test]
    fn transient_status_fails_after_wait() {
        let h = harness(InMemoryControlPlane::new("p"), true);
        let err = h.check_table_status(&EncryptionInfo::pending()).unwrap_err();
        assert!(matches!(err, HarnessError::Assertion(_)));
    }

    #[test]
    fn converged_status_passes_either_way() {
        let info = EncryptionInfo::converged(format!("{KEY}/cryptoKeyVersions/1"));
        harness(InMemoryControlPlane::new("p"), false)
            .check_table_status(&info)
            .unwrap();
        harness(InMemoryControlPlane::new("p"), true)
            .check_table_status(&info)
            .unwrap();
    }

    #[test]
    fn other_codes_are_unhandled() {
        let h = harness(InMemoryControlPlane::new("p"), false);
        let mut info = EncryptionInfo::pending();
        info.status = Status::new(StatusCode::FailedPrecondition, "key disabled");
        assert!(matches!(
            h.check_table_status(&info),
            Err(HarnessError::UnhandledState(_))
        ));
    }

    #[test]
    fn malformed_converged_status_fails() {
        let h = harness(InMemoryControlPlane::new("p"), true);
        let mut info = EncryptionInfo::converged(format!("{KEY}/cryptoKeyVersions/1"));
        info.status.message = "stale".to_string();
        assert!(matches!(
            h.check_table_status(&info),
            Err(HarnessError::Assertion(_))
        ));
    }

    #[tokio::test]
    async fn teardown_tolerates_missing_resources() {
        let plane = InMemoryControlPlane::new("p");
        let h = harness(plane.clone(), false);
        let ids = ScenarioIds::new("cmek-it-", ScenarioKind::Backup, 1);

        // Nothing was ever created.
        h.teardown(&ids).await;
        assert_eq!(plane.instance_count().await, 0);
    }
}
