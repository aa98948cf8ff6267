//! Convergence poller: fetches key status on a backoff schedule.

use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tracing::{debug, info, warn};

use cmek_admin::AdminClient;

use crate::error::{ConvergenceError, ConvergenceResult};
use crate::schedule::BackoffSchedule;
use crate::tracker::{ConvergenceTracker, NextAction, Observation};

type SleepFuture<'a> = Pin<Box<dyn Future<Output = ()> + Send + 'a>>;

/// The poller's only suspension point.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> SleepFuture<'_>;
}

/// Sleeps on the tokio timer.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
        Box::pin(tokio::time::sleep(duration))
    }
}

/// Returns immediately and remembers every requested duration.
#[derive(Debug, Default)]
pub struct RecordingSleeper {
    slept: Mutex<Vec<Duration>>,
}

impl RecordingSleeper {
    pub fn new() -> Self {
        Self::default()
    }

    /// Durations requested so far, in order.
    pub fn slept(&self) -> Vec<Duration> {
        self.slept
            .lock()
            .map(|s| s.clone())
            .unwrap_or_default()
    }

    pub fn total(&self) -> Duration {
        self.slept().iter().sum()
    }
}

impl Sleeper for RecordingSleeper {
    fn sleep(&self, duration: Duration) -> SleepFuture<'_> {
        if let Ok(mut slept) = self.slept.lock() {
            slept.push(duration);
        }
        Box::pin(std::future::ready(()))
    }
}

/// How a successful wait went.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollOutcome {
    /// Fetches made, including the one that saw `OK`.
    pub attempts: usize,
    /// Total time asked of the sleeper.
    pub waited: Duration,
}

/// Polls a table's per-cluster key status until it converges.
#[derive(Clone)]
pub struct ConvergencePoller {
    schedule: BackoffSchedule,
    sleeper: Arc<dyn Sleeper>,
}

impl ConvergencePoller {
    pub fn new(schedule: BackoffSchedule, sleeper: Arc<dyn Sleeper>) -> Self {
        Self { schedule, sleeper }
    }

    /// Block until `cluster_id`'s key status for `table_id` is `OK`.
    ///
    /// API errors during a fetch are logged and count as a pending
    /// observation. An entry holding anything but exactly one
    /// `EncryptionInfo` is an error. Running out of schedule is
    /// [`ConvergenceError::Timeout`].
    pub async fn wait_for_key_status<C>(
        &self,
        client: &C,
        instance_id: &str,
        table_id: &str,
        cluster_id: &str,
    ) -> ConvergenceResult<PollOutcome>
    where
        C: AdminClient + ?Sized,
    {
        let mut tracker = ConvergenceTracker::new(self.schedule.clone());
        let mut waited = Duration::ZERO;

        loop {
            let observation = match client.get_encryption_info(instance_id, table_id).await {
                Ok(mut infos) => match infos.remove(cluster_id) {
                    Some(entries) if entries.len() == 1 => {
                        Observation::Status(entries[0].status.code)
                    }
                    Some(entries) => {
                        return Err(ConvergenceError::UnhandledState(format!(
                            "cluster {cluster_id} of table {table_id} reported {} encryption infos",
                            entries.len()
                        )));
                    }
                    None => {
                        debug!(%table_id, %cluster_id, "no encryption info for cluster yet");
                        Observation::Absent
                    }
                },
                Err(err) => {
                    info!(
                        %table_id,
                        %cluster_id,
                        attempt = tracker.attempts() + 1,
                        error = %err,
                        "encryption info fetch failed"
                    );
                    Observation::FetchFailed
                }
            };

            match tracker.step(observation) {
                NextAction::Return => {
                    info!(
                        %table_id,
                        %cluster_id,
                        attempts = tracker.attempts(),
                        waited_secs = waited.as_secs(),
                        "key status converged"
                    );
                    return Ok(PollOutcome {
                        attempts: tracker.attempts(),
                        waited,
                    });
                }
                NextAction::Sleep(delay) => {
                    info!(
                        %table_id,
                        %cluster_id,
                        attempt = tracker.attempts(),
                        delay_secs = delay.as_secs(),
                        "waiting for key status"
                    );
                    self.sleeper.sleep(delay).await;
                    waited += delay;
                }
                NextAction::Fail => {
                    warn!(
                        %table_id,
                        %cluster_id,
                        attempts = tracker.attempts(),
                        "key status failed to converge"
                    );
                    return Err(ConvergenceError::Timeout {
                        table_id: table_id.to_string(),
                        cluster_id: cluster_id.to_string(),
                        attempts: tracker.attempts(),
                    });
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::VecDeque;

    use async_trait::async_trait;
    use cmek_admin::{AdminError, AdminResult, BackupRequest, InMemoryControlPlane};
    use cmek_model::*;

    use super::*;

    const KEY: &str = "projects/p/locations/us-central1/keyRings/r/cryptoKeys/k";

    async fn plane_with_table(plane: InMemoryControlPlane) -> InMemoryControlPlane {
        plane
            .create_instance(
                "i",
                &[ClusterSpec::cmek("c1", "us-central1-b", 1, StorageType::Ssd, KEY)],
            )
            .await
            .unwrap();
        plane
            .create_table("i", "t", &["cf".to_string()])
            .await
            .unwrap();
        plane
    }

    fn poller(secs: &[u64]) -> (ConvergencePoller, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::new());
        let poller = ConvergencePoller::new(BackoffSchedule::from_secs(secs).unwrap(), sleeper.clone());
        (poller, sleeper)
    }

    /// Answers encryption-info reads from a script; nothing else is called.
    struct ScriptedClient {
        replies: Mutex<VecDeque<AdminResult<EncryptionInfoMap>>>,
        fetches: Mutex<usize>,
    }

    impl ScriptedClient {
        fn new(replies: Vec<AdminResult<EncryptionInfoMap>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                fetches: Mutex::new(0),
            }
        }

        fn fetches(&self) -> usize {
            *self.fetches.lock().unwrap()
        }
    }

    #[async_trait]
    impl AdminClient for ScriptedClient {
        async fn create_instance(&self, _: &str, _: &[ClusterSpec]) -> AdminResult<Instance> {
            unimplemented!()
        }
        async fn get_cluster(&self, _: &str, _: &str) -> AdminResult<Cluster> {
            unimplemented!()
        }
        async fn create_cluster(&self, _: &str, _: &ClusterSpec) -> AdminResult<Cluster> {
            unimplemented!()
        }
        async fn delete_instance(&self, _: &str) -> AdminResult<()> {
            unimplemented!()
        }
        async fn create_table(&self, _: &str, _: &str, _: &[String]) -> AdminResult<Table> {
            unimplemented!()
        }
        async fn get_encryption_info(&self, _: &str, _: &str) -> AdminResult<EncryptionInfoMap> {
            *self.fetches.lock().unwrap() += 1;
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(EncryptionInfoMap::new()))
        }
        async fn create_backup(&self, _: &str, _: &BackupRequest) -> AdminResult<Backup> {
            unimplemented!()
        }
        async fn get_backup(&self, _: &str, _: &str, _: &str) -> AdminResult<Backup> {
            unimplemented!()
        }
        async fn delete_backup(&self, _: &str, _: &str, _: &str) -> AdminResult<()> {
            unimplemented!()
        }
    }

    fn single(cluster: &str, info: EncryptionInfo) -> AdminResult<EncryptionInfoMap> {
        Ok(EncryptionInfoMap::from([(cluster.to_string(), vec![info])]))
    }

    #[tokio::test]
    async fn returns_immediately_when_already_ok() {
        let plane = plane_with_table(InMemoryControlPlane::new("p")).await;
        let (poller, sleeper) = poller(&BackoffSchedule::DEFAULT_SECS);

        let outcome = poller.wait_for_key_status(&plane, "i", "t", "c1").await.unwrap();
        assert_eq!(outcome.attempts, 1);
        assert_eq!(outcome.waited, Duration::ZERO);
        assert!(sleeper.slept().is_empty());
    }

    #[tokio::test]
    async fn sleeps_schedule_prefix_until_ok() {
        let plane = plane_with_table(InMemoryControlPlane::new("p").with_convergence_reads(3)).await;
        let (poller, sleeper) = poller(&BackoffSchedule::DEFAULT_SECS);

        let outcome = poller.wait_for_key_status(&plane, "i", "t", "c1").await.unwrap();
        assert_eq!(outcome.attempts, 4);
        assert_eq!(
            sleeper.slept(),
            vec![
                Duration::from_secs(5),
                Duration::from_secs(10),
                Duration::from_secs(50)
            ]
        );
        assert_eq!(outcome.waited, Duration::from_secs(65));
    }

    #[tokio::test]
    async fn api_errors_are_absorbed() {
        let plane = plane_with_table(
            InMemoryControlPlane::new("p")
                .with_transient_failures(2)
                .with_convergence_reads(1),
        )
        .await;
        let (poller, sleeper) = poller(&[1, 2, 3, 4]);

        let outcome = poller.wait_for_key_status(&plane, "i", "t", "c1").await.unwrap();
        assert_eq!(outcome.attempts, 4);
        assert_eq!(sleeper.slept().len(), 3);
    }

    #[tokio::test]
    async fn exhaustion_is_timeout() {
        let plane = plane_with_table(InMemoryControlPlane::new("p").with_convergence_reads(u32::MAX)).await;
        let (poller, sleeper) = poller(&BackoffSchedule::DEFAULT_SECS);

        let err = poller
            .wait_for_key_status(&plane, "i", "t", "c1")
            .await
            .unwrap_err();
        match err {
            ConvergenceError::Timeout {
                table_id,
                cluster_id,
                attempts,
            } => {
                assert_eq!(table_id, "t");
                assert_eq!(cluster_id, "c1");
                assert_eq!(attempts, 8);
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(sleeper.slept().len(), 7);
        assert_eq!(sleeper.total(), Duration::from_secs(765));
    }

    #[tokio::test]
    async fn fetches_at_most_schedule_length() {
        let client = ScriptedClient::new(vec![
            Err(AdminError::Unavailable("down".into())),
            single("c1", EncryptionInfo::pending()),
            Ok(EncryptionInfoMap::new()),
        ]);
        let (poller, sleeper) = poller(&[1, 1, 1]);

        let err = poller
            .wait_for_key_status(&client, "i", "t", "c1")
            .await
            .unwrap_err();
        assert!(matches!(err, ConvergenceError::Timeout { attempts: 3, .. }));
        assert_eq!(client.fetches(), 3);
        assert_eq!(sleeper.slept().len(), 2);
    }

    #[tokio::test]
    async fn multiple_infos_per_cluster_is_unhandled() {
        let client = ScriptedClient::new(vec![Ok(EncryptionInfoMap::from([(
            "c1".to_string(),
            vec![EncryptionInfo::pending(), EncryptionInfo::pending()],
        )]))]);
        let (poller, sleeper) = poller(&[1, 1, 1]);

        let err = poller
            .wait_for_key_status(&client, "i", "t", "c1")
            .await
            .unwrap_err();
        assert!(matches!(err, ConvergenceError::UnhandledState(_)));
        assert_eq!(client.fetches(), 1);
        assert!(sleeper.slept().is_empty());
    }

    #[tokio::test]
    async fn repolling_after_convergence_returns_ok_again() {
        let plane = plane_with_table(InMemoryControlPlane::new("p").with_convergence_reads(2)).await;
        let (poller, _) = poller(&[1, 1, 1, 1]);

        poller.wait_for_key_status(&plane, "i", "t", "c1").await.unwrap();
        let again = poller.wait_for_key_status(&plane, "i", "t", "c1").await.unwrap();
        assert_eq!(again.attempts, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn tokio_sleeper_waits_on_timer() {
        let start = tokio::time::Instant::now();
        TokioSleeper.sleep(Duration::from_secs(300)).await;
        assert!(start.elapsed() >= Duration::from_secs(300));
    }
}
