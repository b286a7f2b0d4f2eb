//! Admission watcher: owns at most one wait session at a time.

use std::sync::Arc;

use tokio::sync::{oneshot, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::config::WatcherConfig;
use crate::credentials::CredentialStore;
use crate::navigator::Navigator;
use crate::push::PushChannel;
use crate::queue::QueueStatusService;

use super::session::{Collaborators, WaitSession};
use super::types::{WatchOutcome, WatchStatus};

struct ActiveSession {
    resource_id: String,
    shutdown_tx: Option<oneshot::Sender<()>>,
    task: JoinHandle<WatchOutcome>,
}

/// Watches a waiting room until the session is admitted.
///
/// `start_watching` spawns a wait session for a resource. The session
/// combines the push channel, fallback polling and reconnects, and on
/// admission persists the access key and navigates to the reservation view.
/// Dropping the watcher stops the running session.
pub struct AdmissionWatcher {
    config: WatcherConfig,
    deps: Collaborators,
    status_tx: Arc<watch::Sender<WatchStatus>>,
    outcome_tx: Arc<watch::Sender<Option<WatchOutcome>>>,
    session: Mutex<Option<ActiveSession>>,
}

impl AdmissionWatcher {
    pub fn new(
        config: WatcherConfig,
        queue: Arc<dyn QueueStatusService>,
        push: Arc<dyn PushChannel>,
        credentials: Arc<dyn CredentialStore>,
        navigator: Arc<dyn Navigator>,
    ) -> Self {
        let (status_tx, _) = watch::channel(WatchStatus::default());
        let (outcome_tx, _) = watch::channel(None);
        Self {
            config,
            deps: Collaborators {
                queue,
                push,
                credentials,
                navigator,
            },
            status_tx: Arc::new(status_tx),
            outcome_tx: Arc::new(outcome_tx),
            session: Mutex::new(None),
        }
    }

    /// Subscribe to status updates of the current session.
    pub fn subscribe(&self) -> watch::Receiver<WatchStatus> {
        self.status_tx.subscribe()
    }

    /// Latest status.
    pub fn status(&self) -> WatchStatus {
        self.status_tx.borrow().clone()
    }

    /// Resource of the running session, if any.
    pub async fn resource_id(&self) -> Option<String> {
        self.session
            .lock()
            .await
            .as_ref()
            .filter(|s| !s.task.is_finished())
            .map(|s| s.resource_id.clone())
    }

    /// Start watching `resource_id`.
    ///
    /// Returns false when a session for the same resource is already
    /// running. A session for a different resource is stopped first.
    pub async fn start_watching(&self, resource_id: &str) -> bool {
        let mut session = self.session.lock().await;

        if let Some(active) = session.as_ref() {
            if active.resource_id == resource_id && !active.task.is_finished() {
                debug!(resource_id = resource_id, "Already watching, ignoring start");
                return false;
            }
        }
        if let Some(previous) = session.take() {
            info!(
                previous = %previous.resource_id,
                resource_id = resource_id,
                "Replacing wait session"
            );
            stop_session(previous).await;
        }

        self.status_tx.send_replace(WatchStatus::default());
        self.outcome_tx.send_replace(None);

        let wait_session = WaitSession::new(
            resource_id,
            self.config.clone(),
            self.deps.clone(),
            Arc::clone(&self.status_tx),
        );
        let span = info_span!(
            "wait_session",
            resource_id = %resource_id,
            session_id = %wait_session.id()
        );

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let outcome_tx = Arc::clone(&self.outcome_tx);
        let task = tokio::spawn(
            async move {
                info!("Wait session started");
                let outcome = wait_session.run(shutdown_rx).await;
                info!(outcome = ?outcome, "Wait session ended");
                outcome_tx.send_replace(Some(outcome.clone()));
                outcome
            }
            .instrument(span),
        );

        *session = Some(ActiveSession {
            resource_id: resource_id.to_string(),
            shutdown_tx: Some(shutdown_tx),
            task,
        });
        true
    }

    /// Stop the current session and wait for it to release its resources.
    ///
    /// Returns how the session ended, or None when nothing was running.
    pub async fn stop_watching(&self) -> Option<WatchOutcome> {
        let active = self.session.lock().await.take()?;
        stop_session(active).await
    }

    /// Wait until the current session ends.
    ///
    /// Returns None when no session was ever started.
    pub async fn wait_for_outcome(&self) -> Option<WatchOutcome> {
        let mut outcome_rx = self.outcome_tx.subscribe();
        if self.session.lock().await.is_none() {
            return outcome_rx.borrow().clone();
        }
        let outcome = match outcome_rx.wait_for(Option::is_some).await {
            Ok(outcome) => outcome.clone(),
            Err(_) => None,
        };
        outcome
    }
}

async fn stop_session(mut active: ActiveSession) -> Option<WatchOutcome> {
    if let Some(shutdown_tx) = active.shutdown_tx.take() {
        // Already gone when the session finished on its own
        let _ = shutdown_tx.send(());
    }
    match active.task.await {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            warn!(resource_id = %active.resource_id, "Wait session task failed: {}", e);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::ApiError;
    use crate::push::CloseReason;
    use crate::queue::{QueueError, QueueStatus};
    use crate::testing::fixtures::admit_message;
    use crate::testing::{
        MockCredentialStore, MockPushChannel, MockQueueStatus, RecordingNavigator,
    };
    use crate::watcher::{messages, ConnectionState};
    use std::time::Duration;
    use tokio::time::{sleep, Instant};

    struct Harness {
        queue: Arc<MockQueueStatus>,
        push: Arc<MockPushChannel>,
        credentials: Arc<MockCredentialStore>,
        navigator: Arc<RecordingNavigator>,
        watcher: AdmissionWatcher,
    }

    fn harness() -> Harness {
        harness_with(WatcherConfig::default())
    }

    fn harness_with(config: WatcherConfig) -> Harness {
        let queue = Arc::new(MockQueueStatus::new());
        let push = Arc::new(MockPushChannel::new());
        let credentials = Arc::new(MockCredentialStore::new());
        let navigator = Arc::new(RecordingNavigator::new());
        let watcher = AdmissionWatcher::new(
            config,
            Arc::clone(&queue) as Arc<dyn QueueStatusService>,
            Arc::clone(&push) as Arc<dyn PushChannel>,
            Arc::clone(&credentials) as Arc<dyn CredentialStore>,
            Arc::clone(&navigator) as Arc<dyn Navigator>,
        );
        Harness {
            queue,
            push,
            credentials,
            navigator,
            watcher,
        }
    }

    fn admitted(key: &str) -> QueueStatus {
        QueueStatus::Admitted {
            access_key: key.to_string(),
        }
    }

    fn gaps(times: &[Instant]) -> Vec<Duration> {
        times.windows(2).map(|w| w[1] - w[0]).collect()
    }

    #[tokio::test(start_paused = true)]
    async fn test_sync_admission_persists_closes_and_navigates_once() {
        let h = harness();
        h.queue.push_status(admitted("K1")).await;
        let started = Instant::now();

        assert!(h.watcher.start_watching("42").await);
        sleep(Duration::from_millis(500)).await;

        assert_eq!(h.credentials.get("42").unwrap().as_deref(), Some("K1"));
        assert_eq!(h.push.close_reasons(), vec![CloseReason::Admitted]);
        assert_eq!(h.watcher.status().state, ConnectionState::Admitted);
        assert_eq!(h.watcher.status().message, messages::ADMITTED);
        assert!(h.navigator.routes().is_empty());

        sleep(Duration::from_millis(600)).await;
        let navigations = h.navigator.navigations();
        assert_eq!(navigations.len(), 1);
        assert_eq!(navigations[0].route, "/concerts/42/reserve");
        assert_eq!(
            navigations[0].timestamp - started,
            Duration::from_millis(1000)
        );

        match h.watcher.wait_for_outcome().await {
            Some(WatchOutcome::Admitted(credential)) => {
                assert_eq!(credential.resource_id, "42");
                assert_eq!(credential.access_key, "K1");
            }
            other => panic!("unexpected outcome: {:?}", other),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_close_does_not_delay_navigation() {
        let h = harness();
        h.push.set_close_delay(Duration::from_secs(5));
        h.queue.push_status(admitted("K1")).await;
        let started = Instant::now();

        h.watcher.start_watching("42").await;
        sleep(Duration::from_millis(500)).await;

        // Stored while the close is still pending
        assert_eq!(h.credentials.get("42").unwrap().as_deref(), Some("K1"));
        assert!(h.navigator.routes().is_empty());

        sleep(Duration::from_millis(600)).await;
        let navigations = h.navigator.navigations();
        assert_eq!(navigations.len(), 1);
        assert_eq!(
            navigations[0].timestamp - started,
            Duration::from_millis(1000)
        );
        assert_eq!(h.push.live_connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stalled_connect_falls_back_to_polling() {
        let h = harness();
        h.push.set_hang_connects(true);
        h.queue.set_default(admitted("K")).await;
        let started = Instant::now();

        h.watcher.start_watching("42").await;
        sleep(Duration::from_millis(9_900)).await;
        assert_eq!(h.watcher.status().state, ConnectionState::Connecting);
        assert_eq!(h.queue.check_count().await, 0);

        // Connect gives up at 10s, polling admits at the next tick
        sleep(Duration::from_millis(200)).await;
        assert_eq!(h.watcher.status().state, ConnectionState::Reconnecting);

        sleep(Duration::from_millis(5_000)).await;
        assert!(h.queue.check_count().await >= 1);
        assert_eq!(h.credentials.get("42").unwrap().as_deref(), Some("K"));

        let navigations = h.navigator.navigations();
        assert_eq!(navigations.len(), 1);
        assert_eq!(
            navigations[0].timestamp - started,
            Duration::from_millis(15_000)
        );
        assert_eq!(h.push.connect_count(), 1);
        assert!(matches!(
            h.watcher.wait_for_outcome().await,
            Some(WatchOutcome::Admitted(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_poll_interval_keeps_polling() {
        let h = harness_with(WatcherConfig {
            poll_interval_ms: 0,
            ..WatcherConfig::default()
        });
        h.push.set_always_fail(true);

        h.watcher.start_watching("42").await;
        sleep(Duration::from_millis(10)).await;

        assert_eq!(h.watcher.status().state, ConnectionState::Reconnecting);
        assert!(h.queue.check_count().await >= 5);
        assert!(matches!(
            h.watcher.stop_watching().await,
            Some(WatchOutcome::Stopped)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_push_admission() {
        let h = harness();
        h.queue.set_default(QueueStatus::Waiting { rank: Some(3) }).await;

        h.watcher.start_watching("42").await;
        sleep(Duration::from_millis(10)).await;
        assert_eq!(h.watcher.status().state, ConnectionState::Waiting);

        assert!(h.push.send_text(&admit_message("PUSHED")));
        sleep(Duration::from_millis(1100)).await;

        assert_eq!(h.credentials.get("42").unwrap().as_deref(), Some("PUSHED"));
        assert_eq!(h.navigator.routes(), vec!["/concerts/42/reserve"]);
        assert_eq!(h.push.close_reasons(), vec![CloseReason::Admitted]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_backoff_doubles_up_to_cap() {
        let h = harness();
        h.push.set_always_fail(true);

        h.watcher.start_watching("42").await;
        sleep(Duration::from_secs(100)).await;

        let gaps = gaps(&h.push.connect_times());
        let expected: Vec<Duration> = [5000, 10000, 20000, 30000, 30000]
            .into_iter()
            .map(Duration::from_millis)
            .collect();
        assert_eq!(&gaps[..5], &expected[..]);
        assert_eq!(h.watcher.status().state, ConnectionState::Reconnecting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_polling_runs_while_disconnected() {
        let h = harness();
        h.push.set_always_fail(true);

        h.watcher.start_watching("42").await;
        sleep(Duration::from_millis(12_100)).await;

        let checks = h.queue.recorded_checks().await;
        assert_eq!(checks.len(), 3);
        let times: Vec<Instant> = checks.iter().map(|c| c.timestamp).collect();
        assert!(gaps(&times)
            .iter()
            .all(|gap| *gap == Duration::from_millis(4000)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_sync_shortens_next_reconnect() {
        let h = harness();
        h.queue.set_default(QueueStatus::Waiting { rank: Some(7) }).await;

        h.watcher.start_watching("42").await;
        sleep(Duration::from_millis(10)).await;
        assert_eq!(h.watcher.status().rank, Some(7));

        let closed_at = Instant::now();
        assert!(h.push.close_latest(Some(1006), "abnormal"));
        sleep(Duration::from_millis(2100)).await;

        let times = h.push.connect_times();
        assert_eq!(times.len(), 2);
        assert_eq!(times[1] - closed_at, Duration::from_millis(2000));
        assert_eq!(h.watcher.status().state, ConnectionState::Waiting);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_sync_falls_back_to_polling() {
        let h = harness();
        h.queue
            .push_error(QueueError::Api(ApiError::Timeout))
            .await;
        h.queue.push_status(admitted("K2")).await;

        h.watcher.start_watching("42").await;
        sleep(Duration::from_millis(10)).await;
        assert_eq!(h.watcher.status().state, ConnectionState::Reconnecting);

        sleep(Duration::from_millis(6000)).await;

        // The poll at 4s admitted before the reconnect at 5s fired
        assert_eq!(h.push.connect_count(), 1);
        assert_eq!(h.credentials.get("42").unwrap().as_deref(), Some("K2"));
        assert_eq!(h.navigator.routes().len(), 1);
        assert_eq!(h.push.close_reasons(), vec![CloseReason::Admitted]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_reconnect_replaces_stale_connection() {
        let h = harness();
        h.queue
            .push_error(QueueError::Api(ApiError::Timeout))
            .await;

        h.watcher.start_watching("42").await;
        sleep(Duration::from_millis(5100)).await;

        assert_eq!(h.push.connect_count(), 2);
        assert_eq!(h.push.close_reasons(), vec![CloseReason::Reconnect]);
        assert_eq!(h.push.max_live_connections(), 1);
        assert_eq!(h.watcher.status().state, ConnectionState::Waiting);

        // sync, poll at 4s, sync after reconnect; the open channel stops polling
        assert_eq!(h.queue.check_count().await, 3);
        sleep(Duration::from_secs(20)).await;
        assert_eq!(h.queue.check_count().await, 3);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simultaneous_signals_admit_once() {
        let h = harness();
        h.queue.push_status(admitted("K3")).await;
        h.queue.set_delay(Duration::from_millis(100)).await;

        h.watcher.start_watching("42").await;
        sleep(Duration::from_millis(10)).await;
        h.push.send_text(&admit_message("K3"));
        h.push.send_text(&admit_message("K3"));
        sleep(Duration::from_secs(5)).await;

        assert_eq!(h.credentials.put_count(), 1);
        assert_eq!(h.navigator.routes().len(), 1);
        assert_eq!(h.push.close_reasons(), vec![CloseReason::Admitted]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unrecognized_messages_are_ignored() {
        let h = harness();

        h.watcher.start_watching("42").await;
        sleep(Duration::from_millis(10)).await;

        h.push.send_text(r#"{"type":"PING"}"#);
        h.push.send_text("not json");
        h.push.send_text(r#"{"type":"ADMIT"}"#);
        h.push.send_text(r#"{"type":"ADMIT","accessKey":""}"#);
        sleep(Duration::from_millis(10)).await;

        assert_eq!(h.watcher.status().state, ConnectionState::Waiting);
        assert_eq!(h.credentials.put_count(), 0);
        assert_eq!(h.push.live_connections(), 1);

        h.push.send_text(&admit_message("K5"));
        sleep(Duration::from_millis(10)).await;
        assert_eq!(h.watcher.status().state, ConnectionState::Admitted);
    }

    #[tokio::test(start_paused = true)]
    async fn test_channel_error_triggers_reconnect() {
        let h = harness();

        h.watcher.start_watching("42").await;
        sleep(Duration::from_millis(10)).await;
        h.push.send_error("connection reset");
        sleep(Duration::from_millis(10)).await;

        assert_eq!(h.watcher.status().state, ConnectionState::Reconnecting);
        sleep(Duration::from_millis(2000)).await;
        assert_eq!(h.push.connect_count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_watching_ends_all_activity() {
        let h = harness();
        h.push.set_always_fail(true);

        h.watcher.start_watching("42").await;
        sleep(Duration::from_millis(4500)).await;

        assert_eq!(h.watcher.stop_watching().await, Some(WatchOutcome::Stopped));
        let connects = h.push.connect_count();
        let checks = h.queue.check_count().await;

        sleep(Duration::from_secs(60)).await;
        assert_eq!(h.push.connect_count(), connects);
        assert_eq!(h.queue.check_count().await, checks);
        assert!(h.navigator.routes().is_empty());
        assert!(h.watcher.resource_id().await.is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_closes_channel_with_unmount_reason() {
        let h = harness();

        h.watcher.start_watching("42").await;
        sleep(Duration::from_millis(10)).await;
        h.watcher.stop_watching().await;

        assert_eq!(h.push.close_reasons(), vec![CloseReason::Unmount]);
        assert_eq!(h.push.live_connections(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_during_navigation_delay_cancels_navigation() {
        let h = harness();
        h.queue.push_status(admitted("K4")).await;

        h.watcher.start_watching("42").await;
        sleep(Duration::from_millis(500)).await;
        assert_eq!(h.watcher.stop_watching().await, Some(WatchOutcome::Stopped));

        sleep(Duration::from_secs(2)).await;
        assert!(h.navigator.routes().is_empty());
        assert_eq!(h.credentials.get("42").unwrap().as_deref(), Some("K4"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_credential_write_failure_still_navigates() {
        let h = harness();
        h.credentials.set_fail_writes(true);
        h.queue.push_status(admitted("K6")).await;

        h.watcher.start_watching("42").await;
        let outcome = h.watcher.wait_for_outcome().await;

        assert!(matches!(outcome, Some(WatchOutcome::Admitted(_))));
        assert_eq!(h.navigator.routes(), vec!["/concerts/42/reserve"]);
        assert!(h.credentials.get("42").unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_watching_same_resource_is_noop() {
        let h = harness();

        assert!(h.watcher.start_watching("42").await);
        assert!(!h.watcher.start_watching("42").await);
        sleep(Duration::from_millis(10)).await;

        assert_eq!(h.push.connect_count(), 1);
        assert_eq!(h.push.max_live_connections(), 1);
        assert_eq!(h.watcher.resource_id().await.as_deref(), Some("42"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_start_watching_other_resource_replaces_session() {
        let h = harness();

        h.watcher.start_watching("42").await;
        sleep(Duration::from_millis(10)).await;
        assert!(h.watcher.start_watching("43").await);
        sleep(Duration::from_millis(10)).await;

        assert_eq!(h.push.close_reasons(), vec![CloseReason::Unmount]);
        assert_eq!(h.push.live_connections(), 1);
        assert_eq!(h.watcher.resource_id().await.as_deref(), Some("43"));
        let checks = h.queue.recorded_checks().await;
        assert_eq!(checks.last().unwrap().resource_id, "43");
    }

    #[tokio::test(start_paused = true)]
    async fn test_status_reports_rank() {
        let h = harness();
        h.queue.push_status(QueueStatus::Waiting { rank: Some(12) }).await;
        let mut status_rx = h.watcher.subscribe();

        h.watcher.start_watching("42").await;
        let status = status_rx
            .wait_for(|s| s.state == ConnectionState::Waiting)
            .await
            .unwrap()
            .clone();

        assert_eq!(status.rank, Some(12));
        assert_eq!(status.message, messages::connected(Some(12)));
    }

    #[tokio::test]
    async fn test_wait_for_outcome_without_session() {
        let h = harness();
        assert!(h.watcher.wait_for_outcome().await.is_none());
        assert!(h.watcher.stop_watching().await.is_none());
    }
}
