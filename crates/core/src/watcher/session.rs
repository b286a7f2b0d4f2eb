//! One wait session: the connection state machine for a single resource.
//!
//! A session is owned by exactly one task. Every trigger (channel frames,
//! status check results, timers, unmount) is handled sequentially from a
//! single `select!` loop, so the first admission signal to flip the state
//! to `Admitted` wins and every later one observes the terminal state.

use std::future::pending;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use futures::stream::{FuturesUnordered, StreamExt};
use tokio::sync::{oneshot, watch};
use tokio::time::{interval_at, sleep, Instant, Interval, MissedTickBehavior, Sleep};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::WatcherConfig;
use crate::credentials::{AdmissionCredential, CredentialStore};
use crate::navigator::{reservation_route, Navigator};
use crate::push::{CloseReason, PushChannel, PushConnection, PushError, PushFrame, PushMessage};
use crate::queue::{QueueError, QueueStatus, QueueStatusService};

use super::backoff::RetryBackoff;
use super::types::{messages, ConnectionState, WatchOutcome, WatchStatus};

/// Upper bound for sending a close frame during teardown.
const CLOSE_TIMEOUT: Duration = Duration::from_secs(1);

type ConnectFuture = BoxFuture<'static, Result<Box<dyn PushConnection>, PushError>>;
type CheckFuture = BoxFuture<'static, (CheckOrigin, Result<QueueStatus, QueueError>)>;

/// Which trigger issued a status check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum CheckOrigin {
    /// Reconciliation right after the channel opened.
    Sync,
    /// Fallback polling tick.
    Poll,
}

/// External collaborators a session talks to.
#[derive(Clone)]
pub(crate) struct Collaborators {
    pub queue: Arc<dyn QueueStatusService>,
    pub push: Arc<dyn PushChannel>,
    pub credentials: Arc<dyn CredentialStore>,
    pub navigator: Arc<dyn Navigator>,
}

pub(crate) struct WaitSession {
    id: Uuid,
    resource_id: String,
    config: WatcherConfig,
    deps: Collaborators,
    status_tx: Arc<watch::Sender<WatchStatus>>,

    state: ConnectionState,
    rank: Option<u64>,
    backoff: RetryBackoff,
    unmounted: bool,
    admitted: Option<AdmissionCredential>,

    poll: Option<Interval>,
    reconnect: Option<Pin<Box<Sleep>>>,
    navigation: Option<Pin<Box<Sleep>>>,
    connecting: Option<ConnectFuture>,
    connection: Option<Box<dyn PushConnection>>,
    checks: FuturesUnordered<CheckFuture>,
}

impl WaitSession {
    pub(crate) fn new(
        resource_id: &str,
        config: WatcherConfig,
        deps: Collaborators,
        status_tx: Arc<watch::Sender<WatchStatus>>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            resource_id: resource_id.to_string(),
            backoff: RetryBackoff::from_config(&config),
            config,
            deps,
            status_tx,
            state: ConnectionState::Idle,
            rank: None,
            unmounted: false,
            admitted: None,
            poll: None,
            reconnect: None,
            navigation: None,
            connecting: None,
            connection: None,
            checks: FuturesUnordered::new(),
        }
    }

    pub(crate) fn id(&self) -> Uuid {
        self.id
    }

    #[cfg(test)]
    pub(crate) fn state(&self) -> ConnectionState {
        self.state
    }

    /// Drive the session until navigation or unmount.
    ///
    /// Dropping the sender of `shutdown_rx` counts as unmount.
    pub(crate) async fn run(mut self, mut shutdown_rx: oneshot::Receiver<()>) -> WatchOutcome {
        self.start_watching();

        loop {
            tokio::select! {
                biased;

                _ = &mut shutdown_rx => {
                    self.unmount().await;
                    return WatchOutcome::Stopped;
                }

                _ = wait_sleep(&mut self.navigation) => {
                    self.navigation = None;
                    let route = reservation_route(&self.resource_id);
                    info!(route = %route, "Navigating to reservation");
                    self.deps.navigator.navigate(&route);
                    return match self.admitted.take() {
                        Some(credential) => WatchOutcome::Admitted(credential),
                        None => WatchOutcome::Stopped,
                    };
                }

                result = wait_connect(&mut self.connecting) => {
                    self.connecting = None;
                    self.on_connect_result(result);
                }

                frame = recv_frame(&mut self.connection) => {
                    self.on_frame(frame).await;
                }

                Some((origin, result)) = self.checks.next(), if !self.checks.is_empty() => {
                    self.on_check_result(origin, result).await;
                }

                _ = tick_poll(&mut self.poll) => {
                    self.on_poll_tick();
                }

                _ = wait_sleep(&mut self.reconnect) => {
                    self.reconnect = None;
                    self.on_reconnect_timer().await;
                }
            }
        }
    }

    /// Open the push channel unless one is already open or opening.
    pub(crate) fn start_watching(&mut self) {
        if self.unmounted || self.state.is_terminal() {
            return;
        }
        if self.connection.is_some() || self.connecting.is_some() {
            debug!("Push channel already live, ignoring start");
            return;
        }
        self.open_channel();
    }

    fn open_channel(&mut self) {
        self.set_state(ConnectionState::Connecting, messages::CONNECTING.to_string());

        let push = Arc::clone(&self.deps.push);
        let resource_id = self.resource_id.clone();
        self.connecting = Some(Box::pin(async move {
            let limit = push.connect_timeout();
            match tokio::time::timeout(limit, push.connect(&resource_id)).await {
                Ok(result) => result,
                Err(_) => Err(PushError::ConnectionFailed(format!(
                    "Connect timed out after {}ms",
                    limit.as_millis()
                ))),
            }
        }));
    }

    fn on_connect_result(&mut self, result: Result<Box<dyn PushConnection>, PushError>) {
        match result {
            Ok(connection) => {
                info!("Push channel open, syncing queue status");
                self.connection = Some(connection);
                self.stop_all_timers();
                self.set_state(ConnectionState::Syncing, self.status_message());
                self.spawn_check(CheckOrigin::Sync);
            }
            Err(e) => {
                warn!("Push channel connect failed: {}", e);
                self.on_connection_lost();
            }
        }
    }

    async fn on_frame(&mut self, frame: Result<PushFrame, PushError>) {
        match frame {
            Ok(PushFrame::Text(text)) => self.on_push_message(&text).await,
            Ok(PushFrame::Closed { code, reason }) => {
                warn!(code = ?code, reason = %reason, "Push channel closed");
                self.on_connection_lost();
            }
            Err(e) => {
                warn!("Push channel error: {}", e);
                self.on_connection_lost();
            }
        }
    }

    async fn on_push_message(&mut self, text: &str) {
        debug!(payload = text, "Push message received");
        match PushMessage::decode(text) {
            Ok(message) => match message.admission_key() {
                Some(key) => {
                    info!("Admission received over push channel");
                    let key = key.to_string();
                    self.handle_admission(key).await;
                }
                None if matches!(message, PushMessage::Admit { .. }) => {
                    warn!("Ignoring ADMIT message without access key");
                }
                None => debug!("Ignoring unrecognized push message"),
            },
            Err(e) => warn!("Failed to process push message: {}", e),
        }
    }

    async fn on_check_result(
        &mut self,
        origin: CheckOrigin,
        result: Result<QueueStatus, QueueError>,
    ) {
        if self.unmounted || self.state.is_terminal() {
            return;
        }

        match (origin, result) {
            (_, Ok(QueueStatus::Admitted { access_key })) => {
                info!(origin = ?origin, "Queue status reports admission");
                self.handle_admission(access_key).await;
            }
            (CheckOrigin::Sync, Ok(QueueStatus::Waiting { rank })) => {
                info!(rank = ?rank, "Queue status synced, still waiting");
                self.rank = rank.or(self.rank);
                self.backoff.on_synced();
                if self.state == ConnectionState::Syncing {
                    self.set_state(ConnectionState::Waiting, messages::connected(self.rank));
                } else {
                    self.publish(self.status_message());
                }
            }
            (CheckOrigin::Poll, Ok(QueueStatus::Waiting { rank })) => {
                debug!(rank = ?rank, "Polling: still waiting");
                if rank.is_some() && rank != self.rank {
                    self.rank = rank;
                    self.publish(self.status_message());
                }
            }
            (CheckOrigin::Sync, Err(e)) => {
                warn!("Queue status sync failed, falling back to polling: {}", e);
                self.set_state(ConnectionState::Reconnecting, self.status_message());
                self.start_polling();
                self.schedule_reconnect();
            }
            (CheckOrigin::Poll, Err(e)) => {
                warn!("Polling check failed: {}", e);
            }
        }
    }

    fn on_poll_tick(&mut self) {
        debug!("Polling queue status");
        self.spawn_check(CheckOrigin::Poll);
    }

    async fn on_reconnect_timer(&mut self) {
        info!(
            delay_ms = self.backoff.delay().as_millis() as u64,
            "Reconnect timer fired, reopening push channel"
        );
        self.connecting = None;
        if let Some(stale) = self.connection.take() {
            close_connection(stale, CloseReason::Reconnect).await;
        }
        self.open_channel();
        self.backoff.on_reconnect_fired();
    }

    /// The channel is gone: poll as a safety net and schedule a reconnect.
    fn on_connection_lost(&mut self) {
        self.connection = None;
        if self.unmounted || self.state.is_terminal() {
            return;
        }
        self.set_state(ConnectionState::Reconnecting, messages::RETRYING.to_string());
        self.start_polling();
        self.schedule_reconnect();
    }

    fn start_polling(&mut self) {
        if self.poll.is_some() || self.unmounted || self.state.is_terminal() {
            return;
        }
        info!(
            interval_ms = self.config.poll_interval_ms,
            "Starting fallback polling"
        );
        let period = self.config.poll_interval();
        let mut poll = interval_at(Instant::now() + period, period);
        poll.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.poll = Some(poll);
        self.publish(messages::POLLING.to_string());
    }

    fn schedule_reconnect(&mut self) {
        if self.reconnect.is_some() || self.unmounted || self.state.is_terminal() {
            return;
        }
        let delay = self.backoff.delay();
        info!(delay_ms = delay.as_millis() as u64, "Scheduling reconnect");
        self.reconnect = Some(Box::pin(sleep(delay)));
    }

    /// Single admission path for every trigger. Only the first call has
    /// any effect; returns whether this call performed the admission.
    pub(crate) async fn handle_admission(&mut self, access_key: String) -> bool {
        if self.unmounted || self.state.is_terminal() {
            debug!("Admission already handled, ignoring");
            return false;
        }

        self.set_state(ConnectionState::Admitted, messages::ADMITTED.to_string());
        self.stop_all_timers();

        let credential = AdmissionCredential::new(self.resource_id.clone(), access_key);
        if let Err(e) = self.deps.credentials.put(&credential) {
            error!("Failed to persist admission credential: {}", e);
        }
        info!(
            delay_ms = self.config.navigation_delay_ms,
            "Admitted, navigation scheduled"
        );
        self.admitted = Some(credential);
        // Armed before the close so a slow close cannot push navigation back
        self.navigation = Some(Box::pin(sleep(self.config.navigation_delay())));

        self.teardown(CloseReason::Admitted).await;
        true
    }

    /// Cancel the poll interval and the reconnect timer.
    pub(crate) fn stop_all_timers(&mut self) {
        self.poll = None;
        self.reconnect = None;
    }

    /// Release timers, in-flight work and the channel.
    async fn teardown(&mut self, reason: CloseReason) {
        self.stop_all_timers();
        self.connecting = None;
        self.checks = FuturesUnordered::new();
        if let Some(connection) = self.connection.take() {
            close_connection(connection, reason).await;
        }
    }

    pub(crate) async fn unmount(&mut self) {
        if self.unmounted {
            return;
        }
        info!(state = self.state.as_str(), "Stopping wait session");
        self.unmounted = true;
        self.navigation = None;
        self.teardown(CloseReason::Unmount).await;
    }

    fn spawn_check(&mut self, origin: CheckOrigin) {
        let queue = Arc::clone(&self.deps.queue);
        let resource_id = self.resource_id.clone();
        self.checks.push(Box::pin(async move {
            let result = queue.check_status(&resource_id).await;
            (origin, result)
        }));
    }

    fn set_state(&mut self, state: ConnectionState, message: String) {
        if self.state != state {
            debug!(from = self.state.as_str(), to = state.as_str(), "State transition");
        }
        self.state = state;
        self.publish(message);
    }

    fn publish(&self, message: String) {
        self.status_tx.send_replace(WatchStatus {
            state: self.state,
            rank: self.rank,
            message,
        });
    }

    fn status_message(&self) -> String {
        self.status_tx.borrow().message.clone()
    }
}

async fn close_connection(mut connection: Box<dyn PushConnection>, reason: CloseReason) {
    match tokio::time::timeout(CLOSE_TIMEOUT, connection.close(reason)).await {
        Ok(Ok(())) => debug!(reason = reason.as_str(), "Push channel closed"),
        Ok(Err(e)) => debug!(reason = reason.as_str(), "Closing push channel failed: {}", e),
        Err(_) => debug!(reason = reason.as_str(), "Closing push channel timed out"),
    }
}

async fn wait_sleep(timer: &mut Option<Pin<Box<Sleep>>>) {
    match timer {
        Some(timer) => timer.as_mut().await,
        None => pending().await,
    }
}

async fn wait_connect(
    connecting: &mut Option<ConnectFuture>,
) -> Result<Box<dyn PushConnection>, PushError> {
    match connecting {
        Some(connecting) => connecting.await,
        None => pending().await,
    }
}

async fn recv_frame(
    connection: &mut Option<Box<dyn PushConnection>>,
) -> Result<PushFrame, PushError> {
    match connection {
        Some(connection) => connection.recv().await,
        None => pending().await,
    }
}

async fn tick_poll(poll: &mut Option<Interval>) {
    match poll {
        Some(poll) => {
            poll.tick().await;
        }
        None => pending().await,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::credentials::MemoryCredentialStore;
    use crate::testing::{MockPushChannel, MockQueueStatus, RecordingNavigator};

    struct Harness {
        queue: Arc<MockQueueStatus>,
        push: Arc<MockPushChannel>,
        credentials: Arc<MemoryCredentialStore>,
        navigator: Arc<RecordingNavigator>,
    }

    impl Harness {
        fn new() -> Self {
            Self {
                queue: Arc::new(MockQueueStatus::new()),
                push: Arc::new(MockPushChannel::new()),
                credentials: Arc::new(MemoryCredentialStore::new()),
                navigator: Arc::new(RecordingNavigator::new()),
            }
        }

        fn session(&self) -> (WaitSession, watch::Receiver<WatchStatus>) {
            let (status_tx, status_rx) = watch::channel(WatchStatus::default());
            let deps = Collaborators {
                queue: Arc::clone(&self.queue) as Arc<dyn QueueStatusService>,
                push: Arc::clone(&self.push) as Arc<dyn PushChannel>,
                credentials: Arc::clone(&self.credentials) as Arc<dyn CredentialStore>,
                navigator: Arc::clone(&self.navigator) as Arc<dyn Navigator>,
            };
            (
                WaitSession::new("42", WatcherConfig::default(), deps, Arc::new(status_tx)),
                status_rx,
            )
        }
    }

    #[tokio::test]
    async fn test_handle_admission_first_call_wins() {
        let harness = Harness::new();
        let (mut session, status_rx) = harness.session();

        assert!(session.handle_admission("first".to_string()).await);
        assert!(!session.handle_admission("second".to_string()).await);

        assert_eq!(session.state(), ConnectionState::Admitted);
        assert_eq!(
            harness.credentials.get("42").unwrap().as_deref(),
            Some("first")
        );
        assert_eq!(status_rx.borrow().message, messages::ADMITTED);
    }

    #[tokio::test]
    async fn test_admission_after_unmount_is_ignored() {
        let harness = Harness::new();
        let (mut session, _status_rx) = harness.session();

        session.unmount().await;
        assert!(!session.handle_admission("late".to_string()).await);
        assert!(harness.credentials.get("42").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_stop_all_timers_when_nothing_armed() {
        let harness = Harness::new();
        let (mut session, _status_rx) = harness.session();

        session.stop_all_timers();
        session.stop_all_timers();
        assert!(session.poll.is_none());
        assert!(session.reconnect.is_none());
    }

    #[tokio::test]
    async fn test_start_watching_is_idempotent() {
        let harness = Harness::new();
        let (mut session, _status_rx) = harness.session();

        session.start_watching();
        assert_eq!(session.state(), ConnectionState::Connecting);
        assert!(session.connecting.is_some());

        session.start_watching();
        assert!(session.connecting.is_some());
    }

    #[tokio::test]
    async fn test_connection_loss_arms_both_timers() {
        let harness = Harness::new();
        let (mut session, status_rx) = harness.session();

        session.on_connection_lost();
        assert_eq!(session.state(), ConnectionState::Reconnecting);
        assert!(session.poll.is_some());
        assert!(session.reconnect.is_some());
        assert_eq!(status_rx.borrow().message, messages::POLLING);

        session.handle_admission("K".to_string()).await;
        assert!(session.poll.is_none());
        assert!(session.reconnect.is_none());
    }
}
