//! Mock push channel for testing.

use async_trait::async_trait;
use std::future::pending;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{sleep, Instant};

use crate::push::{CloseReason, PushChannel, PushConnection, PushError, PushFrame};

type FrameSender = mpsc::UnboundedSender<Result<PushFrame, PushError>>;

/// One connection handed out by the mock.
#[derive(Debug)]
struct ConnectionRecord {
    tx: Option<FrameSender>,
    closed_with: Option<CloseReason>,
    live: bool,
}

#[derive(Debug, Default)]
struct PushState {
    connect_attempts: Vec<Instant>,
    connections: Vec<ConnectionRecord>,
    fail_remaining: usize,
    always_fail: bool,
    hang_connects: bool,
    close_delay: Option<Duration>,
    max_live: usize,
}

impl PushState {
    fn live_count(&self) -> usize {
        self.connections.iter().filter(|c| c.live).count()
    }

    fn latest_live(&mut self) -> Option<&mut ConnectionRecord> {
        self.connections.iter_mut().rev().find(|c| c.live)
    }
}

/// Mock implementation of the PushChannel trait.
///
/// Provides controllable behavior for testing:
/// - Fail connection attempts (the next N, or all of them)
/// - Stall connection attempts or closes
/// - Push frames, server closes and errors into the newest live connection
/// - Record connect attempts, close reasons and how many connections were
///   open at the same time
#[derive(Debug, Clone, Default)]
pub struct MockPushChannel {
    state: Arc<Mutex<PushState>>,
}

impl MockPushChannel {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, PushState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Fail the next `count` connection attempts.
    pub fn fail_next_connects(&self, count: usize) {
        self.state().fail_remaining = count;
    }

    /// Fail every connection attempt until turned off.
    pub fn set_always_fail(&self, fail: bool) {
        self.state().always_fail = fail;
    }

    /// Leave connection attempts pending forever, like a server that
    /// accepts TCP and never answers the upgrade.
    pub fn set_hang_connects(&self, hang: bool) {
        self.state().hang_connects = hang;
    }

    /// Delay every client close by `delay` before it is recorded.
    pub fn set_close_delay(&self, delay: Duration) {
        self.state().close_delay = Some(delay);
    }

    /// Number of connection attempts, failed ones included.
    pub fn connect_count(&self) -> usize {
        self.state().connect_attempts.len()
    }

    /// When each connection attempt was made.
    pub fn connect_times(&self) -> Vec<Instant> {
        self.state().connect_attempts.clone()
    }

    /// Connections currently open.
    pub fn live_connections(&self) -> usize {
        self.state().live_count()
    }

    /// Highest number of connections that were open at the same time.
    pub fn max_live_connections(&self) -> usize {
        self.state().max_live
    }

    /// Close reasons sent by the client, in order.
    pub fn close_reasons(&self) -> Vec<CloseReason> {
        self.state()
            .connections
            .iter()
            .filter_map(|c| c.closed_with)
            .collect()
    }

    /// Deliver a text frame to the newest live connection.
    /// Returns false when no connection is open.
    pub fn send_text(&self, text: &str) -> bool {
        self.send(Ok(PushFrame::Text(text.to_string())))
    }

    /// Simulate the server closing the newest live connection.
    pub fn close_latest(&self, code: Option<u16>, reason: &str) -> bool {
        let sent = self.send(Ok(PushFrame::Closed {
            code,
            reason: reason.to_string(),
        }));
        if sent {
            if let Some(record) = self.state().latest_live() {
                record.live = false;
                record.tx = None;
            }
        }
        sent
    }

    /// Deliver a transport error to the newest live connection.
    pub fn send_error(&self, message: &str) -> bool {
        self.send(Err(PushError::Protocol(message.to_string())))
    }

    fn send(&self, frame: Result<PushFrame, PushError>) -> bool {
        let tx = self.state().latest_live().and_then(|c| c.tx.clone());
        match tx {
            Some(tx) => tx.send(frame).is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl PushChannel for MockPushChannel {
    async fn connect(&self, _resource_id: &str) -> Result<Box<dyn PushConnection>, PushError> {
        let hang = {
            let mut state = self.state();
            state.connect_attempts.push(Instant::now());
            state.hang_connects
        };
        if hang {
            pending::<()>().await;
        }

        let mut state = self.state();

        if state.always_fail {
            return Err(PushError::ConnectionFailed("mock connect failure".to_string()));
        }
        if state.fail_remaining > 0 {
            state.fail_remaining -= 1;
            return Err(PushError::ConnectionFailed("mock connect failure".to_string()));
        }

        let (tx, rx) = mpsc::unbounded_channel();
        state.connections.push(ConnectionRecord {
            tx: Some(tx),
            closed_with: None,
            live: true,
        });
        state.max_live = state.max_live.max(state.live_count());

        Ok(Box::new(MockPushConnection {
            index: state.connections.len() - 1,
            rx,
            state: Arc::clone(&self.state),
        }))
    }
}

struct MockPushConnection {
    index: usize,
    rx: mpsc::UnboundedReceiver<Result<PushFrame, PushError>>,
    state: Arc<Mutex<PushState>>,
}

impl MockPushConnection {
    fn record(&self, update: impl FnOnce(&mut ConnectionRecord)) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(record) = state.connections.get_mut(self.index) {
            update(record);
        }
    }
}

#[async_trait]
impl PushConnection for MockPushConnection {
    async fn recv(&mut self) -> Result<PushFrame, PushError> {
        match self.rx.recv().await {
            Some(frame) => frame,
            None => Ok(PushFrame::Closed {
                code: None,
                reason: String::new(),
            }),
        }
    }

    async fn close(&mut self, reason: CloseReason) -> Result<(), PushError> {
        let delay = self
            .state
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .close_delay;
        if let Some(delay) = delay {
            sleep(delay).await;
        }
        self.record(|record| {
            record.closed_with = Some(reason);
            record.live = false;
            record.tx = None;
        });
        Ok(())
    }
}

impl Drop for MockPushConnection {
    fn drop(&mut self) {
        self.record(|record| {
            record.live = false;
            record.tx = None;
        });
    }
}
