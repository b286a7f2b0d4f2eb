//! Mock queue status service for testing.

use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

use crate::queue::{QueueError, QueueStatus, QueueStatusService};

/// A recorded status check for test assertions.
#[derive(Debug, Clone)]
pub struct RecordedCheck {
    /// Resource the check was made for.
    pub resource_id: String,
    /// When the check was made (tokio clock, so paused time applies).
    pub timestamp: Instant,
}

/// Mock implementation of the QueueStatusService trait.
///
/// Scripted responses are returned in order; once they run out every check
/// returns the default status (`Waiting` without a rank unless changed).
pub struct MockQueueStatus {
    /// Responses to return, front first.
    responses: Arc<RwLock<VecDeque<Result<QueueStatus, QueueError>>>>,
    /// Returned when no scripted response is left.
    default_status: Arc<RwLock<QueueStatus>>,
    /// Recorded checks.
    checks: Arc<RwLock<Vec<RecordedCheck>>>,
    /// Simulated latency of each check.
    delay: Arc<RwLock<Option<Duration>>>,
}

impl std::fmt::Debug for MockQueueStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockQueueStatus")
            .field("responses", &"<responses>")
            .field("checks", &"<checks>")
            .finish()
    }
}

impl Default for MockQueueStatus {
    fn default() -> Self {
        Self::new()
    }
}

impl MockQueueStatus {
    pub fn new() -> Self {
        Self {
            responses: Arc::new(RwLock::new(VecDeque::new())),
            default_status: Arc::new(RwLock::new(QueueStatus::Waiting { rank: None })),
            checks: Arc::new(RwLock::new(Vec::new())),
            delay: Arc::new(RwLock::new(None)),
        }
    }

    /// Queue a successful response.
    pub async fn push_status(&self, status: QueueStatus) {
        self.responses.write().await.push_back(Ok(status));
    }

    /// Queue a failing response.
    pub async fn push_error(&self, error: QueueError) {
        self.responses.write().await.push_back(Err(error));
    }

    /// Status returned once the scripted responses are used up.
    pub async fn set_default(&self, status: QueueStatus) {
        *self.default_status.write().await = status;
    }

    /// Make every check take `delay` before answering.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    /// Get recorded checks.
    pub async fn recorded_checks(&self) -> Vec<RecordedCheck> {
        self.checks.read().await.clone()
    }

    /// Get the number of checks performed.
    pub async fn check_count(&self) -> usize {
        self.checks.read().await.len()
    }
}

#[async_trait]
impl QueueStatusService for MockQueueStatus {
    async fn check_status(&self, resource_id: &str) -> Result<QueueStatus, QueueError> {
        self.checks.write().await.push(RecordedCheck {
            resource_id: resource_id.to_string(),
            timestamp: Instant::now(),
        });

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let scripted = self.responses.write().await.pop_front();
        match scripted {
            Some(response) => response,
            None => Ok(self.default_status.read().await.clone()),
        }
    }
}
