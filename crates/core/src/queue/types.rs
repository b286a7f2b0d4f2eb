//! Types for queue status checks.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::api::ApiError;

/// Errors that can occur during a status check.
#[derive(Debug, Error)]
pub enum QueueError {
    #[error("API error: {0}")]
    Api(#[from] ApiError),

    /// The backend reported admission without handing out a key.
    #[error("Admitted status without access key")]
    MissingAccessKey,
}

/// Position of a session in the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueueState {
    Waiting,
    Admitted,
    /// Any other status; counts as still waiting.
    #[serde(other)]
    Unknown,
}

/// Response of the queue status endpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueueStatusResponse {
    pub status: QueueState,
    /// 1-based position while waiting.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rank: Option<u64>,
    /// Present once admitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_key: Option<String>,
}

impl QueueStatusResponse {
    pub fn waiting(rank: Option<u64>) -> Self {
        Self {
            status: QueueState::Waiting,
            rank,
            access_key: None,
        }
    }

    pub fn admitted(access_key: impl Into<String>) -> Self {
        Self {
            status: QueueState::Admitted,
            rank: None,
            access_key: Some(access_key.into()),
        }
    }
}

/// Result of a status check, validated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueueStatus {
    Waiting { rank: Option<u64> },
    Admitted { access_key: String },
}

impl TryFrom<QueueStatusResponse> for QueueStatus {
    type Error = QueueError;

    fn try_from(response: QueueStatusResponse) -> Result<Self, Self::Error> {
        match response.status {
            QueueState::Waiting => Ok(QueueStatus::Waiting {
                rank: response.rank,
            }),
            QueueState::Admitted => match response.access_key {
                Some(key) if !key.is_empty() => Ok(QueueStatus::Admitted { access_key: key }),
                _ => Err(QueueError::MissingAccessKey),
            },
            QueueState::Unknown => {
                debug!(rank = ?response.rank, "Unrecognized queue status, treating as waiting");
                Ok(QueueStatus::Waiting {
                    rank: response.rank,
                })
            }
        }
    }
}

/// Queue Status Service: where does this session stand for `resource_id`?
#[async_trait]
pub trait QueueStatusService: Send + Sync {
    async fn check_status(&self, resource_id: &str) -> Result<QueueStatus, QueueError>;
}
