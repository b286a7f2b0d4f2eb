//! Types for the admission watcher.

use serde::{Deserialize, Serialize};

use crate::credentials::AdmissionCredential;

/// Connection state of a wait session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    /// No session started yet.
    #[default]
    Idle,
    /// Opening the push channel.
    Connecting,
    /// Channel open, reconciling with the queue status service.
    Syncing,
    /// In the queue, waiting for admission.
    Waiting,
    /// Channel lost; polling and waiting for the reconnect timer.
    Reconnecting,
    /// Admission granted. Terminal.
    Admitted,
}

impl ConnectionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConnectionState::Idle => "idle",
            ConnectionState::Connecting => "connecting",
            ConnectionState::Syncing => "syncing",
            ConnectionState::Waiting => "waiting",
            ConnectionState::Reconnecting => "reconnecting",
            ConnectionState::Admitted => "admitted",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionState::Admitted)
    }
}

/// What an observer of the waiting room gets to see.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchStatus {
    pub state: ConnectionState,
    /// Last known position in the queue.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rank: Option<u64>,
    /// Human-readable progress message.
    pub message: String,
}

impl Default for WatchStatus {
    fn default() -> Self {
        Self {
            state: ConnectionState::Idle,
            rank: None,
            message: messages::CONNECTING.to_string(),
        }
    }
}

/// How a wait session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchOutcome {
    /// Admitted and navigated to the reservation view.
    Admitted(AdmissionCredential),
    /// Stopped before navigation happened.
    Stopped,
}

/// Status messages shown while waiting.
pub mod messages {
    pub const CONNECTING: &str = "Connecting to the waiting queue...";
    pub const POLLING: &str = "Waiting for server response (polling started)...";
    pub const RETRYING: &str = "Connection failed. Retrying...";
    pub const ADMITTED: &str = "Admitted! Moving to the reservation page...";

    pub fn connected(rank: Option<u64>) -> String {
        match rank {
            Some(rank) => format!("Connected to the queue. Current position: {}", rank),
            None => "Connected to the queue. Checking your position...".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_admitted_is_terminal() {
        for state in [
            ConnectionState::Idle,
            ConnectionState::Connecting,
            ConnectionState::Syncing,
            ConnectionState::Waiting,
            ConnectionState::Reconnecting,
        ] {
            assert!(!state.is_terminal(), "{} should not be terminal", state.as_str());
        }
        assert!(ConnectionState::Admitted.is_terminal());
    }

    #[test]
    fn test_connected_message() {
        assert_eq!(
            messages::connected(Some(12)),
            "Connected to the queue. Current position: 12"
        );
        assert!(messages::connected(None).contains("Checking"));
    }

    #[test]
    fn test_status_serialization() {
        let status = WatchStatus {
            state: ConnectionState::Waiting,
            rank: Some(3),
            message: messages::connected(Some(3)),
        };
        let json = serde_json::to_value(&status).unwrap();
        assert_eq!(json["state"], "waiting");
        assert_eq!(json["rank"], 3);
    }
}
