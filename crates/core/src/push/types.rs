//! Types for the push channel.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

/// Errors that can occur on the push channel.
#[derive(Debug, Error)]
pub enum PushError {
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Failed to decode message: {0}")]
    Decode(String),
}

/// Connect timeout for channels that do not configure one.
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// WebSocket normal closure code.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Why the watcher closes a connection. Each reason carries its own text
/// so server logs can tell them apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloseReason {
    /// Session was admitted.
    Admitted,
    /// Watcher was stopped before admission.
    Unmount,
    /// A stale connection is replaced by a reconnect.
    Reconnect,
}

impl CloseReason {
    pub fn code(&self) -> u16 {
        NORMAL_CLOSURE
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CloseReason::Admitted => "ADMITTED",
            CloseReason::Unmount => "Watcher Unmount",
            CloseReason::Reconnect => "Reconnecting",
        }
    }
}

/// A frame received from the push channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PushFrame {
    Text(String),
    /// The connection ended; `code` is absent when no close frame was sent.
    Closed { code: Option<u16>, reason: String },
}

/// Messages the backend pushes. Only `ADMIT` is acted upon.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "type")]
pub enum PushMessage {
    #[serde(rename = "ADMIT")]
    Admit {
        #[serde(rename = "accessKey", default)]
        access_key: Option<String>,
    },
    #[serde(other)]
    Unknown,
}

impl PushMessage {
    pub fn decode(text: &str) -> Result<Self, PushError> {
        serde_json::from_str(text).map_err(|e| PushError::Decode(e.to_string()))
    }

    /// Access key of a usable admission message.
    pub fn admission_key(&self) -> Option<&str> {
        match self {
            PushMessage::Admit {
                access_key: Some(key),
            } if !key.is_empty() => Some(key),
            _ => None,
        }
    }
}

/// Opens push connections.
#[async_trait]
pub trait PushChannel: Send + Sync {
    /// Open a connection for `resource_id`. Resolves once the channel is open.
    async fn connect(&self, resource_id: &str) -> Result<Box<dyn PushConnection>, PushError>;

    /// How long an open may take before it counts as failed.
    fn connect_timeout(&self) -> Duration {
        DEFAULT_CONNECT_TIMEOUT
    }
}

/// One open push connection.
#[async_trait]
pub trait PushConnection: Send {
    /// Next frame. Returns `Closed` once the connection has ended.
    async fn recv(&mut self) -> Result<PushFrame, PushError>;

    /// Close with `reason`'s code and text.
    async fn close(&mut self, reason: CloseReason) -> Result<(), PushError>;
}
