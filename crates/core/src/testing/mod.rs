//! Testing utilities and mock implementations.
//!
//! Mocks for every collaborator of the admission watcher, so wait sessions
//! can be driven deterministically (usually under paused tokio time).
//!
//! # Example
//!
//! ```rust,ignore
//! use waitroom_core::testing::{MockPushChannel, MockQueueStatus, RecordingNavigator};
//!
//! let queue = Arc::new(MockQueueStatus::new());
//! let push = Arc::new(MockPushChannel::new());
//! let navigator = Arc::new(RecordingNavigator::new());
//!
//! queue.push_status(QueueStatus::Waiting { rank: Some(3) }).await;
//! // ... start a watcher, then announce admission over the channel
//! push.send_text(r#"{"type":"ADMIT","accessKey":"K1"}"#);
//! ```

mod mock_credentials;
mod mock_navigator;
mod mock_push;
mod mock_queue;

pub use mock_credentials::MockCredentialStore;
pub use mock_navigator::{RecordedNavigation, RecordingNavigator};
pub use mock_push::MockPushChannel;
pub use mock_queue::{MockQueueStatus, RecordedCheck};

/// Test fixtures and helper functions.
pub mod fixtures {
    use crate::config::WatcherConfig;

    /// Watcher policy with the production defaults.
    pub fn watcher_config() -> WatcherConfig {
        WatcherConfig::default()
    }

    /// Watcher policy with short timings for tests against real sockets.
    pub fn fast_watcher_config() -> WatcherConfig {
        WatcherConfig {
            poll_interval_ms: 100,
            initial_retry_delay_ms: 150,
            max_retry_delay_ms: 600,
            synced_retry_delay_ms: 50,
            navigation_delay_ms: 50,
        }
    }

    /// Push message announcing admission.
    pub fn admit_message(access_key: &str) -> String {
        format!(r#"{{"type":"ADMIT","accessKey":"{}"}}"#, access_key)
    }
}
