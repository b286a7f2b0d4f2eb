pub mod api;
pub mod config;
pub mod credentials;
pub mod navigator;
pub mod push;
pub mod queue;
pub mod testing;
pub mod watcher;

pub use api::{ApiClient, ApiError};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, CredentialBackend,
    WatcherConfig,
};
pub use credentials::{
    create_credential_store, AdmissionCredential, CredentialError, CredentialStore,
    MemoryCredentialStore, SqliteCredentialStore,
};
pub use navigator::{reservation_route, ChannelNavigator, Navigator};
pub use push::{CloseReason, PushChannel, PushConnection, PushError, PushFrame, WsPushChannel};
pub use queue::{HttpQueueStatus, QueueError, QueueStatus, QueueStatusService};
pub use watcher::{AdmissionWatcher, ConnectionState, WatchOutcome, WatchStatus};
