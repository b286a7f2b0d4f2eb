//! Admission watcher.
//!
//! Keeps a client in a resource's waiting room until the backend admits it.
//! Admission can arrive over the push channel or from a status check (the
//! sync right after the channel opens, or fallback polling while it is
//! down). Whichever comes first wins; the access key is persisted and the
//! navigator is sent to the reservation view after a short delay.

mod backoff;
mod runner;
mod session;
mod types;

pub use backoff::RetryBackoff;
pub use runner::AdmissionWatcher;
pub use types::*;
