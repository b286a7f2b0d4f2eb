//! Admission credential persistence.
//!
//! A `CredentialStore` keeps the access key granted at admission under
//! `accessKey-<resource_id>`. The watcher only writes; the reservation flow
//! reads the key back and removes it once the backend reports it expired.

mod memory;
mod sqlite;
mod types;

pub use memory::MemoryCredentialStore;
pub use sqlite::SqliteCredentialStore;
pub use types::*;

use std::sync::Arc;

use crate::config::{CredentialBackend, CredentialsConfig};

/// Create the credential store selected in the configuration.
pub fn create_credential_store(
    config: &CredentialsConfig,
) -> Result<Arc<dyn CredentialStore>, CredentialError> {
    match config.backend {
        CredentialBackend::Memory => Ok(Arc::new(MemoryCredentialStore::new())),
        CredentialBackend::Sqlite => Ok(Arc::new(SqliteCredentialStore::new(&config.path)?)),
    }
}
