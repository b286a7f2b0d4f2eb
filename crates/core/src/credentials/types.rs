//! Types for credential storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that can occur while storing or reading credentials.
#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Credential store lock poisoned")]
    Poisoned,
}

/// Access credential granted when a session is admitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AdmissionCredential {
    /// Resource (concert) the credential was granted for.
    pub resource_id: String,
    /// Opaque key required by reservation calls.
    pub access_key: String,
    /// When admission happened.
    pub admitted_at: DateTime<Utc>,
}

impl AdmissionCredential {
    pub fn new(resource_id: impl Into<String>, access_key: impl Into<String>) -> Self {
        Self {
            resource_id: resource_id.into(),
            access_key: access_key.into(),
            admitted_at: Utc::now(),
        }
    }

    /// Storage key for this credential.
    pub fn key(&self) -> String {
        credential_key(&self.resource_id)
    }
}

/// Storage key of the credential for `resource_id`.
pub fn credential_key(resource_id: &str) -> String {
    format!("accessKey-{}", resource_id)
}

/// Scoped key-value persistence for admission credentials.
pub trait CredentialStore: Send + Sync {
    /// Store the credential, replacing any earlier one for the same resource.
    fn put(&self, credential: &AdmissionCredential) -> Result<(), CredentialError>;

    /// Access key stored for the resource, if any.
    fn get(&self, resource_id: &str) -> Result<Option<String>, CredentialError>;

    /// Remove the credential. Returns true when one was stored.
    fn remove(&self, resource_id: &str) -> Result<bool, CredentialError>;
}
