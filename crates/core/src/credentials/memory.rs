//! In-memory credential store.

use std::collections::HashMap;
use std::sync::RwLock;

use super::{credential_key, AdmissionCredential, CredentialError, CredentialStore};

/// Credential store living as long as the process, like a browser tab's
/// session storage.
#[derive(Debug, Default)]
pub struct MemoryCredentialStore {
    entries: RwLock<HashMap<String, String>>,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored credentials.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl CredentialStore for MemoryCredentialStore {
    fn put(&self, credential: &AdmissionCredential) -> Result<(), CredentialError> {
        let mut entries = self.entries.write().map_err(|_| CredentialError::Poisoned)?;
        entries.insert(credential.key(), credential.access_key.clone());
        Ok(())
    }

    fn get(&self, resource_id: &str) -> Result<Option<String>, CredentialError> {
        let entries = self.entries.read().map_err(|_| CredentialError::Poisoned)?;
        Ok(entries.get(&credential_key(resource_id)).cloned())
    }

    fn remove(&self, resource_id: &str) -> Result<bool, CredentialError> {
        let mut entries = self.entries.write().map_err(|_| CredentialError::Poisoned)?;
        Ok(entries.remove(&credential_key(resource_id)).is_some())
    }
}
