//! Mock credential store for testing.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use crate::credentials::{
    AdmissionCredential, CredentialError, CredentialStore, MemoryCredentialStore,
};

/// In-memory credential store that counts writes and can be told to fail.
#[derive(Debug, Default)]
pub struct MockCredentialStore {
    inner: MemoryCredentialStore,
    puts: AtomicUsize,
    fail_writes: AtomicBool,
}

impl MockCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every `put` fail with a database error.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Number of `put` calls, failed ones included.
    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

impl CredentialStore for MockCredentialStore {
    fn put(&self, credential: &AdmissionCredential) -> Result<(), CredentialError> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CredentialError::Database("mock write failure".to_string()));
        }
        self.inner.put(credential)
    }

    fn get(&self, resource_id: &str) -> Result<Option<String>, CredentialError> {
        self.inner.get(resource_id)
    }

    fn remove(&self, resource_id: &str) -> Result<bool, CredentialError> {
        self.inner.remove(resource_id)
    }
}
