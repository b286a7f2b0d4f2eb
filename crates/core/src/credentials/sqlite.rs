//! SQLite-backed credential store.
//!
//! Lets a separate reservation process pick up the key after the watcher
//! exits.

use std::path::Path;
use std::sync::Mutex;

use rusqlite::{params, Connection, OptionalExtension};

use super::{credential_key, AdmissionCredential, CredentialError, CredentialStore};

/// SQLite-backed credential store.
pub struct SqliteCredentialStore {
    conn: Mutex<Connection>,
}

impl SqliteCredentialStore {
    /// Open (or create) the database at `path`.
    pub fn new(path: &Path) -> Result<Self, CredentialError> {
        let conn = Connection::open(path).map_err(|e| CredentialError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory store (useful for testing).
    pub fn in_memory() -> Result<Self, CredentialError> {
        let conn =
            Connection::open_in_memory().map_err(|e| CredentialError::Database(e.to_string()))?;
        Self::initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn initialize_schema(conn: &Connection) -> Result<(), CredentialError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS credentials (
                key TEXT PRIMARY KEY,
                resource_id TEXT NOT NULL,
                access_key TEXT NOT NULL,
                admitted_at TEXT NOT NULL
            );
            "#,
        )
        .map_err(|e| CredentialError::Database(e.to_string()))?;
        Ok(())
    }

    /// Full credential stored for the resource, including admission time.
    pub fn get_credential(
        &self,
        resource_id: &str,
    ) -> Result<Option<AdmissionCredential>, CredentialError> {
        let conn = self.conn.lock().map_err(|_| CredentialError::Poisoned)?;
        conn.query_row(
            "SELECT resource_id, access_key, admitted_at FROM credentials WHERE key = ?1",
            params![credential_key(resource_id)],
            |row| {
                let resource_id: String = row.get(0)?;
                let access_key: String = row.get(1)?;
                let admitted_at: String = row.get(2)?;
                Ok((resource_id, access_key, admitted_at))
            },
        )
        .optional()
        .map_err(|e| CredentialError::Database(e.to_string()))?
        .map(|(resource_id, access_key, admitted_at)| {
            let admitted_at = chrono::DateTime::parse_from_rfc3339(&admitted_at)
                .map(|dt| dt.with_timezone(&chrono::Utc))
                .map_err(|e| CredentialError::Database(format!("Invalid timestamp: {}", e)))?;
            Ok(AdmissionCredential {
                resource_id,
                access_key,
                admitted_at,
            })
        })
        .transpose()
    }
}

impl CredentialStore for SqliteCredentialStore {
    fn put(&self, credential: &AdmissionCredential) -> Result<(), CredentialError> {
        let conn = self.conn.lock().map_err(|_| CredentialError::Poisoned)?;
        conn.execute(
            "INSERT OR REPLACE INTO credentials (key, resource_id, access_key, admitted_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                credential.key(),
                credential.resource_id,
                credential.access_key,
                credential.admitted_at.to_rfc3339(),
            ],
        )
        .map_err(|e| CredentialError::Database(e.to_string()))?;
        Ok(())
    }

    fn get(&self, resource_id: &str) -> Result<Option<String>, CredentialError> {
        let conn = self.conn.lock().map_err(|_| CredentialError::Poisoned)?;
        conn.query_row(
            "SELECT access_key FROM credentials WHERE key = ?1",
            params![credential_key(resource_id)],
            |row| row.get(0),
        )
        .optional()
        .map_err(|e| CredentialError::Database(e.to_string()))
    }

    fn remove(&self, resource_id: &str) -> Result<bool, CredentialError> {
        let conn = self.conn.lock().map_err(|_| CredentialError::Poisoned)?;
        let removed = conn
            .execute(
                "DELETE FROM credentials WHERE key = ?1",
                params![credential_key(resource_id)],
            )
            .map_err(|e| CredentialError::Database(e.to_string()))?;
        Ok(removed > 0)
    }
}
