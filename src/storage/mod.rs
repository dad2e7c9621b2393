//! Storage module for persisting sweep state
//!
//! This module handles all database operations, including:
//! - SQLite database initialization and schema management
//! - Job snapshot persistence
//! - Crawl session records and the durable frontier
//! - The continuation message queue and the document index

mod schema;
mod sqlite;
mod traits;

pub use sqlite::SqliteStorage;
pub use traits::{Storage, StorageError, StorageResult};

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Initializes or opens a storage database
///
/// # Arguments
///
/// * `path` - Path to the SQLite database file
///
/// # Returns
///
/// * `Ok(SqliteStorage)` - Successfully initialized storage
/// * `Err(StorageError)` - Failed to initialize storage
pub fn open_storage(path: &Path) -> StorageResult<SqliteStorage> {
    SqliteStorage::new(path)
}

/// A storage handle shared between the job store, the frontier, the message
/// bus and the index sink
///
/// The lock is only ever held for the duration of a single call, never
/// across an await point.
#[derive(Clone)]
pub struct SharedStorage {
    inner: Arc<Mutex<SqliteStorage>>,
}

impl SharedStorage {
    pub fn new(storage: SqliteStorage) -> Self {
        Self {
            inner: Arc::new(Mutex::new(storage)),
        }
    }

    /// Runs `f` with exclusive access to the underlying storage
    pub fn with<T>(
        &self,
        f: impl FnOnce(&mut SqliteStorage) -> StorageResult<T>,
    ) -> StorageResult<T> {
        let mut guard = self
            .inner
            .lock()
            .map_err(|_| StorageError::Database("storage lock poisoned".to_string()))?;
        f(&mut guard)
    }
}

/// A resumable crawl-engine session
#[derive(Debug, Clone, PartialEq)]
pub struct SessionRecord {
    pub id: String,
    pub created_at: String,
    pub config_hash: String,
    /// Authoritative collection URIs, in insertion order
    pub collection: Vec<String>,
    /// Names of the observers attached when the session was created
    pub observers: Vec<String>,
}

/// One pending entry of the durable frontier
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierRecord {
    pub url: String,
    pub depth: u32,
    pub found_on: Option<String>,
}

/// A document held by the full-text index
#[derive(Debug, Clone, PartialEq)]
pub struct DocumentRecord {
    pub url: String,
    pub status_code: u16,
    pub headers: BTreeMap<String, String>,
    pub title: Option<String>,
    pub body_text: String,
    pub checksum: String,
    pub indexed_at: String,
}

/// What an index write actually did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentWrite {
    Inserted,
    Updated,
    /// Stored checksum already matched; nothing was written
    Unchanged,
}
