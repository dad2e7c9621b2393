//! Storage traits and error types
//!
//! This module defines the trait interface for storage backends and
//! associated error types.

use crate::job::{Job, JobId, Owner, Status};
use crate::storage::{DocumentRecord, DocumentWrite, FrontierRecord, SessionRecord};
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Trait for storage backend implementations
///
/// Every table the crawl needs to survive a process exit lives behind this
/// trait: job snapshots, engine sessions, the durable frontier tier, the
/// continuation queue and the document index.
pub trait Storage {
    // ===== Job Management =====

    /// Inserts or fully overwrites the snapshot stored under `job.id()`
    fn upsert_job(&mut self, job: &Job) -> StorageResult<()>;

    /// Point lookup; `Ok(None)` when no such job exists
    fn get_job(&self, id: JobId) -> StorageResult<Option<Job>>;

    /// Jobs owned by any of `owners` in any of `statuses`, most recent first
    fn list_jobs(&self, owners: &[Owner], statuses: &[Status]) -> StorageResult<Vec<Job>>;

    /// Deletes a job; children referencing it are left alone
    fn delete_job(&mut self, id: JobId) -> StorageResult<bool>;

    // ===== Session Management =====

    fn create_session(&mut self, session: &SessionRecord) -> StorageResult<()>;

    fn get_session(&self, id: &str) -> StorageResult<Option<SessionRecord>>;

    // ===== Frontier Management =====

    /// Adds a URI to a session's durable frontier
    ///
    /// Returns `false` without writing anything when the URI is already
    /// pending or has already been visited in this session.
    fn enqueue(&mut self, session_id: &str, entry: &FrontierRecord) -> StorageResult<bool>;

    /// Oldest pending entries, without removing them
    fn peek_frontier(&self, session_id: &str, limit: usize) -> StorageResult<Vec<FrontierRecord>>;

    /// Removes a URI from the pending set and records it as visited
    ///
    /// Returns `false` if the URI was not pending.
    fn mark_visited(&mut self, session_id: &str, url: &str) -> StorageResult<bool>;

    /// Moves a visited URI back to the pending set
    ///
    /// Used when an exchange failed hard and the URI has to be fetched again
    /// by a later window. Returns `false` if the URI was not visited.
    fn requeue(&mut self, session_id: &str, entry: &FrontierRecord) -> StorageResult<bool>;

    /// Whether a URI is pending or visited in this session
    fn is_known(&self, session_id: &str, url: &str) -> StorageResult<bool>;

    fn count_pending(&self, session_id: &str) -> StorageResult<u64>;

    fn count_visited(&self, session_id: &str) -> StorageResult<u64>;

    // ===== Continuation Messages =====

    fn push_message(&mut self, job_id: &str) -> StorageResult<i64>;

    /// Removes and returns the oldest message
    fn pop_message(&mut self) -> StorageResult<Option<String>>;

    fn count_messages(&self) -> StorageResult<u64>;

    // ===== Document Index =====

    fn upsert_document(&mut self, document: &DocumentRecord) -> StorageResult<DocumentWrite>;

    fn get_document(&self, url: &str) -> StorageResult<Option<DocumentRecord>>;

    fn delete_document(&mut self, url: &str) -> StorageResult<bool>;

    fn count_documents(&self) -> StorageResult<u64>;
}
