//! Full-text indexing sink
//!
//! The indexing observer hands every downloaded HTML document to an
//! [`IndexSink`]. Sink failures come in two strengths: a [`SinkError::Warning`]
//! is logged and the crawl carries on, a [`SinkError::Hard`] aborts the
//! current execution window.

mod sqlite_sink;

pub use sqlite_sink::SqliteIndexSink;

use crate::storage::StorageError;
use std::collections::BTreeMap;
use thiserror::Error;

/// A fetched document offered to the index
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub url: String,
    pub status: u16,
    pub headers: BTreeMap<String, String>,
    pub body: String,
}

#[derive(Debug, Error)]
pub enum SinkError {
    /// Logged and swallowed
    #[error("index warning: {0}")]
    Warning(String),

    /// Propagated out of the window
    #[error("index failure: {0}")]
    Hard(String),
}

impl SinkError {
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::Warning(_))
    }
}

impl From<StorageError> for SinkError {
    fn from(err: StorageError) -> Self {
        Self::Hard(err.to_string())
    }
}

/// Destination for indexed documents
pub trait IndexSink: Send + Sync {
    fn index(&self, document: &Document) -> Result<(), SinkError>;

    /// Removes the document stored under `document.url`
    fn delete(&self, document: &Document) -> Result<(), SinkError>;
}
