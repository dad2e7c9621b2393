//! Crawl frontier
//!
//! The frontier is split into two tiers that sit behind one [`Queue`] trait:
//! - [`MemoryQueue`]: the in-process tier, alive for one execution window
//! - [`DurableQueue`]: the SQLite tier, keyed by the engine session id
//! - [`TieredQueue`]: the composite the crawl engine actually uses
//!
//! Every enqueue and dequeue on the composite is written through to the
//! durable tier, so a later window that resumes by session id sees exactly
//! the pending set left behind.

mod durable;
mod memory;
mod tiered;

pub use durable::DurableQueue;
pub use memory::MemoryQueue;
pub use tiered::TieredQueue;

use crate::storage::{FrontierRecord, StorageError, StorageResult};
use url::Url;

/// A URI waiting to be visited
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrontierEntry {
    /// The URI to fetch
    pub url: Url,

    /// Link distance from the collection root it was reached from
    pub depth: u32,

    /// The page this URI was discovered on; `None` for collection roots
    pub found_on: Option<Url>,
}

impl FrontierEntry {
    /// An entry for a collection root
    pub fn root(url: Url) -> Self {
        Self {
            url,
            depth: 0,
            found_on: None,
        }
    }

    /// An entry discovered on `parent`, one level deeper
    pub fn discovered(url: Url, parent: &FrontierEntry) -> Self {
        Self {
            url,
            depth: parent.depth + 1,
            found_on: Some(parent.url.clone()),
        }
    }

    pub(crate) fn to_record(&self) -> FrontierRecord {
        FrontierRecord {
            url: self.url.to_string(),
            depth: self.depth,
            found_on: self.found_on.as_ref().map(Url::to_string),
        }
    }

    pub(crate) fn from_record(record: FrontierRecord) -> StorageResult<Self> {
        let parse = |s: &str| {
            Url::parse(s).map_err(|e| {
                StorageError::Serialization(format!("bad frontier URL '{}': {}", s, e))
            })
        };

        Ok(Self {
            url: parse(&record.url)?,
            depth: record.depth,
            found_on: record.found_on.as_deref().map(parse).transpose()?,
        })
    }
}

/// A crawl frontier
pub trait Queue: Send {
    /// Adds an entry
    ///
    /// Returns `false` when the URI is already pending or was already
    /// visited; nothing is added in that case.
    fn push(&mut self, entry: FrontierEntry) -> StorageResult<bool>;

    /// Removes the next entry and records it as visited
    fn pop(&mut self) -> StorageResult<Option<FrontierEntry>>;

    /// Number of entries still waiting
    fn pending(&self) -> StorageResult<u64>;

    /// Number of entries popped so far
    fn visited(&self) -> StorageResult<u64>;

    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.pending()? == 0)
    }
}
