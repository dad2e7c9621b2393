//! Continuation message bus
//!
//! An execution window is started by a [`ContinueCrawl`] message and, when
//! work remains, ends by dispatching another one for the same job.

use crate::job::JobId;
use crate::storage::{SharedStorage, Storage, StorageResult};
use tracing::{debug, warn};

/// "Run the next window of this job"
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ContinueCrawl {
    pub job_id: JobId,
}

impl ContinueCrawl {
    pub fn new(job_id: JobId) -> Self {
        Self { job_id }
    }
}

/// Transport for continuation messages
pub trait MessageBus: Send + Sync {
    fn dispatch(&self, message: ContinueCrawl) -> StorageResult<()>;

    /// Takes the oldest message off the bus
    fn receive(&self) -> StorageResult<Option<ContinueCrawl>>;
}

/// Bus backed by the `messages` table
#[derive(Clone)]
pub struct SqliteMessageBus {
    storage: SharedStorage,
}

impl SqliteMessageBus {
    pub fn new(storage: SharedStorage) -> Self {
        Self { storage }
    }

    /// Messages waiting to be received
    pub fn backlog(&self) -> StorageResult<u64> {
        self.storage.with(|s| s.count_messages())
    }
}

impl MessageBus for SqliteMessageBus {
    fn dispatch(&self, message: ContinueCrawl) -> StorageResult<()> {
        let id = self
            .storage
            .with(|s| s.push_message(&message.job_id.to_string()))?;
        debug!(job = %message.job_id, message = id, "Dispatched continuation");
        Ok(())
    }

    fn receive(&self) -> StorageResult<Option<ContinueCrawl>> {
        loop {
            let Some(raw) = self.storage.with(|s| s.pop_message())? else {
                return Ok(None);
            };

            match JobId::parse(&raw) {
                Ok(job_id) => return Ok(Some(ContinueCrawl { job_id })),
                Err(e) => {
                    // Dropped; a malformed message can never be processed
                    warn!(message = %raw, error = %e, "Discarding malformed continuation");
                }
            }
        }
    }
}
