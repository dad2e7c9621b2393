use crate::frontier::{FrontierEntry, Queue};
use crate::storage::{SharedStorage, Storage, StorageResult};

/// SQLite-backed tier, keyed by an engine session id
///
/// Survives process exit. A URI that was popped once is recorded as visited
/// and can never be pushed again under the same session id.
#[derive(Clone)]
pub struct DurableQueue {
    storage: SharedStorage,
    session_id: String,
}

impl DurableQueue {
    /// Opens the durable frontier of an existing crawl session
    pub fn new(storage: SharedStorage, session_id: impl Into<String>) -> Self {
        Self {
            storage,
            session_id: session_id.into(),
        }
    }

    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Oldest pending entries, left in place
    pub fn pending_batch(&self, limit: usize) -> StorageResult<Vec<FrontierEntry>> {
        let records = self
            .storage
            .with(|s| s.peek_frontier(&self.session_id, limit))?;
        records.into_iter().map(FrontierEntry::from_record).collect()
    }

    /// Moves a pending URI to the visited set
    ///
    /// Returns `false` when the URI was not pending.
    pub fn mark_visited(&self, url: &str) -> StorageResult<bool> {
        self.storage.with(|s| s.mark_visited(&self.session_id, url))
    }

    /// Puts a visited entry back into the pending set
    pub fn requeue(&self, entry: &FrontierEntry) -> StorageResult<bool> {
        let record = entry.to_record();
        self.storage.with(|s| s.requeue(&self.session_id, &record))
    }
}

impl Queue for DurableQueue {
    fn push(&mut self, entry: FrontierEntry) -> StorageResult<bool> {
        let record = entry.to_record();
        self.storage.with(|s| s.enqueue(&self.session_id, &record))
    }

    fn pop(&mut self) -> StorageResult<Option<FrontierEntry>> {
        loop {
            let Some(next) = self.pending_batch(1)?.pop() else {
                return Ok(None);
            };
            if self.mark_visited(next.url.as_str())? {
                return Ok(Some(next));
            }
        }
    }

    fn pending(&self) -> StorageResult<u64> {
        self.storage.with(|s| s.count_pending(&self.session_id))
    }

    fn visited(&self) -> StorageResult<u64> {
        self.storage.with(|s| s.count_visited(&self.session_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{SessionRecord, SqliteStorage};
    use url::Url;

    fn storage_with_session(id: &str) -> SharedStorage {
        let mut storage = SqliteStorage::new_in_memory().unwrap();
        storage
            .create_session(&SessionRecord {
                id: id.to_string(),
                created_at: "2024-01-01T00:00:00.000000000Z".to_string(),
                config_hash: "hash".to_string(),
                collection: Vec::new(),
                observers: Vec::new(),
            })
            .unwrap();
        SharedStorage::new(storage)
    }

    fn entry(url: &str) -> FrontierEntry {
        FrontierEntry::root(Url::parse(url).unwrap())
    }

    #[test]
    fn test_pop_marks_visited() {
        let storage = storage_with_session("s1");
        let mut queue = DurableQueue::new(storage, "s1");

        queue.push(entry("https://example.com/a")).unwrap();
        let popped = queue.pop().unwrap().unwrap();

        assert_eq!(popped.url.as_str(), "https://example.com/a");
        assert_eq!(queue.pending().unwrap(), 0);
        assert_eq!(queue.visited().unwrap(), 1);
        assert!(!queue.push(entry("https://example.com/a")).unwrap());
    }

    #[test]
    fn test_reopened_queue_sees_same_frontier() {
        let storage = storage_with_session("s1");
        let mut first = DurableQueue::new(storage.clone(), "s1");

        let root = entry("https://example.com/");
        let child = FrontierEntry::discovered(Url::parse("https://example.com/a").unwrap(), &root);
        first.push(root).unwrap();
        first.push(child.clone()).unwrap();
        first.pop().unwrap();
        drop(first);

        let mut reopened = DurableQueue::new(storage, "s1");
        assert_eq!(reopened.pending().unwrap(), 1);
        assert_eq!(reopened.pop().unwrap(), Some(child));
        assert!(reopened.pop().unwrap().is_none());
    }
}
