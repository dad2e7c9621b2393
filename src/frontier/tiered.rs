use crate::frontier::{DurableQueue, FrontierEntry, MemoryQueue, Queue};
use crate::storage::StorageResult;
use tracing::debug;

/// Number of durable entries pulled into memory per refill
const REFILL_BATCH: usize = 64;

/// Memory tier in front of a durable tier
///
/// Pops prefer the memory tier and refill it from the durable tier when it
/// runs dry. Pushes go to the durable tier first and only reach memory when
/// the durable tier accepted them.
pub struct TieredQueue {
    memory: MemoryQueue,
    durable: DurableQueue,
}

impl TieredQueue {
    pub fn new(durable: DurableQueue) -> Self {
        Self {
            memory: MemoryQueue::new(),
            durable,
        }
    }

    pub fn session_id(&self) -> &str {
        self.durable.session_id()
    }

    /// Returns a popped entry to the durable tier for a later window
    ///
    /// The memory tier keeps the URI in its seen-set, so the entry is not
    /// handed out again before this queue is dropped.
    pub fn requeue(&mut self, entry: &FrontierEntry) -> StorageResult<bool> {
        let requeued = self.durable.requeue(entry)?;
        if requeued {
            debug!(session = self.durable.session_id(), url = %entry.url, "Requeued entry");
        }
        Ok(requeued)
    }

    fn refill(&mut self) -> StorageResult<()> {
        let batch = self.durable.pending_batch(REFILL_BATCH)?;
        debug!(
            session = self.durable.session_id(),
            count = batch.len(),
            "Refilling memory frontier from durable tier"
        );
        for entry in batch {
            self.memory.push(entry)?;
        }
        Ok(())
    }
}

impl Queue for TieredQueue {
    fn push(&mut self, entry: FrontierEntry) -> StorageResult<bool> {
        if !self.durable.push(entry.clone())? {
            return Ok(false);
        }
        self.memory.push(entry)
    }

    fn pop(&mut self) -> StorageResult<Option<FrontierEntry>> {
        loop {
            if self.memory.is_empty() {
                self.refill()?;
            }

            let Some(entry) = self.memory.pop()? else {
                return Ok(None);
            };

            // Entries whose durable record is gone were visited elsewhere
            if self.durable.mark_visited(entry.url.as_str())? {
                return Ok(Some(entry));
            }
        }
    }

    fn pending(&self) -> StorageResult<u64> {
        self.durable.pending()
    }

    fn visited(&self) -> StorageResult<u64> {
        self.durable.visited()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{SessionRecord, SharedStorage, SqliteStorage, Storage};
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
    fn test_push_writes_through() {
        let storage = storage_with_session("s1");
        let mut queue = TieredQueue::new(DurableQueue::new(storage.clone(), "s1"));

        assert!(queue.push(entry("https://example.com/a")).unwrap());
        assert!(!queue.push(entry("https://example.com/a")).unwrap());

        let pending = storage.with(|s| s.count_pending("s1")).unwrap();
        assert_eq!(pending, 1);
    }

    #[test]
    fn test_resume_reconstructs_remaining_frontier() {
        let storage = storage_with_session("s1");

        let mut window_one = TieredQueue::new(DurableQueue::new(storage.clone(), "s1"));
        for path in ["a", "b", "c"] {
            window_one
                .push(entry(&format!("https://example.com/{}", path)))
                .unwrap();
        }
        let first = window_one.pop().unwrap().unwrap();
        assert_eq!(first.url.as_str(), "https://example.com/a");
        drop(window_one);

        let mut window_two = TieredQueue::new(DurableQueue::new(storage, "s1"));
        assert_eq!(window_two.pending().unwrap(), 2);
        assert_eq!(window_two.visited().unwrap(), 1);

        // Already visited, must not come back
        assert!(!window_two.push(entry("https://example.com/a")).unwrap());

        let rest: Vec<String> = std::iter::from_fn(|| window_two.pop().unwrap())
            .map(|e| e.url.to_string())
            .collect();
        assert_eq!(rest, vec!["https://example.com/b", "https://example.com/c"]);
        assert!(window_two.is_empty().unwrap());
    }

    #[test]
    fn test_requeued_entry_returns_in_next_window() {
        let storage = storage_with_session("s1");

        let mut window_one = TieredQueue::new(DurableQueue::new(storage.clone(), "s1"));
        window_one.push(entry("https://example.com/a")).unwrap();
        let popped = window_one.pop().unwrap().unwrap();
        assert!(window_one.requeue(&popped).unwrap());
        assert!(window_one.pop().unwrap().is_none());
        assert_eq!(window_one.pending().unwrap(), 1);
        drop(window_one);

        let mut window_two = TieredQueue::new(DurableQueue::new(storage, "s1"));
        assert_eq!(window_two.pop().unwrap(), Some(popped));
        assert_eq!(window_two.visited().unwrap(), 1);
    }

    #[test]
    fn test_refill_skips_entries_already_in_memory() {
        let storage = storage_with_session("s1");
        let mut queue = TieredQueue::new(DurableQueue::new(storage, "s1"));

        queue.push(entry("https://example.com/a")).unwrap();
        queue.push(entry("https://example.com/b")).unwrap();

        assert!(queue.pop().unwrap().is_some());
        assert!(queue.pop().unwrap().is_some());
        assert!(queue.pop().unwrap().is_none());
        assert_eq!(queue.visited().unwrap(), 2);
    }
}
