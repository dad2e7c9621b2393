use crate::frontier::{FrontierEntry, Queue};
use crate::storage::StorageResult;
use std::collections::{HashSet, VecDeque};

/// In-process FIFO tier
///
/// Remembers every URI it has ever accepted so the same URI is never queued
/// twice within one window.
#[derive(Debug, Default)]
pub struct MemoryQueue {
    entries: VecDeque<FrontierEntry>,
    seen: HashSet<String>,
    popped: u64,
}

impl MemoryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Queue for MemoryQueue {
    fn push(&mut self, entry: FrontierEntry) -> StorageResult<bool> {
        if !self.seen.insert(entry.url.to_string()) {
            return Ok(false);
        }
        self.entries.push_back(entry);
        Ok(true)
    }

    fn pop(&mut self) -> StorageResult<Option<FrontierEntry>> {
        let next = self.entries.pop_front();
        if next.is_some() {
            self.popped += 1;
        }
        Ok(next)
    }

    fn pending(&self) -> StorageResult<u64> {
        Ok(self.entries.len() as u64)
    }

    fn visited(&self) -> StorageResult<u64> {
        Ok(self.popped)
    }
}
