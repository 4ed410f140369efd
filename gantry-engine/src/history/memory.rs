//! In-memory history store

use async_trait::async_trait;
use gantry_core::domain::history::RunHistoryEntry;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use super::{DEFAULT_HISTORY_CAPACITY, HistoryStore};
use crate::error::StorageError;

/// Bounded history kept in process memory
///
/// Cloning shares the underlying buffer.
#[derive(Clone)]
pub struct InMemoryHistoryStore {
    entries: Arc<Mutex<VecDeque<RunHistoryEntry>>>,
    capacity: usize,
}

impl InMemoryHistoryStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity: capacity.max(1),
        }
    }

    /// Number of stored entries
    pub fn len(&self) -> usize {
        self.entries.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new(DEFAULT_HISTORY_CAPACITY)
    }
}

#[async_trait]
impl HistoryStore for InMemoryHistoryStore {
    async fn record(&self, entry: RunHistoryEntry) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        entries.push_front(entry);
        entries.truncate(self.capacity);
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<RunHistoryEntry>, StorageError> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        Ok(entries.iter().take(limit).cloned().collect())
    }
}
