//! JSON file history store
//!
//! The whole history is rewritten on every record: entries are serialized
//! to a sibling temporary file which is then renamed over the target, so a
//! crash never leaves a half-written history behind.

use async_trait::async_trait;
use gantry_core::domain::history::RunHistoryEntry;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::debug;

use super::HistoryStore;
use crate::error::StorageError;

/// History persisted as a JSON array, newest entry first
pub struct JsonFileHistoryStore {
    path: PathBuf,
    capacity: usize,
    entries: Mutex<Vec<RunHistoryEntry>>,
}

impl JsonFileHistoryStore {
    /// Opens a store, loading any existing history at `path`
    ///
    /// A missing file starts an empty history. A file that exists but cannot
    /// be parsed is an error rather than silently discarded.
    pub async fn open(path: impl AsRef<Path>, capacity: usize) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let capacity = capacity.max(1);

        let mut entries: Vec<RunHistoryEntry> = match tokio::fs::read_to_string(&path).await {
            Ok(content) if content.trim().is_empty() => Vec::new(),
            Ok(content) => serde_json::from_str(&content)?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Vec::new(),
            Err(e) => return Err(e.into()),
        };
        entries.truncate(capacity);

        debug!("Loaded {} history entries from {}", entries.len(), path.display());

        Ok(Self {
            path,
            capacity,
            entries: Mutex::new(entries),
        })
    }

    /// Location of the history file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn persist(&self, entries: &[RunHistoryEntry]) -> Result<(), StorageError> {
        let json = serde_json::to_string_pretty(entries)?;
        let tmp = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp, json).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for JsonFileHistoryStore {
    async fn record(&self, entry: RunHistoryEntry) -> Result<(), StorageError> {
        let mut entries = self.entries.lock().await;
        let mut updated = Vec::with_capacity(self.capacity);
        updated.push(entry);
        updated.extend(entries.iter().take(self.capacity - 1).cloned());

        // Memory only moves forward once the file write succeeded
        self.persist(&updated).await?;
        *entries = updated;
        Ok(())
    }

    async fn recent(&self, limit: usize) -> Result<Vec<RunHistoryEntry>, StorageError> {
        let entries = self.entries.lock().await;
        Ok(entries.iter().take(limit).cloned().collect())
    }
}
