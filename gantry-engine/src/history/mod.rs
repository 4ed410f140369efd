//! Run history storage
//!
//! The engine hands every terminal run to a [`HistoryStore`] exactly once.
//! Stores are bounded: once `capacity` entries are held the oldest is
//! evicted.

pub mod file;
pub mod memory;

pub use file::JsonFileHistoryStore;
pub use memory::InMemoryHistoryStore;

use async_trait::async_trait;
use gantry_core::domain::history::RunHistoryEntry;

use crate::error::StorageError;

/// Number of runs kept by the stores when no capacity is given
pub const DEFAULT_HISTORY_CAPACITY: usize = 20;

/// Persistence seam for terminal runs
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Records one terminal run
    async fn record(&self, entry: RunHistoryEntry) -> Result<(), StorageError>;

    /// Most recent entries, newest first
    ///
    /// # Arguments
    /// * `limit` - Maximum number of entries to return
    async fn recent(&self, limit: usize) -> Result<Vec<RunHistoryEntry>, StorageError>;
}
