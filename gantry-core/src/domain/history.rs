//! Run history domain types
//!
//! A history entry is the immutable snapshot of a terminal run, created
//! once and handed to whatever store the engine was given.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::run::{RunId, RunStatus, StageOutcome};

/// Persisted summary of one terminal run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunHistoryEntry {
    pub run_id: RunId,
    pub template_name: String,
    pub status: RunStatus,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub stage_outcomes: Vec<StageRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

impl RunHistoryEntry {
    /// Returns true if the run succeeded
    pub fn succeeded(&self) -> bool {
        self.status == RunStatus::Succeeded
    }

    /// Total wall time of the run
    pub fn duration_ms(&self) -> u64 {
        (self.finished_at - self.started_at).num_milliseconds().max(0) as u64
    }
}

/// Per-stage line of a history entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StageRecord {
    pub stage_index: usize,
    pub outcome: StageOutcome,
    pub duration_ms: u64,
}

/// Aggregate statistics over a slice of history
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryStats {
    pub total_runs: usize,
    pub successful_runs: usize,
    /// Percentage in [0, 100]; 0 when there is no history
    pub success_rate: f64,
    pub average_duration_ms: u64,
}

impl HistoryStats {
    /// Computes statistics over the given entries
    pub fn from_entries(entries: &[RunHistoryEntry]) -> Self {
        let total_runs = entries.len();
        if total_runs == 0 {
            return Self {
                total_runs: 0,
                successful_runs: 0,
                success_rate: 0.0,
                average_duration_ms: 0,
            };
        }

        let successful_runs = entries.iter().filter(|e| e.succeeded()).count();
        let total_duration: u64 = entries.iter().map(|e| e.duration_ms()).sum();

        Self {
            total_runs,
            successful_runs,
            success_rate: successful_runs as f64 / total_runs as f64 * 100.0,
            average_duration_ms: total_duration / total_runs as u64,
        }
    }
}
