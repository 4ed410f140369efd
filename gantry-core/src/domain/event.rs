//! Lifecycle event domain types
//!
//! Events are produced only by the engine and carry everything an observer
//! needs to render the terminal feed: timestamp, kind, and message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::domain::run::RunId;

/// Kind of lifecycle event
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    Started,
    StageStarted,
    StageSucceeded,
    StageFailed,
    RecoveryAttempted,
    RecoverySucceeded,
    RecoveryFailed,
    Completed,
    Failed,
    Reset,
}

impl EventKind {
    /// Returns true for kinds that report a failure
    pub fn is_error(&self) -> bool {
        matches!(
            self,
            EventKind::StageFailed | EventKind::RecoveryFailed | EventKind::Failed
        )
    }

    /// Returns true for kinds that carry a stage index
    pub fn is_stage_scoped(&self) -> bool {
        matches!(
            self,
            EventKind::StageStarted
                | EventKind::StageSucceeded
                | EventKind::StageFailed
                | EventKind::RecoveryAttempted
                | EventKind::RecoverySucceeded
                | EventKind::RecoveryFailed
        )
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::Started => "Started",
            EventKind::StageStarted => "StageStarted",
            EventKind::StageSucceeded => "StageSucceeded",
            EventKind::StageFailed => "StageFailed",
            EventKind::RecoveryAttempted => "RecoveryAttempted",
            EventKind::RecoverySucceeded => "RecoverySucceeded",
            EventKind::RecoveryFailed => "RecoveryFailed",
            EventKind::Completed => "Completed",
            EventKind::Failed => "Failed",
            EventKind::Reset => "Reset",
        };
        write!(f, "{}", name)
    }
}

/// A lifecycle or log event emitted by the engine
///
/// Serialized field names are stable: `kind`, `runId`, `stageIndex`
/// (omitted when absent), `timestamp` (RFC 3339), `message`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub kind: EventKind,
    pub run_id: RunId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stage_index: Option<usize>,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

impl Event {
    /// Creates a run-scoped event
    pub fn run(kind: EventKind, run_id: RunId, timestamp: DateTime<Utc>, message: impl Into<String>) -> Self {
        Self {
            kind,
            run_id,
            stage_index: None,
            timestamp,
            message: message.into(),
        }
    }

    /// Creates a stage-scoped event
    pub fn stage(
        kind: EventKind,
        run_id: RunId,
        stage_index: usize,
        timestamp: DateTime<Utc>,
        message: impl Into<String>,
    ) -> Self {
        Self {
            kind,
            run_id,
            stage_index: Some(stage_index),
            timestamp,
            message: message.into(),
        }
    }

    /// Terminal feed line rebuilt from timestamp, kind and message
    pub fn log_line(&self) -> String {
        format!(
            "{} [{}] {}",
            self.timestamp.format("%H:%M:%S"),
            self.kind,
            self.message
        )
    }
}
