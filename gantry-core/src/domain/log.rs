//! Log domain types

use serde::{Deserialize, Serialize};

use crate::domain::event::{Event, EventKind};

/// A line of the terminal feed
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub level: LogLevel,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LogLevel {
    Info,
    Warning,
    Error,
}

impl From<EventKind> for LogLevel {
    fn from(kind: EventKind) -> Self {
        match kind {
            EventKind::StageFailed | EventKind::RecoveryFailed | EventKind::Failed => LogLevel::Error,
            EventKind::RecoveryAttempted => LogLevel::Warning,
            _ => LogLevel::Info,
        }
    }
}

impl From<&Event> for LogEntry {
    fn from(event: &Event) -> Self {
        Self {
            timestamp: event.timestamp,
            level: event.kind.into(),
            message: format!("[{}] {}", event.kind, event.message),
        }
    }
}
