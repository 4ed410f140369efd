//! Diagnostic side-channel
//!
//! Storage failures and misbehaving subscribers are reported here, never on
//! the event bus, so the lifecycle feed stays a clean record of the run.

use chrono::{DateTime, Utc};
use gantry_core::domain::run::RunId;
use tokio::sync::broadcast;
use tracing::warn;

/// Where a diagnostic originated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSource {
    Storage,
    Subscriber,
}

/// A non-fatal problem observed by the engine
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub source: DiagnosticSource,
    pub run_id: Option<RunId>,
    pub timestamp: DateTime<Utc>,
    pub message: String,
}

/// Broadcast channel for diagnostics
#[derive(Debug, Clone)]
pub struct DiagnosticChannel {
    sender: broadcast::Sender<Diagnostic>,
}

impl DiagnosticChannel {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Reports a diagnostic to every current receiver and to the log
    ///
    /// If nobody is listening the diagnostic only reaches the log.
    pub fn report(&self, diagnostic: Diagnostic) {
        warn!(
            "{:?} diagnostic for run {}: {}",
            diagnostic.source,
            diagnostic
                .run_id
                .map(|id| id.short())
                .unwrap_or_else(|| "-".to_string()),
            diagnostic.message
        );
        let _ = self.sender.send(diagnostic);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Diagnostic> {
        self.sender.subscribe()
    }
}
