//! Error types for the Gantry engine
//!
//! Control-API misuse is reported synchronously as an [`EngineError`] and
//! never changes run state. Stage failures are not errors: they are
//! recorded in the run and broadcast as events.

use thiserror::Error;

/// Result type alias for control operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors returned by control operations
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// A run is already Running or Recovering on this engine
    #[error("a pipeline run is already in progress")]
    AlreadyRunning,

    /// The operation requires a Running run
    #[error("no pipeline run is currently running")]
    NotRunning,

    /// A full run or a single step owns the engine
    #[error("pipeline is busy")]
    PipelineBusy,

    /// No stage with this name in the template
    #[error("unknown stage: {0}")]
    UnknownStage(String),

    /// The operation is not valid from the current run status
    #[error("invalid state: {0}")]
    InvalidState(String),

    /// The engine's driver task has shut down
    #[error("engine has stopped")]
    EngineStopped,
}

/// Errors reported by history stores
///
/// Storage failures never roll back or block a run; the engine reports
/// them on the diagnostic channel.
#[derive(Debug, Error)]
pub enum StorageError {
    /// I/O error from file operations
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization or deserialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The store cannot accept writes right now
    #[error("Storage unavailable: {0}")]
    Unavailable(String),
}
