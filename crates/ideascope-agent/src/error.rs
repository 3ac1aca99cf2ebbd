//! Error types for the engine boundary.

use thiserror::Error;

/// Errors that can occur while starting or consuming a task execution.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Another execution already occupies the engine.
    #[error("Another task execution is already running")]
    ConcurrencyConflict,

    /// Claude CLI executable not found.
    #[error("Claude CLI not found at '{0}'. Ensure Claude Code is installed.")]
    ClaudeNotFound(String),

    /// Failed to spawn the Claude process.
    #[error("Failed to spawn Claude process: {0}")]
    SpawnError(#[from] std::io::Error),

    /// Claude process exited with an error.
    #[error("Claude process exited with error: {0}")]
    ProcessError(String),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Protocol error during communication.
    #[error("Protocol error: {0}")]
    ProtocolError(String),

    /// The consumer dropped the event stream.
    #[error("Channel closed")]
    ChannelClosed,

    /// The execution failed mid-stream.
    #[error("Execution failed: {0}")]
    Execution(String),

    /// Checkpoint not found.
    #[error("Checkpoint not found: {0}")]
    CheckpointNotFound(String),

    /// Checkpoint could not be created or applied.
    #[error("Checkpoint error: {0}")]
    Checkpoint(String),
}

impl EngineError {
    /// Returns true if the engine refused to start because it is busy.
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::ConcurrencyConflict)
    }
}
