//! Core domain errors.

use thiserror::Error;

/// Core domain errors for ideascope.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Unknown analysis mode.
    #[error("Unknown analysis mode: {0}")]
    UnknownMode(String),
}
