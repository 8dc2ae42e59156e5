//! Fatal error kinds for a labeling run.

use thiserror::Error;

/// Errors that abort a run. Simulated worker faults never surface here.
#[derive(Debug, Error)]
pub enum EngineError {
    /// A run parameter is out of its valid range.
    #[error("invalid configuration: {0}")]
    Configuration(String),

    /// The ingestion stream violated the wire protocol.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// A resource (socket, thread, output file) could not be obtained.
    #[error("resource error: {0}")]
    Resource(String),

    /// A shutdown signal arrived before a run could start or finish.
    #[error("interrupted")]
    Interrupted,

    /// Underlying I/O failure on the ingestion connection.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl EngineError {
    /// Process exit status for this failure.
    pub fn exit_code(&self) -> i32 {
        1
    }
}

/// A type alias for `Result<T, EngineError>`.
pub type Result<T> = std::result::Result<T, EngineError>;
