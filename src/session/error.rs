//! Session error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors that can occur during session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    /// Failed to read or write a file.
    #[error("io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Failed to serialize or parse persisted state.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// Thread not found.
    #[error("thread not found: {0}")]
    NotFound(String),

    /// An append would corrupt conversation order: an assistant turn may
    /// never directly follow another assistant turn.
    #[error("invalid turn order for thread {thread_id}: consecutive assistant turns")]
    TurnOrder { thread_id: String },
}

/// Result type for session operations.
pub type Result<T> = std::result::Result<T, SessionError>;

impl SessionError {
    /// Create an IO error with the given path.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
