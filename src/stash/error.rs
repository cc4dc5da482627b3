//! Stash errors

use std::io;

use thiserror::Error;

/// Errors raised by stash storage backends
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("stash '{0}' not found in storage")]
    NotFound(String),

    #[error("invalid stash name '{0}'")]
    InvalidName(String),

    #[error("storage I/O error for '{name}': {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
}

impl StorageError {
    pub fn io(name: impl Into<String>, source: io::Error) -> Self {
        Self::Io {
            name: name.into(),
            source,
        }
    }
}

/// Errors surfaced by the stash manager
#[derive(Debug, Error)]
pub enum StashError {
    /// Another stash already holds the allocated name
    #[error("stash {0} already exists")]
    AlreadyExists(String),

    /// Unknown stash, or one that failed and has no payload
    #[error("stash {0} not found")]
    NotFound(String),

    /// The stash is still being written
    #[error("stash {0} is still in progress")]
    InProgress(String),

    #[error("max_stashes must be at least 1")]
    InvalidRetention,

    #[error("failed to encode events: {0}")]
    Encode(#[from] serde_json::Error),

    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Stashes are written on the tokio blocking pool
    #[error("no tokio runtime available to write the stash")]
    NoRuntime,

    #[error("stash task failed: {0}")]
    Task(String),
}
