//! Error types for manisync-sync.

use std::path::PathBuf;

use thiserror::Error;

use manisync_core::ManifestError;
use manisync_seq::SeqError;

/// All errors that can arise from a sync cycle or its collaborators.
#[derive(Debug, Error)]
pub enum SyncError {
    /// The manifest (fetched or stored) is structurally invalid.
    #[error("manifest error: {0}")]
    Manifest(#[from] ManifestError),

    /// Fetching the manifest or a resource failed.
    #[error("transport error for {location}: {reason}")]
    Transport { location: String, reason: String },

    /// The local store failed to read or write.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// JSON serialization/deserialization error (config file).
    #[error("config JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// A chain step received the wrong number of values.
    #[error("sequence error: {0}")]
    Sequence(#[from] SeqError),

    /// A blocking worker panicked or was cancelled.
    #[error("background task failed: {0}")]
    Join(String),

    /// The async runtime could not be started.
    #[error("failed to start runtime: {0}")]
    Runtime(#[source] std::io::Error),

    /// Another cycle is already running against this coordinator.
    #[error("a sync cycle is already in progress")]
    CycleInProgress,

    /// `dirs::home_dir()` returned `None`.
    #[error("cannot determine home directory; set $HOME or pass --db")]
    HomeNotFound,
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}

/// Convenience constructor for [`SyncError::Transport`].
pub(crate) fn transport_err(location: impl Into<String>, reason: impl ToString) -> SyncError {
    SyncError::Transport {
        location: location.into(),
        reason: reason.to_string(),
    }
}
