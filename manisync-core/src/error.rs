//! Error types for manisync-core.

use std::path::PathBuf;

use thiserror::Error;

/// All errors that can arise from manifest parsing, diffing and generation.
#[derive(Debug, Error)]
pub enum ManifestError {
    /// The manifest is missing required fields or is structurally invalid.
    #[error("malformed manifest: {reason}")]
    Malformed { reason: String },

    /// JSON serialization error (write path only; parse failures are `Malformed`).
    #[error("manifest JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O failure while scanning a directory for `generate`.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ManifestError {
    /// Convenience constructor for [`ManifestError::Malformed`].
    pub fn malformed(reason: impl Into<String>) -> Self {
        Self::Malformed {
            reason: reason.into(),
        }
    }
}

/// Convenience constructor for [`ManifestError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> ManifestError {
    ManifestError::Io {
        path: path.into(),
        source,
    }
}
