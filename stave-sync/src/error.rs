//! Error types for stave-sync.

use std::path::PathBuf;

use thiserror::Error;

use stave_core::{ConfigError, FileId};

/// All errors that can arise from synchronization operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from the configuration layer.
    #[error("config error: {0}")]
    Config(#[from] ConfigError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A unit for this identifier is already part of the model.
    #[error("source unit already present for {0}; remove it before adding")]
    DuplicateUnit(FileId),

    /// A path that cannot be expressed as a `file://` identifier.
    #[error("path is not addressable as a file URI: {0}")]
    UnaddressablePath(PathBuf),
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
