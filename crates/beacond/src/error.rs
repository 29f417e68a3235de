//! Daemon error types.

use std::path::PathBuf;

use beacon_alertmanager::AlertmanagerError;
use beacon_store::StoreError;
use thiserror::Error;

/// Errors raised while setting up or inspecting the daemon.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// The configuration is invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A file could not be read or written.
    #[error("failed to access '{path}': {source}")]
    Io {
        /// The file.
        path: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The Alertmanager client could not be built.
    #[error(transparent)]
    Alertmanager(#[from] AlertmanagerError),

    /// The store failed.
    #[error(transparent)]
    Store(#[from] StoreError),
}

impl DaemonError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Result type for daemon operations.
pub type Result<T> = std::result::Result<T, DaemonError>;
