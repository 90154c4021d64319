//! Fatal errors surfaced by the orchestrator.
//!
//! Only failures that abort a run live here. Detector query failures and
//! per-path removal/backup/restore failures are absorbed into the
//! [`Journal`](crate::journal::Journal) and reported through the
//! [`OperationResult`](crate::journal::OperationResult) instead.

use std::io;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("configuration error at {path:?}: {reason}")]
    Configuration { path: PathBuf, reason: String },

    #[error("backup manifest not found: {0:?}")]
    ManifestNotFound(PathBuf),

    #[error("backup manifest {path:?} is corrupt: {reason}")]
    CorruptManifest { path: PathBuf, reason: String },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl Error {
    pub(crate) fn configuration(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::Configuration {
            path: path.into(),
            reason: reason.to_string(),
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Error::CorruptManifest {
            path: path.into(),
            reason: reason.to_string(),
        }
    }
}

pub type Result<T> = core::result::Result<T, Error>;
