//! Errors for status record storage and discovery.
//!
//! Storage errors are never fatal to an owning recorder: the self-polling
//! control loop logs them and keeps going, so every variant carries enough
//! context to make that log line useful on its own.

use std::path::PathBuf;

use thiserror::Error;

/// Errors reading, writing, or enumerating status records.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Status record I/O failed at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Status record at {path} is malformed: {reason}")]
    Malformed { path: PathBuf, reason: String },
    #[error("Status record not found: {0}")]
    NotFound(PathBuf),
}

impl StoreError {
    pub(crate) fn io(path: &std::path::Path, source: std::io::Error) -> Self {
        StoreError::Io {
            path: path.to_path_buf(),
            source,
        }
    }

    pub(crate) fn malformed(path: &std::path::Path, reason: impl ToString) -> Self {
        StoreError::Malformed {
            path: path.to_path_buf(),
            reason: reason.to_string(),
        }
    }
}
