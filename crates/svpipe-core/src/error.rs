//! Result layer errors.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while storing, reading, emitting, or transferring results.
#[derive(Debug, Error)]
pub enum ResultError {
    /// Filesystem error on a spool file.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Payload accessed after the store was released.
    #[error("Payload already released: {}", path.display())]
    PayloadReleased { path: PathBuf },

    /// A spooled record could not be decoded.
    #[error("Corrupt spool file {} at line {line}: {source}", path.display())]
    SpoolRead {
        path: PathBuf,
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// The output writer rejected a record.
    #[error("Write error: {0}")]
    Write(String),

    /// An outcome message could not be rebuilt on the receiving side.
    #[error("Transfer error: {0}")]
    Transfer(String),
}
