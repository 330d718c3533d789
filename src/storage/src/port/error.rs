use std::io::ErrorKind;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O failure on key '{key}'")]
    Io { key: String, #[source] source: std::io::Error },

    #[error("Value under key '{key}' is not a valid record: {detail}")]
    Corrupt { key: String, detail: String },

    #[error("Record under key '{key}' has schema version {found}, expected {expected}")]
    UnsupportedSchema { key: String, found: u32, expected: u32 },

    #[error("Failed to serialize record for key '{key}'")]
    Serialize { key: String, #[source] source: serde_json::Error },

    #[error("Atomic batch aborted after staging failure")]
    BatchAborted(#[source] Box<StorageError>),
}

impl StorageError {
    /// Whether retrying the same operation can reasonably succeed.
    /// Decides if a per-pair failure during an insert skips the pair or
    /// aborts the whole insert.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Io { source, .. } => matches!(
                source.kind(),
                ErrorKind::Interrupted | ErrorKind::TimedOut | ErrorKind::WouldBlock
            ),
            Self::BatchAborted(inner) => inner.is_transient(),
            _ => false,
        }
    }
}
