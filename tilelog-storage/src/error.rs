//! Errors raised by the storage backends.

use thiserror::Error;

/// A backend failure. Converts into [`tilelog::Error::StorageError`] so it
/// propagates through the log unchanged.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Failure reported by a key-value store.
    #[error("key-value store error: {0}")]
    Kv(String),
    /// Size or root metadata that does not decode.
    #[error("corrupted metadata: {0}")]
    CorruptedMetadata(String),
}

impl From<StorageError> for tilelog::Error {
    fn from(err: StorageError) -> Self {
        tilelog::Error::storage(err)
    }
}
