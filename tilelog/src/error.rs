//! Error types for transparency log operations.

use thiserror::Error;

/// Alias for `core::result::Result<T, Error>`.
pub type Result<T> = core::result::Result<T, Error>;

/// Unified error type for tile log operations.
///
/// Every variant is fatal for the operation that produced it. Nothing in this
/// crate retries; retry policy belongs to the storage backend.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// A proof has the wrong shape for its sizes, or does not rebuild the
    /// trusted root.
    #[error("invalid proof: {0}")]
    InvalidProof(String),
    /// A fetched tile did not hash to the value its parent (or the trusted
    /// root) commits to.
    #[error("downloaded inconsistent tile: {0}")]
    InconsistentTile(String),
    /// Stored tile bytes are shorter than the tile claims, or have gaps.
    #[error("corrupted tile: {0}")]
    CorruptedTile(String),
    /// Tile coordinates out of range.
    #[error("invalid tile: {0}")]
    InvalidTile(String),
    /// A tile path that does not parse.
    #[error("malformed tile path: {0}")]
    InvalidTilePath(String),
    /// Precondition violated at the API boundary.
    #[error("invalid input: {0}")]
    InvalidInput(String),
    /// A storage slot past the end of the trusted tree was requested.
    #[error("indexes not in tree")]
    IndexesNotInTree,
    /// A `HashReader` returned the wrong number of hashes.
    #[error("read_hashes returned {actual} hashes, want {expected}")]
    BadReadHashes {
        /// Number of slots requested.
        expected: usize,
        /// Number of hashes returned.
        actual: usize,
    },
    /// Invalid log configuration.
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    /// An error from the storage backend, passed through unchanged.
    #[error("storage error: {0}")]
    StorageError(#[source] Box<dyn std::error::Error + Send + Sync>),
}

impl Error {
    /// Wrap a backend error.
    pub fn storage<E>(err: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::StorageError(err.into())
    }
}
