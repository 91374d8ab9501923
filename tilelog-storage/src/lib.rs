//! Persistent [`TileStore`](tilelog::TileStore) backends for `tilelog`.
//!
//! - [`FileTileStore`]: one file per tile under a directory.
//! - [`KvTileStore`]: tiles and metadata in any [`KvStore`], including
//!   RocksDB (requires `rocksdb_storage` feature).
//!
//! Backends keep each tile under its width-free key and grow it in place;
//! [`tilelog::merge_tile_hash`] decides what is written.

#![warn(missing_docs)]

mod error;
mod file;
mod kv;

pub use error::StorageError;
pub use file::FileTileStore;
pub use kv::{KvStore, KvTileStore, MemKvStore};
use tilelog::{HASH_SIZE, Hash};

/// Tree size as stored: 8 bytes, big-endian.
pub(crate) fn encode_size(size: u64) -> [u8; 8] {
    size.to_be_bytes()
}

pub(crate) fn decode_size(bytes: &[u8]) -> Result<u64, StorageError> {
    let bytes: [u8; 8] = bytes.try_into().map_err(|_| {
        StorageError::CorruptedMetadata(format!("tree size has {} bytes, want 8", bytes.len()))
    })?;
    Ok(u64::from_be_bytes(bytes))
}

pub(crate) fn decode_root(bytes: &[u8]) -> Result<Hash, StorageError> {
    bytes.try_into().map_err(|_| {
        StorageError::CorruptedMetadata(format!(
            "tree root has {} bytes, want {}",
            bytes.len(),
            HASH_SIZE
        ))
    })
}
