//! Tiled transparency log: an append-only Merkle tree whose hashes are
//! persisted as fixed-height tiles.
//!
//! Records are hashed into an RFC 6962 style Merkle tree. Every node that an
//! append closes is written once, at a storage slot given by
//! [`stored_hash_index`], and slots are grouped into tiles of `2^H` hashes
//! that a backend stores as flat byte strings. Proofs are built by reading
//! slots back and are verified against a trusted tree head alone.
//!
//! # Core types
//!
//! - [`TileLog`]: the log (append, tree heads, inclusion and consistency
//!   proofs).
//! - [`InclusionProof`], [`ConsistencyProof`], [`TreeHead`]: proof values,
//!   serializable with bincode.
//! - [`TileHashReader`]: a [`HashReader`] that authenticates every tile it
//!   fetches against a tree head.
//! - [`TileCache`]: keeps authenticated full tiles in memory.
//!
//! # Store traits
//!
//! - [`TileStore`]: persist tree size, root and tiles.
//! - [`TileReader`]: fetch raw tiles for verification.
//! - [`MemTileStore`]: in-memory store (requires `mem_store` feature).

#![warn(missing_docs)]

mod config;
mod error;
mod hash;
mod hash_reader;
mod log;
/// In-memory tile store (requires `mem_store` feature).
#[cfg(any(test, feature = "mem_store"))]
pub mod mem_store;
/// Tree coordinates and storage slot arithmetic.
pub mod node;
/// Proof construction and verification primitives.
pub mod proof;
mod store;
#[cfg(test)]
mod tests;
/// Tile addressing and tile data.
pub mod tile;
mod tile_reader;

pub use config::{DEFAULT_TILE_HEIGHT, TileLogConfig};
pub use error::{Error, Result};
pub use hash::{Blake3Hash, HASH_SIZE, Hash, HashFunction, Sha256Hash, TreeHash};
pub use hash_reader::HashReader;
pub use log::TileLog;
#[cfg(any(test, feature = "mem_store"))]
pub use mem_store::MemTileStore;
pub use node::{split_stored_hash_index, stored_hash_count, stored_hash_index};
pub use proof::{ConsistencyProof, InclusionProof, RecordProof, TreeHead, TreeProof};
pub use store::TileStore;
pub use tile::{
    MAX_TILE_HEIGHT, Tile, hash_from_tile, merge_tile_hash, new_tiles, tile_for_storage_id,
    tile_storage_key,
};
pub use tile_reader::{TileCache, TileHashReader, TileReader};
