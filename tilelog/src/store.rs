//! Storage abstraction for a tiled log.

use crate::{Hash, Result};

/// The persistent state of a log: its size, its latest root and its tiles.
///
/// Tiles are addressed by their full path (`tile/H/L/N.W`). A backend keeps
/// each tile under its width-free key (see
/// [`tile_storage_key`](crate::tile_storage_key)) and grows it in place as
/// the log appends, so reading the path of a narrower tile returns at least
/// that tile's bytes.
///
/// Writes take `&mut self`: a log has exactly one writer.
pub trait TileStore {
    /// Number of records committed to the log. 0 for a fresh store.
    fn read_tree_size(&self) -> Result<u64>;

    /// Commit a new tree size.
    fn update_tree_size(&mut self, size: u64) -> Result<()>;

    /// Root hash persisted by the last append, if any.
    fn read_tree_root(&self) -> Result<Option<Hash>>;

    /// Persist the root hash of the committed tree.
    fn update_tree_root(&mut self, root: &Hash) -> Result<()>;

    /// Bytes stored for the tile at `path`. Empty if the tile does not exist.
    fn read_tile(&self, path: &str) -> Result<Vec<u8>>;

    /// Write `hash` at bytes `[start, end)` of the tile at `path`.
    ///
    /// Only single-hash ranges are persisted; for any other range nothing is
    /// written and `None` is returned. Otherwise returns the updated tile
    /// bytes. [`merge_tile_hash`](crate::merge_tile_hash) implements the
    /// rule.
    fn update_tiles(
        &mut self,
        path: &str,
        start: usize,
        end: usize,
        hash: &Hash,
    ) -> Result<Option<Vec<u8>>>;
}

impl<S: TileStore + ?Sized> TileStore for &mut S {
    fn read_tree_size(&self) -> Result<u64> {
        (**self).read_tree_size()
    }

    fn update_tree_size(&mut self, size: u64) -> Result<()> {
        (**self).update_tree_size(size)
    }

    fn read_tree_root(&self) -> Result<Option<Hash>> {
        (**self).read_tree_root()
    }

    fn update_tree_root(&mut self, root: &Hash) -> Result<()> {
        (**self).update_tree_root(root)
    }

    fn read_tile(&self, path: &str) -> Result<Vec<u8>> {
        (**self).read_tile(path)
    }

    fn update_tiles(
        &mut self,
        path: &str,
        start: usize,
        end: usize,
        hash: &Hash,
    ) -> Result<Option<Vec<u8>>> {
        (**self).update_tiles(path, start, end, hash)
    }
}
