use std::collections::BTreeMap;

use tracing::debug;

use crate::{
    Hash, Result,
    store::TileStore,
    tile::{merge_tile_hash, tile_storage_key},
};

/// In-memory tile store backed by a `BTreeMap`.
///
/// Useful for tests and ephemeral logs.
#[derive(Debug, Clone, Default)]
pub struct MemTileStore {
    size: u64,
    root: Option<Hash>,
    tiles: BTreeMap<String, Vec<u8>>,
}

impl MemTileStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of distinct tiles held.
    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    /// Iterate over `(storage key, bytes)` pairs in key order.
    pub fn tiles(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.tiles.iter().map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl TileStore for MemTileStore {
    fn read_tree_size(&self) -> Result<u64> {
        Ok(self.size)
    }

    fn update_tree_size(&mut self, size: u64) -> Result<()> {
        self.size = size;
        Ok(())
    }

    fn read_tree_root(&self) -> Result<Option<Hash>> {
        Ok(self.root)
    }

    fn update_tree_root(&mut self, root: &Hash) -> Result<()> {
        self.root = Some(*root);
        Ok(())
    }

    fn read_tile(&self, path: &str) -> Result<Vec<u8>> {
        let key = tile_storage_key(path)?;
        Ok(self.tiles.get(&key).cloned().unwrap_or_default())
    }

    fn update_tiles(
        &mut self,
        path: &str,
        start: usize,
        end: usize,
        hash: &Hash,
    ) -> Result<Option<Vec<u8>>> {
        let key = tile_storage_key(path)?;
        let existing = self.tiles.get(&key).cloned().unwrap_or_default();
        let Some(data) = merge_tile_hash(existing, start, end, hash)? else {
            return Ok(None);
        };
        debug!(tile = %key, len = data.len(), "tile updated");
        self.tiles.insert(key, data.clone());
        Ok(Some(data))
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;
    use crate::error::Error;

    #[test]
    fn test_tiles_grow_in_place() {
        let mut store = MemTileStore::new();
        let a = [1u8; 32];
        let b = [2u8; 32];
        store.update_tiles("tile/2/0/0.1", 0, 32, &a).unwrap();
        store.update_tiles("tile/2/0/0.2", 32, 64, &b).unwrap();
        assert_eq!(store.tile_count(), 1);
        assert_eq!(store.read_tile("tile/2/0/0.1").unwrap(), [a, b].concat());
        assert_eq!(store.read_tile("tile/2/0/0.4").unwrap(), [a, b].concat());
        assert!(store.read_tile("tile/2/0/1.1").unwrap().is_empty());
    }

    #[test]
    fn test_interior_ranges_are_not_stored() {
        let mut store = MemTileStore::new();
        assert_eq!(store.update_tiles("tile/2/0/0.2", 0, 64, &[3u8; 32]).unwrap(), None);
        assert_eq!(store.tile_count(), 0);
    }

    #[test]
    fn test_rejects_bad_paths() {
        let mut store = MemTileStore::new();
        assert_matches!(store.read_tile("tile/2/0"), Err(Error::InvalidTilePath(_)));
        assert_matches!(
            store.update_tiles("nope", 0, 32, &[0u8; 32]),
            Err(Error::InvalidTilePath(_))
        );
    }

    #[test]
    fn test_size_and_root() {
        let mut store = MemTileStore::new();
        assert_eq!(store.read_tree_size().unwrap(), 0);
        assert_eq!(store.read_tree_root().unwrap(), None);
        store.update_tree_size(7).unwrap();
        store.update_tree_root(&[9u8; 32]).unwrap();
        assert_eq!(store.read_tree_size().unwrap(), 7);
        assert_eq!(store.read_tree_root().unwrap(), Some([9u8; 32]));
    }
}
