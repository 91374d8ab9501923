//! Authenticated reads of stored hashes through tiles.
//!
//! [`TileHashReader`] answers [`HashReader`] requests for a tree it knows only
//! by its size and root. It fetches the tiles holding the requested hashes
//! plus every tile needed to link them to the root, checks that linkage, and
//! fails rather than return a hash it could not authenticate.

use std::{
    cell::RefCell,
    collections::{HashMap, hash_map::Entry},
};

use tracing::{trace, warn};

use crate::{
    HASH_SIZE, Hash, HashFunction, Result, Sha256Hash,
    error::Error,
    hash::TreeHash,
    hash_reader::HashReader,
    node::stored_hash_index,
    proof::subtree_index,
    tile::{MAX_TILE_HEIGHT, Tile, hash_from_tile, tile_for_storage_id, tile_hash},
};

/// Source of raw tile data.
pub trait TileReader {
    /// Height of the tiles this reader serves.
    fn height(&self) -> u8;

    /// Fetch the data for each tile, in order.
    ///
    /// Each returned entry must hold at least `tile.width() * HASH_SIZE`
    /// bytes; longer entries are truncated by the caller. The data is
    /// untrusted.
    fn read_tiles(&self, tiles: &[Tile]) -> Result<Vec<Vec<u8>>>;

    /// Called with tiles returned by [`read_tiles`](Self::read_tiles) once
    /// they have been authenticated against a trusted root.
    fn save_tiles(&self, tiles: &[Tile], data: &[Vec<u8>]);
}

impl<R: TileReader + ?Sized> TileReader for &R {
    fn height(&self) -> u8 {
        (**self).height()
    }

    fn read_tiles(&self, tiles: &[Tile]) -> Result<Vec<Vec<u8>>> {
        (**self).read_tiles(tiles)
    }

    fn save_tiles(&self, tiles: &[Tile], data: &[Vec<u8>]) {
        (**self).save_tiles(tiles, data)
    }
}

/// A [`HashReader`] that authenticates everything it returns against a
/// trusted tree head.
#[derive(Debug, Clone)]
pub struct TileHashReader<R, F = Sha256Hash> {
    tree_size: u64,
    root: Hash,
    reader: R,
    hasher: TreeHash<F>,
}

impl<R: TileReader, F: HashFunction> TileHashReader<R, F> {
    /// Reader for the tree of `tree_size` records with root `root`.
    pub fn new(tree_size: u64, root: Hash, reader: R, hasher: TreeHash<F>) -> Self {
        TileHashReader {
            tree_size,
            root,
            reader,
            hasher,
        }
    }

    /// Size of the trusted tree.
    pub fn tree_size(&self) -> u64 {
        self.tree_size
    }

    /// Root of the trusted tree.
    pub fn root(&self) -> &Hash {
        &self.root
    }

    /// The wrapped tile reader.
    pub fn reader(&self) -> &R {
        &self.reader
    }

    /// Unwrap the tile reader.
    pub fn into_reader(self) -> R {
        self.reader
    }

    fn inconsistent(&self, tile: &Tile, what: &str) -> Error {
        warn!(
            tile = %tile,
            tree_size = self.tree_size,
            "tile failed authentication: {}",
            what
        );
        Error::InconsistentTile(format!("{}: {}", tile, what))
    }
}

/// Broken tile layout inside the reader. Reported as a tile fault, never as
/// the caller's input.
fn bad_math(what: String) -> Error {
    Error::InconsistentTile(format!("bad math in TileHashReader: {}", what))
}

impl<R: TileReader, F: HashFunction> HashReader for TileHashReader<R, F> {
    fn read_hashes(&self, indexes: &[u64]) -> Result<Vec<Hash>> {
        if indexes.is_empty() {
            return Ok(Vec::new());
        }
        let h = self.reader.height();
        if h == 0 || h > MAX_TILE_HEIGHT {
            return Err(Error::InvalidTile(format!(
                "tile reader height {} out of range",
                h
            )));
        }
        let size = self.tree_size;
        let end = stored_hash_index(0, size);

        let mut tile_order: HashMap<Tile, usize> = HashMap::new();
        let mut tiles: Vec<Tile> = Vec::new();

        // Tiles holding the subtree roots of the whole tree come first: they
        // are authenticated directly against the root.
        let stx = subtree_index(0, size, Vec::new());
        let mut stx_tile_order = Vec::with_capacity(stx.len());
        for &x in &stx {
            let (tile, _, _) = tile_for_storage_id(HASH_SIZE, h, x);
            let tile = tile.parent(0, size).ok_or(Error::IndexesNotInTree)?;
            let j = match tile_order.entry(tile) {
                Entry::Occupied(e) => *e.get(),
                Entry::Vacant(e) => {
                    e.insert(tiles.len());
                    tiles.push(tile);
                    tiles.len() - 1
                }
            };
            stx_tile_order.push(j);
        }
        let spine_len = tiles.len();

        // Then, for each requested slot, the chain of tiles linking it to a
        // tile already planned, parents before children.
        let mut index_tile_order = Vec::with_capacity(indexes.len());
        for &x in indexes {
            if x >= end {
                return Err(Error::IndexesNotInTree);
            }
            let (tile, _, _) = tile_for_storage_id(HASH_SIZE, h, x);

            let mut k = 0u8;
            let found = loop {
                let p = tile.parent(k, size).ok_or(Error::IndexesNotInTree)?;
                if let Some(&j) = tile_order.get(&p) {
                    break j;
                }
                k += 1;
            };
            if k == 0 {
                index_tile_order.push(found);
                continue;
            }

            for k in (0..k).rev() {
                let p = tile.parent(k, size).ok_or(Error::IndexesNotInTree)?;
                if !p.is_full() {
                    // A tile with a parent tile must be full.
                    return Err(bad_math(format!(
                        "tree size {} slot {} tile {}",
                        size, x, p
                    )));
                }
                tile_order.insert(p, tiles.len());
                tiles.push(p);
            }
            index_tile_order.push(tiles.len() - 1);
        }

        trace!(tiles = tiles.len(), tree_size = size, "fetching tiles");
        let mut data = self.reader.read_tiles(&tiles)?;
        if data.len() != tiles.len() {
            return Err(Error::InvalidInput(format!(
                "tile reader returned {} tiles, want {}",
                data.len(),
                tiles.len()
            )));
        }
        for (tile, bytes) in tiles.iter().zip(data.iter_mut()) {
            let want = tile.data_len();
            if bytes.len() < want {
                return Err(Error::CorruptedTile(format!(
                    "tile reader returned {} bytes for {}, want {}",
                    bytes.len(),
                    tile,
                    want
                )));
            }
            bytes.truncate(want);
        }

        // Authenticate the spine against the root.
        if let Some((&last, rest)) = stx.split_last() {
            let last_j = stx_tile_order[stx.len() - 1];
            let mut th = hash_from_tile(&self.hasher, &tiles[last_j], &data[last_j], last)?;
            for (i, &x) in rest.iter().enumerate().rev() {
                let j = stx_tile_order[i];
                let sub = hash_from_tile(&self.hasher, &tiles[j], &data[j], x)?;
                th = self.hasher.hash_children(&sub, &th);
            }
            if th != self.root {
                return Err(self.inconsistent(&tiles[last_j], "tree root mismatch"));
            }
        }

        // Authenticate every other tile against its already checked parent.
        for i in spine_len..tiles.len() {
            let tile = tiles[i];
            let p = tile.parent(1, size).ok_or(Error::IndexesNotInTree)?;
            let Some(&j) = tile_order.get(&p) else {
                return Err(bad_math(format!(
                    "tree size {} tile {} parent {}",
                    size, tile, p
                )));
            };
            let expected = hash_from_tile(
                &self.hasher,
                &p,
                &data[j],
                stored_hash_index(p.level() * p.height(), tile.number()),
            )?;
            if expected != tile_hash(&self.hasher, &data[i])? {
                return Err(self.inconsistent(&tile, "parent tile mismatch"));
            }
        }

        self.reader.save_tiles(&tiles, &data);

        indexes
            .iter()
            .zip(index_tile_order)
            .map(|(&x, j)| hash_from_tile(&self.hasher, &tiles[j], &data[j], x))
            .collect()
    }
}

/// Keeps authenticated full tiles in memory in front of another
/// [`TileReader`].
///
/// Full tiles never change, so once one has passed authentication it is
/// served from memory from then on. Partial tiles always go to the inner
/// reader. The cache is single-owner and `!Sync`.
#[derive(Debug)]
pub struct TileCache<R> {
    inner: R,
    tiles: RefCell<HashMap<Tile, Vec<u8>>>,
}

impl<R: TileReader> TileCache<R> {
    /// Wrap `inner` with an empty cache.
    pub fn new(inner: R) -> Self {
        TileCache {
            inner,
            tiles: RefCell::new(HashMap::new()),
        }
    }

    /// Number of cached tiles.
    pub fn len(&self) -> usize {
        self.tiles.borrow().len()
    }

    /// Whether nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.tiles.borrow().is_empty()
    }

    /// Whether `tile` is cached.
    pub fn contains(&self, tile: &Tile) -> bool {
        self.tiles.borrow().contains_key(tile)
    }

    /// Drop every cached tile.
    pub fn clear(&self) {
        self.tiles.borrow_mut().clear();
    }

    /// The wrapped reader.
    pub fn inner(&self) -> &R {
        &self.inner
    }

    /// Unwrap the reader, discarding the cache.
    pub fn into_inner(self) -> R {
        self.inner
    }
}

impl<R: TileReader> TileReader for TileCache<R> {
    fn height(&self) -> u8 {
        self.inner.height()
    }

    fn read_tiles(&self, tiles: &[Tile]) -> Result<Vec<Vec<u8>>> {
        let mut out: Vec<Option<Vec<u8>>> = {
            let cache = self.tiles.borrow();
            tiles.iter().map(|t| cache.get(t).cloned()).collect()
        };
        let missing: Vec<Tile> = tiles
            .iter()
            .zip(&out)
            .filter(|(_, d)| d.is_none())
            .map(|(t, _)| *t)
            .collect();
        trace!(
            requested = tiles.len(),
            missing = missing.len(),
            "tile cache lookup"
        );
        if !missing.is_empty() {
            let fetched = self.inner.read_tiles(&missing)?;
            if fetched.len() != missing.len() {
                return Err(Error::InvalidInput(format!(
                    "tile reader returned {} tiles, want {}",
                    fetched.len(),
                    missing.len()
                )));
            }
            let mut fetched = fetched.into_iter();
            for slot in out.iter_mut().filter(|d| d.is_none()) {
                *slot = fetched.next();
            }
        }
        Ok(out.into_iter().flatten().collect())
    }

    fn save_tiles(&self, tiles: &[Tile], data: &[Vec<u8>]) {
        {
            let mut cache = self.tiles.borrow_mut();
            for (tile, bytes) in tiles.iter().zip(data) {
                if tile.is_full() && bytes.len() >= tile.data_len() {
                    cache
                        .entry(*tile)
                        .or_insert_with(|| bytes[..tile.data_len()].to_vec());
                }
            }
        }
        self.inner.save_tiles(tiles, data);
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn test_layout_faults_are_tile_errors() {
        let err = bad_math(format!("tree size {} tile {}", 9, Tile::new(2, 1, 0, 2)));
        assert_matches!(err, Error::InconsistentTile(msg) if msg.contains("tile/2/1/0.2"));
    }
}
