//! Tiles: fixed-height rectangles of stored hashes.
//!
//! A tile of height `H` at tile level `L` holds up to `2^H` consecutive hashes
//! of tree level `L * H`. Hashes of the `H - 1` tree levels above them are
//! never stored; they are recomputed by folding the tile bytes. Tile `N` at
//! level `L` therefore covers the subtree rooted at `(L * H + H, N)`.
//!
//! Tiles are stored as flat byte strings, `W * HASH_SIZE` bytes for a tile of
//! width `W`. Only the tiles on the right edge of the tree are partial.

use std::fmt;

use crate::{
    HASH_SIZE, Hash, HashFunction, Result,
    error::Error,
    hash::TreeHash,
    hash_reader::HashReader,
    node::{split_stored_hash_index, stored_hash_index},
};

/// Largest supported tile height.
pub const MAX_TILE_HEIGHT: u8 = 30;

/// Shift right, yielding 0 once the shift reaches the integer width.
fn shr(x: u64, shift: u32) -> u64 {
    x.checked_shr(shift).unwrap_or(0)
}

/// A tile of the log, identified by height, tile level, tile number and
/// width.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Tile {
    height: u8,
    level: u8,
    number: u64,
    width: u32,
}

impl Tile {
    /// Create a tile. Coordinates are not checked; see [`Tile::validate`].
    pub fn new(height: u8, level: u8, number: u64, width: u32) -> Self {
        Tile {
            height,
            level,
            number,
            width,
        }
    }

    /// Tile height `H`.
    pub fn height(&self) -> u8 {
        self.height
    }

    /// Tile level `L`.
    pub fn level(&self) -> u8 {
        self.level
    }

    /// Tile number `N` within its level.
    pub fn number(&self) -> u64 {
        self.number
    }

    /// Number of hashes in the tile.
    pub fn width(&self) -> u32 {
        self.width
    }

    /// Whether the tile holds all `2^H` hashes and can no longer change.
    pub fn is_full(&self) -> bool {
        self.height <= MAX_TILE_HEIGHT && self.width == 1 << self.height
    }

    /// Byte length of the tile's data.
    pub fn data_len(&self) -> usize {
        self.width as usize * HASH_SIZE
    }

    /// Tree level of the hashes stored in this tile.
    pub fn base_level(&self) -> Result<u8> {
        u8::try_from(u32::from(self.height) * u32::from(self.level))
            .ok()
            .filter(|l| *l < 64)
            .ok_or_else(|| Error::InvalidTile(self.path()))
    }

    /// Check the coordinates describe a tile that can exist.
    pub fn validate(&self) -> Result<()> {
        if self.height < 1
            || self.height > MAX_TILE_HEIGHT
            || self.level >= 64
            || self.width < 1
            || self.width > 1 << self.height
        {
            return Err(Error::InvalidTile(self.path()));
        }
        self.base_level().map(|_| ())
    }

    /// Storage path of this tile: `tile/<H>/<L>/<N>.<W>`.
    pub fn path(&self) -> String {
        format!(
            "tile/{}/{}/{}.{}",
            self.height, self.level, self.number, self.width
        )
    }

    /// Width-free key shared by every width of this tile: `tile/<H>/<L>/<N>`.
    ///
    /// Backends that grow a tile in place store it under this key.
    pub fn storage_key(&self) -> String {
        format!("tile/{}/{}/{}", self.height, self.level, self.number)
    }

    /// Parse a path produced by [`Tile::path`].
    pub fn from_path(path: &str) -> Result<Self> {
        let bad = || Error::InvalidTilePath(path.to_string());
        let rest = path.strip_prefix("tile/").ok_or_else(bad)?;
        let mut parts = rest.split('/');
        let (height, level, number_width) =
            match (parts.next(), parts.next(), parts.next(), parts.next()) {
                (Some(h), Some(l), Some(nw), None) => (h, l, nw),
                _ => return Err(bad()),
            };
        let (number, width) = number_width.split_once('.').ok_or_else(bad)?;
        let tile = Tile::new(
            height.parse().map_err(|_| bad())?,
            level.parse().map_err(|_| bad())?,
            number.parse().map_err(|_| bad())?,
            width.parse().map_err(|_| bad())?,
        );
        // Reject non-canonical spellings such as "+1" or "007".
        if tile.path() != path {
            return Err(bad());
        }
        tile.validate().map_err(|_| bad())?;
        Ok(tile)
    }

    /// The tile `k` tile levels above this one in a tree of `tree_size`
    /// records, trimmed to the hashes that exist at that size.
    ///
    /// Returns `None` if that tile would be empty.
    pub fn parent(&self, k: u8, tree_size: u64) -> Option<Tile> {
        let h = u32::from(self.height);
        let level = self.level.checked_add(k)?;
        let number = shr(self.number, u32::from(k) * h);
        let max = shr(tree_size, u32::from(level) * h);
        let start = number.checked_shl(h).filter(|&start| shr(start, h) == number)?;
        if start >= max {
            return None;
        }
        let width = u64::from(1u32 << h).min(max - start) as u32;
        Some(Tile::new(self.height, level, number, width))
    }

    /// Materialize this tile's bytes from a [`HashReader`].
    pub fn read_data<R: HashReader + ?Sized>(&self, reader: &R) -> Result<Vec<u8>> {
        read_tile_data(self, reader)
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path())
    }
}

/// Locate storage slot `slot` in a tile of the given height.
///
/// Returns the smallest tile containing the slot together with the byte
/// range `[start, end)` the slot's subtree occupies in the tile data. A slot
/// whose tree level is a multiple of `height` maps to exactly one hash;
/// others map to the run of hashes they are folded from.
///
/// # Panics
///
/// Panics if `height` is 0.
pub fn tile_for_storage_id(hash_size: usize, height: u8, slot: u64) -> (Tile, usize, usize) {
    assert!(height > 0, "bad math in tile_for_storage_id: height 0");
    let (level, n) = split_stored_hash_index(slot);
    let tile_level = level / height;
    // Level and index within the tile.
    let level = u32::from(level - tile_level * height);
    let h = u32::from(height);
    let number = (n << level) >> h;
    let n = n - ((number << h) >> level);
    let width = ((n + 1) << level) as u32;
    let start = (n << level) as usize * hash_size;
    let end = ((n + 1) << level) as usize * hash_size;
    (Tile::new(height, tile_level, number, width), start, end)
}

/// Tiles created or extended by growing a tree from `old_size` to
/// `new_size` records.
///
/// # Panics
///
/// Panics if `height` is 0.
pub fn new_tiles(height: u8, old_size: u64, new_size: u64) -> Vec<Tile> {
    assert!(height > 0, "bad math in new_tiles: height 0");
    let h = u32::from(height);
    let mut tiles = Vec::new();
    let mut level = 0u32;
    while shr(new_size, h * level) > 0 {
        let old_n = shr(old_size, h * level);
        let new_n = shr(new_size, h * level);
        if old_n != new_n {
            for n in (old_n >> h)..(new_n >> h) {
                tiles.push(Tile::new(height, level as u8, n, 1 << h));
            }
            let n = new_n >> h;
            let w = new_n - (n << h);
            if w > 0 {
                tiles.push(Tile::new(height, level as u8, n, w as u32));
            }
        }
        level += 1;
    }
    tiles
}

/// Hash of a run of `2^k` consecutive tile hashes, folded pairwise.
pub fn tile_hash<F: HashFunction>(hasher: &TreeHash<F>, data: &[u8]) -> Result<Hash> {
    if data.is_empty()
        || data.len() % HASH_SIZE != 0
        || !(data.len() / HASH_SIZE).is_power_of_two()
    {
        return Err(Error::CorruptedTile(format!(
            "cannot fold {} bytes of tile data",
            data.len()
        )));
    }
    Ok(fold_tile(hasher, data))
}

fn fold_tile<F: HashFunction>(hasher: &TreeHash<F>, data: &[u8]) -> Hash {
    if data.len() == HASH_SIZE {
        let mut h = [0u8; HASH_SIZE];
        h.copy_from_slice(data);
        return h;
    }
    let (left, right) = data.split_at(data.len() / 2);
    hasher.hash_children(&fold_tile(hasher, left), &fold_tile(hasher, right))
}

/// Recompute the hash stored at `slot` from the raw bytes of `tile`.
pub fn hash_from_tile<F: HashFunction>(
    hasher: &TreeHash<F>,
    tile: &Tile,
    data: &[u8],
    slot: u64,
) -> Result<Hash> {
    tile.validate()?;
    if data.len() < tile.data_len() {
        return Err(Error::CorruptedTile(format!(
            "data length {} is too short for {}",
            data.len(),
            tile
        )));
    }
    let (t1, start, end) = tile_for_storage_id(HASH_SIZE, tile.height, slot);
    if tile.level != t1.level || tile.number != t1.number || tile.width < t1.width {
        return Err(Error::InvalidInput(format!(
            "index {} is in {} not {}",
            slot, t1, tile
        )));
    }
    tile_hash(hasher, &data[start..end])
}

/// Read the hashes making up `tile` and concatenate them.
pub fn read_tile_data<R: HashReader + ?Sized>(tile: &Tile, reader: &R) -> Result<Vec<u8>> {
    tile.validate()?;
    let base_level = tile.base_level()?;
    let start = tile.number << tile.height;
    let indexes: Vec<u64> = (0..u64::from(tile.width))
        .map(|i| stored_hash_index(base_level, start + i))
        .collect();
    let hashes = reader.read_hashes(&indexes)?;
    if hashes.len() != indexes.len() {
        return Err(Error::BadReadHashes {
            expected: indexes.len(),
            actual: hashes.len(),
        });
    }
    Ok(hashes.concat())
}

/// Width-free storage key for a tile path. See [`Tile::storage_key`].
pub fn tile_storage_key(path: &str) -> Result<String> {
    Tile::from_path(path).map(|tile| tile.storage_key())
}

/// Write `hash` into a tile's bytes at `[start, end)`.
///
/// Returns `None` when the range spans more than one hash: such nodes are
/// recomputed from the tile and never persisted. Otherwise returns the
/// updated bytes, grown as needed. Bytes past the log's committed size are
/// not authoritative and may be overwritten.
pub fn merge_tile_hash(
    existing: Vec<u8>,
    start: usize,
    end: usize,
    hash: &Hash,
) -> Result<Option<Vec<u8>>> {
    if end < start {
        return Err(Error::InvalidInput(format!(
            "tile range [{}, {}) is reversed",
            start, end
        )));
    }
    if end - start != HASH_SIZE {
        return Ok(None);
    }
    if existing.len() < start {
        return Err(Error::CorruptedTile(format!(
            "tile has {} bytes, cannot write at offset {}",
            existing.len(),
            start
        )));
    }
    let mut data = existing;
    if data.len() < end {
        data.resize(end, 0);
    }
    data[start..end].copy_from_slice(hash);
    Ok(Some(data))
}
