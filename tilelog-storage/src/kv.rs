use std::{cell::RefCell, collections::BTreeMap};

use tilelog::{Hash, Result, TileStore, merge_tile_hash, tile_storage_key};
use tracing::{debug, trace};

use crate::{StorageError, decode_root, decode_size, encode_size};

const SIZE_KEY: &[u8] = b"s";
const ROOT_KEY: &[u8] = b"r";
const TILE_PREFIX: u8 = b't';

/// Abstraction over key-value storage for a tile store.
///
/// `put` takes `&self` (not `&mut self`) so a store can sit behind a shared
/// handle with its own interior mutability, as RocksDB does.
pub trait KvStore {
    /// Value stored under `key`, if any.
    fn get(&self, key: &[u8]) -> std::result::Result<Option<Vec<u8>>, String>;
    /// Store `value` under `key`, replacing any previous value.
    fn put(&self, key: &[u8], value: &[u8]) -> std::result::Result<(), String>;
}

impl<S: KvStore + ?Sized> KvStore for &S {
    fn get(&self, key: &[u8]) -> std::result::Result<Option<Vec<u8>>, String> {
        (**self).get(key)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> std::result::Result<(), String> {
        (**self).put(key, value)
    }
}

/// In-memory [`KvStore`] backed by a `BTreeMap`.
#[derive(Debug, Default)]
pub struct MemKvStore {
    data: RefCell<BTreeMap<Vec<u8>, Vec<u8>>>,
}

impl MemKvStore {
    /// An empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of keys held.
    pub fn len(&self) -> usize {
        self.data.borrow().len()
    }

    /// Whether the store holds no keys.
    pub fn is_empty(&self) -> bool {
        self.data.borrow().is_empty()
    }
}

impl KvStore for MemKvStore {
    fn get(&self, key: &[u8]) -> std::result::Result<Option<Vec<u8>>, String> {
        Ok(self.data.borrow().get(key).cloned())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> std::result::Result<(), String> {
        self.data.borrow_mut().insert(key.to_vec(), value.to_vec());
        Ok(())
    }
}

#[cfg(feature = "rocksdb_storage")]
impl KvStore for rocksdb::DB {
    fn get(&self, key: &[u8]) -> std::result::Result<Option<Vec<u8>>, String> {
        rocksdb::DB::get(self, key).map_err(|e| e.to_string())
    }

    fn put(&self, key: &[u8], value: &[u8]) -> std::result::Result<(), String> {
        rocksdb::DB::put(self, key, value).map_err(|e| e.to_string())
    }
}

/// Tile store over a [`KvStore`].
///
/// Key layout: `s` holds the tree size (8 bytes, big-endian), `r` the root
/// hash, and `t` followed by a tile's width-free key holds the tile bytes.
#[derive(Debug)]
pub struct KvTileStore<S> {
    kv: S,
}

impl<S: KvStore> KvTileStore<S> {
    /// Wrap a key-value store.
    pub fn new(kv: S) -> Self {
        KvTileStore { kv }
    }

    /// The wrapped store.
    pub fn kv(&self) -> &S {
        &self.kv
    }

    /// Unwrap the key-value store.
    pub fn into_inner(self) -> S {
        self.kv
    }

    fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.kv.get(key).map_err(StorageError::Kv)?)
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<()> {
        Ok(self.kv.put(key, value).map_err(StorageError::Kv)?)
    }
}

#[cfg(feature = "rocksdb_storage")]
impl KvTileStore<rocksdb::DB> {
    /// Open or create a RocksDB-backed store at `path`.
    pub fn open_rocksdb(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = path.as_ref();
        tracing::info!("Opening RocksDB tile store at {:?}", path);
        let mut opts = rocksdb::Options::default();
        opts.create_if_missing(true);
        let db = rocksdb::DB::open(&opts, path)
            .map_err(|e| StorageError::Kv(e.to_string()))?;
        Ok(KvTileStore::new(db))
    }
}

fn tile_key(path: &str) -> Result<Vec<u8>> {
    let key = tile_storage_key(path)?;
    let mut out = Vec::with_capacity(key.len() + 1);
    out.push(TILE_PREFIX);
    out.extend_from_slice(key.as_bytes());
    Ok(out)
}

impl<S: KvStore> TileStore for KvTileStore<S> {
    fn read_tree_size(&self) -> Result<u64> {
        match self.get(SIZE_KEY)? {
            Some(bytes) => Ok(decode_size(&bytes)?),
            None => Ok(0),
        }
    }

    fn update_tree_size(&mut self, size: u64) -> Result<()> {
        self.put(SIZE_KEY, &encode_size(size))
    }

    fn read_tree_root(&self) -> Result<Option<Hash>> {
        match self.get(ROOT_KEY)? {
            Some(bytes) => Ok(Some(decode_root(&bytes)?)),
            None => Ok(None),
        }
    }

    fn update_tree_root(&mut self, root: &Hash) -> Result<()> {
        self.put(ROOT_KEY, root)
    }

    fn read_tile(&self, path: &str) -> Result<Vec<u8>> {
        trace!(tile = path, "reading tile");
        Ok(self.get(&tile_key(path)?)?.unwrap_or_default())
    }

    fn update_tiles(
        &mut self,
        path: &str,
        start: usize,
        end: usize,
        hash: &Hash,
    ) -> Result<Option<Vec<u8>>> {
        let key = tile_key(path)?;
        let existing = self.get(&key)?.unwrap_or_default();
        let Some(data) = merge_tile_hash(existing, start, end, hash)? else {
            return Ok(None);
        };
        debug!(tile = path, len = data.len(), "writing tile");
        self.put(&key, &data)?;
        Ok(Some(data))
    }
}
