use std::{
    fs,
    io::{self, Write},
    path::{Path, PathBuf},
};

use tempfile::NamedTempFile;
use tilelog::{Hash, Result, TileStore, merge_tile_hash, tile_storage_key};
use tracing::{debug, info, trace};

use crate::{StorageError, decode_root, decode_size, encode_size};

const TREE_SIZE_FILE: &str = "tree-size";
const TREE_ROOT_FILE: &str = "tree-root";

/// Tile store on a local directory.
///
/// ```text
/// <root>/tree-size      8-byte big-endian record count
/// <root>/tree-root      32-byte root hash
/// <root>/tile/H/L/N     tile bytes, grown in place
/// ```
///
/// Every file is replaced atomically by writing a temporary file next to it
/// and renaming it over the old one, so a crash leaves either the old or the
/// new contents.
#[derive(Debug, Clone)]
pub struct FileTileStore {
    root: PathBuf,
}

impl FileTileStore {
    /// Open or create a store rooted at `root`.
    pub fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        info!("Opening file tile store at {:?}", root);
        fs::create_dir_all(&root).map_err(StorageError::from)?;
        Ok(FileTileStore { root })
    }

    /// Directory the store lives in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn read_file(&self, path: &Path) -> Result<Option<Vec<u8>>> {
        match fs::read(path) {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(StorageError::from(e).into()),
        }
    }

    fn write_file(&self, path: &Path, data: &[u8]) -> Result<()> {
        let dir = path.parent().unwrap_or(&self.root);
        fs::create_dir_all(dir).map_err(StorageError::from)?;
        let mut tmp = NamedTempFile::new_in(dir).map_err(StorageError::from)?;
        tmp.write_all(data).map_err(StorageError::from)?;
        tmp.as_file().sync_all().map_err(StorageError::from)?;
        tmp.persist(path)
            .map_err(|e| StorageError::from(e.error))?;
        Ok(())
    }

    fn tile_file(&self, path: &str) -> Result<PathBuf> {
        Ok(self.root.join(tile_storage_key(path)?))
    }
}

impl TileStore for FileTileStore {
    fn read_tree_size(&self) -> Result<u64> {
        match self.read_file(&self.root.join(TREE_SIZE_FILE))? {
            Some(bytes) => Ok(decode_size(&bytes)?),
            None => Ok(0),
        }
    }

    fn update_tree_size(&mut self, size: u64) -> Result<()> {
        self.write_file(&self.root.join(TREE_SIZE_FILE), &encode_size(size))
    }

    fn read_tree_root(&self) -> Result<Option<Hash>> {
        match self.read_file(&self.root.join(TREE_ROOT_FILE))? {
            Some(bytes) => Ok(Some(decode_root(&bytes)?)),
            None => Ok(None),
        }
    }

    fn update_tree_root(&mut self, root: &Hash) -> Result<()> {
        self.write_file(&self.root.join(TREE_ROOT_FILE), root)
    }

    fn read_tile(&self, path: &str) -> Result<Vec<u8>> {
        let file = self.tile_file(path)?;
        trace!(tile = path, "reading tile file");
        Ok(self.read_file(&file)?.unwrap_or_default())
    }

    fn update_tiles(
        &mut self,
        path: &str,
        start: usize,
        end: usize,
        hash: &Hash,
    ) -> Result<Option<Vec<u8>>> {
        let file = self.tile_file(path)?;
        let existing = self.read_file(&file)?.unwrap_or_default();
        let Some(data) = merge_tile_hash(existing, start, end, hash)? else {
            return Ok(None);
        };
        debug!(tile = path, len = data.len(), "writing tile file");
        self.write_file(&file, &data)?;
        Ok(Some(data))
    }
}
