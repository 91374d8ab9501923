//! The tiled log: appends, tree heads and proofs over a [`TileStore`].

use std::collections::{HashMap, hash_map::Entry};

use tracing::{debug, trace};

use crate::{
    HASH_SIZE, Hash, HashFunction, Result, Sha256Hash,
    config::TileLogConfig,
    error::Error,
    hash::TreeHash,
    hash_reader::HashReader,
    node::{stored_hash_index, stored_hashes_for_record_hash},
    proof::{
        ConsistencyProof, InclusionProof, TreeHead, check_record, check_tree,
        new_tree_root_from_tree_proof, prove_record, prove_tree, root_from_record_proof,
        tree_hash,
    },
    store::TileStore,
    tile::{Tile, hash_from_tile, tile_for_storage_id},
    tile_reader::{TileHashReader, TileReader},
};

/// An append-only Merkle log persisted as tiles.
///
/// The log owns its store. Appends take `&mut self`, so a log has a single
/// writer; everything else takes `&self`.
#[derive(Debug)]
pub struct TileLog<S, F = Sha256Hash> {
    config: TileLogConfig,
    store: S,
    hasher: TreeHash<F>,
}

impl<S: TileStore> TileLog<S, Sha256Hash> {
    /// A SHA-256 log over `store`.
    pub fn with_store(config: TileLogConfig, store: S) -> Result<Self> {
        Self::new(config, store, Sha256Hash)
    }
}

impl<S: TileStore, F: HashFunction> TileLog<S, F> {
    /// A log over `store` hashing with `function`.
    pub fn new(config: TileLogConfig, store: S, function: F) -> Result<Self> {
        config.validate()?;
        Ok(TileLog {
            config,
            store,
            hasher: TreeHash::new(function),
        })
    }

    /// The log's configuration.
    pub fn config(&self) -> &TileLogConfig {
        &self.config
    }

    /// The tree hasher records and nodes are hashed with.
    pub fn tree_hasher(&self) -> &TreeHash<F> {
        &self.hasher
    }

    /// The backing store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Unwrap the backing store.
    pub fn into_store(self) -> S {
        self.store
    }

    /// Leaf hash of a record.
    pub fn record_hash(&self, data: &[u8]) -> Hash {
        self.hasher.hash_leaf(data)
    }

    /// Number of records in the log.
    pub fn size(&self) -> Result<u64> {
        self.store.read_tree_size()
    }

    /// Root hash of the whole log.
    pub fn root(&self) -> Result<Hash> {
        let size = self.size()?;
        self.root_at(size)
    }

    /// Root hash of the first `tree_size` records.
    pub fn root_at(&self, tree_size: u64) -> Result<Hash> {
        self.check_size(tree_size)?;
        tree_hash(&self.hasher, tree_size, self)
    }

    /// Current size and root.
    pub fn tree_head(&self) -> Result<TreeHead> {
        let size = self.size()?;
        let root = self.root_at(size)?;
        Ok(TreeHead { size, root })
    }

    /// The root written by the last append, as the store holds it.
    pub fn stored_root(&self) -> Result<Option<Hash>> {
        self.store.read_tree_root()
    }

    fn check_size(&self, tree_size: u64) -> Result<u64> {
        let size = self.size()?;
        if tree_size > size {
            return Err(Error::InvalidInput(format!(
                "tree size {} exceeds log size {}",
                tree_size, size
            )));
        }
        Ok(size)
    }

    /// Proof that the tree of `tree_size` records contains record
    /// `record_index`.
    pub fn inclusion_proof(&self, tree_size: u64, record_index: u64) -> Result<InclusionProof> {
        self.check_size(tree_size)?;
        if record_index >= tree_size {
            return Err(Error::InvalidInput(format!(
                "record index {} is not below tree size {}",
                record_index, tree_size
            )));
        }
        let path = prove_record(&self.hasher, tree_size, record_index, self)?;
        Ok(InclusionProof {
            tree_size,
            record_index,
            path,
        })
    }

    /// Proof that the tree of `old_size` records is a prefix of the tree of
    /// `new_size` records.
    pub fn consistency_proof(&self, old_size: u64, new_size: u64) -> Result<ConsistencyProof> {
        self.check_size(new_size)?;
        if old_size > new_size {
            return Err(Error::InvalidInput(format!(
                "old tree size {} exceeds new tree size {}",
                old_size, new_size
            )));
        }
        let path = prove_tree(&self.hasher, new_size, old_size, self)?;
        Ok(ConsistencyProof {
            old_size,
            new_size,
            path,
        })
    }

    /// Check `proof` shows a record with leaf hash `record_hash` is in the
    /// tree with root `root`.
    pub fn verify_inclusion_proof(
        &self,
        root: &Hash,
        proof: &InclusionProof,
        record_hash: &Hash,
    ) -> Result<()> {
        check_record(
            &self.hasher,
            &proof.path,
            proof.tree_size,
            root,
            proof.record_index,
            *record_hash,
        )
    }

    /// Check `proof` shows the tree with root `new_root` extends the tree
    /// with root `old_root`.
    pub fn verify_consistency_proof(
        &self,
        old_root: &Hash,
        proof: &ConsistencyProof,
        new_root: &Hash,
    ) -> Result<()> {
        check_tree(
            &self.hasher,
            &proof.path,
            proof.new_size,
            new_root,
            proof.old_size,
            old_root,
        )
    }

    /// Root implied by an inclusion proof for a record with leaf hash
    /// `record_hash`.
    pub fn root_from_inclusion_proof(
        &self,
        proof: &InclusionProof,
        record_hash: &Hash,
    ) -> Result<Hash> {
        root_from_record_proof(
            &self.hasher,
            &proof.path,
            proof.tree_size,
            proof.record_index,
            *record_hash,
        )
    }

    /// New root implied by a consistency proof from a tree with root
    /// `old_root`.
    pub fn root_from_consistency_proof(
        &self,
        old_root: &Hash,
        proof: &ConsistencyProof,
    ) -> Result<Hash> {
        new_tree_root_from_tree_proof(
            &self.hasher,
            &proof.path,
            proof.new_size,
            proof.old_size,
            old_root,
        )
    }

    /// Append one record.
    pub fn write_record(&mut self, data: &[u8]) -> Result<TreeHead> {
        let record_hash = self.record_hash(data);
        self.write_record_hashes(&[record_hash])
    }

    /// Append records in order.
    pub fn write_records<I>(&mut self, records: I) -> Result<TreeHead>
    where
        I: IntoIterator,
        I::Item: AsRef<[u8]>,
    {
        let hashes: Vec<Hash> = records
            .into_iter()
            .map(|r| self.hasher.hash_leaf(r.as_ref()))
            .collect();
        self.write_record_hashes(&hashes)
    }

    /// Append records given their leaf hashes.
    ///
    /// Each record's tile writes land before the tree size moves past it, and
    /// the root of the grown tree is stored just ahead of the size, so a
    /// failure leaves the log at the last fully written record with a stored
    /// root that matches it.
    pub fn write_record_hashes(&mut self, record_hashes: &[Hash]) -> Result<TreeHead> {
        let height = self.config.tile_height;
        let mut size = self.size()?;
        let mut root = self.root_at(size)?;
        if record_hashes.is_empty() {
            return Ok(TreeHead { size, root });
        }

        for record_hash in record_hashes {
            let hashes = stored_hashes_for_record_hash(&self.hasher, size, *record_hash, &*self)?;
            let base = stored_hash_index(0, size);
            for (slot, hash) in (base..).zip(&hashes) {
                let (tile, start, end) = tile_for_storage_id(HASH_SIZE, height, slot);
                self.store.update_tiles(&tile.path(), start, end, hash)?;
            }
            size += 1;
            root = tree_hash(&self.hasher, size, &SizedReader { log: &*self, size })?;
            self.store.update_tree_root(&root)?;
            self.store.update_tree_size(size)?;
        }

        debug!(
            appended = record_hashes.len(),
            size,
            root = %hex::encode(root),
            "appended records"
        );
        Ok(TreeHead { size, root })
    }

    /// A reader that authenticates every hash it serves from this log's
    /// tiles against `head`.
    pub fn verifying_reader(&self, head: &TreeHead) -> TileHashReader<&Self, F>
    where
        F: Clone,
    {
        TileHashReader::new(head.size, head.root, self, self.hasher.clone())
    }
}

impl<S: TileStore, F: HashFunction> TileLog<S, F> {
    fn read_hashes_at(&self, size: u64, indexes: &[u64]) -> Result<Vec<Hash>> {
        let end = stored_hash_index(0, size);
        let height = self.config.tile_height;
        let mut tiles: HashMap<String, Vec<u8>> = HashMap::new();

        let mut hashes = Vec::with_capacity(indexes.len());
        for &index in indexes {
            if index >= end {
                return Err(Error::IndexesNotInTree);
            }
            let (tile, _, _) = tile_for_storage_id(HASH_SIZE, height, index);
            let data = match tiles.entry(tile.storage_key()) {
                Entry::Occupied(e) => e.into_mut(),
                Entry::Vacant(e) => {
                    trace!(tile = %tile, "reading tile");
                    e.insert(self.store.read_tile(&tile.path())?)
                }
            };
            hashes.push(hash_from_tile(&self.hasher, &tile, &data[..], index)?);
        }
        Ok(hashes)
    }
}

impl<S: TileStore, F: HashFunction> HashReader for TileLog<S, F> {
    fn read_hashes(&self, indexes: &[u64]) -> Result<Vec<Hash>> {
        self.read_hashes_at(self.size()?, indexes)
    }
}

/// Hashes of a tree `size` records long, which runs one record ahead of the
/// stored size while that record is being appended.
struct SizedReader<'a, S, F> {
    log: &'a TileLog<S, F>,
    size: u64,
}

impl<S: TileStore, F: HashFunction> HashReader for SizedReader<'_, S, F> {
    fn read_hashes(&self, indexes: &[u64]) -> Result<Vec<Hash>> {
        self.log.read_hashes_at(self.size, indexes)
    }
}

impl<S: TileStore, F: HashFunction> TileReader for TileLog<S, F> {
    fn height(&self) -> u8 {
        self.config.tile_height
    }

    fn read_tiles(&self, tiles: &[Tile]) -> Result<Vec<Vec<u8>>> {
        tiles
            .iter()
            .map(|tile| {
                trace!(tile = %tile, "reading tile");
                self.store.read_tile(&tile.path())
            })
            .collect()
    }

    fn save_tiles(&self, _tiles: &[Tile], _data: &[Vec<u8>]) {}
}
