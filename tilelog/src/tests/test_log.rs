use assert_matches::assert_matches;

use super::direct_root;
use crate::{
    Blake3Hash, Error, HASH_SIZE, Hash, HashReader, MemTileStore, Result, TileLog, TileLogConfig,
    TileStore, TreeHead, hash_from_tile, new_tiles, node::split_stored_hash_index,
    stored_hash_count, stored_hash_index, tile_for_storage_id,
};

fn new_log(height: u8) -> TileLog<MemTileStore> {
    TileLog::with_store(TileLogConfig::with_tile_height(height), MemTileStore::new())
        .expect("valid config")
}

fn record(i: u64) -> Vec<u8> {
    format!("entry-{i}").into_bytes()
}

fn check_log(height: u8, count: u64) {
    let mut log = new_log(height);
    let mut leaves: Vec<Hash> = Vec::new();
    let mut roots: Vec<Hash> = vec![log.root().unwrap()];

    for n in 0..count {
        let data = record(n);
        leaves.push(log.record_hash(&data));
        let head = log.write_record(&data).unwrap();
        assert_eq!(head.size, n + 1);
        assert_eq!(head.root, direct_root(log.tree_hasher(), &leaves));
        roots.push(head.root);

        let size = n + 1;
        for i in 0..size {
            let proof = log.inclusion_proof(size, i).unwrap();
            log.verify_inclusion_proof(&head.root, &proof, &leaves[i as usize])
                .unwrap_or_else(|e| panic!("H={height} inclusion {i}@{size}: {e}"));
        }
        for m in 0..=size {
            let proof = log.consistency_proof(m, size).unwrap();
            if m == size {
                assert!(proof.path.is_empty());
            }
            log.verify_consistency_proof(&roots[m as usize], &proof, &head.root)
                .unwrap_or_else(|e| panic!("H={height} consistency {m}->{size}: {e}"));
        }
    }

    // Proofs against older tree heads still work after the log grew.
    for size in 1..=count {
        assert_eq!(log.root_at(size).unwrap(), roots[size as usize]);
        let proof = log.inclusion_proof(size, size / 2).unwrap();
        log.verify_inclusion_proof(
            &roots[size as usize],
            &proof,
            &leaves[(size / 2) as usize],
        )
        .unwrap();
    }
}

#[test]
fn test_proofs_for_every_size() {
    for height in 1..=3 {
        check_log(height, 33);
    }
}

#[test]
fn test_proofs_with_default_height() {
    check_log(TileLogConfig::default().tile_height, 40);
}

#[test]
fn test_blake3_log() {
    let mut log = TileLog::new(
        TileLogConfig::with_tile_height(2),
        MemTileStore::new(),
        Blake3Hash,
    )
    .unwrap();
    let head = log.write_records((0..10).map(record)).unwrap();
    let leaves: Vec<Hash> = (0..10).map(|i| log.record_hash(&record(i))).collect();
    assert_eq!(head.root, direct_root(log.tree_hasher(), &leaves));
    let proof = log.inclusion_proof(10, 7).unwrap();
    log.verify_inclusion_proof(&head.root, &proof, &leaves[7])
        .unwrap();
}

#[test]
fn test_inclusion_of_b_in_abcd() {
    let mut log = new_log(2);
    let head = log.write_records(["a", "b", "c", "d"]).unwrap();
    assert_eq!(head.size, 4);
    let hasher = log.tree_hasher();
    let (a, b, c, d) = (
        hasher.hash_leaf(b"a"),
        hasher.hash_leaf(b"b"),
        hasher.hash_leaf(b"c"),
        hasher.hash_leaf(b"d"),
    );

    let proof = log.inclusion_proof(4, 1).unwrap();
    assert_eq!(proof.path, vec![a, hasher.hash_children(&c, &d)]);
    let root = log.root_from_inclusion_proof(&proof, &b).unwrap();
    assert_eq!(root, log.root_at(4).unwrap());
    assert_eq!(root, head.root);
}

#[test]
fn test_consistency_from_three_to_four() {
    let mut log = new_log(2);
    log.write_records(["a", "b", "c"]).unwrap();
    let old_root = log.root_at(3).unwrap();
    log.write_record(b"d").unwrap();
    let new_root = log.root_at(4).unwrap();

    let proof = log.consistency_proof(3, 4).unwrap();
    assert_eq!(
        log.root_from_consistency_proof(&old_root, &proof).unwrap(),
        new_root
    );
    log.verify_consistency_proof(&old_root, &proof, &new_root)
        .unwrap();

    let mut forged = old_root;
    forged[HASH_SIZE - 1] ^= 0x80;
    assert_matches!(
        log.verify_consistency_proof(&forged, &proof, &new_root),
        Err(Error::InvalidProof(_))
    );
    assert_matches!(
        log.root_from_consistency_proof(&forged, &proof),
        Err(Error::InvalidProof(_))
    );
}

#[test]
fn test_consistency_from_empty_tree() {
    let mut log = new_log(2);
    let empty = log.root().unwrap();
    log.write_records(["a", "b", "c"]).unwrap();
    let root = log.root().unwrap();
    let proof = log.consistency_proof(0, 3).unwrap();
    assert!(proof.path.is_empty());
    log.verify_consistency_proof(&empty, &proof, &root).unwrap();
    assert_matches!(
        log.root_from_consistency_proof(&empty, &proof),
        Err(Error::InvalidInput(_))
    );
}

#[test]
fn test_any_flipped_byte_fails() {
    let mut log = new_log(2);
    let head = log.write_records((0..13).map(record)).unwrap();
    let old_root = log.root_at(6).unwrap();
    let leaf = log.record_hash(&record(9));

    let inclusion = log.inclusion_proof(13, 9).unwrap();
    for i in 0..inclusion.path.len() {
        for byte in 0..HASH_SIZE {
            let mut bad = inclusion.clone();
            bad.path[i][byte] ^= 1;
            assert!(
                log.verify_inclusion_proof(&head.root, &bad, &leaf).is_err(),
                "hash {i} byte {byte}"
            );
        }
    }

    let consistency = log.consistency_proof(6, 13).unwrap();
    for i in 0..consistency.path.len() {
        for byte in 0..HASH_SIZE {
            let mut bad = consistency.clone();
            bad.path[i][byte] ^= 1;
            assert!(
                log.verify_consistency_proof(&old_root, &bad, &head.root)
                    .is_err(),
                "hash {i} byte {byte}"
            );
        }
    }
}

#[test]
fn test_verification_is_idempotent() {
    let mut log = new_log(3);
    let head = log.write_records((0..20).map(record)).unwrap();
    let leaf = log.record_hash(&record(17));
    let proof = log.inclusion_proof(20, 17).unwrap();
    let first = log.verify_inclusion_proof(&head.root, &proof, &leaf);
    let second = log.verify_inclusion_proof(&head.root, &proof, &leaf);
    assert!(first.is_ok() && second.is_ok());

    let wrong = log.record_hash(&record(16));
    assert_matches!(
        log.verify_inclusion_proof(&head.root, &proof, &wrong),
        Err(Error::InvalidProof(_))
    );
    assert_matches!(
        log.verify_inclusion_proof(&head.root, &proof, &wrong),
        Err(Error::InvalidProof(_))
    );
}

#[test]
fn test_tile_bytes_reproduce_every_slot() {
    let height = 2;
    let mut log = new_log(height);
    let mut leaves: Vec<Hash> = Vec::new();
    for n in 0..50 {
        leaves.push(log.record_hash(&record(n)));
        log.write_record(&record(n)).unwrap();

        let size = n + 1;
        for slot in 0..stored_hash_count(size) {
            let (level, index) = split_stored_hash_index(slot);
            let lo = (index << level) as usize;
            let hi = ((index + 1) << level) as usize;
            let expected = direct_root(log.tree_hasher(), &leaves[lo..hi]);

            let (tile, _, _) = tile_for_storage_id(HASH_SIZE, height, slot);
            let data = log.store().read_tile(&tile.path()).unwrap();
            let got = hash_from_tile(log.tree_hasher(), &tile, &data, slot).unwrap();
            assert_eq!(got, expected, "slot {slot} at size {size}");
        }
    }
}

#[test]
fn test_new_tiles_match_closed_slots() {
    for height in 1..=4u8 {
        for n in 0..64u64 {
            let mut closed: Vec<_> = (stored_hash_index(0, n)..stored_hash_count(n + 1))
                .map(|slot| tile_for_storage_id(HASH_SIZE, height, slot))
                .filter(|(_, start, end)| end - start == HASH_SIZE)
                .map(|(tile, _, _)| tile)
                .collect();
            closed.sort();
            let mut grown = new_tiles(height, n, n + 1);
            grown.sort();
            assert_eq!(grown, closed, "H={height} n={n}");
        }
    }
}

#[test]
fn test_new_tiles_cover_whole_tree() {
    let height = 2;
    let mut log = new_log(height);
    log.write_records((0..37).map(record)).unwrap();
    for tile in new_tiles(height, 0, 37) {
        let stored = log.read_tiles_for_test(&tile);
        assert_eq!(stored, tile.read_data(&log).unwrap(), "{tile}");
    }
}

impl<S: TileStore> TileLog<S> {
    fn read_tiles_for_test(&self, tile: &crate::Tile) -> Vec<u8> {
        let mut data = self.store().read_tile(&tile.path()).unwrap();
        data.truncate(tile.data_len());
        data
    }
}

/// Fails every `update_tiles` call once its budget is spent.
struct FlakyStore {
    inner: MemTileStore,
    budget: usize,
}

impl TileStore for FlakyStore {
    fn read_tree_size(&self) -> Result<u64> {
        self.inner.read_tree_size()
    }

    fn update_tree_size(&mut self, size: u64) -> Result<()> {
        self.inner.update_tree_size(size)
    }

    fn read_tree_root(&self) -> Result<Option<Hash>> {
        self.inner.read_tree_root()
    }

    fn update_tree_root(&mut self, root: &Hash) -> Result<()> {
        self.inner.update_tree_root(root)
    }

    fn read_tile(&self, path: &str) -> Result<Vec<u8>> {
        self.inner.read_tile(path)
    }

    fn update_tiles(
        &mut self,
        path: &str,
        start: usize,
        end: usize,
        hash: &Hash,
    ) -> Result<Option<Vec<u8>>> {
        if self.budget == 0 {
            return Err(Error::storage("disk full"));
        }
        self.budget -= 1;
        self.inner.update_tiles(path, start, end, hash)
    }
}

#[test]
fn test_failed_write_stops_at_last_whole_record() {
    // Records 0..5 make 1 + 2 + 1 + 3 + 1 tile writes.
    let store = FlakyStore {
        inner: MemTileStore::new(),
        budget: 8,
    };
    let mut log = TileLog::with_store(TileLogConfig::with_tile_height(2), store).unwrap();
    assert_matches!(
        log.write_records((0..10).map(record)),
        Err(Error::StorageError(_))
    );
    assert_eq!(log.size().unwrap(), 5);

    let leaves: Vec<Hash> = (0..5).map(|i| log.record_hash(&record(i))).collect();
    let root = log.root().unwrap();
    assert_eq!(root, direct_root(log.tree_hasher(), &leaves));
    assert_eq!(log.stored_root().unwrap(), Some(root));
    let proof = log.inclusion_proof(5, 4).unwrap();
    log.verify_inclusion_proof(&root, &proof, &leaves[4]).unwrap();
}

#[test]
fn test_failed_batch_keeps_size_and_root_together() {
    let mut log = TileLog::with_store(
        TileLogConfig::with_tile_height(2),
        FlakyStore {
            inner: MemTileStore::new(),
            budget: 7,
        },
    )
    .unwrap();
    let before = log.write_records(["a", "b"]).unwrap();
    assert_eq!(log.stored_root().unwrap(), Some(before.root));

    // "c" and "d" use the remaining four tile writes.
    assert_matches!(
        log.write_records(["c", "d", "e", "f", "g"]),
        Err(Error::StorageError(_))
    );
    assert_eq!(log.size().unwrap(), 4);
    let root = log.root_at(4).unwrap();
    assert_ne!(root, before.root);
    assert_eq!(log.stored_root().unwrap(), Some(root));
}

#[test]
fn test_empty_batch_is_a_no_op() {
    let mut log = new_log(2);
    log.write_records(["a", "b"]).unwrap();
    let head = log.tree_head().unwrap();
    assert_eq!(log.write_record_hashes(&[]).unwrap(), head);
    assert_eq!(log.size().unwrap(), 2);
}

#[test]
fn test_reads_beyond_tree_fail() {
    let mut log = new_log(2);
    log.write_records(["a", "b", "c"]).unwrap();
    let end = stored_hash_count(3);
    assert_eq!(log.read_hashes(&[end - 1]).unwrap().len(), 1);
    assert_matches!(log.read_hashes(&[end]), Err(Error::IndexesNotInTree));
}

#[test]
fn test_tree_head_encoding() {
    let mut log = new_log(2);
    let head = log.write_records(["a", "b", "c"]).unwrap();
    let bytes = head.encode_to_vec().unwrap();
    assert_eq!(TreeHead::decode_from_slice(&bytes).unwrap(), head);

    let proof = log.consistency_proof(1, 3).unwrap();
    let bytes = proof.encode_to_vec().unwrap();
    let decoded = crate::ConsistencyProof::decode_from_slice(&bytes).unwrap();
    let old_root = log.root_at(1).unwrap();
    log.verify_consistency_proof(&old_root, &decoded, &head.root)
        .unwrap();
}

#[test]
fn test_twenty_six_entries() {
    // 26 records; inclusion of 17 in the first 20, consistency 20 -> 26.
    let mut log = new_log(2);
    log.write_records((0..26).map(record)).unwrap();
    let root_20 = log.root_at(20).unwrap();
    let root_26 = log.root_at(26).unwrap();

    let inclusion = log.inclusion_proof(20, 17).unwrap();
    log.verify_inclusion_proof(&root_20, &inclusion, &log.record_hash(&record(17)))
        .unwrap();

    let consistency = log.consistency_proof(20, 26).unwrap();
    log.verify_consistency_proof(&root_20, &consistency, &root_26)
        .unwrap();
}
