//! Tree coordinates and storage slot arithmetic.
//!
//! A node `(level, n)` is the `n`th perfect subtree of height `level`; it
//! covers leaves `[n << level, (n + 1) << level)`. Persisted nodes are laid
//! out in the order appends close them (section 3.3 of Crosby and Wallach,
//! "Efficient Data Structures for Tamper-Evident Logging"):
//!
//! ```text
//! slot:   0  1  2   3  4  5  6   7  8  9  10 ...
//! node: 0/0 0/1 1/0 0/2 0/3 1/1 2/0 0/4 0/5 1/2 0/6 ...
//! ```
//!
//! None of these functions validate their inputs against a tree size;
//! callers check bounds first.

use crate::{
    Hash, HashFunction, Result,
    error::Error,
    hash::TreeHash,
    hash_reader::HashReader,
};

/// Returns `(k, log2 k)` where `k` is the largest power of two smaller
/// than `n`.
///
/// # Panics
///
/// Panics if `n <= 1`.
pub fn max_power_2(n: u64) -> (u64, u8) {
    assert!(n > 1, "bad math in max_power_2({n})");
    let l = (n - 1).ilog2() as u8;
    (1 << l, l)
}

/// Maps the tree coordinates `(level, n)` to the storage slot the node
/// occupies.
pub fn stored_hash_index(level: u8, n: u64) -> u64 {
    // Level L's nth hash is written right after level L+1's 2n+1th hash, so
    // walk down to the level 0 ordering and add the level back at the end.
    let mut n = n;
    for _ in 0..level {
        n = 2 * n + 1;
    }

    // Level 0's nth hash sits at n + n/2 + n/4 + ...
    let mut i = 0;
    while n > 0 {
        i += n;
        n >>= 1;
    }

    i + u64::from(level)
}

/// Inverse of [`stored_hash_index`]: the `(level, n)` stored at `slot`.
pub fn split_stored_hash_index(slot: u64) -> (u8, u64) {
    // stored_hash_index(0, n) < 2n, so the record that closed this slot is
    // in [slot/2, slot/2 + log2(slot)].
    let mut n = slot / 2;
    let mut slot_n = stored_hash_index(0, n);
    assert!(slot_n <= slot, "bad math in split_stored_hash_index");
    loop {
        // Record n adds 1 + trailing_zeros(n + 1) hashes.
        let x = slot_n + 1 + u64::from((n + 1).trailing_zeros());
        if x > slot {
            break;
        }
        n += 1;
        slot_n = x;
    }
    // The slot was written with record n: it is one of (0, n), (1, n/2),
    // (2, n/4), ...
    let level = (slot - slot_n) as u8;
    (level, n >> level)
}

/// Number of slots in use once `n` records have been appended.
pub fn stored_hash_count(n: u64) -> u64 {
    if n == 0 {
        return 0;
    }
    let mut count = stored_hash_index(0, n - 1) + 1;
    let mut i = n - 1;
    while i & 1 != 0 {
        count += 1;
        i >>= 1;
    }
    count
}

/// Hashes to store when appending record `n` with the given data.
///
/// See [`stored_hashes_for_record_hash`].
pub fn stored_hashes<F: HashFunction, R: HashReader + ?Sized>(
    hasher: &TreeHash<F>,
    n: u64,
    data: &[u8],
    reader: &R,
) -> Result<Vec<Hash>> {
    stored_hashes_for_record_hash(hasher, n, hasher.hash_leaf(data), reader)
}

/// Hashes to store when appending record `n` whose leaf hash is
/// `record_hash`.
///
/// The result starts with `record_hash` and continues with every interior
/// node the append closes, bottom up; it belongs at consecutive slots
/// starting at `stored_hash_index(0, n)`. Up to `log2 n` earlier hashes are
/// read from `reader`.
pub fn stored_hashes_for_record_hash<F: HashFunction, R: HashReader + ?Sized>(
    hasher: &TreeHash<F>,
    n: u64,
    record_hash: Hash,
    reader: &R,
) -> Result<Vec<Hash>> {
    // Each trailing 1 bit of n closes a subtree and consumes the hash of its
    // left sibling.
    let m = (n + 1).trailing_zeros() as u8;
    let mut indexes = vec![0u64; usize::from(m)];
    for i in 0..m {
        // n >> i is always odd here; requested in increasing slot order.
        indexes[usize::from(m - 1 - i)] = stored_hash_index(i, (n >> i) - 1);
    }

    let old = reader.read_hashes(&indexes)?;
    if old.len() != indexes.len() {
        return Err(Error::BadReadHashes {
            expected: indexes.len(),
            actual: old.len(),
        });
    }

    let mut hashes = Vec::with_capacity(usize::from(m) + 1);
    hashes.push(record_hash);
    let mut h = record_hash;
    for i in 0..m {
        h = hasher.hash_children(&old[usize::from(m - 1 - i)], &h);
        hashes.push(h);
    }
    Ok(hashes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stored_hash_index_layout() {
        let expected = [
            (0, 0, 0),
            (0, 1, 1),
            (1, 0, 2),
            (0, 2, 3),
            (0, 3, 4),
            (1, 1, 5),
            (2, 0, 6),
            (0, 4, 7),
            (0, 5, 8),
            (1, 2, 9),
            (0, 6, 10),
            (0, 7, 11),
            (1, 3, 12),
            (2, 1, 13),
            (3, 0, 14),
        ];
        for (level, n, slot) in expected {
            assert_eq!(stored_hash_index(level, n), slot, "({level}, {n})");
        }
    }

    #[test]
    fn test_split_stored_hash_index() {
        for level in 0..10 {
            for n in 0..100 {
                let slot = stored_hash_index(level, n);
                assert_eq!(split_stored_hash_index(slot), (level, n));
            }
        }
    }

    #[test]
    fn test_stored_hash_count() {
        // Leaves plus one closed parent per carry.
        let expected = [0, 1, 3, 4, 7, 8, 10, 11, 15];
        for (n, count) in expected.into_iter().enumerate() {
            assert_eq!(stored_hash_count(n as u64), count, "n = {n}");
        }
    }

    #[test]
    fn test_stored_hash_count_matches_next_leaf_slot() {
        for n in 0..1000 {
            assert_eq!(stored_hash_count(n), stored_hash_index(0, n));
        }
    }

    #[test]
    fn test_max_power_2() {
        assert_eq!(max_power_2(2), (1, 0));
        assert_eq!(max_power_2(3), (2, 1));
        assert_eq!(max_power_2(4), (2, 1));
        assert_eq!(max_power_2(5), (4, 2));
        assert_eq!(max_power_2(1 << 40), (1 << 39, 39));
    }

    #[test]
    #[should_panic(expected = "bad math")]
    fn test_max_power_2_rejects_one() {
        max_power_2(1);
    }
}
