//! Inclusion and consistency proofs over stored hashes.
//!
//! Proof construction works in two passes over a leaf interval `[lo, hi)`:
//! an `*_index` pass lists every storage slot the proof needs, the slots are
//! read in one [`HashReader`] call, and a second pass folds the returned
//! hashes into the proof. Verification rebuilds roots from a proof using only
//! `hash_children`, so it trusts nothing but the caller's tree head.
//!
//! See RFC 6962 sections 2.1.1 and 2.1.2.

use bincode::{Decode, Encode};

use crate::{
    Hash, HashFunction, Result,
    error::Error,
    hash::TreeHash,
    hash_reader::HashReader,
    node::{max_power_2, stored_hash_index},
};

/// Proof that a tree contains a record: the audit path, leaf side first.
pub type RecordProof = Vec<Hash>;

/// Proof that a tree extends an earlier tree.
pub type TreeProof = Vec<Hash>;

// =============================================================================
// Proof values
// =============================================================================

fn encode_config() -> impl bincode::config::Config {
    bincode::config::standard()
        .with_big_endian()
        .with_no_limit()
}

fn decode_config() -> impl bincode::config::Config {
    bincode::config::standard()
        .with_big_endian()
        .with_limit::<{ 100 * 1024 * 1024 }>()
}

/// A tree size paired with its root hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct TreeHead {
    /// Number of records in the tree.
    pub size: u64,
    /// Root hash of the tree.
    pub root: Hash,
}

/// Evidence that the record at `record_index` is in the tree of
/// `tree_size` records.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct InclusionProof {
    /// Size of the tree the proof is against.
    pub tree_size: u64,
    /// Index of the proven record.
    pub record_index: u64,
    /// Audit path.
    pub path: RecordProof,
}

/// Evidence that the tree of `old_size` records is a prefix of the tree of
/// `new_size` records.
#[derive(Debug, Clone, PartialEq, Eq, Encode, Decode)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ConsistencyProof {
    /// Size of the earlier tree.
    pub old_size: u64,
    /// Size of the later tree.
    pub new_size: u64,
    /// Consistency path.
    pub path: TreeProof,
}

macro_rules! impl_bincode_bytes {
    ($ty:ident) => {
        impl $ty {
            /// Serialize to bytes using bincode.
            pub fn encode_to_vec(&self) -> Result<Vec<u8>> {
                bincode::encode_to_vec(self, encode_config()).map_err(|e| {
                    Error::InvalidInput(format!(
                        "failed to encode {}: {}",
                        stringify!($ty),
                        e
                    ))
                })
            }

            /// Deserialize from bytes. Decoding is capped at 100 MiB so a
            /// crafted length prefix cannot force a huge allocation.
            pub fn decode_from_slice(bytes: &[u8]) -> Result<Self> {
                let (value, _) =
                    bincode::decode_from_slice(bytes, decode_config()).map_err(|e| {
                        Error::InvalidInput(format!(
                            "failed to decode {}: {}",
                            stringify!($ty),
                            e
                        ))
                    })?;
                Ok(value)
            }
        }
    };
}

impl_bincode_bytes!(TreeHead);
impl_bincode_bytes!(InclusionProof);
impl_bincode_bytes!(ConsistencyProof);

// =============================================================================
// Subtree hashes
// =============================================================================

fn read_exact<R: HashReader + ?Sized>(reader: &R, indexes: &[u64]) -> Result<Vec<Hash>> {
    let hashes = reader.read_hashes(indexes)?;
    if hashes.len() != indexes.len() {
        return Err(Error::BadReadHashes {
            expected: indexes.len(),
            actual: hashes.len(),
        });
    }
    Ok(hashes)
}

/// Appends to `need` the slots of the maximal aligned perfect subtrees that
/// make up `[lo, hi)`, largest first.
pub fn subtree_index(lo: u64, hi: u64, mut need: Vec<u64>) -> Vec<u64> {
    let mut lo = lo;
    while lo < hi {
        let (k, level) = max_power_2(hi - lo + 1);
        assert!(lo & (k - 1) == 0, "bad math in subtree_index");
        need.push(stored_hash_index(level, lo >> level));
        lo += k;
    }
    need
}

/// Folds the hashes read for `subtree_index(lo, hi)` into the root of
/// `[lo, hi)`. Returns the root and the unconsumed hashes.
pub fn subtree_hash<'h, F: HashFunction>(
    hasher: &TreeHash<F>,
    lo: u64,
    hi: u64,
    hashes: &'h [Hash],
) -> (Hash, &'h [Hash]) {
    // Partition into a left run of perfect subtrees, largest first; the
    // right fringe is folded in from the right.
    let mut num_tree = 0;
    let mut lo = lo;
    while lo < hi {
        let (k, _) = max_power_2(hi - lo + 1);
        assert!(lo & (k - 1) == 0, "bad math in subtree_hash");
        num_tree += 1;
        lo += k;
    }
    assert!(
        num_tree > 0 && hashes.len() >= num_tree,
        "bad index math in subtree_hash"
    );

    let mut h = hashes[num_tree - 1];
    for i in (0..num_tree - 1).rev() {
        h = hasher.hash_children(&hashes[i], &h);
    }
    (h, &hashes[num_tree..])
}

/// Root hash of the tree of the first `n` records.
///
/// Makes one `read_hashes` call for at most `1 + log2 n` slots.
pub fn tree_hash<F: HashFunction, R: HashReader + ?Sized>(
    hasher: &TreeHash<F>,
    n: u64,
    reader: &R,
) -> Result<Hash> {
    if n == 0 {
        return Ok(hasher.empty_root());
    }
    let indexes = subtree_index(0, n, Vec::new());
    let hashes = read_exact(reader, &indexes)?;
    let (h, rest) = subtree_hash(hasher, 0, n, &hashes);
    assert!(rest.is_empty(), "bad index math in tree_hash");
    Ok(h)
}

// =============================================================================
// Inclusion
// =============================================================================

/// Appends the slots needed to prove leaf `n` is in `[lo, hi)`.
pub fn leaf_proof_index(lo: u64, hi: u64, n: u64, mut need: Vec<u64>) -> Vec<u64> {
    assert!(lo <= n && n < hi, "bad math in leaf_proof_index");
    if lo + 1 == hi {
        return need;
    }
    let (k, _) = max_power_2(hi - lo);
    if n < lo + k {
        need = leaf_proof_index(lo, lo + k, n, need);
        need = subtree_index(lo + k, hi, need);
    } else {
        need = subtree_index(lo, lo + k, need);
        need = leaf_proof_index(lo + k, hi, n, need);
    }
    need
}

/// Builds the proof that leaf `n` is in `[lo, hi)` from the hashes read for
/// [`leaf_proof_index`]. Returns the proof and the unconsumed hashes.
pub fn leaf_proof<'h, F: HashFunction>(
    hasher: &TreeHash<F>,
    lo: u64,
    hi: u64,
    n: u64,
    hashes: &'h [Hash],
) -> (RecordProof, &'h [Hash]) {
    assert!(lo <= n && n < hi, "bad math in leaf_proof");

    if lo + 1 == hi {
        // The verifier has the leaf hash already.
        return (Vec::new(), hashes);
    }

    // Walk toward n, recording the hash of the side not taken.
    let (k, _) = max_power_2(hi - lo);
    let (mut proof, sibling, rest) = if n < lo + k {
        let (proof, rest) = leaf_proof(hasher, lo, lo + k, n, hashes);
        let (sibling, rest) = subtree_hash(hasher, lo + k, hi, rest);
        (proof, sibling, rest)
    } else {
        let (sibling, rest) = subtree_hash(hasher, lo, lo + k, hashes);
        let (proof, rest) = leaf_proof(hasher, lo + k, hi, n, rest);
        (proof, sibling, rest)
    };
    proof.push(sibling);
    (proof, rest)
}

/// Proof that the tree of `t` records contains record `n`.
pub fn prove_record<F: HashFunction, R: HashReader + ?Sized>(
    hasher: &TreeHash<F>,
    t: u64,
    n: u64,
    reader: &R,
) -> Result<RecordProof> {
    if n >= t {
        return Err(Error::InvalidInput(format!(
            "record index {} is not below tree size {}",
            n, t
        )));
    }
    let indexes = leaf_proof_index(0, t, n, Vec::new());
    if indexes.is_empty() {
        return Ok(Vec::new());
    }
    let hashes = read_exact(reader, &indexes)?;
    let (proof, rest) = leaf_proof(hasher, 0, t, n, &hashes);
    assert!(rest.is_empty(), "bad index math in prove_record");
    Ok(proof)
}

// Rebuilds the root of [lo, hi) implied by proof p for leaf n.
fn run_record_proof<F: HashFunction>(
    hasher: &TreeHash<F>,
    p: &[Hash],
    lo: u64,
    hi: u64,
    n: u64,
    leaf_hash: Hash,
) -> Result<Hash> {
    assert!(lo <= n && n < hi, "bad math in run_record_proof");

    if lo + 1 == hi {
        if !p.is_empty() {
            return Err(Error::InvalidProof(format!(
                "{} unexpected trailing hashes in record proof",
                p.len()
            )));
        }
        return Ok(leaf_hash);
    }

    let Some((last, rest)) = p.split_last() else {
        return Err(Error::InvalidProof("record proof too short".into()));
    };

    let (k, _) = max_power_2(hi - lo);
    if n < lo + k {
        let h = run_record_proof(hasher, rest, lo, lo + k, n, leaf_hash)?;
        Ok(hasher.hash_children(&h, last))
    } else {
        let h = run_record_proof(hasher, rest, lo + k, hi, n, leaf_hash)?;
        Ok(hasher.hash_children(last, &h))
    }
}

/// Root of the tree of `t` records implied by `proof` for record `n` with
/// leaf hash `leaf_hash`. The caller compares it against a trusted root.
pub fn root_from_record_proof<F: HashFunction>(
    hasher: &TreeHash<F>,
    proof: &[Hash],
    t: u64,
    n: u64,
    leaf_hash: Hash,
) -> Result<Hash> {
    if n >= t {
        return Err(Error::InvalidInput(format!(
            "record index {} is not below tree size {}",
            n, t
        )));
    }
    run_record_proof(hasher, proof, 0, t, n, leaf_hash)
}

/// Verify that `proof` shows the tree of `t` records with root `root` has
/// record `n` with leaf hash `leaf_hash`.
pub fn check_record<F: HashFunction>(
    hasher: &TreeHash<F>,
    proof: &[Hash],
    t: u64,
    root: &Hash,
    n: u64,
    leaf_hash: Hash,
) -> Result<()> {
    let rebuilt = root_from_record_proof(hasher, proof, t, n, leaf_hash)?;
    if rebuilt != *root {
        return Err(Error::InvalidProof(format!(
            "record proof for index {} does not match root of tree size {}",
            n, t
        )));
    }
    Ok(())
}

// =============================================================================
// Consistency
// =============================================================================

/// Appends the slots needed for the consistency sub-proof of `[lo, hi)`
/// against an old tree of `n` records.
pub fn tree_proof_index(lo: u64, hi: u64, n: u64, mut need: Vec<u64>) -> Vec<u64> {
    assert!(lo < n && n <= hi, "bad math in tree_proof_index");
    if n == hi {
        if lo == 0 {
            return need;
        }
        return subtree_index(lo, hi, need);
    }
    let (k, _) = max_power_2(hi - lo);
    if n <= lo + k {
        need = tree_proof_index(lo, lo + k, n, need);
        need = subtree_index(lo + k, hi, need);
    } else {
        need = subtree_index(lo, lo + k, need);
        need = tree_proof_index(lo + k, hi, n, need);
    }
    need
}

/// Builds the consistency sub-proof of `[lo, hi)` against an old tree of
/// `n` records. Returns the proof and the unconsumed hashes.
pub fn tree_proof<'h, F: HashFunction>(
    hasher: &TreeHash<F>,
    lo: u64,
    hi: u64,
    n: u64,
    hashes: &'h [Hash],
) -> (TreeProof, &'h [Hash]) {
    assert!(lo < n && n <= hi, "bad math in tree_proof");

    // Reached the old tree's right edge.
    if n == hi {
        if lo == 0 {
            // This is the old tree itself; the verifier knows its root.
            return (Vec::new(), hashes);
        }
        let (h, rest) = subtree_hash(hasher, lo, hi, hashes);
        return (vec![h], rest);
    }

    let (k, _) = max_power_2(hi - lo);
    let (mut proof, sibling, rest) = if n <= lo + k {
        let (proof, rest) = tree_proof(hasher, lo, lo + k, n, hashes);
        let (sibling, rest) = subtree_hash(hasher, lo + k, hi, rest);
        (proof, sibling, rest)
    } else {
        let (sibling, rest) = subtree_hash(hasher, lo, lo + k, hashes);
        let (proof, rest) = tree_proof(hasher, lo + k, hi, n, rest);
        (proof, sibling, rest)
    };
    proof.push(sibling);
    (proof, rest)
}

/// Proof that the tree of `t` records contains the tree of `n` records as a
/// prefix. `n == 0` yields an empty proof.
pub fn prove_tree<F: HashFunction, R: HashReader + ?Sized>(
    hasher: &TreeHash<F>,
    t: u64,
    n: u64,
    reader: &R,
) -> Result<TreeProof> {
    if n > t {
        return Err(Error::InvalidInput(format!(
            "old tree size {} exceeds new tree size {}",
            n, t
        )));
    }
    if n == 0 {
        return Ok(Vec::new());
    }
    let indexes = tree_proof_index(0, t, n, Vec::new());
    if indexes.is_empty() {
        return Ok(Vec::new());
    }
    let hashes = read_exact(reader, &indexes)?;
    let (proof, rest) = tree_proof(hasher, 0, t, n, &hashes);
    assert!(rest.is_empty(), "bad index math in prove_tree");
    Ok(proof)
}

// Rebuilds the (old, new) hashes of [lo, hi) implied by proof p, where old
// is the root of the old tree of n records.
fn run_tree_proof<F: HashFunction>(
    hasher: &TreeHash<F>,
    p: &[Hash],
    lo: u64,
    hi: u64,
    n: u64,
    old: Hash,
) -> Result<(Hash, Hash)> {
    assert!(lo < n && n <= hi, "bad math in run_tree_proof");

    if n == hi {
        if lo == 0 {
            if !p.is_empty() {
                return Err(Error::InvalidProof(format!(
                    "{} unexpected trailing hashes in tree proof",
                    p.len()
                )));
            }
            return Ok((old, old));
        }
        if p.len() != 1 {
            return Err(Error::InvalidProof(format!(
                "tree proof has {} hashes where 1 is expected",
                p.len()
            )));
        }
        return Ok((p[0], p[0]));
    }

    let Some((last, rest)) = p.split_last() else {
        return Err(Error::InvalidProof("tree proof too short".into()));
    };

    let (k, _) = max_power_2(hi - lo);
    if n <= lo + k {
        let (oh, th) = run_tree_proof(hasher, rest, lo, lo + k, n, old)?;
        Ok((oh, hasher.hash_children(&th, last)))
    } else {
        let (oh, th) = run_tree_proof(hasher, rest, lo + k, hi, n, old)?;
        Ok((
            hasher.hash_children(last, &oh),
            hasher.hash_children(last, &th),
        ))
    }
}

/// Root of the tree of `t` records implied by `proof`, accepted only if the
/// same proof also rebuilds `old_root` for the tree of `n` records.
///
/// For `n == t` the proof must be empty and the result is `old_root`. An
/// empty old tree (`n == 0`) commits to nothing, so no new root can be
/// derived from it; that case is [`Error::InvalidInput`] unless `t` is 0 too.
pub fn new_tree_root_from_tree_proof<F: HashFunction>(
    hasher: &TreeHash<F>,
    proof: &[Hash],
    t: u64,
    n: u64,
    old_root: &Hash,
) -> Result<Hash> {
    if n > t {
        return Err(Error::InvalidInput(format!(
            "old tree size {} exceeds new tree size {}",
            n, t
        )));
    }
    if n == 0 {
        if !proof.is_empty() {
            return Err(Error::InvalidProof(
                "consistency proof from an empty tree must be empty".into(),
            ));
        }
        if t == 0 {
            return Ok(*old_root);
        }
        return Err(Error::InvalidInput(
            "cannot derive a root from an empty old tree".into(),
        ));
    }
    let (rebuilt_old, rebuilt_new) = run_tree_proof(hasher, proof, 0, t, n, *old_root)?;
    if rebuilt_old != *old_root {
        return Err(Error::InvalidProof(format!(
            "tree proof does not match old root of tree size {}",
            n
        )));
    }
    Ok(rebuilt_new)
}

/// Verify that `proof` shows the tree of `t` records with root `root`
/// contains the tree of `n` records with root `old_root` as a prefix.
///
/// A proof from the empty tree is accepted iff it is empty.
pub fn check_tree<F: HashFunction>(
    hasher: &TreeHash<F>,
    proof: &[Hash],
    t: u64,
    root: &Hash,
    n: u64,
    old_root: &Hash,
) -> Result<()> {
    if n == 0 {
        if !proof.is_empty() {
            return Err(Error::InvalidProof(
                "consistency proof from an empty tree must be empty".into(),
            ));
        }
        if t == 0 && old_root != root {
            return Err(Error::InvalidProof(
                "roots of two empty trees differ".into(),
            ));
        }
        return Ok(());
    }
    let rebuilt = new_tree_root_from_tree_proof(hasher, proof, t, n, old_root)?;
    if rebuilt != *root {
        return Err(Error::InvalidProof(format!(
            "tree proof does not match root of tree size {}",
            t
        )));
    }
    Ok(())
}
