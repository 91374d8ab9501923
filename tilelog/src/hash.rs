//! Domain-separated tree hashing.
//!
//! - Leaf hashes:     `H(0x00 || record)`
//! - Interior hashes: `H(0x01 || left || right)`
//! - Empty tree:      `H("")`
//!
//! The 0x00/0x01 tags keep a record from ever hashing to the same value as
//! an interior node, which is what makes second preimages against proofs
//! infeasible.

use sha2::{Digest, Sha256};

/// Size of every hash handled by the log, in bytes.
pub const HASH_SIZE: usize = 32;

/// A 32-byte tree hash.
pub type Hash = [u8; HASH_SIZE];

/// Domain tag prepended to leaf hash inputs.
const LEAF_TAG: u8 = 0x00;
/// Domain tag prepended to interior node inputs.
const INTERIOR_TAG: u8 = 0x01;

/// The raw hash function a log is built on.
///
/// Implementations hash the concatenation of `parts` without allocating it.
pub trait HashFunction {
    /// Hash the concatenation of `parts`.
    fn hash_parts(&self, parts: &[&[u8]]) -> Hash;

    /// Hash a single byte string.
    fn hash(&self, data: &[u8]) -> Hash {
        self.hash_parts(&[data])
    }
}

/// SHA-256, as used by RFC 6962 / RFC 9162 logs.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Sha256Hash;

impl HashFunction for Sha256Hash {
    fn hash_parts(&self, parts: &[&[u8]]) -> Hash {
        let mut hasher = Sha256::new();
        for part in parts {
            hasher.update(part);
        }
        hasher.finalize().into()
    }
}

/// Blake3 with a 32-byte output.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Blake3Hash;

impl HashFunction for Blake3Hash {
    fn hash_parts(&self, parts: &[&[u8]]) -> Hash {
        let mut hasher = blake3::Hasher::new();
        for part in parts {
            hasher.update(part);
        }
        *hasher.finalize().as_bytes()
    }
}

/// Tree hashing on top of a [`HashFunction`].
#[derive(Debug, Default, Clone, Copy)]
pub struct TreeHash<F> {
    function: F,
}

impl<F: HashFunction> TreeHash<F> {
    /// Wrap a hash function.
    pub fn new(function: F) -> Self {
        TreeHash { function }
    }

    /// The underlying hash function.
    pub fn function(&self) -> &F {
        &self.function
    }

    /// Root of a tree with no records: `H("")`.
    pub fn empty_root(&self) -> Hash {
        self.function.hash(b"")
    }

    /// Leaf hash of a record: `H(0x00 || data)`.
    pub fn hash_leaf(&self, data: &[u8]) -> Hash {
        self.function.hash_parts(&[&[LEAF_TAG][..], data])
    }

    /// Interior node hash: `H(0x01 || left || right)`.
    pub fn hash_children(&self, left: &Hash, right: &Hash) -> Hash {
        self.function
            .hash_parts(&[&[INTERIOR_TAG][..], &left[..], &right[..]])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sha256_empty_root_matches_rfc6962() {
        let th = TreeHash::new(Sha256Hash);
        assert_eq!(
            hex::encode(th.empty_root()),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }

    #[test]
    fn sha256_leaf_hash_of_empty_record() {
        // RFC 6962 test vector: the leaf hash of an empty entry.
        let th = TreeHash::new(Sha256Hash);
        assert_eq!(
            hex::encode(th.hash_leaf(b"")),
            "6e340b9cffb37a989ca544e6bb780a2c78901d3fb33738768511a30617afa01d"
        );
    }

    #[test]
    fn leaf_and_interior_domains_differ() {
        let th = TreeHash::new(Blake3Hash);
        let left = th.hash_leaf(b"l");
        let right = th.hash_leaf(b"r");
        let mut forged = Vec::with_capacity(2 * HASH_SIZE);
        forged.extend_from_slice(&left);
        forged.extend_from_slice(&right);
        assert_ne!(th.hash_children(&left, &right), th.hash_leaf(&forged));
    }

    #[test]
    fn hash_parts_equals_hash_of_concatenation() {
        let f = Sha256Hash;
        assert_eq!(f.hash_parts(&[&b"ab"[..], &b""[..], &b"cd"[..]]), f.hash(b"abcd"));
        let f = Blake3Hash;
        assert_eq!(f.hash_parts(&[&b"ab"[..], &b"cd"[..]]), f.hash(b"abcd"));
    }
}
