//! Read access to stored tree hashes.

use crate::{Hash, Result, error::Error};

/// Reads stored hashes by storage slot (see
/// [`stored_hash_index`](crate::stored_hash_index)).
///
/// Implementations must return exactly one hash per requested slot, in
/// request order, or an error. Callers in this crate always request slots
/// in increasing order.
pub trait HashReader {
    /// Return the hashes stored at `indexes`.
    fn read_hashes(&self, indexes: &[u64]) -> Result<Vec<Hash>>;
}

/// A flat, slot-indexed hash array is the simplest reader.
impl HashReader for [Hash] {
    fn read_hashes(&self, indexes: &[u64]) -> Result<Vec<Hash>> {
        indexes
            .iter()
            .map(|&index| {
                usize::try_from(index)
                    .ok()
                    .and_then(|i| self.get(i))
                    .copied()
                    .ok_or(Error::IndexesNotInTree)
            })
            .collect()
    }
}

impl HashReader for Vec<Hash> {
    fn read_hashes(&self, indexes: &[u64]) -> Result<Vec<Hash>> {
        self.as_slice().read_hashes(indexes)
    }
}

impl<R: HashReader + ?Sized> HashReader for &R {
    fn read_hashes(&self, indexes: &[u64]) -> Result<Vec<Hash>> {
        (**self).read_hashes(indexes)
    }
}
