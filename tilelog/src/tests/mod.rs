mod test_log;

use crate::{Hash, HashFunction, TreeHash, node::max_power_2};

/// Root of `leaves` computed straight from the RFC 6962 definition.
pub(crate) fn direct_root<F: HashFunction>(hasher: &TreeHash<F>, leaves: &[Hash]) -> Hash {
    match leaves.len() {
        0 => hasher.empty_root(),
        1 => leaves[0],
        n => {
            let (k, _) = max_power_2(n as u64);
            let (left, right) = leaves.split_at(k as usize);
            hasher.hash_children(&direct_root(hasher, left), &direct_root(hasher, right))
        }
    }
}
