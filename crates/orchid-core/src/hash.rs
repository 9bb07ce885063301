//! Model-state-hash helpers
//!
//! The model state hash is the XOR of one contribution per cell. Each
//! contribution mixes two hashes of the cell's canonical path with the hash
//! of its current value, so an update only needs to XOR out the old
//! contribution and XOR in the new one.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// Value hash used for Undefined cells
pub const UNDEFINED_HASH: u64 = 0x9e37_79b9_7f4a_7c15;

/// Deterministic hash of any `Hash` value.
///
/// `DefaultHasher::new()` uses fixed keys, so results are stable within a
/// build of the kernel.
pub fn stable_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DefaultHasher::new();
    value.hash(&mut hasher);
    hasher.finish()
}

/// Pair of path hashes owned by every cell
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct NameHash {
    a: u64,
    b: u64,
}

impl NameHash {
    pub fn of(path: &str) -> Self {
        let a = stable_hash(&(path, 0xa5a5u16));
        // odd multiplier keeps the value hash fully mixed in
        let b = stable_hash(&(0x5a5au16, path)) | 1;
        NameHash { a, b }
    }

    /// Contribution of a cell holding a value with the given hash
    #[inline]
    pub fn contribution(&self, value_hash: u64) -> u64 {
        self.a ^ self.b.wrapping_mul(value_hash)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stable_hash_is_deterministic() {
        assert_eq!(stable_hash("top.counter"), stable_hash("top.counter"));
        assert_ne!(stable_hash(&1i64), stable_hash(&2i64));
    }

    #[test]
    fn test_name_hash_distinguishes_paths() {
        let a = NameHash::of("top.a");
        let b = NameHash::of("top.b");
        assert_ne!(a.contribution(7), b.contribution(7));
        assert_ne!(a.contribution(7), a.contribution(8));
    }

    #[test]
    fn test_xor_contributions_cancel() {
        let n = NameHash::of("top.x");
        let total = 0x1234u64 ^ n.contribution(5);
        assert_eq!(total ^ n.contribution(5), 0x1234);
    }
}
