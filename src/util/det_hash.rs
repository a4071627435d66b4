//! Stable hashing for global-state fingerprints.
//!
//! `std`'s `DefaultHasher` is randomly keyed per process, which would make
//! cycle detection results differ between a run and its replay. Fingerprints
//! use a fixed-key FNV-1a hasher with a final avalanche step instead.

use std::hash::{BuildHasher, Hash, Hasher};

const FNV_OFFSET: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// Deterministic, non-cryptographic hasher.
#[derive(Debug, Clone)]
pub struct DetHasher {
    state: u64,
}

impl Default for DetHasher {
    fn default() -> Self {
        Self { state: FNV_OFFSET }
    }
}

impl Hasher for DetHasher {
    fn write(&mut self, bytes: &[u8]) {
        for &byte in bytes {
            self.state ^= u64::from(byte);
            self.state = self.state.wrapping_mul(FNV_PRIME);
        }
    }

    fn finish(&self) -> u64 {
        let mut h = self.state;
        h ^= h >> 33;
        h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
        h ^= h >> 33;
        h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
        h ^= h >> 33;
        h
    }
}

/// Builder for [`DetHasher`], usable as a `HashMap` hasher.
#[derive(Debug, Clone, Copy, Default)]
pub struct DetBuildHasher;

impl BuildHasher for DetBuildHasher {
    type Hasher = DetHasher;

    fn build_hasher(&self) -> DetHasher {
        DetHasher::default()
    }
}

/// `HashMap` whose hashing is identical across processes.
pub type DetHashMap<K, V> = std::collections::HashMap<K, V, DetBuildHasher>;

/// Hashes a single value with [`DetHasher`].
#[must_use]
pub fn stable_hash<T: Hash + ?Sized>(value: &T) -> u64 {
    let mut hasher = DetHasher::default();
    value.hash(&mut hasher);
    hasher.finish()
}
