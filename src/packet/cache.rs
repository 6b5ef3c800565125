//! Per-position suppress-decision cache
//!
//! Spawn packets for the same entity cluster repeat heavily within a
//! tick, so verdicts are memoized under a quantized (position, observer)
//! key. Quantization is quarter-block; entries churn out through LRU
//! order rather than explicit invalidation.

use std::hash::{Hash, Hasher};
use std::num::NonZeroUsize;

use lru::LruCache;
use rustc_hash::FxHasher;

use crate::host::ObserverId;
use crate::util::vec3::Vec3;

/// Entries kept per interceptor
pub const CACHE_CAPACITY: usize = 512;

/// Quarter-block position quantization
const QUANT_PER_BLOCK: f64 = 4.0;

#[inline]
fn quantize(v: f64) -> i64 {
    (v * QUANT_PER_BLOCK).round() as i64
}

fn key(observer: ObserverId, position: Vec3) -> u64 {
    let mut h = FxHasher::default();
    observer.hash(&mut h);
    quantize(position.x).hash(&mut h);
    quantize(position.y).hash(&mut h);
    quantize(position.z).hash(&mut h);
    h.finish()
}

/// LRU map from quantized (observer, position) to a suppress flag
pub struct DecisionCache {
    entries: LruCache<u64, bool>,
}

impl DecisionCache {
    pub fn new() -> Self {
        Self::with_capacity(CACHE_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).unwrap_or(NonZeroUsize::MIN);
        Self {
            entries: LruCache::new(capacity),
        }
    }

    pub fn get(&mut self, observer: ObserverId, position: Vec3) -> Option<bool> {
        self.entries.get(&key(observer, position)).copied()
    }

    pub fn insert(&mut self, observer: ObserverId, position: Vec3, suppress: bool) {
        self.entries.put(key(observer, position), suppress);
    }

    /// Dropped wholesale on configuration reload
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for DecisionCache {
    fn default() -> Self {
        Self::new()
    }
}
