//! Fixed-size bit array with lock-free set and test.

use std::sync::atomic::{AtomicU64, Ordering};

/// Bits are only ever set, never cleared, so concurrent `set` calls commute
/// and cannot lose updates.
#[derive(Debug)]
pub struct AtomicBitSet {
    words: Vec<AtomicU64>,
    len: u64,
}

impl AtomicBitSet {
    pub fn new(len: u64) -> Self {
        let words = len.div_ceil(64) as usize;
        Self {
            words: (0..words).map(|_| AtomicU64::new(0)).collect(),
            len,
        }
    }

    pub fn len(&self) -> u64 {
        self.len
    }

    /// Set a bit, returning its previous value.
    ///
    /// # Panics
    /// Panics if `index >= len`; callers derive indexes modulo `len`.
    pub fn set(&self, index: u64) -> bool {
        let (word, mask) = self.locate(index);
        self.words[word].fetch_or(mask, Ordering::AcqRel) & mask != 0
    }

    pub fn get(&self, index: u64) -> bool {
        let (word, mask) = self.locate(index);
        self.words[word].load(Ordering::Acquire) & mask != 0
    }

    fn locate(&self, index: u64) -> (usize, u64) {
        assert!(index < self.len, "bit {} out of range {}", index, self.len);
        ((index / 64) as usize, 1u64 << (index % 64))
    }
}
