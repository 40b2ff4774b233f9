//! Free-space bitmap tracking allocated blocks.
//!
//! One bit per block id: 1 = allocated, 0 = free. Bits are packed into
//! `u64` words, bit `i % 64` of word `i / 64`. The bitmap is persisted
//! inside the superblock, after its metadata header.

use crate::storage::page::Page;

const WORD_BITS: usize = u64::BITS as usize;

/// In-memory free-space bitmap.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeBitmap {
    words: Vec<u64>,
    /// Number of addressable bits; bits at or past this index are never free.
    capacity: u32,
}

impl FreeBitmap {
    /// Create an all-free bitmap tracking `capacity` blocks.
    pub fn new(capacity: u32) -> Self {
        let words = (capacity as usize).div_ceil(WORD_BITS);
        Self {
            words: vec![0; words],
            capacity,
        }
    }

    /// Load `capacity` bits stored as little-endian words at `offset`.
    pub fn read_from(page: &Page, offset: usize, capacity: u32) -> Self {
        let mut bitmap = Self::new(capacity);
        for (i, word) in bitmap.words.iter_mut().enumerate() {
            *word = page.read_u64(offset + i * 8);
        }
        bitmap
    }

    /// Store the bitmap words at `offset`.
    pub fn write_to(&self, page: &mut Page, offset: usize) {
        for (i, &word) in self.words.iter().enumerate() {
            page.write_u64(offset + i * 8, word);
        }
    }

    /// Number of blocks tracked.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.capacity
    }

    /// Whether block `index` is allocated. Out-of-range indices read as free.
    #[inline]
    pub fn get(&self, index: u32) -> bool {
        let i = index as usize;
        self.words
            .get(i / WORD_BITS)
            .is_some_and(|w| w & (1 << (i % WORD_BITS)) != 0)
    }

    /// Mark block `index` allocated (`true`) or free (`false`).
    ///
    /// # Panics
    /// Panics if `index >= capacity`.
    pub fn set(&mut self, index: u32, allocated: bool) {
        assert!(index < self.capacity, "bitmap index {index} out of range");
        let i = index as usize;
        let mask = 1u64 << (i % WORD_BITS);
        if allocated {
            self.words[i / WORD_BITS] |= mask;
        } else {
            self.words[i / WORD_BITS] &= !mask;
        }
    }

    /// Lowest free block index, scanning a word at a time.
    pub fn first_clear(&self) -> Option<u32> {
        self.words
            .iter()
            .enumerate()
            .find(|(_, w)| **w != u64::MAX)
            .map(|(wi, w)| (wi * WORD_BITS + w.trailing_ones() as usize) as u32)
            .filter(|&index| index < self.capacity)
    }

    /// Number of allocated blocks.
    pub fn count_allocated(&self) -> u32 {
        self.words.iter().map(|w| w.count_ones()).sum()
    }
}
