//! Block store statistics.

use std::fmt;

/// Counters kept by the [`BlockStore`](super::BlockStore).
///
/// The store is single-writer (`&mut self` on every access), so the
/// counters are plain integers. Copy the struct to take a snapshot.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct StoreStats {
    /// Accesses served from the in-memory block image.
    pub cache_hits: u64,
    /// Accesses that had to load the block from disk.
    pub cache_misses: u64,
    /// Blocks written back by `flush`.
    pub blocks_written: u64,
    /// Block ids handed out by the bitmap.
    pub allocations: u64,
    /// Block ids returned to the bitmap.
    pub releases: u64,
}

impl StoreStats {
    /// Fraction of accesses served without disk I/O (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.cache_hits + self.cache_misses;
        if total == 0 {
            0.0
        } else {
            self.cache_hits as f64 / total as f64
        }
    }

    /// Blocks currently held by the tree (allocations minus releases).
    pub fn live_blocks(&self) -> u64 {
        self.allocations.saturating_sub(self.releases)
    }
}

impl fmt::Display for StoreStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Stats {{ hits: {}, misses: {}, written: {}, allocated: {}, released: {}, hit_rate: {:.2}% }}",
            self.cache_hits,
            self.cache_misses,
            self.blocks_written,
            self.allocations,
            self.releases,
            self.hit_rate() * 100.0
        )
    }
}
