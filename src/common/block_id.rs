//! Block identifier type.

use std::fmt;

/// Identifies a fixed-size block in the backing file.
///
/// Using `u32` allows for 4 billion blocks, far more than the free-space
/// bitmap can track. Block 0 is always the superblock, so no B-tree node
/// ever lives there.
///
/// "No block" is expressed as `Option<BlockId>` in memory. On disk the
/// absent value is encoded as [`BlockId::NONE_RAW`] so that a real block id
/// is never overloaded as an empty marker.
///
/// # Example
/// ```
/// use blocktree::BlockId;
///
/// let block_id = BlockId::new(42);
/// assert_eq!(block_id.0, 42);
/// assert_eq!(BlockId::from_raw(BlockId::to_raw(None)), None);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockId(pub u32);

impl BlockId {
    /// The superblock (file metadata + free-space bitmap).
    pub const SUPERBLOCK: BlockId = BlockId(0);

    /// On-disk encoding of "no block".
    pub const NONE_RAW: u32 = u32::MAX;

    /// Create a new BlockId.
    #[inline]
    pub fn new(id: u32) -> Self {
        BlockId(id)
    }

    /// Index form for bitmap and cache addressing.
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    /// Encode an optional block id for storage.
    #[inline]
    pub fn to_raw(id: Option<BlockId>) -> u32 {
        id.map_or(Self::NONE_RAW, |b| b.0)
    }

    /// Decode a stored block id.
    #[inline]
    pub fn from_raw(raw: u32) -> Option<BlockId> {
        (raw != Self::NONE_RAW).then_some(BlockId(raw))
    }
}

impl fmt::Display for BlockId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block({})", self.0)
    }
}
