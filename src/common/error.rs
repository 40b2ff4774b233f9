//! Error types for blocktree.

use thiserror::Error;

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors raised by the block store and the B-tree engine.
///
/// A search or delete miss is not an error: those report `None` / `false`.
/// Everything here is either an I/O failure, resource exhaustion, or a
/// structural invariant that turned out not to hold.
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from disk operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Requested block lies beyond the end of the file.
    #[error("Block {0} not found")]
    BlockNotFound(u32),

    /// Block id is not marked allocated in the free-space bitmap.
    #[error("Block {0} is not allocated")]
    BlockNotAllocated(u32),

    /// The free-space bitmap has no clear bit left.
    #[error("Out of blocks: all {capacity} blocks are allocated")]
    OutOfBlocks { capacity: u32 },

    /// Stored CRC32 does not match the block contents.
    #[error("Checksum mismatch in block {0}")]
    ChecksumMismatch(u32),

    /// Block 0 does not hold a valid superblock.
    #[error("Invalid superblock: {0}")]
    InvalidSuperblock(String),

    /// Configuration value out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Block does not contain a B-tree node.
    #[error("Block {0} does not hold a B-tree node")]
    NotANode(u32),

    /// A non-root node has no parent recorded.
    #[error("Node {0} has no parent")]
    MissingParent(u32),

    /// A parent does not list the child that points back at it.
    #[error("Node {child} is not a child of node {parent}")]
    ChildNotFound { parent: u32, child: u32 },

    /// A full node was found where room was required.
    #[error("Node {0} is full")]
    NodeFull(u32),

    /// Node holds too few routing keys to be split.
    #[error("Node {0} has too few keys to split")]
    NotSplittable(u32),

    /// No adjacent child pair starts at the given slot.
    #[error("Node {parent} has no sibling pair at index {index}")]
    NoSibling { parent: u32, index: usize },

    /// Merging two siblings would overflow the fanout bound.
    #[error("Cannot merge nodes {left} and {right}: combined node exceeds {max_keys} keys")]
    MergeOverflow { left: u32, right: u32, max_keys: usize },

    /// Operation requires internal nodes but found a leaf (or vice versa).
    #[error("Unexpected node kind at block {0}")]
    UnexpectedNodeKind(u32),

    /// Tree structure violates an invariant.
    #[error("Tree corrupted: {0}")]
    Corrupted(String),
}
