//! B-tree node type and its block encoding.
//!
//! A node occupies exactly one block. Leaves hold a single key (and its
//! value); internal nodes hold `n` routing keys and `n + 1` child block ids,
//! where `keys[i]` is the maximum key reachable through `children[i]`.

use crate::common::config::{BLOCK_SIZE, MAX_SUPPORTED_KEYS};
use crate::common::{BlockId, Error, Key, Result};
use crate::storage::page::{Page, PageHeader, PageType};

/// Node layout (after the page header):
///
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 5       4     block_number
/// 9       4     parent (u32::MAX = root)
/// 13      1     flags (bit 0: leaf key present)
/// 14      2     num_keys
/// 16      2     num_children
/// 18      8     key (leaf)
/// 26      8     value (leaf)
/// 34      8*n   routing keys
/// ..      4*c   child block ids
/// ```
mod layout {
    pub const BLOCK_NUMBER: usize = super::PageHeader::SIZE;
    pub const PARENT: usize = BLOCK_NUMBER + 4;
    pub const FLAGS: usize = PARENT + 4;
    pub const NUM_KEYS: usize = FLAGS + 1;
    pub const NUM_CHILDREN: usize = NUM_KEYS + 2;
    pub const KEY: usize = NUM_CHILDREN + 2;
    pub const VALUE: usize = KEY + 8;
    pub const KEYS: usize = VALUE + 8;
}

const FLAG_HAS_KEY: u8 = 0x01;

// The widest allowed node must fit in one block.
const _: () = assert!(
    layout::KEYS + MAX_SUPPORTED_KEYS * 8 + (MAX_SUPPORTED_KEYS + 1) * 4 <= BLOCK_SIZE
);

/// Decoded B-tree node.
///
/// Nodes are plain values: the engine reads one out of its block, changes
/// it, and writes it back. Parent and child links are block ids, never
/// references.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Node {
    /// The node's own block id.
    pub block_number: BlockId,
    pub is_leaf: bool,
    /// Owning internal node; `None` only for the root.
    pub parent: Option<BlockId>,
    /// The single key of a leaf. `None` for internal nodes and the empty root.
    pub key: Option<Key>,
    /// Payload associated with a leaf's key.
    pub value: u64,
    /// Routing keys of an internal node.
    pub keys: Vec<Key>,
    /// Child block ids of an internal node (`keys.len() + 1` when populated).
    pub children: Vec<BlockId>,
}

impl Node {
    /// A fresh, empty node for `block_number`.
    pub fn empty(block_number: BlockId, is_leaf: bool) -> Self {
        Self {
            block_number,
            is_leaf,
            parent: None,
            key: None,
            value: 0,
            keys: Vec::new(),
            children: Vec::new(),
        }
    }

    /// Number of routing keys.
    #[inline]
    pub fn num_keys(&self) -> usize {
        self.keys.len()
    }

    /// An internal node with `max_keys` routing keys has no room left.
    #[inline]
    pub fn is_full(&self, max_keys: usize) -> bool {
        !self.is_leaf && self.keys.len() >= max_keys
    }

    #[inline]
    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }

    /// The root of a tree with no entries.
    #[inline]
    pub fn is_empty_leaf(&self) -> bool {
        self.is_leaf && self.key.is_none()
    }

    /// Position of `child` in this node's child list.
    pub fn child_index(&self, child: BlockId) -> Result<usize> {
        self.children
            .iter()
            .position(|&c| c == child)
            .ok_or(Error::ChildNotFound {
                parent: self.block_number.0,
                child: child.0,
            })
    }

    /// Child slot a key routes to: the first child whose maximum is
    /// `>= key`, or the last child.
    pub fn route(&self, key: Key) -> usize {
        self.keys
            .iter()
            .position(|&k| key <= k)
            .unwrap_or(self.keys.len())
    }

    /// Turn the node into an empty leaf in place (used for an emptied root).
    pub fn clear_to_leaf(&mut self) {
        self.is_leaf = true;
        self.key = None;
        self.value = 0;
        self.keys.clear();
        self.children.clear();
    }

    // ========================================================================
    // Encoding
    // ========================================================================

    /// Encode the node into a block image.
    ///
    /// The page header checksum is left for the block store to fill in at
    /// flush time. Bytes past the populated arrays are not cleared.
    pub fn write_to(&self, page: &mut Page) {
        page.set_page_type(if self.is_leaf {
            PageType::BTreeLeaf
        } else {
            PageType::BTreeInternal
        });
        page.write_u32(layout::BLOCK_NUMBER, self.block_number.0);
        page.write_u32(layout::PARENT, BlockId::to_raw(self.parent));
        page.write_u8(
            layout::FLAGS,
            if self.key.is_some() { FLAG_HAS_KEY } else { 0 },
        );
        page.write_u16(layout::NUM_KEYS, self.keys.len() as u16);
        page.write_u16(layout::NUM_CHILDREN, self.children.len() as u16);
        page.write_u64(layout::KEY, self.key.unwrap_or(0));
        page.write_u64(layout::VALUE, self.value);

        let mut offset = layout::KEYS;
        for &k in &self.keys {
            page.write_u64(offset, k);
            offset += 8;
        }
        for &c in &self.children {
            page.write_u32(offset, c.0);
            offset += 4;
        }
    }

    /// Decode the node stored in `page`, which must be block `block_id`.
    ///
    /// # Errors
    /// - `Error::NotANode` if the block holds something else
    /// - `Error::Corrupted` if counts or the self id are inconsistent
    pub fn read_from(block_id: BlockId, page: &Page) -> Result<Self> {
        let is_leaf = match page.page_type() {
            PageType::BTreeLeaf => true,
            PageType::BTreeInternal => false,
            _ => return Err(Error::NotANode(block_id.0)),
        };

        let stored_id = page.read_u32(layout::BLOCK_NUMBER);
        if stored_id != block_id.0 {
            return Err(Error::Corrupted(format!(
                "block {} claims to be block {stored_id}",
                block_id.0
            )));
        }

        let num_keys = page.read_u16(layout::NUM_KEYS) as usize;
        let num_children = page.read_u16(layout::NUM_CHILDREN) as usize;
        if num_keys > MAX_SUPPORTED_KEYS || num_children > MAX_SUPPORTED_KEYS + 1 {
            return Err(Error::Corrupted(format!(
                "block {}: {num_keys} keys / {num_children} children exceed node capacity",
                block_id.0
            )));
        }
        if is_leaf && (num_keys != 0 || num_children != 0) {
            return Err(Error::Corrupted(format!(
                "leaf {} has routing entries",
                block_id.0
            )));
        }

        let mut offset = layout::KEYS;
        let mut keys = Vec::with_capacity(num_keys);
        for _ in 0..num_keys {
            keys.push(page.read_u64(offset));
            offset += 8;
        }
        let mut children = Vec::with_capacity(num_children);
        for _ in 0..num_children {
            children.push(BlockId::new(page.read_u32(offset)));
            offset += 4;
        }

        let flags = page.read_u8(layout::FLAGS);
        Ok(Self {
            block_number: block_id,
            is_leaf,
            parent: BlockId::from_raw(page.read_u32(layout::PARENT)),
            key: ((flags & FLAG_HAS_KEY) != 0).then(|| page.read_u64(layout::KEY)),
            value: page.read_u64(layout::VALUE),
            keys,
            children,
        })
    }
}
