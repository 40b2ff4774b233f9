//! Block Store - addressable fixed-size blocks backed by a file.
//!
//! The [`BlockStore`] is the context object the B-tree engine works
//! against. It owns:
//! - the [`DiskManager`] for the backing file
//! - an in-memory image of every block touched so far
//! - the [`FreeBitmap`] deciding which block ids are in use
//! - the superblock fields (root block id, fanout)
//!
//! Mutations through [`BlockStore::block_mut`] are visible to every later
//! read immediately. [`BlockStore::flush`] writes the superblock and all
//! dirty blocks back and syncs the file.

use std::collections::HashSet;
use std::path::Path;

use tracing::{debug, trace, warn};

use crate::common::config::{MAX_BLOCKS, SUPERBLOCK_HEADER_SIZE};
use crate::common::{BlockId, Error, Result};
use crate::storage::bitmap::FreeBitmap;
use crate::storage::page::{Page, PageHeader, PageType};
use crate::storage::{DiskManager, StoreStats};

/// Magic bytes identifying a blocktree file.
pub const MAGIC: [u8; 8] = *b"BLKTREE1";

/// On-disk format version.
pub const FORMAT_VERSION: u16 = 1;

/// Superblock layout (block 0).
///
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       5     PageHeader (type = Meta, CRC32)
/// 5       8     magic "BLKTREE1"
/// 13      2     format version
/// 15      4     max_blocks (bitmap capacity)
/// 19      4     root block id (u32::MAX = none)
/// 23      2     max_keys (tree fanout, 0 = unset)
/// 25      7     reserved
/// 32      ..    bitmap words (u64, little-endian)
/// ```
mod layout {
    pub const MAGIC: usize = 5;
    pub const VERSION: usize = 13;
    pub const MAX_BLOCKS: usize = 15;
    pub const ROOT: usize = 19;
    pub const MAX_KEYS: usize = 23;
}

/// Fixed-size block storage with bitmap allocation.
///
/// # Memory
/// Loaded blocks are never evicted: every block touched stays cached until
/// the store is dropped. The cache is bounded by the block capacity, at most
/// `MAX_BLOCKS` x `BLOCK_SIZE` (32512 x 4 KiB, about 127 MiB).
///
/// # Thread Safety
/// `BlockStore` is **single-writer**: every access takes `&mut self`.
/// Wrap the owning tree in [`SharedBTree`](crate::index::btree::SharedBTree)
/// for use across threads.
pub struct BlockStore {
    disk: DiskManager,
    /// Block images indexed by block id. `None` = not loaded yet.
    cache: Vec<Option<Box<Page>>>,
    /// Blocks modified since the last flush.
    dirty: HashSet<BlockId>,
    bitmap: FreeBitmap,
    root: Option<BlockId>,
    max_keys: u16,
    superblock_dirty: bool,
    stats: StoreStats,
}

impl BlockStore {
    /// Create a new store file with room for `max_blocks` blocks.
    ///
    /// Block 0 is written immediately as the superblock.
    ///
    /// # Errors
    /// Fails if the file already exists or `max_blocks` is out of range.
    pub fn create<P: AsRef<Path>>(path: P, max_blocks: u32) -> Result<Self> {
        if !(2..=MAX_BLOCKS).contains(&max_blocks) {
            return Err(Error::InvalidConfig(format!(
                "max_blocks must be in 2..={MAX_BLOCKS}, got {max_blocks}"
            )));
        }

        let mut disk = DiskManager::create(&path)?;
        let superblock = disk.extend()?;
        debug_assert_eq!(superblock, BlockId::SUPERBLOCK);

        let mut bitmap = FreeBitmap::new(max_blocks);
        bitmap.set(BlockId::SUPERBLOCK.0, true);

        let mut store = Self {
            disk,
            cache: Vec::new(),
            dirty: HashSet::new(),
            bitmap,
            root: None,
            max_keys: 0,
            superblock_dirty: true,
            stats: StoreStats::default(),
        };
        store.flush()?;

        debug!(path = %path.as_ref().display(), max_blocks, "created block store");
        Ok(store)
    }

    /// Open an existing store file.
    ///
    /// # Errors
    /// Fails on I/O errors, a corrupt superblock, or a checksum mismatch.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut disk = DiskManager::open(&path)?;
        if disk.block_count() == 0 {
            return Err(Error::InvalidSuperblock("file is empty".into()));
        }

        let page = disk.read_block(BlockId::SUPERBLOCK)?;
        if page.page_type() != PageType::Meta {
            return Err(Error::InvalidSuperblock(format!(
                "block 0 has type {:?}",
                page.page_type()
            )));
        }
        if !page.verify_checksum() {
            return Err(Error::ChecksumMismatch(BlockId::SUPERBLOCK.0));
        }
        if page.as_slice()[layout::MAGIC..layout::MAGIC + 8] != MAGIC {
            return Err(Error::InvalidSuperblock("bad magic".into()));
        }
        let version = page.read_u16(layout::VERSION);
        if version != FORMAT_VERSION {
            return Err(Error::InvalidSuperblock(format!(
                "unsupported format version {version}"
            )));
        }
        let max_blocks = page.read_u32(layout::MAX_BLOCKS);
        if !(2..=MAX_BLOCKS).contains(&max_blocks) {
            return Err(Error::InvalidSuperblock(format!(
                "max_blocks {max_blocks} out of range"
            )));
        }

        let bitmap = FreeBitmap::read_from(&page, SUPERBLOCK_HEADER_SIZE, max_blocks);
        let root = BlockId::from_raw(page.read_u32(layout::ROOT));
        let max_keys = page.read_u16(layout::MAX_KEYS);

        debug!(
            path = %path.as_ref().display(),
            blocks = disk.block_count(),
            allocated = bitmap.count_allocated(),
            "opened block store"
        );

        Ok(Self {
            disk,
            cache: Vec::new(),
            dirty: HashSet::new(),
            bitmap,
            root,
            max_keys,
            superblock_dirty: false,
            stats: StoreStats::default(),
        })
    }

    /// Open `path` if it exists, otherwise create it with `max_blocks`.
    pub fn open_or_create<P: AsRef<Path>>(path: P, max_blocks: u32) -> Result<Self> {
        if path.as_ref().exists() {
            Self::open(path)
        } else {
            Self::create(path, max_blocks)
        }
    }

    // ========================================================================
    // Block access
    // ========================================================================

    /// Read-only view of an allocated block.
    ///
    /// # Errors
    /// - `Error::BlockNotAllocated` for free ids and the superblock
    /// - `Error::ChecksumMismatch` if the block fails verification on load
    pub fn block(&mut self, block_id: BlockId) -> Result<&Page> {
        let page = self.load(block_id)?;
        Ok(page)
    }

    /// Mutable view of an allocated block. The block is marked dirty.
    pub fn block_mut(&mut self, block_id: BlockId) -> Result<&mut Page> {
        self.load(block_id)?;
        self.dirty.insert(block_id);
        self.cached_mut(block_id)
    }

    /// Whether `block_id` is currently allocated.
    #[inline]
    pub fn is_allocated(&self, block_id: BlockId) -> bool {
        self.bitmap.get(block_id.0)
    }

    // ========================================================================
    // Allocation
    // ========================================================================

    /// Allocate the lowest free block id and zero its contents.
    ///
    /// # Errors
    /// `Error::OutOfBlocks` when every bit in the bitmap is set.
    pub fn allocate(&mut self) -> Result<BlockId> {
        let index = self.bitmap.first_clear().ok_or(Error::OutOfBlocks {
            capacity: self.bitmap.capacity(),
        })?;
        let block_id = BlockId::new(index);

        while self.disk.block_count() <= index {
            self.disk.extend()?;
        }

        self.bitmap.set(index, true);
        self.superblock_dirty = true;

        let slot = block_id.index();
        if self.cache.len() <= slot {
            self.cache.resize_with(slot + 1, || None);
        }
        self.cache[slot] = Some(Box::new(Page::new()));
        self.dirty.insert(block_id);

        self.stats.allocations += 1;
        trace!(block = block_id.0, "allocated block");
        Ok(block_id)
    }

    /// Return a block id to the bitmap. Contents are left as they are.
    ///
    /// # Errors
    /// `Error::BlockNotAllocated` if the id is free or the superblock.
    pub fn release(&mut self, block_id: BlockId) -> Result<()> {
        self.check_allocated(block_id)?;

        self.bitmap.set(block_id.0, false);
        self.superblock_dirty = true;

        self.stats.releases += 1;
        trace!(block = block_id.0, "released block");
        Ok(())
    }

    // ========================================================================
    // Superblock fields
    // ========================================================================

    /// Root block recorded in the superblock.
    #[inline]
    pub fn root(&self) -> Option<BlockId> {
        self.root
    }

    pub fn set_root(&mut self, root: Option<BlockId>) {
        self.root = root;
        self.superblock_dirty = true;
    }

    /// Fanout recorded in the superblock (0 = never set).
    #[inline]
    pub fn max_keys(&self) -> u16 {
        self.max_keys
    }

    pub fn set_max_keys(&mut self, max_keys: u16) {
        self.max_keys = max_keys;
        self.superblock_dirty = true;
    }

    /// Block capacity of the bitmap.
    #[inline]
    pub fn capacity(&self) -> u32 {
        self.bitmap.capacity()
    }

    /// Number of allocated blocks, superblock included.
    #[inline]
    pub fn allocated_count(&self) -> u32 {
        self.bitmap.count_allocated()
    }

    /// Current statistics.
    #[inline]
    pub fn stats(&self) -> StoreStats {
        self.stats
    }

    // ========================================================================
    // Persistence
    // ========================================================================

    /// Write the superblock and every dirty block, then sync the file.
    pub fn flush(&mut self) -> Result<()> {
        let mut pending: Vec<BlockId> = self.dirty.iter().copied().collect();
        pending.sort_unstable();

        // A block leaves the dirty set only once it is on disk, so a failed
        // write is retried by the next flush (or by drop).
        for &block_id in &pending {
            if let Some(Some(page)) = self.cache.get_mut(block_id.index()) {
                page.update_checksum();
                self.disk.write_block(block_id, page)?;
                self.stats.blocks_written += 1;
            }
            self.dirty.remove(&block_id);
        }

        // Superblock last: it must never mark blocks allocated that are not
        // written yet.
        if self.superblock_dirty {
            let page = self.encode_superblock();
            self.disk.write_block(BlockId::SUPERBLOCK, &page)?;
            self.superblock_dirty = false;
        }

        self.disk.sync()?;
        debug!(blocks = pending.len(), "flushed block store");
        Ok(())
    }

    fn encode_superblock(&self) -> Page {
        let mut page = Page::new();
        PageHeader::new(PageType::Meta).write_to(page.as_mut_slice());
        page.as_mut_slice()[layout::MAGIC..layout::MAGIC + 8].copy_from_slice(&MAGIC);
        page.write_u16(layout::VERSION, FORMAT_VERSION);
        page.write_u32(layout::MAX_BLOCKS, self.bitmap.capacity());
        page.write_u32(layout::ROOT, BlockId::to_raw(self.root));
        page.write_u16(layout::MAX_KEYS, self.max_keys);
        self.bitmap.write_to(&mut page, SUPERBLOCK_HEADER_SIZE);
        page.update_checksum();
        page
    }

    // ========================================================================
    // Internal
    // ========================================================================

    fn check_allocated(&self, block_id: BlockId) -> Result<()> {
        if block_id == BlockId::SUPERBLOCK || !self.bitmap.get(block_id.0) {
            return Err(Error::BlockNotAllocated(block_id.0));
        }
        Ok(())
    }

    /// Make sure the block image is in memory, reading it from disk if needed.
    fn load(&mut self, block_id: BlockId) -> Result<&mut Page> {
        self.check_allocated(block_id)?;

        let slot = block_id.index();
        if self.cache.len() <= slot {
            self.cache.resize_with(slot + 1, || None);
        }

        if self.cache[slot].is_some() {
            self.stats.cache_hits += 1;
        } else {
            let page = self.disk.read_block(block_id)?;
            if !page.verify_checksum() {
                return Err(Error::ChecksumMismatch(block_id.0));
            }
            self.stats.cache_misses += 1;
            self.cache[slot] = Some(Box::new(page));
        }

        self.cached_mut(block_id)
    }

    fn cached_mut(&mut self, block_id: BlockId) -> Result<&mut Page> {
        self.cache
            .get_mut(block_id.index())
            .and_then(|slot| slot.as_deref_mut())
            .ok_or(Error::BlockNotFound(block_id.0))
    }
}

impl Drop for BlockStore {
    fn drop(&mut self) {
        if self.dirty.is_empty() && !self.superblock_dirty {
            return;
        }
        if let Err(e) = self.flush() {
            warn!(error = %e, "failed to flush block store on drop");
        }
    }
}
