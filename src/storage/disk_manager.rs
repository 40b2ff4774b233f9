//! Disk Manager - low-level file I/O for fixed-size blocks.
//!
//! The [`DiskManager`] handles all direct file operations:
//! - Reading and writing whole blocks
//! - Extending the file by one zeroed block
//! - Syncing the file

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::common::config::BLOCK_SIZE;
use crate::common::{BlockId, Error, Result};
use crate::storage::page::Page;

/// Manages disk I/O for a single index file.
///
/// # File Layout
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┬─────────┐
/// │ Block 0 │ Block 1 │ Block 2 │  ...    │ Block N │
/// │ (super) │ (4KB)   │ (4KB)   │         │ (4KB)   │
/// └─────────┴─────────┴─────────┴─────────┴─────────┘
/// Offset:  0      4096     8192    ...    N×4096
/// ```
///
/// Block N is located at file offset `N × BLOCK_SIZE`. The disk manager
/// knows nothing about which blocks are in use; that is the job of the
/// free-space bitmap in the block store.
///
/// Writes are not synced individually. Call [`DiskManager::sync`] once a
/// batch of writes is complete.
pub struct DiskManager {
    file: File,
    /// Number of blocks in the file.
    block_count: u32,
}

impl DiskManager {
    /// Create a new index file.
    ///
    /// # Errors
    /// Returns an error if the file already exists or cannot be created.
    pub fn create<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create_new(true)
            .open(path)?;

        Ok(Self {
            file,
            block_count: 0,
        })
    }

    /// Open an existing index file.
    ///
    /// # Errors
    /// Returns an error if the file doesn't exist or cannot be opened.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let file_size = file.metadata()?.len();
        let block_count = (file_size / BLOCK_SIZE as u64) as u32;

        Ok(Self { file, block_count })
    }

    /// Open an existing file without write access. Every write fails.
    #[cfg(test)]
    pub(crate) fn open_read_only<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = OpenOptions::new().read(true).open(&path)?;
        let block_count = (file.metadata()?.len() / BLOCK_SIZE as u64) as u32;
        Ok(Self { file, block_count })
    }

    /// Read a block from disk.
    ///
    /// # Errors
    /// Returns `Error::BlockNotFound` if the block lies past the end of file.
    pub fn read_block(&mut self, block_id: BlockId) -> Result<Page> {
        self.check_in_file(block_id)?;

        self.file.seek(SeekFrom::Start(Self::offset(block_id)))?;
        let mut page = Page::new();
        self.file.read_exact(page.as_mut_slice())?;

        Ok(page)
    }

    /// Write a block to disk.
    ///
    /// # Errors
    /// Returns `Error::BlockNotFound` if the file has not been extended to
    /// cover the block yet.
    pub fn write_block(&mut self, block_id: BlockId, page: &Page) -> Result<()> {
        self.check_in_file(block_id)?;

        self.file.seek(SeekFrom::Start(Self::offset(block_id)))?;
        self.file.write_all(page.as_slice())?;

        Ok(())
    }

    /// Append one zeroed block to the file and return its id.
    pub fn extend(&mut self) -> Result<BlockId> {
        let block_id = BlockId::new(self.block_count);

        self.file.seek(SeekFrom::Start(Self::offset(block_id)))?;
        self.file.write_all(&[0u8; BLOCK_SIZE])?;

        self.block_count += 1;
        Ok(block_id)
    }

    /// Flush file contents and metadata to stable storage.
    pub fn sync(&mut self) -> Result<()> {
        self.file.sync_all()?;
        Ok(())
    }

    /// Get the number of blocks in the file.
    #[inline]
    pub fn block_count(&self) -> u32 {
        self.block_count
    }

    /// Get the total size of the file in bytes.
    #[inline]
    pub fn file_size(&self) -> u64 {
        (self.block_count as u64) * (BLOCK_SIZE as u64)
    }

    #[inline]
    fn offset(block_id: BlockId) -> u64 {
        (block_id.0 as u64) * (BLOCK_SIZE as u64)
    }

    fn check_in_file(&self, block_id: BlockId) -> Result<()> {
        if block_id.0 >= self.block_count {
            return Err(Error::BlockNotFound(block_id.0));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_new_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.idx");

        let dm = DiskManager::create(&path).unwrap();
        assert_eq!(dm.block_count(), 0);
        assert_eq!(dm.file_size(), 0);
    }

    #[test]
    fn test_create_existing_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.idx");

        DiskManager::create(&path).unwrap();
        assert!(DiskManager::create(&path).is_err());
    }

    #[test]
    fn test_open_nonexistent_fails() {
        let dir = tempdir().unwrap();
        assert!(DiskManager::open(dir.path().join("missing.idx")).is_err());
    }

    #[test]
    fn test_extend_and_read_block() {
        let dir = tempdir().unwrap();
        let mut dm = DiskManager::create(dir.path().join("test.idx")).unwrap();

        let block_id = dm.extend().unwrap();
        assert_eq!(block_id, BlockId::new(0));
        assert_eq!(dm.block_count(), 1);

        let page = dm.read_block(block_id).unwrap();
        assert!(page.as_slice().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_write_and_persist() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.idx");

        {
            let mut dm = DiskManager::create(&path).unwrap();
            for i in 0..4u32 {
                let block_id = dm.extend().unwrap();
                assert_eq!(block_id.0, i);

                let mut page = Page::new();
                page.write_u32(8, i * 11);
                dm.write_block(block_id, &page).unwrap();
            }
            dm.sync().unwrap();
        }

        let mut dm = DiskManager::open(&path).unwrap();
        assert_eq!(dm.block_count(), 4);
        assert_eq!(dm.file_size(), 4 * BLOCK_SIZE as u64);
        for i in 0..4u32 {
            assert_eq!(dm.read_block(BlockId::new(i)).unwrap().read_u32(8), i * 11);
        }
    }

    #[test]
    fn test_out_of_file_access() {
        let dir = tempdir().unwrap();
        let mut dm = DiskManager::create(dir.path().join("test.idx")).unwrap();
        dm.extend().unwrap();

        assert!(matches!(
            dm.read_block(BlockId::new(1)),
            Err(Error::BlockNotFound(1))
        ));
        assert!(matches!(
            dm.write_block(BlockId::new(3), &Page::new()),
            Err(Error::BlockNotFound(3))
        ));
    }
}
