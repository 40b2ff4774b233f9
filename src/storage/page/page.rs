//! Page - the in-memory image of one block.
//!
//! A [`Page`] is a raw 4KB byte array. The block store keeps one per loaded
//! block; B-tree nodes are encoded into and decoded from it.

use crate::common::config::BLOCK_SIZE;

use super::page_header::{PageHeader, PageType};

/// A block's worth of data (4KB, 4KB-aligned).
///
/// `Page` does NOT implement `Clone` in production code (copying 4KB should
/// be explicit). A `#[cfg(test)]` Clone is provided for tests.
///
/// # Example
/// ```
/// use blocktree::storage::page::Page;
///
/// let mut page = Page::new();
/// page.write_u64(16, 0xDEAD_BEEF);
/// assert_eq!(page.read_u64(16), 0xDEAD_BEEF);
/// ```
#[repr(align(4096))]
pub struct Page {
    data: [u8; BLOCK_SIZE],
}

impl Page {
    /// Create a new zeroed page.
    #[inline]
    pub fn new() -> Self {
        Self {
            data: [0u8; BLOCK_SIZE],
        }
    }

    #[inline]
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    #[inline]
    pub fn as_mut_slice(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Zero out the entire page.
    pub fn reset(&mut self) {
        self.data.fill(0);
    }

    /// Read the page header.
    pub fn header(&self) -> PageHeader {
        PageHeader::from_bytes(&self.data)
    }

    /// Type tag of the block.
    #[inline]
    pub fn page_type(&self) -> PageType {
        PageType::from(self.data[PageHeader::OFFSET_PAGE_TYPE])
    }

    /// Set the type tag, leaving the checksum untouched.
    #[inline]
    pub fn set_page_type(&mut self, page_type: PageType) {
        self.data[PageHeader::OFFSET_PAGE_TYPE] = page_type as u8;
    }

    /// Seal the block: store the CRC of its current contents.
    ///
    /// Called by the block store right before the page goes to disk.
    pub fn update_checksum(&mut self) {
        let mut header = self.header();
        header.checksum = PageHeader::compute_checksum(&self.data);
        header.write_to(&mut self.data);
    }

    /// Whether the stored CRC matches the contents.
    pub fn verify_checksum(&self) -> bool {
        self.header().verify_checksum(&self.data)
    }

    // ========================================================================
    // Little-endian field access
    // ========================================================================

    #[inline]
    pub fn read_u8(&self, offset: usize) -> u8 {
        self.data[offset]
    }

    #[inline]
    pub fn write_u8(&mut self, offset: usize, value: u8) {
        self.data[offset] = value;
    }

    #[inline]
    pub fn read_u16(&self, offset: usize) -> u16 {
        let mut buf = [0u8; 2];
        buf.copy_from_slice(&self.data[offset..offset + 2]);
        u16::from_le_bytes(buf)
    }

    #[inline]
    pub fn write_u16(&mut self, offset: usize, value: u16) {
        self.data[offset..offset + 2].copy_from_slice(&value.to_le_bytes());
    }

    #[inline]
    pub fn read_u32(&self, offset: usize) -> u32 {
        let mut buf = [0u8; 4];
        buf.copy_from_slice(&self.data[offset..offset + 4]);
        u32::from_le_bytes(buf)
    }

    #[inline]
    pub fn write_u32(&mut self, offset: usize, value: u32) {
        self.data[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }

    #[inline]
    pub fn read_u64(&self, offset: usize) -> u64 {
        let mut buf = [0u8; 8];
        buf.copy_from_slice(&self.data[offset..offset + 8]);
        u64::from_le_bytes(buf)
    }

    #[inline]
    pub fn write_u64(&mut self, offset: usize, value: u64) {
        self.data[offset..offset + 8].copy_from_slice(&value.to_le_bytes());
    }
}

impl Default for Page {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
impl Clone for Page {
    fn clone(&self) -> Self {
        let mut new_page = Page::new();
        new_page.data.copy_from_slice(&self.data);
        new_page
    }
}
