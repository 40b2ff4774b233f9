//! Block header: what a block holds and whether its bytes are intact.

/// Kind of content stored in a block. Encoded as the block's first byte.
#[repr(u8)]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub enum PageType {
    /// Never written (freshly extended, all zeros).
    #[default]
    Invalid = 0,
    /// Superblock: file metadata and the free-space bitmap.
    Meta = 1,
    BTreeInternal = 2,
    BTreeLeaf = 3,
}

impl From<u8> for PageType {
    /// Unknown tags decode as `Invalid`.
    fn from(tag: u8) -> Self {
        match tag {
            1 => Self::Meta,
            2 => Self::BTreeInternal,
            3 => Self::BTreeLeaf,
            _ => Self::Invalid,
        }
    }
}

impl PageType {
    /// Whether the block carries a B-tree node.
    #[inline]
    pub fn is_node(self) -> bool {
        matches!(self, Self::BTreeInternal | Self::BTreeLeaf)
    }
}

/// Leading bytes of every block.
///
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       1     page type tag
/// 1       4     CRC32 of the block, little-endian
/// ```
///
/// The CRC covers all `BLOCK_SIZE` bytes with the checksum field read as
/// zeros. `Invalid` blocks are exempt.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct PageHeader {
    pub page_type: PageType,
    pub checksum: u32,
}

impl PageHeader {
    pub const SIZE: usize = 5;
    pub const OFFSET_PAGE_TYPE: usize = 0;
    pub const OFFSET_CHECKSUM: usize = 1;

    const CHECKSUM_RANGE: std::ops::Range<usize> = Self::OFFSET_CHECKSUM..Self::SIZE;

    pub fn new(page_type: PageType) -> Self {
        Self {
            page_type,
            checksum: 0,
        }
    }

    /// Decode the header at the start of `data`.
    ///
    /// # Panics
    /// If `data` is shorter than [`PageHeader::SIZE`].
    pub fn from_bytes(data: &[u8]) -> Self {
        let mut crc = [0u8; 4];
        crc.copy_from_slice(&data[Self::CHECKSUM_RANGE]);
        Self {
            page_type: PageType::from(data[Self::OFFSET_PAGE_TYPE]),
            checksum: u32::from_le_bytes(crc),
        }
    }

    /// Encode the header into the start of `data`.
    ///
    /// # Panics
    /// If `data` is shorter than [`PageHeader::SIZE`].
    pub fn write_to(&self, data: &mut [u8]) {
        data[Self::OFFSET_PAGE_TYPE] = self.page_type as u8;
        data[Self::CHECKSUM_RANGE].copy_from_slice(&self.checksum.to_le_bytes());
    }

    /// CRC32 of a whole block, skipping over the stored checksum.
    pub fn compute_checksum(block: &[u8]) -> u32 {
        let (head, rest) = block.split_at(Self::OFFSET_CHECKSUM);
        let tail = &rest[4..];

        let mut hasher = crc32fast::Hasher::new();
        hasher.update(head);
        hasher.update(&0u32.to_le_bytes());
        hasher.update(tail);
        hasher.finalize()
    }

    /// Whether `block` matches the stored checksum.
    pub fn verify_checksum(&self, block: &[u8]) -> bool {
        match self.page_type {
            PageType::Invalid => true,
            _ => self.checksum == Self::compute_checksum(block),
        }
    }
}
