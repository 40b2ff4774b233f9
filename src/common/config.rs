//! Configuration constants and runtime tree configuration.

use super::error::{Error, Result};

/// Size of a block in bytes (4KB).
///
/// Every B-tree node occupies exactly one block, and block N lives at file
/// offset `N × BLOCK_SIZE`.
pub const BLOCK_SIZE: usize = 4096;

/// Bytes at the start of the superblock reserved for file metadata.
/// The free-space bitmap fills the rest of block 0.
pub const SUPERBLOCK_HEADER_SIZE: usize = 32;

/// Maximum number of blocks the superblock bitmap can track.
pub const MAX_BLOCKS: u32 = ((BLOCK_SIZE - SUPERBLOCK_HEADER_SIZE) * 8) as u32;

/// Default fanout bound (routing keys per internal node).
pub const DEFAULT_MAX_KEYS: usize = 2;

/// Largest fanout whose node image still fits in one block.
pub const MAX_SUPPORTED_KEYS: usize = 256;

/// Environment variable overriding the fanout.
pub const ENV_MAX_KEYS: &str = "BLOCKTREE_MAX_KEYS";

/// Environment variable overriding the block capacity.
pub const ENV_MAX_BLOCKS: &str = "BLOCKTREE_MAX_BLOCKS";

/// Runtime parameters of a tree.
///
/// # Invariants
/// - `2 <= max_keys <= MAX_SUPPORTED_KEYS`
/// - `2 <= max_blocks <= MAX_BLOCKS` (the superblock plus at least a root)
///
/// `max_keys` is persisted in the superblock when a tree is created; opening
/// an existing file always uses the stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeConfig {
    max_keys: usize,
    max_blocks: u32,
}

impl TreeConfig {
    /// Create a config with the given fanout and the full block capacity.
    pub fn new(max_keys: usize) -> Result<Self> {
        let config = Self {
            max_keys,
            max_blocks: MAX_BLOCKS,
        };
        config.validate()?;
        Ok(config)
    }

    /// Restrict the number of blocks the store may hand out.
    pub fn with_max_blocks(self, max_blocks: u32) -> Result<Self> {
        let config = Self { max_blocks, ..self };
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from `BLOCKTREE_MAX_KEYS` / `BLOCKTREE_MAX_BLOCKS`,
    /// falling back to the defaults for unset variables.
    pub fn from_env() -> Result<Self> {
        let max_keys = match std::env::var(ENV_MAX_KEYS) {
            Ok(raw) => raw.trim().parse::<usize>().map_err(|e| {
                Error::InvalidConfig(format!("{ENV_MAX_KEYS}={raw:?}: {e}"))
            })?,
            Err(_) => DEFAULT_MAX_KEYS,
        };
        let max_blocks = match std::env::var(ENV_MAX_BLOCKS) {
            Ok(raw) => raw.trim().parse::<u32>().map_err(|e| {
                Error::InvalidConfig(format!("{ENV_MAX_BLOCKS}={raw:?}: {e}"))
            })?,
            Err(_) => MAX_BLOCKS,
        };
        Self::new(max_keys)?.with_max_blocks(max_blocks)
    }

    /// Maximum routing keys per internal node.
    #[inline]
    pub fn max_keys(&self) -> usize {
        self.max_keys
    }

    /// Split partition size, `MAX_KEYS / 2`.
    #[inline]
    pub fn min_keys(&self) -> usize {
        self.max_keys / 2
    }

    /// Number of blocks (superblock included) the store may use.
    #[inline]
    pub fn max_blocks(&self) -> u32 {
        self.max_blocks
    }

    fn validate(&self) -> Result<()> {
        if !(2..=MAX_SUPPORTED_KEYS).contains(&self.max_keys) {
            return Err(Error::InvalidConfig(format!(
                "max_keys must be in 2..={MAX_SUPPORTED_KEYS}, got {}",
                self.max_keys
            )));
        }
        if !(2..=MAX_BLOCKS).contains(&self.max_blocks) {
            return Err(Error::InvalidConfig(format!(
                "max_blocks must be in 2..={MAX_BLOCKS}, got {}",
                self.max_blocks
            )));
        }
        Ok(())
    }
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_keys: DEFAULT_MAX_KEYS,
            max_blocks: MAX_BLOCKS,
        }
    }
}
