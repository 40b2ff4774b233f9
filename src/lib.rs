//! blocktree - a disk-resident B-tree that lives in fixed-size blocks.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                        blocktree-cli                        │
//! │             line-oriented commands over one file            │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                    Index Layer (index/)                     │
//! │   BTree: search / insert / delete / split / merge / verify  │
//! │   SharedBTree: Arc<Mutex<BTree>>    hash_key: str -> u64    │
//! └─────────────────────────────────────────────────────────────┘
//!                               ↓
//! ┌─────────────────────────────────────────────────────────────┐
//! │                   Storage Layer (storage/)                  │
//! │   BlockStore: superblock + free bitmap + lazy block cache   │
//! │   DiskManager: 4 KiB block I/O     Page: block image + CRC  │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//! - [`common`] - Shared primitives (BlockId, Key, Error, config)
//! - [`storage`] - Disk I/O, allocation and block formats
//! - [`index`] - The B-tree and key hashing
//!
//! # Quick Start
//! ```no_run
//! use blocktree::{hash_str, BTree, TreeConfig};
//!
//! let mut tree = BTree::create("paths.idx", TreeConfig::default()).unwrap();
//! tree.insert(hash_str("/etc/hosts")).unwrap();
//! assert!(tree.search(hash_str("/etc/hosts")).unwrap().is_some());
//! tree.flush().unwrap();
//! ```

pub mod common;
pub mod index;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::BLOCK_SIZE;
pub use common::{BlockId, Error, Key, Result, TreeConfig};

pub use index::btree::Node;
pub use index::{hash_key, hash_str, BTree, SharedBTree, TreeStats};
pub use storage::page::{Page, PageHeader, PageType};
pub use storage::{BlockStore, StoreStats};
