//! Index structures.
//!
//! - [`btree`] - the block-based B-tree
//! - [`hash_key`] / [`hash_str`] - mapping path-like strings to integer keys

pub mod btree;
mod hash;

pub use btree::{BTree, SharedBTree, TreeStats};
pub use hash::{hash_key, hash_str, HASH_SEED};
