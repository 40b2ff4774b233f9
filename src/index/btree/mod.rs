//! Disk-resident B-tree.
//!
//! - [`Node`] - decoded node and its block encoding
//! - [`BTree`] - the engine: search, insert with splits, delete, merge
//! - [`TreeStats`] - result of [`BTree::validate`]
//! - [`SharedBTree`] - mutex-guarded handle for multi-threaded callers

mod node;
mod shared;
mod tree;
mod verify;

pub use node::Node;
pub use shared::SharedBTree;
pub use tree::BTree;
pub use verify::TreeStats;
