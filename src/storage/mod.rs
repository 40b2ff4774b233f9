//! Storage layer - disk I/O, block allocation and block formats.
//!
//! This module handles persistent storage:
//! - [`DiskManager`] - Low-level file I/O
//! - [`BlockStore`] - Addressable blocks with bitmap allocation
//! - [`bitmap`] - Free-space bitmap
//! - [`page`] - Block image types and layouts

pub mod bitmap;
mod block_store;
mod disk_manager;
pub mod page;
mod stats;

pub use bitmap::FreeBitmap;
pub use block_store::{BlockStore, FORMAT_VERSION, MAGIC};
pub use disk_manager::DiskManager;
pub use stats::StoreStats;
