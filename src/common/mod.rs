//! Common types and utilities shared across blocktree.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration constants and [`TreeConfig`]
//! - Error types
//! - Identifiers ([`BlockId`]) and the [`Key`] type

pub mod config;
pub mod error;
mod block_id;

pub use block_id::BlockId;
pub use config::TreeConfig;
pub use error::{Error, Result};

/// Integer key indexed by the tree (usually a string hash).
pub type Key = u64;
