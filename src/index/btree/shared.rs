//! Thread-safe handle around a [`BTree`].

use std::sync::Arc;

use parking_lot::{Mutex, MutexGuard};

use super::BTree;
use crate::common::{BlockId, Key, Result};

/// A cloneable, thread-safe tree handle.
///
/// Every operation takes one lock for its whole duration, so operations
/// from different threads are serialized. Reads need the lock too: even a
/// search may pull blocks into the cache.
#[derive(Clone)]
pub struct SharedBTree {
    inner: Arc<Mutex<BTree>>,
}

impl SharedBTree {
    pub fn new(tree: BTree) -> Self {
        Self {
            inner: Arc::new(Mutex::new(tree)),
        }
    }

    pub fn insert(&self, key: Key) -> Result<BlockId> {
        self.inner.lock().insert(key)
    }

    pub fn insert_value(&self, key: Key, value: u64) -> Result<BlockId> {
        self.inner.lock().insert_value(key, value)
    }

    pub fn search(&self, key: Key) -> Result<Option<BlockId>> {
        self.inner.lock().search(key)
    }

    pub fn get(&self, key: Key) -> Result<Option<u64>> {
        self.inner.lock().get(key)
    }

    pub fn delete(&self, key: Key) -> Result<bool> {
        self.inner.lock().delete(key)
    }

    pub fn flush(&self) -> Result<()> {
        self.inner.lock().flush()
    }

    /// Run `f` with exclusive access to the tree.
    pub fn with<R>(&self, f: impl FnOnce(&mut BTree) -> R) -> R {
        f(&mut self.inner.lock())
    }

    /// Lock the tree directly. Holding the guard blocks every other handle.
    pub fn lock(&self) -> MutexGuard<'_, BTree> {
        self.inner.lock()
    }
}
