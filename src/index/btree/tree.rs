//! B-tree engine over a [`BlockStore`].
//!
//! Every node lives in its own block and is addressed by block id only.
//! Upward navigation (routing-key refresh, cascading splits, depth) follows
//! the `parent` field stored in each node; downward navigation follows
//! `children`.
//!
//! # Shape
//! ```text
//!                  [root: keys=[20] children=[A, B]]
//!                   /                            \
//!     [A: keys=[10] children=[l10, l20]]   [B: keys=[] children=[l30]]
//!          /          \                           |
//!      (leaf 10)   (leaf 20)                  (leaf 30)
//! ```
//! `keys[i]` is the maximum key under `children[i]`; the last child has no
//! routing key. Leaves carry exactly one key and sit at the same depth.

use std::path::Path;

use tracing::{debug, trace, warn};

use crate::common::{BlockId, Error, Key, Result, TreeConfig};
use crate::index::btree::Node;
use crate::storage::{BlockStore, StoreStats};

/// A disk-resident B-tree mapping integer keys to leaf blocks.
///
/// The root block id is fixed at creation: root splits rewrite the root
/// block in place, so the id recorded in the superblock never changes.
pub struct BTree {
    store: BlockStore,
    root: BlockId,
    config: TreeConfig,
}

impl BTree {
    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Create a new index file holding an empty tree.
    pub fn create<P: AsRef<Path>>(path: P, config: TreeConfig) -> Result<Self> {
        let mut store = BlockStore::create(path, config.max_blocks())?;
        store.set_max_keys(config.max_keys() as u16);

        let root = store.allocate()?;
        Node::empty(root, true).write_to(store.block_mut(root)?);
        store.set_root(Some(root));
        store.flush()?;

        debug!(root = root.0, max_keys = config.max_keys(), "created tree");
        Ok(Self {
            store,
            root,
            config,
        })
    }

    /// Open an existing index file. The fanout stored in the file wins.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let store = BlockStore::open(path)?;

        let root = store
            .root()
            .ok_or_else(|| Error::InvalidSuperblock("no root block recorded".into()))?;
        let config =
            TreeConfig::new(store.max_keys() as usize)?.with_max_blocks(store.capacity())?;

        let mut tree = Self {
            store,
            root,
            config,
        };
        if tree.read_node(root)?.parent.is_some() {
            return Err(Error::Corrupted(format!("root {} has a parent", root.0)));
        }

        debug!(root = root.0, max_keys = config.max_keys(), "opened tree");
        Ok(tree)
    }

    /// Open `path` if it exists, otherwise create it with `config`.
    pub fn open_or_create<P: AsRef<Path>>(path: P, config: TreeConfig) -> Result<Self> {
        if !path.as_ref().exists() {
            return Self::create(path, config);
        }

        let tree = Self::open(path)?;
        if tree.config.max_keys() != config.max_keys() {
            warn!(
                requested = config.max_keys(),
                stored = tree.config.max_keys(),
                "ignoring requested fanout; using the one stored in the file"
            );
        }
        Ok(tree)
    }

    /// Persist every modified block.
    pub fn flush(&mut self) -> Result<()> {
        self.store.flush()
    }

    #[inline]
    pub fn root(&self) -> BlockId {
        self.root
    }

    #[inline]
    pub fn config(&self) -> TreeConfig {
        self.config
    }

    #[inline]
    pub fn max_keys(&self) -> usize {
        self.config.max_keys()
    }

    /// Blocks in use by the tree (the superblock is not counted).
    #[inline]
    pub fn allocated_blocks(&self) -> u32 {
        self.store.allocated_count().saturating_sub(1)
    }

    #[inline]
    pub fn store_stats(&self) -> StoreStats {
        self.store.stats()
    }

    // ========================================================================
    // Node access
    // ========================================================================

    /// Allocate a block and initialize an empty node in it.
    pub fn create_node(&mut self, is_leaf: bool) -> Result<Node> {
        let block_id = self.store.allocate()?;
        let node = Node::empty(block_id, is_leaf);
        self.write_node(&node)?;
        Ok(node)
    }

    /// Decode the node stored in `block_id`.
    pub fn read_node(&mut self, block_id: BlockId) -> Result<Node> {
        let page = self.store.block(block_id)?;
        Node::read_from(block_id, page)
    }

    /// Encode `node` back into its block.
    ///
    /// # Errors
    /// `Error::NodeFull` if the node carries more routing keys than the
    /// fanout allows.
    pub fn write_node(&mut self, node: &Node) -> Result<()> {
        if node.num_keys() > self.config.max_keys() {
            return Err(Error::NodeFull(node.block_number.0));
        }
        let page = self.store.block_mut(node.block_number)?;
        node.write_to(page);
        Ok(())
    }

    /// Return a node's block to the allocator. Its contents are not cleared.
    pub fn free_node(&mut self, block_id: BlockId) -> Result<()> {
        trace!(block = block_id.0, "freeing node");
        self.store.release(block_id)
    }

    // ========================================================================
    // Search
    // ========================================================================

    /// Find the leaf holding `key`, starting at the root.
    pub fn search(&mut self, key: Key) -> Result<Option<BlockId>> {
        self.search_from(self.root, key)
    }

    /// Find the leaf holding `key` in the subtree rooted at `block_id`.
    ///
    /// Every child of an internal node is visited in order; the first match
    /// wins. Routing keys are not used to prune the descent.
    ///
    /// # Errors
    /// `Error::Corrupted` if the descent runs deeper than there are blocks,
    /// which only a child pointer cycle can cause.
    pub fn search_from(&mut self, block_id: BlockId, key: Key) -> Result<Option<BlockId>> {
        self.search_below(block_id, key, 0)
    }

    fn search_below(
        &mut self,
        block_id: BlockId,
        key: Key,
        depth: usize,
    ) -> Result<Option<BlockId>> {
        self.check_descent(block_id, depth)?;
        let node = self.read_node(block_id)?;
        if node.is_leaf {
            return Ok((node.key == Some(key)).then_some(block_id));
        }

        for &child in &node.children {
            if let Some(found) = self.search_below(child, key, depth + 1)? {
                return Ok(Some(found));
            }
        }
        Ok(None)
    }

    /// A path from the root can be no longer than the number of allocated
    /// blocks.
    pub(crate) fn check_descent(&self, block_id: BlockId, depth: usize) -> Result<()> {
        let limit = self.store.allocated_count() as usize;
        if depth > limit {
            return Err(Error::Corrupted(format!(
                "descent reached block {} at depth {depth}, beyond {limit} allocated blocks",
                block_id.0
            )));
        }
        Ok(())
    }

    /// Value stored alongside `key`, if present.
    pub fn get(&mut self, key: Key) -> Result<Option<u64>> {
        match self.search(key)? {
            Some(leaf) => Ok(Some(self.read_node(leaf)?.value)),
            None => Ok(None),
        }
    }

    pub fn contains(&mut self, key: Key) -> Result<bool> {
        Ok(self.search(key)?.is_some())
    }

    // ========================================================================
    // Insertion
    // ========================================================================

    /// Insert `key` with a zero value. Returns the new leaf's block id.
    pub fn insert(&mut self, key: Key) -> Result<BlockId> {
        self.insert_value(key, 0)
    }

    /// Insert `key` with `value`. Duplicate keys are stored as separate
    /// leaves. Returns the new leaf's block id.
    pub fn insert_value(&mut self, key: Key, value: u64) -> Result<BlockId> {
        let mut leaf = self.create_node(true)?;
        leaf.key = Some(key);
        leaf.value = value;
        let leaf_id = leaf.block_number;

        if let Err(e) = self.place_leaf(leaf) {
            if let Err(free_err) = self.free_node(leaf_id) {
                warn!(block = leaf_id.0, error = %free_err, "failed to free orphaned leaf");
            }
            return Err(e);
        }

        trace!(key, leaf = leaf_id.0, "inserted");
        Ok(leaf_id)
    }

    fn place_leaf(&mut self, mut leaf: Node) -> Result<()> {
        let key = leaf.key.ok_or(Error::UnexpectedNodeKind(leaf.block_number.0))?;
        let mut root = self.read_node(self.root)?;

        if root.is_empty_leaf() {
            root.is_leaf = false;
            root.children = vec![leaf.block_number];
            leaf.parent = Some(self.root);
            self.write_node(&leaf)?;
            self.write_node(&root)?;
            debug!(key, root = self.root.0, "seeded empty tree");
            return Ok(());
        }
        if root.is_leaf {
            return Err(Error::Corrupted(format!(
                "root {} is a populated leaf",
                self.root.0
            )));
        }

        if root.is_full(self.config.max_keys()) {
            self.split_root()?;
        }

        let target = loop {
            let bottom = self.find_bottom(key)?;
            if !bottom.is_full(self.config.max_keys()) {
                break bottom;
            }
            self.make_room(bottom.block_number)?;
        };

        self.insert_into_bottom(target, leaf, key)
    }

    /// Descend from the root along the routing keys to the internal node
    /// whose children are leaves.
    fn find_bottom(&mut self, key: Key) -> Result<Node> {
        let mut node = self.read_node(self.root)?;
        loop {
            let slot = node.route(key);
            let child_id = *node.children.get(slot).ok_or_else(|| {
                Error::Corrupted(format!(
                    "node {} has no child at slot {slot}",
                    node.block_number.0
                ))
            })?;
            let child = self.read_node(child_id)?;
            trace!(node = node.block_number.0, slot, child = child_id.0, "descend");
            if child.is_leaf {
                return Ok(node);
            }
            node = child;
        }
    }

    /// Put `leaf` into a non-full bottom node at its ordered position.
    fn insert_into_bottom(&mut self, mut target: Node, mut leaf: Node, key: Key) -> Result<()> {
        let mut leaf_keys = Vec::with_capacity(target.children.len() + 1);
        for &child in &target.children {
            let child_node = self.read_node(child)?;
            let child_key = child_node
                .key
                .ok_or(Error::UnexpectedNodeKind(child.0))?;
            leaf_keys.push(child_key);
        }

        // After any equal keys, so duplicates keep insertion order
        let pos = leaf_keys.partition_point(|&k| k <= key);
        leaf_keys.insert(pos, key);
        target.children.insert(pos, leaf.block_number);
        leaf_keys.pop();
        target.keys = leaf_keys;

        leaf.parent = Some(target.block_number);
        self.write_node(&leaf)?;
        self.write_node(&target)?;

        self.update_parent_keys(target.block_number)
    }

    // ========================================================================
    // Splitting
    // ========================================================================

    /// Split the full root into two new children, rewriting the root block
    /// in place with the promoted key. The tree grows one level.
    pub fn split_root(&mut self) -> Result<()> {
        let mut root = self.read_node(self.root)?;
        if root.is_leaf {
            return Err(Error::UnexpectedNodeKind(self.root.0));
        }
        let m = self.config.min_keys();
        if root.num_keys() <= m {
            return Err(Error::NotSplittable(self.root.0));
        }

        let right_keys = root.keys.split_off(m + 1);
        let right_children = root.children.split_off(m + 1);
        let promoted = root
            .keys
            .pop()
            .ok_or(Error::NotSplittable(self.root.0))?;
        let left_keys = std::mem::take(&mut root.keys);
        let left_children = std::mem::take(&mut root.children);

        let mut left = self.create_node(false)?;
        let mut right = match self.create_node(false) {
            Ok(node) => node,
            Err(e) => {
                self.free_node(left.block_number)?;
                return Err(e);
            }
        };

        left.parent = Some(self.root);
        left.keys = left_keys;
        left.children = left_children;
        right.parent = Some(self.root);
        right.keys = right_keys;
        right.children = right_children;

        self.write_node(&left)?;
        self.write_node(&right)?;
        self.reparent(&left.children, left.block_number)?;
        self.reparent(&right.children, right.block_number)?;

        root.keys = vec![promoted];
        root.children = vec![left.block_number, right.block_number];
        self.write_node(&root)?;

        debug!(
            root = self.root.0,
            left = left.block_number.0,
            right = right.block_number.0,
            promoted,
            "split root"
        );
        Ok(())
    }

    /// Split the full non-root `child` found at `node.children[index]`.
    ///
    /// The tail of `child` moves into a new sibling inserted right after it,
    /// and the maximum remaining in `child` is promoted into `node`. If
    /// `node` is itself full, room is made above it first (cascading as far
    /// up as needed) and the split is retried against `child`'s new parent.
    pub fn split_node(&mut self, node_id: BlockId, index: usize, child_id: BlockId) -> Result<()> {
        let mut parent = self.read_node(node_id)?;
        if parent.children.get(index) != Some(&child_id) {
            return Err(Error::ChildNotFound {
                parent: node_id.0,
                child: child_id.0,
            });
        }

        while parent.is_full(self.config.max_keys()) {
            self.make_room(parent.block_number)?;
            let child = self.read_node(child_id)?;
            let parent_id = child.parent.ok_or(Error::MissingParent(child_id.0))?;
            parent = self.read_node(parent_id)?;
        }
        let index = parent.child_index(child_id)?;

        let mut child = self.read_node(child_id)?;
        if child.is_leaf {
            return Err(Error::UnexpectedNodeKind(child_id.0));
        }
        let m = self.config.min_keys();
        if child.num_keys() <= m {
            return Err(Error::NotSplittable(child_id.0));
        }

        let sibling_keys = child.keys.split_off(m + 1);
        let sibling_children = child.children.split_off(m + 1);
        let promoted = child.keys.pop().ok_or(Error::NotSplittable(child_id.0))?;

        let mut sibling = self.create_node(false)?;
        sibling.parent = Some(parent.block_number);
        sibling.keys = sibling_keys;
        sibling.children = sibling_children;

        self.write_node(&sibling)?;
        self.reparent(&sibling.children, sibling.block_number)?;
        self.write_node(&child)?;

        parent.keys.insert(index, promoted);
        parent.children.insert(index + 1, sibling.block_number);
        self.write_node(&parent)?;

        debug!(
            parent = parent.block_number.0,
            child = child_id.0,
            sibling = sibling.block_number.0,
            promoted,
            "split node"
        );
        Ok(())
    }

    /// Split `node_id` so that it (or its new sibling) has room for one
    /// more entry.
    fn make_room(&mut self, node_id: BlockId) -> Result<()> {
        let node = self.read_node(node_id)?;
        match node.parent {
            None => self.split_root(),
            Some(parent_id) => {
                let index = self.read_node(parent_id)?.child_index(node_id)?;
                self.split_node(parent_id, index, node_id)
            }
        }
    }

    fn reparent(&mut self, children: &[BlockId], parent: BlockId) -> Result<()> {
        for &child in children {
            let mut node = self.read_node(child)?;
            node.parent = Some(parent);
            self.write_node(&node)?;
        }
        Ok(())
    }

    /// Refresh routing keys on the path from `node_id` to the root.
    ///
    /// Stops at the first ancestor whose routing key for the changed subtree
    /// is explicit; above that point the subtree maximum is unchanged.
    pub fn update_parent_keys(&mut self, node_id: BlockId) -> Result<()> {
        let mut current = node_id;
        loop {
            let node = self.read_node(current)?;
            let Some(parent_id) = node.parent else {
                return Ok(());
            };

            let mut parent = self.read_node(parent_id)?;
            let index = parent.child_index(current)?;
            if index < parent.num_keys() {
                let max = self.find_maximum(current)?.ok_or_else(|| {
                    Error::Corrupted(format!("subtree {} holds no keys", current.0))
                })?;
                if parent.keys[index] != max {
                    trace!(parent = parent_id.0, index, max, "refresh routing key");
                    parent.keys[index] = max;
                    self.write_node(&parent)?;
                }
                return Ok(());
            }
            current = parent_id;
        }
    }

    // ========================================================================
    // Deletion
    // ========================================================================

    /// Remove one leaf holding `key`. Returns `false` if the key is absent.
    ///
    /// No rebalancing happens: nodes may drop below `MIN_KEYS` routing keys.
    pub fn delete(&mut self, key: Key) -> Result<bool> {
        let Some(leaf_id) = self.search(key)? else {
            return Ok(false);
        };

        let leaf = self.read_node(leaf_id)?;
        let parent_id = leaf.parent.ok_or(Error::MissingParent(leaf_id.0))?;

        self.free_node(leaf_id)?;
        self.remove_key(parent_id, leaf_id)?;

        debug!(key, leaf = leaf_id.0, "deleted");
        Ok(true)
    }

    /// Remove `child_id`'s entry from `node_id`, shifting later keys and
    /// children left.
    ///
    /// A node left without children is freed and removed from its own
    /// parent in turn; an emptied root becomes an empty leaf again.
    pub fn remove_key(&mut self, node_id: BlockId, child_id: BlockId) -> Result<()> {
        let mut current = node_id;
        let mut removed = child_id;

        loop {
            let mut node = self.read_node(current)?;
            let pos = node.child_index(removed)?;
            node.children.remove(pos);
            if pos < node.num_keys() {
                node.keys.remove(pos);
            } else {
                node.keys.pop();
            }

            if !node.children.is_empty() {
                self.write_node(&node)?;
                return self.update_parent_keys(current);
            }

            match node.parent {
                None => {
                    node.clear_to_leaf();
                    self.write_node(&node)?;
                    debug!(root = current.0, "tree is empty");
                    return Ok(());
                }
                Some(parent_id) => {
                    self.free_node(current)?;
                    removed = current;
                    current = parent_id;
                }
            }
        }
    }

    /// Merge `children[index]` and `children[index + 1]` of `parent_id`,
    /// pulling the separating key down between them.
    ///
    /// Both children must be internal nodes and the merged node must fit in
    /// `MAX_KEYS`. The right sibling's block is freed. Deletion never calls
    /// this on its own.
    pub fn merge_children(&mut self, parent_id: BlockId, index: usize) -> Result<()> {
        let mut parent = self.read_node(parent_id)?;
        if index + 1 >= parent.children.len() || index >= parent.num_keys() {
            return Err(Error::NoSibling {
                parent: parent_id.0,
                index,
            });
        }

        let mut left = self.read_node(parent.children[index])?;
        let right = self.read_node(parent.children[index + 1])?;
        if left.is_leaf || right.is_leaf {
            let leaf = if left.is_leaf { &left } else { &right };
            return Err(Error::UnexpectedNodeKind(leaf.block_number.0));
        }

        let merged_keys = left.num_keys() + 1 + right.num_keys();
        if merged_keys > self.config.max_keys() {
            return Err(Error::MergeOverflow {
                left: left.block_number.0,
                right: right.block_number.0,
                max_keys: self.config.max_keys(),
            });
        }

        let separator = parent.keys.remove(index);
        parent.children.remove(index + 1);

        left.keys.push(separator);
        left.keys.extend_from_slice(&right.keys);
        left.children.extend_from_slice(&right.children);

        self.reparent(&right.children, left.block_number)?;
        self.write_node(&left)?;
        self.write_node(&parent)?;
        self.free_node(right.block_number)?;

        debug!(
            parent = parent_id.0,
            left = left.block_number.0,
            right = right.block_number.0,
            separator,
            "merged children"
        );
        Ok(())
    }

    // ========================================================================
    // Auxiliary queries
    // ========================================================================

    /// Smallest key under `block_id`, following `children[0]`.
    pub fn find_minimum(&mut self, block_id: BlockId) -> Result<Option<Key>> {
        let mut node = self.read_node(block_id)?;
        loop {
            if node.is_leaf {
                return Ok(node.key);
            }
            match node.children.first() {
                Some(&child) => node = self.read_node(child)?,
                None => return Ok(None),
            }
        }
    }

    /// Largest key under `block_id`, following the last child.
    pub fn find_maximum(&mut self, block_id: BlockId) -> Result<Option<Key>> {
        let mut node = self.read_node(block_id)?;
        loop {
            if node.is_leaf {
                return Ok(node.key);
            }
            match node.children.last() {
                Some(&child) => node = self.read_node(child)?,
                None => return Ok(None),
            }
        }
    }

    /// Number of internal levels between `block_id` and the leaves.
    pub fn find_height(&mut self, block_id: BlockId) -> Result<usize> {
        let mut height = 0;
        let mut node = self.read_node(block_id)?;
        while !node.is_leaf {
            let child = *node.children.first().ok_or_else(|| {
                Error::Corrupted(format!("internal node {} has no children", node.block_number.0))
            })?;
            height += 1;
            node = self.read_node(child)?;
        }
        Ok(height)
    }

    /// Number of ancestors of `block_id` (0 for the root).
    pub fn find_depth(&mut self, block_id: BlockId) -> Result<usize> {
        let limit = self.store.allocated_count() as usize;
        let mut depth = 0;
        let mut node = self.read_node(block_id)?;
        while let Some(parent) = node.parent {
            depth += 1;
            if depth > limit {
                return Err(Error::Corrupted(format!(
                    "parent chain from {} does not reach the root",
                    block_id.0
                )));
            }
            node = self.read_node(parent)?;
        }
        Ok(depth)
    }

    /// Smallest key in the tree.
    pub fn minimum(&mut self) -> Result<Option<Key>> {
        self.find_minimum(self.root)
    }

    /// Largest key in the tree.
    pub fn maximum(&mut self) -> Result<Option<Key>> {
        self.find_maximum(self.root)
    }

    /// Internal levels above the leaves (0 for an empty tree).
    pub fn height(&mut self) -> Result<usize> {
        self.find_height(self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn create_tree(max_keys: usize) -> (BTree, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = TreeConfig::new(max_keys).unwrap();
        let tree = BTree::create(dir.path().join("tree.idx"), config).unwrap();
        (tree, dir)
    }

    fn tree_with(max_keys: usize, keys: &[Key]) -> (BTree, tempfile::TempDir) {
        let (mut tree, dir) = create_tree(max_keys);
        for &k in keys {
            tree.insert(k).unwrap();
        }
        (tree, dir)
    }

    #[test]
    fn test_empty_tree() {
        let (mut tree, _dir) = create_tree(2);
        let root = tree.read_node(tree.root()).unwrap();
        assert!(root.is_empty_leaf());
        assert_eq!(tree.search(0).unwrap(), None);
        assert_eq!(tree.minimum().unwrap(), None);
        assert_eq!(tree.maximum().unwrap(), None);
        assert_eq!(tree.height().unwrap(), 0);
        assert!(!tree.delete(1).unwrap());
    }

    #[test]
    fn test_first_insert_seeds_root() {
        let (mut tree, _dir) = create_tree(2);
        let leaf = tree.insert(42).unwrap();

        let root = tree.read_node(tree.root()).unwrap();
        assert!(!root.is_leaf);
        assert_eq!(root.num_keys(), 0);
        assert_eq!(root.children, vec![leaf]);

        let leaf_node = tree.read_node(leaf).unwrap();
        assert_eq!(leaf_node.parent, Some(tree.root()));
        assert_eq!(tree.search(42).unwrap(), Some(leaf));
    }

    #[test]
    fn test_zero_is_a_valid_key() {
        let (mut tree, _dir) = tree_with(2, &[0, 5]);
        assert!(tree.search(0).unwrap().is_some());
        assert_eq!(tree.minimum().unwrap(), Some(0));
    }

    #[test]
    fn test_bottom_node_keeps_leaves_ordered() {
        let (mut tree, _dir) = tree_with(6, &[30, 10, 20]);
        let root = tree.read_node(tree.root()).unwrap();
        assert_eq!(root.keys, vec![10, 20]);
        assert_eq!(root.children.len(), 3);

        let last = tree.read_node(root.children[2]).unwrap();
        assert_eq!(last.key, Some(30));
    }

    #[test]
    fn test_root_split_keeps_root_block() {
        let (mut tree, _dir) = create_tree(2);
        let root_id = tree.root();
        for k in [10, 20, 30, 40] {
            tree.insert(k).unwrap();
        }

        let root = tree.read_node(root_id).unwrap();
        assert_eq!(tree.root(), root_id);
        assert!(!root.is_leaf);
        assert!(root.num_keys() >= 1);
        assert_eq!(tree.height().unwrap(), 2);
    }

    #[test]
    fn test_split_root_partition() {
        let (mut tree, _dir) = tree_with(2, &[10, 20, 30]);
        // root: keys [10, 20], three leaves
        tree.split_root().unwrap();

        let root = tree.read_node(tree.root()).unwrap();
        assert_eq!(root.keys, vec![20]);
        let left = tree.read_node(root.children[0]).unwrap();
        let right = tree.read_node(root.children[1]).unwrap();
        assert_eq!(left.keys, vec![10]);
        assert_eq!(left.children.len(), 2);
        assert!(right.keys.is_empty());
        assert_eq!(right.children.len(), 1);

        for &c in left.children.iter() {
            assert_eq!(tree.read_node(c).unwrap().parent, Some(left.block_number));
        }
        assert_eq!(
            tree.read_node(right.children[0]).unwrap().parent,
            Some(right.block_number)
        );
    }

    #[test]
    fn test_split_root_rejects_small_root() {
        let (mut tree, _dir) = tree_with(2, &[10]);
        assert!(matches!(tree.split_root(), Err(Error::NotSplittable(_))));
    }

    #[test]
    fn test_split_node_promotes_child_maximum() {
        let (mut tree, _dir) = tree_with(6, &[10, 20, 30, 40, 50, 60, 70]);
        // Root is full (6 keys); make it a two-level tree first
        tree.split_root().unwrap();
        let root = tree.read_node(tree.root()).unwrap();
        assert_eq!(root.keys, vec![40]);

        // Fill the right child up to six keys
        for k in [80, 90, 100] {
            tree.insert(k).unwrap();
        }
        let root = tree.read_node(tree.root()).unwrap();
        let right_id = root.children[1];
        let right = tree.read_node(right_id).unwrap();
        assert_eq!(right.keys, vec![50, 60, 70, 80, 90]);
        tree.insert(110).unwrap();
        let right = tree.read_node(right_id).unwrap();
        assert!(right.is_full(6));

        tree.split_node(tree.root(), 1, right_id).unwrap();
        let root = tree.read_node(tree.root()).unwrap();
        assert_eq!(root.keys, vec![40, 80]);
        assert_eq!(root.children.len(), 3);
        assert_eq!(tree.find_maximum(root.children[1]).unwrap(), Some(80));
        assert_eq!(tree.find_minimum(root.children[2]).unwrap(), Some(90));
    }

    #[test]
    fn test_split_node_rejects_wrong_index() {
        let (mut tree, _dir) = tree_with(2, &[10, 20, 30, 40]);
        let root = tree.read_node(tree.root()).unwrap();
        let child = root.children[0];
        assert!(matches!(
            tree.split_node(tree.root(), 1, child),
            Err(Error::ChildNotFound { .. })
        ));
    }

    #[test]
    fn test_cascading_splits_grow_height() {
        let (mut tree, _dir) = create_tree(2);
        for k in 1..=64 {
            tree.insert(k * 10).unwrap();
        }
        assert!(tree.height().unwrap() >= 4);
        for k in 1..=64 {
            assert!(tree.search(k * 10).unwrap().is_some(), "missing {}", k * 10);
        }
    }

    #[test]
    fn test_routing_keys_track_subtree_maximum() {
        let (mut tree, _dir) = tree_with(2, &[50, 40, 30, 20, 10, 60, 55, 5]);
        let mut stack = vec![tree.root()];
        while let Some(id) = stack.pop() {
            let node = tree.read_node(id).unwrap();
            if node.is_leaf {
                continue;
            }
            for (i, &child) in node.children.iter().enumerate() {
                if i < node.num_keys() {
                    assert_eq!(Some(node.keys[i]), tree.find_maximum(child).unwrap());
                }
                stack.push(child);
            }
        }
    }

    #[test]
    fn test_duplicate_keys_stored_twice() {
        let (mut tree, _dir) = create_tree(2);
        let a = tree.insert(7).unwrap();
        let b = tree.insert(7).unwrap();
        assert_ne!(a, b);

        assert!(tree.delete(7).unwrap());
        assert!(tree.search(7).unwrap().is_some());
        assert!(tree.delete(7).unwrap());
        assert!(tree.search(7).unwrap().is_none());
    }

    #[test]
    fn test_search_stops_on_child_cycle() {
        // root: [20] -> A: [10] (l10, l20), B: [30] (l30, l40)
        let (mut tree, _dir) = tree_with(2, &[10, 20, 30, 40]);
        let root = tree.read_node(tree.root()).unwrap();
        let mut a = tree.read_node(root.children[0]).unwrap();
        a.children[1] = tree.root();
        tree.write_node(&a).unwrap();

        assert!(matches!(tree.search(99), Err(Error::Corrupted(_))));
        // Keys reached before the cycle are still found
        assert!(tree.search(10).unwrap().is_some());
    }

    #[test]
    fn test_insert_value_and_get() {
        let (mut tree, _dir) = create_tree(2);
        tree.insert_value(100, 4242).unwrap();
        tree.insert_value(200, 7).unwrap();
        assert_eq!(tree.get(100).unwrap(), Some(4242));
        assert_eq!(tree.get(200).unwrap(), Some(7));
        assert_eq!(tree.get(300).unwrap(), None);
    }

    #[test]
    fn test_delete_frees_leaf_block() {
        let (mut tree, _dir) = tree_with(2, &[1, 2, 3]);
        let leaf = tree.search(2).unwrap().unwrap();
        let before = tree.allocated_blocks();

        assert!(tree.delete(2).unwrap());
        assert_eq!(tree.allocated_blocks(), before - 1);
        assert!(matches!(
            tree.read_node(leaf),
            Err(Error::BlockNotAllocated(_))
        ));
    }

    #[test]
    fn test_delete_last_child_refreshes_routing_keys() {
        let (mut tree, _dir) = tree_with(2, &[10, 20, 30, 40, 50]);
        assert!(tree.delete(50).unwrap());
        assert_eq!(tree.maximum().unwrap(), Some(40));
        assert!(tree.delete(40).unwrap());
        assert_eq!(tree.maximum().unwrap(), Some(30));
        for k in [10, 20, 30] {
            assert!(tree.contains(k).unwrap());
        }
    }

    #[test]
    fn test_delete_everything_resets_root() {
        let keys = [5, 3, 8, 1, 9, 7];
        let (mut tree, _dir) = tree_with(2, &keys);
        for k in keys {
            assert!(tree.delete(k).unwrap());
        }

        let root = tree.read_node(tree.root()).unwrap();
        assert!(root.is_empty_leaf());
        assert_eq!(tree.allocated_blocks(), 1);

        // And the tree is usable again
        tree.insert(11).unwrap();
        assert!(tree.contains(11).unwrap());
    }

    #[test]
    fn test_remove_key_unknown_child() {
        let (mut tree, _dir) = tree_with(2, &[1]);
        assert!(matches!(
            tree.remove_key(tree.root(), BlockId::new(999)),
            Err(Error::ChildNotFound { .. })
        ));
    }

    #[test]
    fn test_merge_children() {
        let (mut tree, _dir) = tree_with(6, &[10, 20, 30, 40, 50, 60, 70]);
        tree.split_root().unwrap();
        let root = tree.read_node(tree.root()).unwrap();
        let (left_id, right_id) = (root.children[0], root.children[1]);
        let before = tree.allocated_blocks();

        tree.merge_children(tree.root(), 0).unwrap();

        let root = tree.read_node(tree.root()).unwrap();
        assert_eq!(root.children, vec![left_id]);
        assert!(root.keys.is_empty());
        let merged = tree.read_node(left_id).unwrap();
        assert_eq!(merged.keys, vec![10, 20, 30, 40, 50, 60]);
        assert_eq!(merged.children.len(), 7);
        for &c in &merged.children {
            assert_eq!(tree.read_node(c).unwrap().parent, Some(left_id));
        }
        assert_eq!(tree.allocated_blocks(), before - 1);
        assert!(!tree.store.is_allocated(right_id));
        for k in [10, 20, 30, 40, 50, 60, 70] {
            assert!(tree.contains(k).unwrap());
        }
    }

    #[test]
    fn test_merge_children_overflow() {
        // root: [20] -> A: [10] (l10, l20), B: [30] (l30, l40)
        let (mut tree, _dir) = tree_with(2, &[10, 20, 30, 40]);
        let before = tree.allocated_blocks();
        assert!(matches!(
            tree.merge_children(tree.root(), 0),
            Err(Error::MergeOverflow { max_keys: 2, .. })
        ));
        assert_eq!(tree.allocated_blocks(), before);
    }

    #[test]
    fn test_merge_children_rejects_leaves() {
        let (mut tree, _dir) = tree_with(2, &[1, 2]);
        assert!(matches!(
            tree.merge_children(tree.root(), 0),
            Err(Error::UnexpectedNodeKind(_))
        ));
        assert!(matches!(
            tree.merge_children(tree.root(), 1),
            Err(Error::NoSibling { index: 1, .. })
        ));
    }

    #[test]
    fn test_min_max_height_depth() {
        let (mut tree, _dir) = tree_with(2, &[3, 1, 4, 1, 5, 9, 2, 6]);
        assert_eq!(tree.minimum().unwrap(), Some(1));
        assert_eq!(tree.maximum().unwrap(), Some(9));

        let height = tree.height().unwrap();
        let leaf = tree.search(5).unwrap().unwrap();
        assert_eq!(tree.find_depth(leaf).unwrap(), height);
        assert_eq!(tree.find_depth(tree.root()).unwrap(), 0);
        assert_eq!(tree.find_height(leaf).unwrap(), 0);
    }

    #[test]
    fn test_out_of_blocks_does_not_leak() {
        let dir = tempdir().unwrap();
        let config = TreeConfig::new(2).unwrap().with_max_blocks(6).unwrap();
        let mut tree = BTree::create(dir.path().join("tree.idx"), config).unwrap();

        // superblock + root + leaves; splitting needs extra blocks
        let mut inserted = Vec::new();
        let mut failed = false;
        for k in 1..=10 {
            match tree.insert(k) {
                Ok(_) => inserted.push(k),
                Err(Error::OutOfBlocks { .. }) => {
                    failed = true;
                    break;
                }
                Err(e) => panic!("unexpected error: {e}"),
            }
        }
        assert!(failed);
        assert_eq!(tree.allocated_blocks(), 1 + inserted.len() as u32);
        for k in inserted {
            assert!(tree.contains(k).unwrap());
        }
    }

    #[test]
    fn test_reopen_preserves_tree() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tree.idx");
        let root;
        {
            let mut tree = BTree::create(&path, TreeConfig::new(6).unwrap()).unwrap();
            for k in 0..40 {
                tree.insert_value(k * 3, k).unwrap();
            }
            root = tree.root();
            tree.flush().unwrap();
        }

        let mut tree = BTree::open(&path).unwrap();
        assert_eq!(tree.root(), root);
        assert_eq!(tree.max_keys(), 6);
        for k in 0..40 {
            assert_eq!(tree.get(k * 3).unwrap(), Some(k));
        }
    }

    #[test]
    fn test_open_or_create_keeps_stored_fanout() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("tree.idx");
        {
            let mut tree = BTree::open_or_create(&path, TreeConfig::new(6).unwrap()).unwrap();
            tree.insert(1).unwrap();
        }
        let tree = BTree::open_or_create(&path, TreeConfig::new(2).unwrap()).unwrap();
        assert_eq!(tree.max_keys(), 6);
    }
}
