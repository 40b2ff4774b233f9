//! Structural checks and debug rendering for [`BTree`].

use std::collections::HashSet;
use std::fmt::{self, Write as _};

use tracing::debug;

use super::BTree;
use crate::common::{BlockId, Error, Key, Result};

/// Shape summary returned by [`BTree::validate`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TreeStats {
    /// Internal levels above the leaves (0 for an empty tree).
    pub height: usize,
    /// Internal nodes, the root included once populated.
    pub internal_nodes: usize,
    /// Leaves, i.e. stored keys.
    pub leaves: usize,
}

impl fmt::Display for TreeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TreeStats {{ height: {}, internal: {}, leaves: {} }}",
            self.height, self.internal_nodes, self.leaves
        )
    }
}

/// Per-subtree facts gathered bottom-up.
struct Subtree {
    min: Key,
    max: Key,
    height: usize,
}

impl BTree {
    /// Walk the whole tree and check every structural invariant.
    ///
    /// Checked:
    /// - every child points back at its parent, and the root has none
    /// - internal nodes hold `children == keys + 1` and at most `MAX_KEYS` keys
    /// - routing keys are non-decreasing and each equals its subtree maximum
    /// - every key under `children[i]` is `>= keys[i - 1]`
    /// - all leaves sit at the same depth
    /// - no block is reachable twice, and no allocated block is unreachable
    ///
    /// # Errors
    /// `Error::Corrupted` describing the first violation found.
    pub fn validate(&mut self) -> Result<TreeStats> {
        let root_id = self.root();
        let root = self.read_node(root_id)?;
        if root.parent.is_some() {
            return Err(Error::Corrupted(format!("root {} has a parent", root_id.0)));
        }

        let mut stats = TreeStats::default();
        let mut visited = HashSet::new();

        if root.is_empty_leaf() {
            visited.insert(root_id);
        } else if root.is_leaf {
            return Err(Error::Corrupted(format!(
                "root {} is a populated leaf",
                root_id.0
            )));
        } else {
            let subtree = self.check_subtree(root_id, None, &mut visited, &mut stats)?;
            stats.height = subtree.height;
        }

        let reachable = visited.len() as u32;
        let allocated = self.allocated_blocks();
        if reachable != allocated {
            return Err(Error::Corrupted(format!(
                "{allocated} blocks allocated but {reachable} reachable from the root"
            )));
        }

        debug!(%stats, "tree validated");
        Ok(stats)
    }

    fn check_subtree(
        &mut self,
        block_id: BlockId,
        expected_parent: Option<BlockId>,
        visited: &mut HashSet<BlockId>,
        stats: &mut TreeStats,
    ) -> Result<Subtree> {
        if !visited.insert(block_id) {
            return Err(Error::Corrupted(format!(
                "block {} is reachable more than once",
                block_id.0
            )));
        }

        let node = self.read_node(block_id)?;
        if node.parent != expected_parent {
            return Err(Error::Corrupted(format!(
                "block {} records parent {:?}, expected {:?}",
                block_id.0,
                node.parent.map(|p| p.0),
                expected_parent.map(|p| p.0)
            )));
        }

        if node.is_leaf {
            let key = node
                .key
                .ok_or_else(|| Error::Corrupted(format!("leaf {} has no key", block_id.0)))?;
            stats.leaves += 1;
            return Ok(Subtree {
                min: key,
                max: key,
                height: 0,
            });
        }

        stats.internal_nodes += 1;
        if node.children.len() != node.num_keys() + 1 {
            return Err(Error::Corrupted(format!(
                "node {} has {} keys and {} children",
                block_id.0,
                node.num_keys(),
                node.children.len()
            )));
        }
        if node.num_keys() > self.max_keys() {
            return Err(Error::Corrupted(format!(
                "node {} has {} keys, more than {}",
                block_id.0,
                node.num_keys(),
                self.max_keys()
            )));
        }
        if node.keys.windows(2).any(|w| w[0] > w[1]) {
            return Err(Error::Corrupted(format!(
                "node {} keys out of order: {:?}",
                block_id.0, node.keys
            )));
        }

        let mut min = Key::MAX;
        let mut max = Key::MIN;
        let mut height = None;
        for (i, &child) in node.children.iter().enumerate() {
            let sub = self.check_subtree(child, Some(block_id), visited, stats)?;

            if let Some(&routing) = node.keys.get(i) {
                if routing != sub.max {
                    return Err(Error::Corrupted(format!(
                        "node {} key[{i}] = {routing}, subtree maximum is {}",
                        block_id.0, sub.max
                    )));
                }
            }
            if i > 0 && sub.min < node.keys[i - 1] {
                return Err(Error::Corrupted(format!(
                    "node {} child {i} holds {} below separator {}",
                    block_id.0,
                    sub.min,
                    node.keys[i - 1]
                )));
            }
            match height {
                None => height = Some(sub.height),
                Some(h) if h != sub.height => {
                    return Err(Error::Corrupted(format!(
                        "node {} has children of different heights",
                        block_id.0
                    )));
                }
                Some(_) => {}
            }

            min = min.min(sub.min);
            max = max.max(sub.max);
        }

        Ok(Subtree {
            min,
            max,
            height: height.unwrap_or(0) + 1,
        })
    }

    /// Render the tree as an indented outline, one block per line.
    pub fn dump(&mut self) -> Result<String> {
        let mut out = String::new();
        let root = self.root();
        if self.read_node(root)?.is_empty_leaf() {
            out.push_str("(empty)\n");
            return Ok(out);
        }
        self.dump_node(root, 0, &mut out)?;
        Ok(out)
    }

    fn dump_node(&mut self, block_id: BlockId, depth: usize, out: &mut String) -> Result<()> {
        self.check_descent(block_id, depth)?;
        let node = self.read_node(block_id)?;
        let indent = "  ".repeat(depth);

        if node.is_leaf {
            let key = node.key.map_or_else(|| "-".to_string(), |k| k.to_string());
            // Writing to a String cannot fail
            let _ = writeln!(
                out,
                "{indent}Block {} leaf key={key} value={}",
                block_id.0, node.value
            );
            return Ok(());
        }

        let children: Vec<u32> = node.children.iter().map(|c| c.0).collect();
        let _ = writeln!(
            out,
            "{indent}Block {} internal keys={:?} children={:?}",
            block_id.0, node.keys, children
        );
        for &child in &node.children {
            self.dump_node(child, depth + 1, out)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::TreeConfig;
    use crate::index::btree::Node;
    use tempfile::tempdir;

    fn create_tree(max_keys: usize) -> (BTree, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let config = TreeConfig::new(max_keys).unwrap();
        let tree = BTree::create(dir.path().join("tree.idx"), config).unwrap();
        (tree, dir)
    }

    #[test]
    fn test_validate_empty_tree() {
        let (mut tree, _dir) = create_tree(2);
        assert_eq!(tree.validate().unwrap(), TreeStats::default());
        assert_eq!(tree.dump().unwrap(), "(empty)\n");
    }

    #[test]
    fn test_validate_counts_nodes() {
        let (mut tree, _dir) = create_tree(2);
        for k in [10, 20, 30, 40] {
            tree.insert(k).unwrap();
        }
        let stats = tree.validate().unwrap();
        assert_eq!(stats.leaves, 4);
        assert_eq!(stats.height, 2);
        assert_eq!(stats.internal_nodes, 3);
    }

    #[test]
    fn test_validate_after_many_operations() {
        let (mut tree, _dir) = create_tree(3);
        for k in (0..200u64).map(|i| (i * 7919) % 257) {
            tree.insert(k).unwrap();
        }
        tree.validate().unwrap();
        for k in (0..200u64).step_by(3).map(|i| (i * 7919) % 257) {
            assert!(tree.delete(k).unwrap());
        }
        tree.validate().unwrap();
    }

    #[test]
    fn test_validate_detects_bad_routing_key() {
        let (mut tree, _dir) = create_tree(2);
        for k in [10, 20, 30] {
            tree.insert(k).unwrap();
        }
        let mut root = tree.read_node(tree.root()).unwrap();
        root.keys[0] = 15;
        tree.write_node(&root).unwrap();

        assert!(matches!(tree.validate(), Err(Error::Corrupted(_))));
    }

    #[test]
    fn test_validate_detects_bad_parent() {
        let (mut tree, _dir) = create_tree(2);
        let leaf = tree.insert(10).unwrap();
        tree.insert(20).unwrap();

        let mut node = tree.read_node(leaf).unwrap();
        node.parent = Some(BlockId::new(77));
        tree.write_node(&node).unwrap();

        assert!(matches!(tree.validate(), Err(Error::Corrupted(_))));
    }

    #[test]
    fn test_validate_detects_leaked_block() {
        let (mut tree, _dir) = create_tree(2);
        tree.insert(10).unwrap();
        let orphan = tree.create_node(true).unwrap();
        assert_eq!(orphan, Node::empty(orphan.block_number, true));

        let err = tree.validate().unwrap_err();
        assert!(err.to_string().contains("reachable"), "{err}");
    }

    #[test]
    fn test_child_cycle_reported_not_overflowed() {
        let (mut tree, _dir) = create_tree(2);
        for k in [10, 20, 30, 40] {
            tree.insert(k).unwrap();
        }
        let root = tree.read_node(tree.root()).unwrap();
        let mut right = tree.read_node(root.children[1]).unwrap();
        right.children[0] = tree.root();
        tree.write_node(&right).unwrap();

        assert!(matches!(tree.validate(), Err(Error::Corrupted(_))));
        assert!(matches!(tree.dump(), Err(Error::Corrupted(_))));
    }

    #[test]
    fn test_dump_layout() {
        let (mut tree, _dir) = create_tree(2);
        tree.insert_value(10, 1).unwrap();
        tree.insert_value(20, 2).unwrap();

        let dump = tree.dump().unwrap();
        let lines: Vec<&str> = dump.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("Block 1 internal keys=[10]"));
        assert!(lines[1].starts_with("  Block ") && lines[1].ends_with("leaf key=10 value=1"));
        assert!(lines[2].ends_with("leaf key=20 value=2"));
    }
}
