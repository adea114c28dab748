//! Adaptive Radix Tree over binary-comparable keys.
//!
//! Based on "The Adaptive Radix Tree: ARTful Indexing for Main-Memory
//! Databases" by Leis et al., 2013.
//!
//! Key features:
//! - Adaptive node sizes (4, 16, 48, 256 children)
//! - Path compression with a bounded inline prefix per node
//! - Duplicate keys collapse into one leaf with a sorted row-id set
//! - Lazy ordered range scans
//!
//! The tree contains no internal synchronization; callers serialize
//! structural mutation externally (see [`crate::ArtIndex`]).

mod node;
mod scan;

#[cfg(test)]
mod proptests;

pub use node::NodeKind;
pub use scan::Scan;

use tracing::trace;

use crate::key::ArtKey;
use crate::{IndexConfig, RowId};
use node::{prefix_mismatch, Node};

/// Error returned by [`Art::insert`] on a unique index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum InsertError {
    /// The key is already present and the index enforces uniqueness.
    #[error("duplicate key violates unique index constraint")]
    DuplicateKey,
}

/// Outcome of an erase step, consumed by the parent slot.
enum EraseOutcome {
    /// Key or row id not present; nothing changed.
    Miss,
    /// Row id removed; the subtree is still live.
    Hit,
    /// Row id removed and the node is now empty; the owner must detach it.
    HitEmptied,
}

/// An adaptive radix tree index mapping encoded keys to row identifiers.
pub struct Art {
    root: Option<Box<Node>>,
    max_prefix: usize,
    unique: bool,
    len: usize,
}

impl Art {
    /// Create an empty tree with the default configuration.
    pub fn new() -> Self {
        Self::with_config(IndexConfig::default())
    }

    /// Create an empty tree with the given configuration.
    pub fn with_config(config: IndexConfig) -> Self {
        assert!(config.max_prefix > 0, "max_prefix must be at least 1");
        Self {
            root: None,
            max_prefix: config.max_prefix,
            unique: config.unique,
            len: 0,
        }
    }

    /// Number of live (key, row id) entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// Whether the tree holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Shape of the root node, if any. Exposed for diagnostics and tests.
    pub fn root_kind(&self) -> Option<NodeKind> {
        self.root.as_deref().map(Node::kind)
    }

    /// Insert a (key, row id) entry.
    ///
    /// Returns `Ok(true)` if a new entry was added, `Ok(false)` if the exact
    /// (key, row id) pair was already present, and `Err(DuplicateKey)` if the
    /// key exists and the index enforces uniqueness.
    pub fn insert(&mut self, key: &ArtKey, row_id: RowId) -> Result<bool, InsertError> {
        if self.root.is_none() {
            self.root = Some(Box::new(Node::new_leaf(key.as_bytes(), row_id)));
            self.len += 1;
            return Ok(true);
        }
        let root = self.root.as_deref_mut().unwrap();
        let added = Self::insert_rec(root, key.as_bytes(), 0, row_id, self.unique, self.max_prefix)?;
        if added {
            self.len += 1;
        }
        Ok(added)
    }

    fn insert_rec(
        node: &mut Node,
        key: &[u8],
        depth: usize,
        row_id: RowId,
        unique: bool,
        max_prefix: usize,
    ) -> Result<bool, InsertError> {
        match node {
            Node::Leaf(leaf) => {
                if leaf.key == key {
                    if unique {
                        return Err(InsertError::DuplicateKey);
                    }
                    return Ok(leaf.insert_row_id(row_id));
                }
                Self::split_leaf(node, key, depth, row_id, max_prefix);
                Ok(true)
            }
            _ => {
                let mismatch = prefix_mismatch(node, key, depth, max_prefix);
                if mismatch < node.prefix().len() {
                    Self::split_prefix(node, key, depth, mismatch, row_id);
                    return Ok(true);
                }
                let depth = depth + mismatch;
                assert!(depth < key.len(), "encoded keys must be prefix-free");
                let byte = key[depth];
                if let Some(child) = node.find_child_mut(byte) {
                    Self::insert_rec(child, key, depth + 1, row_id, unique, max_prefix)
                } else {
                    node.insert_child(byte, Box::new(Node::new_leaf(key, row_id)));
                    Ok(true)
                }
            }
        }
    }

    /// Split a leaf into a branch holding the old leaf and a new one.
    ///
    /// A shared prefix longer than `max_prefix` is laid out as a chain of
    /// nodes, each carrying at most `max_prefix` prefix bytes plus one
    /// discriminating byte.
    fn split_leaf(node: &mut Node, key: &[u8], depth: usize, row_id: RowId, max_prefix: usize) {
        let old = std::mem::replace(node, Node::new_node4());
        let Node::Leaf(old_leaf) = old else {
            unreachable!("split_leaf on a non-leaf");
        };
        let mut d = depth;
        let mut cur = node;
        loop {
            let common = common_prefix_len(&old_leaf.key[d..], &key[d..]);
            if common > max_prefix {
                cur.set_prefix(&key[d..d + max_prefix]);
                d += max_prefix;
                let byte = key[d];
                cur.add_child(byte, Box::new(Node::new_node4()));
                d += 1;
                cur = cur.find_child_mut(byte).unwrap();
            } else {
                cur.set_prefix(&key[d..d + common]);
                d += common;
                assert!(
                    d < old_leaf.key.len() && d < key.len(),
                    "encoded keys must be prefix-free"
                );
                let old_byte = old_leaf.key[d];
                let new_byte = key[d];
                cur.add_child(old_byte, Box::new(Node::Leaf(old_leaf)));
                cur.add_child(new_byte, Box::new(Node::new_leaf(key, row_id)));
                return;
            }
        }
    }

    /// Split a branch whose compressed prefix diverges from the key at
    /// `mismatch`: a new Node4 takes the common part, the old branch keeps
    /// the remainder, and a fresh leaf joins as the second child.
    fn split_prefix(node: &mut Node, key: &[u8], depth: usize, mismatch: usize, row_id: RowId) {
        trace!(depth, mismatch, "splitting compressed prefix");
        let old_prefix = node.prefix().to_vec();
        let old_byte = old_prefix[mismatch];
        node.set_prefix(&old_prefix[mismatch + 1..]);
        let old = std::mem::replace(node, Node::new_node4());
        node.set_prefix(&old_prefix[..mismatch]);
        node.add_child(old_byte, Box::new(old));
        assert!(depth + mismatch < key.len(), "encoded keys must be prefix-free");
        node.add_child(key[depth + mismatch], Box::new(Node::new_leaf(key, row_id)));
    }

    /// Remove a (key, row id) entry. Returns whether it was found.
    ///
    /// Removing a leaf's last row id removes the leaf; a branch left with a
    /// single child collapses into it.
    pub fn erase(&mut self, key: &ArtKey, row_id: RowId) -> bool {
        let Some(root) = self.root.as_deref_mut() else {
            return false;
        };
        match Self::erase_rec(root, key.as_bytes(), 0, row_id, self.max_prefix) {
            EraseOutcome::Miss => false,
            EraseOutcome::Hit => {
                self.len -= 1;
                true
            }
            EraseOutcome::HitEmptied => {
                self.root = None;
                self.len -= 1;
                true
            }
        }
    }

    fn erase_rec(
        node: &mut Node,
        key: &[u8],
        depth: usize,
        row_id: RowId,
        max_prefix: usize,
    ) -> EraseOutcome {
        match node {
            Node::Leaf(leaf) => {
                if leaf.key != key || !leaf.remove_row_id(row_id) {
                    return EraseOutcome::Miss;
                }
                if leaf.row_ids.is_empty() {
                    EraseOutcome::HitEmptied
                } else {
                    EraseOutcome::Hit
                }
            }
            _ => {
                let mismatch = prefix_mismatch(node, key, depth, max_prefix);
                if mismatch < node.prefix().len() {
                    return EraseOutcome::Miss;
                }
                let depth = depth + mismatch;
                if depth >= key.len() {
                    return EraseOutcome::Miss;
                }
                let byte = key[depth];
                let Some(child) = node.find_child_mut(byte) else {
                    return EraseOutcome::Miss;
                };
                match Self::erase_rec(child, key, depth + 1, row_id, max_prefix) {
                    EraseOutcome::Miss => return EraseOutcome::Miss,
                    EraseOutcome::Hit => {}
                    EraseOutcome::HitEmptied => {
                        drop(node.remove_child(byte));
                        if node.child_count() == 0 {
                            return EraseOutcome::HitEmptied;
                        }
                        node.maybe_shrink();
                    }
                }
                // A removal or a deeper collapse can leave this node with a
                // single child; merge into it where the prefix bound allows.
                if node.child_count() == 1 {
                    Self::collapse(node, max_prefix);
                }
                EraseOutcome::Hit
            }
        }
    }

    /// Eliminate a branch reduced to a single child, merging its prefix into
    /// the child. When the merged prefix would overflow the inline bound the
    /// link is kept; it is exactly a long-prefix chain link.
    fn collapse(node: &mut Node, max_prefix: usize) {
        let (byte, mut child) = node.take_single_child();
        if matches!(*child, Node::Leaf(_)) {
            trace!("collapsing single-child branch into leaf");
            *node = *child;
            return;
        }
        let merged_len = node.prefix().len() + 1 + child.prefix().len();
        if merged_len <= max_prefix {
            trace!(merged_len, "merging collapsed branch prefix into child");
            let mut merged = node.prefix().to_vec();
            merged.push(byte);
            merged.extend_from_slice(child.prefix());
            child.set_prefix(&merged);
            *node = *child;
        } else {
            node.add_child(byte, child);
        }
    }

    /// Look up a key. Returns the ordered set of row ids, empty on a miss.
    pub fn search(&self, key: &ArtKey) -> &[RowId] {
        let key = key.as_bytes();
        let Some(mut node) = self.root.as_deref() else {
            return &[];
        };
        let mut depth = 0;
        loop {
            match node {
                Node::Leaf(leaf) => {
                    return if leaf.key == key { &leaf.row_ids } else { &[] };
                }
                _ => {
                    let mismatch = prefix_mismatch(node, key, depth, self.max_prefix);
                    if mismatch < node.prefix().len() {
                        return &[];
                    }
                    depth += mismatch;
                    if depth >= key.len() {
                        return &[];
                    }
                    let Some(child) = node.find_child(key[depth]) else {
                        return &[];
                    };
                    node = child;
                    depth += 1;
                }
            }
        }
    }

    /// Lazily scan row ids for keys within `[low, high]`, honoring the
    /// inclusive flags, in ascending key order.
    ///
    /// The iterator is finite, yields nothing once the upper bound is passed,
    /// and is safe to abandon early.
    pub fn scan(
        &self,
        low: &ArtKey,
        high: &ArtKey,
        low_inclusive: bool,
        high_inclusive: bool,
    ) -> Scan<'_> {
        Scan::new(
            self.root.as_deref(),
            low.as_bytes(),
            high.as_bytes(),
            low_inclusive,
            high_inclusive,
        )
    }
}

impl Default for Art {
    fn default() -> Self {
        Self::new()
    }
}

fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}
