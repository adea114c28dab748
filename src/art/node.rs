//! Node shapes for the adaptive radix tree.
//!
//! Branch nodes pick one of four layouts based on fanout:
//!
//! - Node4: up to 4 children, sorted parallel arrays, linear scan
//! - Node16: up to 16 children, same layout as Node4
//! - Node48: 256-entry byte-to-slot map plus 48 child slots
//! - Node256: direct 256-entry child array
//!
//! Growth order is 4 -> 16 -> 48 -> 256; shrink order is the exact reverse,
//! with thresholds strictly below the smaller capacity so alternating
//! insert/erase near a boundary does not thrash.

use smallvec::SmallVec;
use tracing::trace;

use crate::RowId;

/// Marker for an unused entry in the Node48 byte-to-slot map.
const EMPTY_SLOT: u8 = 0xFF;

/// Child count at or below which a Node16 shrinks back to a Node4.
const NODE16_SHRINK: usize = 3;
/// Child count at or below which a Node48 shrinks back to a Node16.
const NODE48_SHRINK: usize = 12;
/// Child count at or below which a Node256 shrinks back to a Node48.
const NODE256_SHRINK: usize = 37;

/// Compressed-path prefix buffer. Bounded by the tree's `max_prefix`.
pub(crate) type Prefix = SmallVec<[u8; 16]>;

/// The shape of a node, observable for diagnostics and tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    /// Terminal node holding a key and its row ids.
    Leaf,
    /// Branch with up to 4 children.
    Node4,
    /// Branch with up to 16 children.
    Node16,
    /// Branch with up to 48 children.
    Node48,
    /// Branch with up to 256 children.
    Node256,
}

/// Terminal node: one key's bytes plus the set of matching row ids.
///
/// Duplicate keys collapse into a single leaf; the row-id set is kept sorted
/// and deduplicated so `search` returns an ordered set.
pub(crate) struct Leaf {
    /// The full encoded key.
    pub(crate) key: Vec<u8>,
    /// Sorted, deduplicated row identifiers.
    pub(crate) row_ids: SmallVec<[RowId; 2]>,
}

impl Leaf {
    pub(crate) fn new(key: &[u8], row_id: RowId) -> Self {
        let mut row_ids = SmallVec::new();
        row_ids.push(row_id);
        Self {
            key: key.to_vec(),
            row_ids,
        }
    }

    /// Insert a row id, keeping the set sorted. Returns false if it was
    /// already present.
    pub(crate) fn insert_row_id(&mut self, row_id: RowId) -> bool {
        match self.row_ids.binary_search(&row_id) {
            Ok(_) => false,
            Err(pos) => {
                self.row_ids.insert(pos, row_id);
                true
            }
        }
    }

    /// Remove a row id. Returns false if it was not present.
    pub(crate) fn remove_row_id(&mut self, row_id: RowId) -> bool {
        match self.row_ids.binary_search(&row_id) {
            Ok(pos) => {
                self.row_ids.remove(pos);
                true
            }
            Err(_) => false,
        }
    }
}

/// Branch with up to 4 children in sorted parallel arrays.
pub(crate) struct Node4 {
    prefix: Prefix,
    count: u8,
    keys: [u8; 4],
    children: [Option<Box<Node>>; 4],
}

impl Node4 {
    pub(crate) fn new() -> Self {
        Self {
            prefix: Prefix::new(),
            count: 0,
            keys: [0; 4],
            children: std::array::from_fn(|_| None),
        }
    }
}

/// Branch with up to 16 children, same layout as Node4.
pub(crate) struct Node16 {
    prefix: Prefix,
    count: u8,
    keys: [u8; 16],
    children: [Option<Box<Node>>; 16],
}

impl Node16 {
    fn new() -> Self {
        Self {
            prefix: Prefix::new(),
            count: 0,
            keys: [0; 16],
            children: std::array::from_fn(|_| None),
        }
    }
}

/// Branch with a 256-entry byte-to-slot map and 48 child slots.
pub(crate) struct Node48 {
    prefix: Prefix,
    count: u8,
    index: Box<[u8; 256]>,
    children: Box<[Option<Box<Node>>; 48]>,
}

impl Node48 {
    fn new() -> Self {
        Self {
            prefix: Prefix::new(),
            count: 0,
            index: Box::new([EMPTY_SLOT; 256]),
            children: Box::new(std::array::from_fn(|_| None)),
        }
    }
}

/// Branch with a direct 256-entry child array.
pub(crate) struct Node256 {
    prefix: Prefix,
    count: u16,
    children: Box<[Option<Box<Node>>; 256]>,
}

impl Node256 {
    fn new() -> Self {
        Self {
            prefix: Prefix::new(),
            count: 0,
            children: Box::new(std::array::from_fn(|_| None)),
        }
    }
}

/// A node in the tree: a leaf or one of the four branch shapes.
///
/// Child slots are `Option<Box<Node>>`, so every node has exactly one owner
/// and grow/shrink transfers children by moving the boxes.
pub(crate) enum Node {
    Leaf(Leaf),
    Node4(Node4),
    Node16(Node16),
    Node48(Node48),
    Node256(Node256),
}

impl Node {
    pub(crate) fn new_leaf(key: &[u8], row_id: RowId) -> Self {
        Node::Leaf(Leaf::new(key, row_id))
    }

    pub(crate) fn new_node4() -> Self {
        Node::Node4(Node4::new())
    }

    pub(crate) fn kind(&self) -> NodeKind {
        match self {
            Node::Leaf(_) => NodeKind::Leaf,
            Node::Node4(_) => NodeKind::Node4,
            Node::Node16(_) => NodeKind::Node16,
            Node::Node48(_) => NodeKind::Node48,
            Node::Node256(_) => NodeKind::Node256,
        }
    }

    /// The compressed-path prefix. Empty for leaves, which own their full key.
    pub(crate) fn prefix(&self) -> &[u8] {
        match self {
            Node::Leaf(_) => &[],
            Node::Node4(n) => &n.prefix,
            Node::Node16(n) => &n.prefix,
            Node::Node48(n) => &n.prefix,
            Node::Node256(n) => &n.prefix,
        }
    }

    pub(crate) fn set_prefix(&mut self, new_prefix: &[u8]) {
        let prefix = match self {
            Node::Leaf(_) => panic!("leaf nodes have no prefix"),
            Node::Node4(n) => &mut n.prefix,
            Node::Node16(n) => &mut n.prefix,
            Node::Node48(n) => &mut n.prefix,
            Node::Node256(n) => &mut n.prefix,
        };
        prefix.clear();
        prefix.extend_from_slice(new_prefix);
    }

    /// Number of children. Zero for leaves.
    pub(crate) fn child_count(&self) -> usize {
        match self {
            Node::Leaf(_) => 0,
            Node::Node4(n) => n.count as usize,
            Node::Node16(n) => n.count as usize,
            Node::Node48(n) => n.count as usize,
            Node::Node256(n) => n.count as usize,
        }
    }

    fn is_full(&self) -> bool {
        match self {
            Node::Leaf(_) => true,
            Node::Node4(n) => n.count as usize == 4,
            Node::Node16(n) => n.count as usize == 16,
            Node::Node48(n) => n.count as usize == 48,
            Node::Node256(_) => false,
        }
    }

    /// Look up the child for a discriminating byte.
    pub(crate) fn find_child(&self, byte: u8) -> Option<&Node> {
        match self {
            Node::Leaf(_) => None,
            Node::Node4(n) => {
                let count = n.count as usize;
                n.keys[..count]
                    .iter()
                    .position(|&k| k == byte)
                    .map(|i| n.children[i].as_deref().unwrap())
            }
            Node::Node16(n) => {
                let count = n.count as usize;
                n.keys[..count]
                    .iter()
                    .position(|&k| k == byte)
                    .map(|i| n.children[i].as_deref().unwrap())
            }
            Node::Node48(n) => {
                let slot = n.index[byte as usize];
                if slot == EMPTY_SLOT {
                    None
                } else {
                    n.children[slot as usize].as_deref()
                }
            }
            Node::Node256(n) => n.children[byte as usize].as_deref(),
        }
    }

    pub(crate) fn find_child_mut(&mut self, byte: u8) -> Option<&mut Node> {
        match self {
            Node::Leaf(_) => None,
            Node::Node4(n) => {
                let count = n.count as usize;
                n.keys[..count]
                    .iter()
                    .position(|&k| k == byte)
                    .map(|i| n.children[i].as_deref_mut().unwrap())
            }
            Node::Node16(n) => {
                let count = n.count as usize;
                n.keys[..count]
                    .iter()
                    .position(|&k| k == byte)
                    .map(|i| n.children[i].as_deref_mut().unwrap())
            }
            Node::Node48(n) => {
                let slot = n.index[byte as usize];
                if slot == EMPTY_SLOT {
                    None
                } else {
                    n.children[slot as usize].as_deref_mut()
                }
            }
            Node::Node256(n) => n.children[byte as usize].as_deref_mut(),
        }
    }

    /// Add a child, growing to the next shape first if this one is full.
    pub(crate) fn insert_child(&mut self, byte: u8, child: Box<Node>) {
        if self.is_full() {
            self.grow();
        }
        self.add_child(byte, child);
    }

    /// Add a child to a shape with spare capacity. The discriminating byte
    /// must not already be present.
    pub(crate) fn add_child(&mut self, byte: u8, child: Box<Node>) {
        debug_assert!(self.find_child(byte).is_none());
        match self {
            Node::Leaf(_) => panic!("cannot add a child to a leaf"),
            Node::Node4(n) => {
                let count = n.count as usize;
                assert!(count < 4, "Node4 is full, must grow first");
                let pos = n.keys[..count].iter().position(|&k| k > byte).unwrap_or(count);
                for i in (pos..count).rev() {
                    n.keys[i + 1] = n.keys[i];
                    n.children[i + 1] = n.children[i].take();
                }
                n.keys[pos] = byte;
                n.children[pos] = Some(child);
                n.count += 1;
            }
            Node::Node16(n) => {
                let count = n.count as usize;
                assert!(count < 16, "Node16 is full, must grow first");
                let pos = n.keys[..count].iter().position(|&k| k > byte).unwrap_or(count);
                for i in (pos..count).rev() {
                    n.keys[i + 1] = n.keys[i];
                    n.children[i + 1] = n.children[i].take();
                }
                n.keys[pos] = byte;
                n.children[pos] = Some(child);
                n.count += 1;
            }
            Node::Node48(n) => {
                let count = n.count as usize;
                assert!(count < 48, "Node48 is full, must grow first");
                let slot = n
                    .children
                    .iter()
                    .position(|c| c.is_none())
                    .expect("Node48 below capacity must have a free slot");
                n.children[slot] = Some(child);
                n.index[byte as usize] = slot as u8;
                n.count += 1;
            }
            Node::Node256(n) => {
                n.children[byte as usize] = Some(child);
                n.count += 1;
            }
        }
    }

    /// Remove and return the child for a discriminating byte, compacting the
    /// shape's storage. The caller applies the shrink/collapse rules next.
    pub(crate) fn remove_child(&mut self, byte: u8) -> Box<Node> {
        match self {
            Node::Leaf(_) => panic!("cannot remove a child from a leaf"),
            Node::Node4(n) => {
                let count = n.count as usize;
                let pos = n.keys[..count]
                    .iter()
                    .position(|&k| k == byte)
                    .expect("removed child must exist");
                let child = n.children[pos].take().unwrap();
                for i in pos..count - 1 {
                    n.keys[i] = n.keys[i + 1];
                    n.children[i] = n.children[i + 1].take();
                }
                n.count -= 1;
                child
            }
            Node::Node16(n) => {
                let count = n.count as usize;
                let pos = n.keys[..count]
                    .iter()
                    .position(|&k| k == byte)
                    .expect("removed child must exist");
                let child = n.children[pos].take().unwrap();
                for i in pos..count - 1 {
                    n.keys[i] = n.keys[i + 1];
                    n.children[i] = n.children[i + 1].take();
                }
                n.count -= 1;
                child
            }
            Node::Node48(n) => {
                let slot = n.index[byte as usize];
                assert!(slot != EMPTY_SLOT, "removed child must exist");
                let child = n.children[slot as usize].take().unwrap();
                n.index[byte as usize] = EMPTY_SLOT;
                n.count -= 1;
                child
            }
            Node::Node256(n) => {
                let child = n.children[byte as usize]
                    .take()
                    .expect("removed child must exist");
                n.count -= 1;
                child
            }
        }
    }

    /// The smallest (byte, child) pair with byte >= `from`, or None.
    ///
    /// Restartable ascending-order child access; `from` of 256 always yields
    /// None, so callers can resume past byte 255 without a special case.
    pub(crate) fn next_child_at_or_after(&self, from: u16) -> Option<(u8, &Node)> {
        match self {
            Node::Leaf(_) => None,
            Node::Node4(n) => {
                let count = n.count as usize;
                n.keys[..count]
                    .iter()
                    .position(|&k| k as u16 >= from)
                    .map(|i| (n.keys[i], n.children[i].as_deref().unwrap()))
            }
            Node::Node16(n) => {
                let count = n.count as usize;
                n.keys[..count]
                    .iter()
                    .position(|&k| k as u16 >= from)
                    .map(|i| (n.keys[i], n.children[i].as_deref().unwrap()))
            }
            Node::Node48(n) => (from..256).find_map(|b| {
                let slot = n.index[b as usize];
                if slot == EMPTY_SLOT {
                    None
                } else {
                    Some((b as u8, n.children[slot as usize].as_deref().unwrap()))
                }
            }),
            Node::Node256(n) => (from..256)
                .find_map(|b| n.children[b as usize].as_deref().map(|c| (b as u8, c))),
        }
    }

    /// Detach the only remaining child. The node must have exactly one.
    pub(crate) fn take_single_child(&mut self) -> (u8, Box<Node>) {
        assert_eq!(self.child_count(), 1, "node must have exactly one child");
        let (byte, _) = self.next_child_at_or_after(0).unwrap();
        let child = self.remove_child(byte);
        (byte, child)
    }

    /// Replace this node with the next larger shape, transferring all
    /// children in byte order.
    fn grow(&mut self) {
        let old = std::mem::replace(self, Node::new_node4());
        *self = match old {
            Node::Node4(n4) => {
                trace!(from = "Node4", to = "Node16", "growing node");
                let mut n16 = Node16::new();
                n16.prefix = n4.prefix;
                n16.count = n4.count;
                n16.keys[..4].copy_from_slice(&n4.keys);
                let mut children = n4.children;
                for (slot, child) in children.iter_mut().enumerate() {
                    n16.children[slot] = child.take();
                }
                Node::Node16(n16)
            }
            Node::Node16(n16) => {
                trace!(from = "Node16", to = "Node48", "growing node");
                let mut n48 = Node48::new();
                n48.prefix = n16.prefix;
                n48.count = n16.count;
                let mut children = n16.children;
                for i in 0..n16.count as usize {
                    n48.index[n16.keys[i] as usize] = i as u8;
                    n48.children[i] = children[i].take();
                }
                Node::Node48(n48)
            }
            Node::Node48(n48) => {
                trace!(from = "Node48", to = "Node256", "growing node");
                let mut n256 = Node256::new();
                n256.prefix = n48.prefix;
                n256.count = n48.count as u16;
                let mut children = n48.children;
                for byte in 0..256 {
                    let slot = n48.index[byte];
                    if slot != EMPTY_SLOT {
                        n256.children[byte] = children[slot as usize].take();
                    }
                }
                Node::Node256(n256)
            }
            Node::Leaf(_) | Node::Node256(_) => panic!("no larger shape to grow into"),
        };
    }

    /// Replace this node with the next smaller shape once the child count
    /// drops to the shrink threshold. No-op above the threshold.
    pub(crate) fn maybe_shrink(&mut self) {
        let shrink = match self {
            Node::Node16(n) => (n.count as usize) <= NODE16_SHRINK,
            Node::Node48(n) => (n.count as usize) <= NODE48_SHRINK,
            Node::Node256(n) => (n.count as usize) <= NODE256_SHRINK,
            Node::Leaf(_) | Node::Node4(_) => false,
        };
        if !shrink {
            return;
        }
        let old = std::mem::replace(self, Node::new_node4());
        *self = match old {
            Node::Node16(n16) => {
                trace!(from = "Node16", to = "Node4", "shrinking node");
                let mut n4 = Node4::new();
                n4.prefix = n16.prefix;
                n4.count = n16.count;
                n4.keys.copy_from_slice(&n16.keys[..4]);
                let mut children = n16.children;
                for i in 0..n16.count as usize {
                    n4.children[i] = children[i].take();
                }
                Node::Node4(n4)
            }
            Node::Node48(n48) => {
                trace!(from = "Node48", to = "Node16", "shrinking node");
                let mut n16 = Node16::new();
                n16.prefix = n48.prefix;
                let mut children = n48.children;
                let mut next = 0usize;
                for byte in 0..256 {
                    let slot = n48.index[byte];
                    if slot != EMPTY_SLOT {
                        n16.keys[next] = byte as u8;
                        n16.children[next] = children[slot as usize].take();
                        next += 1;
                    }
                }
                n16.count = next as u8;
                Node::Node16(n16)
            }
            Node::Node256(n256) => {
                trace!(from = "Node256", to = "Node48", "shrinking node");
                let mut n48 = Node48::new();
                n48.prefix = n256.prefix;
                let mut children = n256.children;
                let mut next = 0usize;
                for byte in 0..256 {
                    if let Some(child) = children[byte].take() {
                        n48.index[byte] = next as u8;
                        n48.children[next] = Some(child);
                        next += 1;
                    }
                }
                n48.count = next as u8;
                Node::Node48(n48)
            }
            other => other,
        };
    }
}

/// Index of the first byte where `node`'s prefix and `key[depth..]` disagree,
/// or the full prefix length on a complete match.
///
/// Every insert and lookup resolves how far a key and a compressed prefix
/// agree before deciding whether to descend, split, or stop. A stored prefix
/// longer than the configured maximum can only arise from a corrupted tree
/// and fails loudly.
pub(crate) fn prefix_mismatch(node: &Node, key: &[u8], depth: usize, max_prefix: usize) -> usize {
    let prefix = node.prefix();
    assert!(
        prefix.len() <= max_prefix,
        "node prefix length {} exceeds the configured maximum {}",
        prefix.len(),
        max_prefix
    );
    prefix
        .iter()
        .zip(key[depth.min(key.len())..].iter())
        .take_while(|(a, b)| a == b)
        .count()
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Node::Leaf(leaf) => f
                .debug_struct("Leaf")
                .field("key", &leaf.key)
                .field("row_ids", &leaf.row_ids)
                .finish(),
            branch => f
                .debug_struct(&format!("{:?}", branch.kind()))
                .field("prefix", &branch.prefix())
                .field("children", &branch.child_count())
                .finish(),
        }
    }
}
