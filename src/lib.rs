//! # artindex - Adaptive Radix Tree Row Index
//!
//! An in-memory, order-preserving index over binary-comparable keys, mapping
//! each key to one or more row identifiers.
//!
//! ## Features
//!
//! - **Adaptive nodes**: branches pick among four layouts (4/16/48/256
//!   children) as fanout changes, growing and shrinking in place
//! - **Path compression**: shared key bytes stored once per branch
//! - **Order-preserving keys**: integers, floats, and byte strings encode so
//!   byte-wise comparison matches logical order
//! - **Duplicates**: equal keys share one leaf with a sorted row-id set
//! - **Range scans**: lazy ascending-order iteration between two keys
//!
//! ## Architecture
//!
//! [`Art`] is the tree itself: single-writer, no internal synchronization.
//! [`ArtIndex`] wraps it in a lock so mutations are serialized and lookups
//! can share access, which is the concurrency contract the tree requires.
//!
//! ## Example
//!
//! ```rust
//! use artindex::{ArtIndex, RowId};
//!
//! let index = ArtIndex::new();
//! index.insert(42i64, RowId(7)).unwrap();
//! index.insert(-3i64, RowId(8)).unwrap();
//!
//! assert_eq!(index.search(42i64), vec![RowId(7)]);
//!
//! // Ascending key order: -3 sorts before 42.
//! assert_eq!(
//!     index.scan(i64::MIN, i64::MAX, true, true),
//!     vec![RowId(8), RowId(7)]
//! );
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod art;
pub mod key;

pub use art::{Art, InsertError, NodeKind, Scan};
pub use key::{ArtKey, KeyEncode};

use std::sync::atomic::{AtomicUsize, Ordering};

use parking_lot::RwLock;

/// An opaque reference to one data row, stored at the leaves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RowId(pub u64);

/// Configuration for an index.
#[derive(Debug, Clone)]
pub struct IndexConfig {
    /// Maximum number of compressed-prefix bytes stored inline per node.
    /// Longer shared prefixes are laid out as chains of nodes.
    pub max_prefix: usize,
    /// Whether inserts of an already-present key are rejected.
    pub unique: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            max_prefix: 8,
            unique: false,
        }
    }
}

/// A concurrency-safe wrapper around [`Art`].
///
/// Structural mutation requires exclusive access (see the tree's
/// single-writer contract), so every mutating call takes the write lock;
/// lookups and scans share the read lock. Scans materialize their results
/// because the lazy iterator cannot outlive the lock guard — callers that
/// manage their own synchronization can use [`Art::scan`] directly.
pub struct ArtIndex {
    inner: RwLock<Art>,
    len: AtomicUsize,
}

impl ArtIndex {
    /// Create an empty index with the default configuration.
    pub fn new() -> Self {
        Self::with_config(IndexConfig::default())
    }

    /// Create an empty index with the given configuration.
    pub fn with_config(config: IndexConfig) -> Self {
        Self {
            inner: RwLock::new(Art::with_config(config)),
            len: AtomicUsize::new(0),
        }
    }

    /// Insert a (value, row id) entry.
    ///
    /// Returns whether a new entry was added, or
    /// [`InsertError::DuplicateKey`] on a unique index.
    pub fn insert<T: KeyEncode>(&self, value: T, row_id: RowId) -> Result<bool, InsertError> {
        let key = ArtKey::encode(value);
        let mut inner = self.inner.write();
        let added = inner.insert(&key, row_id)?;
        if added {
            self.len.fetch_add(1, Ordering::Relaxed);
        }
        Ok(added)
    }

    /// Remove a (value, row id) entry. Returns whether it was found.
    pub fn erase<T: KeyEncode>(&self, value: T, row_id: RowId) -> bool {
        let key = ArtKey::encode(value);
        let mut inner = self.inner.write();
        let found = inner.erase(&key, row_id);
        if found {
            self.len.fetch_sub(1, Ordering::Relaxed);
        }
        found
    }

    /// Look up a value. Returns the ordered set of row ids, empty on a miss.
    pub fn search<T: KeyEncode>(&self, value: T) -> Vec<RowId> {
        let key = ArtKey::encode(value);
        let inner = self.inner.read();
        inner.search(&key).to_vec()
    }

    /// Collect row ids for values within `[low, high]`, honoring the
    /// inclusive flags, in ascending key order.
    pub fn scan<L: KeyEncode, H: KeyEncode>(
        &self,
        low: L,
        high: H,
        low_inclusive: bool,
        high_inclusive: bool,
    ) -> Vec<RowId> {
        let low = ArtKey::encode(low);
        let high = ArtKey::encode(high);
        let inner = self.inner.read();
        inner
            .scan(&low, &high, low_inclusive, high_inclusive)
            .collect()
    }

    /// Number of live (key, row id) entries.
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Relaxed)
    }

    /// Whether the index holds no entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for ArtIndex {
    fn default() -> Self {
        Self::new()
    }
}
