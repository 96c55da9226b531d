//! # Memtable Module
//!
//! The mutable in-memory index of one LSM partition: an ordered
//! multi-version buffer of the most recent writes, keyed by
//! `(user key, version)`. Flushed memtables are merged into on-disk runs
//! by an external compaction subsystem; the memtable itself is volatile.
//!
//! ## Design Invariants
//!
//! - Records are ordered by user key ascending, then version
//!   **descending** — for one key, the newest record comes first, forming
//!   the duplicate chain consistent reads walk.
//! - Records are immutable and never removed individually; the whole
//!   memtable is dropped after flush and its extents retired in bulk.
//! - Every successful insert bumps the 32-bit `version` counter. Readers
//!   holding cursors detect the bump and re-anchor locally
//!   (see [`iterator::MemtableIterator`]).
//! - `min_version` tracks the smallest record version ever inserted,
//!   `used` the total byte size of stored records.
//! - A frozen memtable rejects inserts but remains readable. Which
//!   frozen/dirty registries a memtable is threaded into is the owning
//!   scheduler's business, not the memtable's.
//!
//! ## Concurrency
//!
//! A partition is served by one cooperative worker task at a time, but an
//! arbitrary number of inserts may land between two consecutive reader
//! calls. State lives behind an `RwLock` held only within a single call;
//! no guard ever crosses a call boundary.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

pub mod iterator;

use std::cmp::Ordering;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering as AtomicOrdering};
use std::sync::{Arc, RwLock};

use thiserror::Error;
use tracing::{info, trace};

use crate::record::{
    compare, compare_with_key, KeyDef, KeyFmt, LookupKey, Record, RecordFormat, RecordRef,
};
use crate::region::{Region, RegionError};
use crate::tree::{BlockTree, TreeOrder};

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`Memtable`] operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum MemtableError {
    /// Extent allocation failed in the region ledger.
    #[error("region error: {0}")]
    Region(#[from] RegionError),

    /// The memtable was frozen by its scheduler and no longer accepts
    /// inserts.
    #[error("memtable is frozen")]
    Frozen,

    /// Internal invariant violation (poisoned lock).
    #[error("internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Tree Ordering
// ------------------------------------------------------------------------------------------------

/// Comparator context binding the key definition and record format to the
/// tree: user key ascending, version descending; lookup keys may carry the
/// ignore-version sentinel.
pub(crate) struct RecordOrder {
    key_def: Arc<KeyDef>,
    format: Arc<RecordFormat>,
}

impl TreeOrder for RecordOrder {
    type Elem = RecordRef;
    type Key = LookupKey;

    fn cmp_elem(&self, a: &RecordRef, b: &RecordRef) -> Ordering {
        let ord = compare(a, b, &self.format, &self.key_def);
        if ord != Ordering::Equal {
            return ord;
        }
        // Descending version order: newer sorts first.
        b.version().cmp(&a.version())
    }

    fn cmp_key(&self, elem: &RecordRef, key: &LookupKey) -> Ordering {
        compare_with_key(elem, key, &self.format, &self.key_def)
    }
}

// ------------------------------------------------------------------------------------------------
// Memtable Core
// ------------------------------------------------------------------------------------------------

/// Shared state behind the memtable's lock.
struct MemtableInner {
    /// Ordered multi-version record container.
    tree: BlockTree<RecordOrder>,
    /// Total byte size of stored records.
    used: usize,
    /// Smallest version of any contained record; `u64::MAX` when empty.
    min_version: u64,
}

/// The ordered multi-version write buffer of one index partition.
pub struct Memtable {
    inner: RwLock<MemtableInner>,
    /// Bumped on every successful insert; cursors watch it for drift.
    version: AtomicU32,
    frozen: AtomicBool,
    key_def: Arc<KeyDef>,
    format: Arc<RecordFormat>,
    region: Arc<Region>,
    /// Current version tag for extent charges, updated externally.
    alloc_tag: Arc<AtomicU64>,
}

impl Memtable {
    /// Create an empty memtable for the given index key definition.
    ///
    /// `region` is the shared extent ledger; `alloc_tag` is the shared
    /// cell holding the version tag under which new extents are charged.
    pub fn new(
        key_def: Arc<KeyDef>,
        format: Arc<RecordFormat>,
        region: Arc<Region>,
        alloc_tag: Arc<AtomicU64>,
    ) -> Self {
        let order = RecordOrder {
            key_def: Arc::clone(&key_def),
            format: Arc::clone(&format),
        };
        Self {
            inner: RwLock::new(MemtableInner {
                tree: BlockTree::new(order, Arc::clone(&region)),
                used: 0,
                min_version: u64::MAX,
            }),
            version: AtomicU32::new(0),
            frozen: AtomicBool::new(false),
            key_def,
            format,
            region,
            alloc_tag,
        }
    }

    /// Insert a record, charging any tree extent allocation to
    /// `alloc_tag`.
    ///
    /// On success `used` grows by the record size, `min_version` is
    /// lowered if the record's version is the smallest seen, and the
    /// memtable version counter is bumped. On extent-charge failure the
    /// tree is unchanged and no counter moves.
    pub fn insert(&self, record: &RecordRef, alloc_tag: u64) -> Result<(), MemtableError> {
        if self.frozen.load(AtomicOrdering::SeqCst) {
            return Err(MemtableError::Frozen);
        }

        trace!(
            version = record.version(),
            key = %KeyFmt(record.key()),
            "memtable insert"
        );

        let mut inner = self
            .inner
            .write()
            .map_err(|_| MemtableError::Internal("memtable lock poisoned".into()))?;

        inner.tree.insert(Arc::clone(record), alloc_tag)?;
        inner.used += record.size();
        if record.version() < inner.min_version {
            inner.min_version = record.version();
        }
        self.version.fetch_add(1, AtomicOrdering::SeqCst);
        Ok(())
    }

    /// The record with the same user key as `record` and the next smaller
    /// version, or `None` if no older version exists.
    pub fn older_version(&self, record: &RecordRef) -> Result<Option<RecordRef>, MemtableError> {
        if record.version() == 0 {
            return Ok(None);
        }

        let inner = self
            .inner
            .read()
            .map_err(|_| MemtableError::Internal("memtable lock poisoned".into()))?;

        let key = LookupKey::new(Arc::clone(record), record.version() - 1);
        let (pos, _) = inner.tree.lower_bound(&key);
        match inner.tree.get(pos) {
            Some(found)
                if compare(found, record, &self.format, &self.key_def) == Ordering::Equal =>
            {
                Ok(Some(Arc::clone(found)))
            }
            _ => Ok(None),
        }
    }

    /// Stop accepting inserts. The memtable remains readable.
    pub fn freeze(&self) {
        info!(
            version = self.version.load(AtomicOrdering::SeqCst),
            "memtable frozen"
        );
        self.frozen.store(true, AtomicOrdering::SeqCst);
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.load(AtomicOrdering::SeqCst)
    }

    /// Monotonic insert counter, watched by cursors for drift.
    pub fn version(&self) -> u32 {
        self.version.load(AtomicOrdering::SeqCst)
    }

    /// Total byte size of stored records.
    pub fn used(&self) -> usize {
        self.read_inner(|inner| inner.used)
    }

    /// Smallest version of any contained record; `u64::MAX` when empty.
    pub fn min_version(&self) -> u64 {
        self.read_inner(|inner| inner.min_version)
    }

    /// Number of stored records (all versions counted).
    pub fn len(&self) -> usize {
        self.read_inner(|inner| inner.tree.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The version tag extents are currently charged under.
    pub fn current_alloc_tag(&self) -> u64 {
        self.alloc_tag.load(AtomicOrdering::SeqCst)
    }

    pub fn key_def(&self) -> &Arc<KeyDef> {
        &self.key_def
    }

    pub fn format(&self) -> &Arc<RecordFormat> {
        &self.format
    }

    pub fn region(&self) -> &Arc<Region> {
        &self.region
    }

    fn read_inner<T>(&self, f: impl FnOnce(&MemtableInner) -> T) -> T {
        match self.inner.read() {
            Ok(inner) => f(&inner),
            Err(poisoned) => f(&poisoned.into_inner()),
        }
    }

    /// User-key comparison under this memtable's key definition.
    pub(crate) fn compare_records(&self, a: &Record, b: &Record) -> Ordering {
        compare(a, b, &self.format, &self.key_def)
    }
}
