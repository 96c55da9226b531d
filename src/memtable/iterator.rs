//! Snapshot-consistent cursor over a [`Memtable`].
//!
//! Yields records based on an initial search key, an iteration order, and
//! a view version: every record with a version above the view is skipped.
//! The result set spans two dimensions — `next_key` switches to the
//! newest visible record of the next distinct user key in the scan
//! direction, `next_version` to an older record of the same key.
//!
//! Between any two calls the memtable may have absorbed inserts. The
//! cursor watches the memtable version counter: on drift it re-anchors
//! its position by exact search (records are immutable and never
//! removed, so the anchor record is always still there), and `restore`
//! additionally scans for newly inserted records the cursor would have
//! legitimately yielded first had they existed at open time.

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::cmp::Ordering;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use std::sync::Arc;

use tracing::{debug, trace};

use super::{Memtable, MemtableError, MemtableInner};
use crate::iterator::{IteratorType, RecordIterator, Restore};
use crate::record::{KeyFmt, LookupKey, RecordRef};
use crate::tree::TreePos;

// ------------------------------------------------------------------------------------------------
// Iterator State
// ------------------------------------------------------------------------------------------------

/// A stateful, bidirectional cursor over one memtable.
///
/// Borrows the memtable, the search key, and the reader's view-version
/// cell for its lifetime. Closing is dropping: the retained copy of the
/// last yielded record is released with the cursor.
pub struct MemtableIterator {
    mem: Arc<Memtable>,

    /// Direction, start position, and stop criteria. A zero-field key
    /// normalizes LT to LE and GT/EQ to GE at open time.
    iterator_type: IteratorType,
    /// The opened key; may carry a prefix of the index key, or no fields
    /// at all for a full scan.
    key: RecordRef,
    /// The reader's snapshot bound: only records with a version at or
    /// below the cell's current value are visible.
    view_version: Arc<AtomicU64>,

    /// Current position in the tree. After interleaved inserts it may no
    /// longer address `curr_stmt`; the version-drift check repairs it.
    curr_pos: TreePos,
    /// The record the cursor logically stands on. There is no guarantee
    /// `curr_pos` still points at it until the drift check has run.
    curr_stmt: Option<RecordRef>,
    /// Owned copy of the record returned from the most recent public
    /// call; keeps the caller's handle valid across memtable activity.
    last_stmt: Option<RecordRef>,
    /// Memtable version observed at the most recent anchoring.
    version: u32,

    /// False until the first advancing or restoring call.
    search_started: bool,
}

impl MemtableIterator {
    /// Open a cursor. `key` with zero fields scans the whole memtable;
    /// the direction then normalizes to GE (forward) or LE (backward).
    pub fn open(
        mem: Arc<Memtable>,
        iterator_type: IteratorType,
        key: RecordRef,
        view_version: Arc<AtomicU64>,
    ) -> Self {
        let iterator_type = if key.part_count() == 0 {
            if iterator_type.is_backward() {
                IteratorType::Le
            } else {
                IteratorType::Ge
            }
        } else {
            iterator_type
        };

        trace!(
            ?iterator_type,
            key = %KeyFmt(key.key()),
            view = view_version.load(AtomicOrdering::SeqCst),
            "memtable iterator open"
        );

        Self {
            mem,
            iterator_type,
            key,
            view_version,
            curr_pos: TreePos::INVALID,
            curr_stmt: None,
            last_stmt: None,
            version: 0,
            search_started: false,
        }
    }

    // --------------------------------------------------------------------------------------------
    // Support
    // --------------------------------------------------------------------------------------------

    fn view(&self) -> u64 {
        self.view_version.load(AtomicOrdering::SeqCst)
    }

    fn curr(&self) -> &RecordRef {
        self.curr_stmt.as_ref().expect("cursor must hold a record")
    }

    /// Copy the current record out as an owned handle, retaining one copy
    /// so the caller's handle stays valid whatever the memtable does.
    fn copy_out(&mut self) -> RecordRef {
        let dup = Arc::clone(self.curr());
        self.last_stmt = Some(Arc::clone(&dup));
        dup
    }

    /// One step in the scan direction. Returns false at the tree edge,
    /// leaving `curr_stmt` untouched.
    fn step(&mut self, inner: &MemtableInner) -> bool {
        self.curr_pos = if self.iterator_type.is_backward() {
            inner.tree.prev(self.curr_pos)
        } else {
            inner.tree.next(self.curr_pos)
        };
        match inner.tree.get(self.curr_pos) {
            Some(rec) => {
                self.curr_stmt = Some(Arc::clone(rec));
                true
            }
            None => false,
        }
    }

    /// Advance to a record with `version <= view`, direction-aware.
    ///
    /// Entry condition: `curr_pos` addresses `curr_stmt`, positioned at
    /// the direction-first record of a user-key run. Under EQ the search
    /// ends as soon as the user key diverges from the opened key. For
    /// backward scans, afterwards lift the cursor to the newest visible
    /// version of the key: same-key records are newest first in forward
    /// order, so that is the backward-most same-key record still within
    /// the view.
    fn find_visible(&mut self, inner: &MemtableInner) -> bool {
        let view = self.view();

        while self.curr().version() > view {
            let stepped = self.step(inner);
            let diverged = stepped
                && self.iterator_type == IteratorType::Eq
                && self.mem.compare_records(&self.key, self.curr()) != Ordering::Equal;
            if !stepped || diverged {
                self.curr_stmt = None;
                return false;
            }
        }

        if self.iterator_type.is_backward() {
            let mut prev_pos = inner.tree.prev(self.curr_pos);
            while let Some(prev) = inner.tree.get(prev_pos) {
                if prev.version() > view
                    || self.mem.compare_records(self.curr(), prev) != Ordering::Equal
                {
                    break;
                }
                self.curr_stmt = Some(Arc::clone(prev));
                self.curr_pos = prev_pos;
                prev_pos = inner.tree.prev(prev_pos);
            }
        }
        true
    }

    /// First positioning of the cursor.
    fn start(&mut self, inner: &MemtableInner) -> bool {
        debug_assert!(!self.search_started);
        self.search_started = true;
        self.version = self.mem.version();

        if self.key.part_count() > 0 {
            let lookup = LookupKey::any_version(Arc::clone(&self.key));
            match self.iterator_type {
                IteratorType::Eq => {
                    let (pos, exact) = inner.tree.lower_bound(&lookup);
                    self.curr_pos = pos;
                    if !exact {
                        return false;
                    }
                }
                IteratorType::Le | IteratorType::Gt => {
                    self.curr_pos = inner.tree.upper_bound(&lookup);
                }
                IteratorType::Ge | IteratorType::Lt => {
                    self.curr_pos = inner.tree.lower_bound(&lookup).0;
                }
            }
        } else if self.iterator_type == IteratorType::Le {
            self.curr_pos = TreePos::INVALID;
        } else {
            debug_assert_eq!(self.iterator_type, IteratorType::Ge);
            self.curr_pos = inner.tree.first();
        }

        if self.iterator_type.is_backward() {
            // Bounds land one past the scan start; `prev` of the invalid
            // position is the tree tail.
            self.curr_pos = inner.tree.prev(self.curr_pos);
        }
        match inner.tree.get(self.curr_pos) {
            Some(rec) => self.curr_stmt = Some(Arc::clone(rec)),
            None => return false,
        }
        self.find_visible(inner)
    }

    /// Re-anchor `curr_pos` if the memtable version moved since the last
    /// anchoring. The exact search must succeed: records are immutable
    /// and never removed from a memtable.
    fn check_version(&mut self, inner: &MemtableInner) {
        let mem_version = self.mem.version();
        if self.version == mem_version {
            return;
        }
        self.version = mem_version;

        if let Some(elem) = inner.tree.get(self.curr_pos) {
            if Arc::ptr_eq(elem, self.curr()) {
                return;
            }
        }

        let curr = self.curr();
        let lookup = LookupKey::new(Arc::clone(curr), curr.version());
        let (pos, exact) = inner.tree.lower_bound(&lookup);
        debug_assert!(exact, "anchor record must still be present");
        debug!(
            version = mem_version,
            key = %KeyFmt(curr.key()),
            "cursor re-anchored after memtable change"
        );
        self.curr_pos = pos;
    }

    /// Move to the next distinct user key in the scan direction and find
    /// its newest visible version.
    fn next_key_impl(&mut self, inner: &MemtableInner) -> bool {
        if !self.search_started {
            return self.start(inner);
        }
        let Some(prev) = self.curr_stmt.clone() else {
            // End of stream is sticky until a restore intervenes.
            return false;
        };
        self.check_version(inner);

        loop {
            if !self.step(inner) {
                self.curr_stmt = None;
                return false;
            }
            if self.mem.compare_records(&prev, self.curr()) != Ordering::Equal {
                break;
            }
        }

        if self.iterator_type == IteratorType::Eq
            && self.mem.compare_records(&self.key, self.curr()) != Ordering::Equal
        {
            self.curr_stmt = None;
            return false;
        }
        self.find_visible(inner)
    }

    /// Move to the next older record of the current user key, regardless
    /// of the scan direction (older versions sit right after the current
    /// record in forward order). Reports not-found without moving.
    fn next_version_impl(&mut self, inner: &MemtableInner) -> bool {
        if !self.search_started {
            return self.start(inner);
        }
        if self.curr_stmt.is_none() {
            return false;
        }
        self.check_version(inner);

        let next_pos = inner.tree.next(self.curr_pos);
        match inner.tree.get(next_pos) {
            Some(next) if self.mem.compare_records(self.curr(), next) == Ordering::Equal => {
                self.curr_stmt = Some(Arc::clone(next));
                self.curr_pos = next_pos;
                true
            }
            _ => false,
        }
    }

    // --------------------------------------------------------------------------------------------
    // Restore
    // --------------------------------------------------------------------------------------------

    /// Restore before the first search: position from the hint as if it
    /// were the opened key, then skip everything the caller has already
    /// consumed.
    fn restore_unstarted(&mut self, inner: &MemtableInner, hint: Option<&RecordRef>) -> Restore {
        let Some(hint) = hint else {
            let record = self.start(inner).then(|| self.copy_out());
            return Restore::Unchanged(record);
        };
        let hint = Arc::clone(hint);

        // Re-entry is a fresh positioning from the hint, with the type
        // widened so a record equal to the hint can be observed again.
        let saved_type = self.iterator_type;
        let saved_key = Arc::clone(&self.key);
        self.iterator_type = match saved_type {
            IteratorType::Gt | IteratorType::Eq => IteratorType::Ge,
            IteratorType::Lt => IteratorType::Le,
            other => other,
        };
        self.key = Arc::clone(&hint);
        let found = self.start(inner);
        self.iterator_type = saved_type;
        self.key = saved_key;
        if !found {
            return Restore::Unchanged(None);
        }

        let mut position_changed = true;
        if self.mem.compare_records(self.curr(), &hint) == Ordering::Equal {
            position_changed = false;
            if self.curr().version() >= hint.version() {
                // Skip the hint itself and any version the caller has
                // already seen, landing on a strictly older record or the
                // next key.
                loop {
                    if self.next_version_impl(inner) {
                        if self.curr().version() >= hint.version() {
                            continue;
                        }
                        break;
                    }
                    self.next_key_impl(inner);
                    break;
                }
                if self.curr_stmt.is_some() {
                    position_changed = true;
                }
            }
        } else if saved_type == IteratorType::Eq
            && self.mem.compare_records(&self.key, self.curr()) != Ordering::Equal
        {
            // Landing out of the equality range reports as moved with no
            // record; historical contract, kept as-is.
            return Restore::Moved(None);
        }

        let record = self.curr_stmt.is_some().then(|| self.copy_out());
        if position_changed {
            Restore::Moved(record)
        } else {
            Restore::Unchanged(record)
        }
    }

    /// Restore for a forward cursor: walk backward from the current
    /// position and adopt any newly inserted visible record lying between
    /// the hint and the current record in iteration order.
    fn restore_forward(&mut self, inner: &MemtableInner, hint: &RecordRef) -> Restore {
        let view = self.view();
        let mut pos = self.curr_pos;
        let mut moved = false;

        loop {
            pos = inner.tree.prev(pos);
            let Some(t) = inner.tree.get(pos) else { break };
            let ord = self.mem.compare_records(t, hint);
            if ord == Ordering::Less || (ord == Ordering::Equal && t.version() >= hint.version()) {
                break;
            }
            if t.version() <= view {
                let adopted = Arc::clone(t);
                self.curr_pos = pos;
                self.curr_stmt = Some(adopted);
                moved = true;
            }
        }

        let record = Some(self.copy_out());
        if moved {
            Restore::Moved(record)
        } else {
            Restore::Unchanged(record)
        }
    }

    /// Restore for a backward cursor: promote to the newest record of the
    /// current key that is visible and still strictly older than the
    /// hint, so nothing is ever yielded twice.
    fn restore_backward(&mut self, inner: &MemtableInner, hint: &RecordRef) -> Restore {
        let view = self.view();
        let mut pos = self.curr_pos;
        let mut moved = false;

        let break_version = if self.mem.compare_records(self.curr(), hint) == Ordering::Equal {
            hint.version()
        } else {
            view.saturating_add(1)
        };
        loop {
            pos = inner.tree.prev(pos);
            let Some(t) = inner.tree.get(pos) else { break };
            let ord = self.mem.compare_records(t, self.curr());
            debug_assert!(ord != Ordering::Greater);
            if ord == Ordering::Less || t.version() >= break_version {
                break;
            }
            let adopted = Arc::clone(t);
            self.curr_pos = pos;
            self.curr_stmt = Some(adopted);
            moved = true;
        }

        let record = Some(self.copy_out());
        if moved {
            Restore::Moved(record)
        } else {
            Restore::Unchanged(record)
        }
    }
}

// ------------------------------------------------------------------------------------------------
// Capability Implementation
// ------------------------------------------------------------------------------------------------

impl RecordIterator for MemtableIterator {
    type Error = MemtableError;

    fn next_key(&mut self) -> Result<Option<RecordRef>, MemtableError> {
        let mem = Arc::clone(&self.mem);
        let inner = mem
            .inner
            .read()
            .map_err(|_| MemtableError::Internal("memtable lock poisoned".into()))?;

        if self.next_key_impl(&inner) {
            Ok(Some(self.copy_out()))
        } else {
            Ok(None)
        }
    }

    fn next_version(&mut self) -> Result<Option<RecordRef>, MemtableError> {
        let mem = Arc::clone(&self.mem);
        let inner = mem
            .inner
            .read()
            .map_err(|_| MemtableError::Internal("memtable lock poisoned".into()))?;

        if self.next_version_impl(&inner) {
            Ok(Some(self.copy_out()))
        } else {
            Ok(None)
        }
    }

    fn restore(&mut self, hint: Option<&RecordRef>) -> Result<Restore, MemtableError> {
        let mem = Arc::clone(&self.mem);
        let inner = mem
            .inner
            .read()
            .map_err(|_| MemtableError::Internal("memtable lock poisoned".into()))?;
        let inner = &*inner;

        if !self.search_started {
            return Ok(self.restore_unstarted(inner, hint));
        }

        if self.version == self.mem.version() {
            // Nothing changed since the last anchoring; re-yield.
            let record = self.curr_stmt.is_some().then(|| self.copy_out());
            return Ok(Restore::Unchanged(record));
        }

        let Some(hint) = hint.filter(|_| self.curr_stmt.is_some()) else {
            // No reference point to reconcile against: reset and search
            // again from the opened key.
            let was = self.curr_stmt.take();
            self.search_started = false;
            self.start(inner);
            let moved = !same_record(was.as_ref(), self.curr_stmt.as_ref());
            let record = self.curr_stmt.is_some().then(|| self.copy_out());
            return Ok(if moved {
                Restore::Moved(record)
            } else {
                Restore::Unchanged(record)
            });
        };
        let hint = Arc::clone(hint);

        self.check_version(inner);
        if self.iterator_type.is_backward() {
            Ok(self.restore_backward(inner, &hint))
        } else {
            Ok(self.restore_forward(inner, &hint))
        }
    }
}

/// Pointer identity over optional record handles.
fn same_record(a: Option<&RecordRef>, b: Option<&RecordRef>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(x), Some(y)) => Arc::ptr_eq(x, y),
        _ => false,
    }
}
