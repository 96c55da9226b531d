//! # Iterator Module
//!
//! The polymorphic capability set shared by every record iterator of the
//! engine (memtable iterators today; on-disk run and transaction iterators
//! plug into the same surface).
//!
//! All three operations report end-of-stream as a successful `None` — a
//! status of `Ok` alone never distinguishes "found" from "exhausted";
//! callers must inspect the yielded record.

use crate::record::RecordRef;

/// Direction, start position, and stop criteria of a scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IteratorType {
    /// Exactly the opened key, newest visible version first.
    Eq,
    /// Forward from the opened key, inclusive.
    Ge,
    /// Forward from the opened key, exclusive.
    Gt,
    /// Backward from the opened key, inclusive.
    Le,
    /// Backward from the opened key, exclusive.
    Lt,
}

impl IteratorType {
    /// Whether this type scans backward (toward lesser keys).
    pub fn is_backward(self) -> bool {
        matches!(self, IteratorType::Le | IteratorType::Lt)
    }
}

/// Outcome of [`RecordIterator::restore`]: whether the cursor moved, and
/// the record now under it (`None` at end-of-stream).
#[derive(Debug, Clone)]
pub enum Restore {
    /// The cursor still reflects the last yield.
    Unchanged(Option<RecordRef>),
    /// The cursor was re-anchored; the caller must not assume continuity
    /// with the previous yield.
    Moved(Option<RecordRef>),
}

impl Restore {
    pub fn moved(&self) -> bool {
        matches!(self, Restore::Moved(_))
    }

    /// The record under the cursor after the restore.
    pub fn record(&self) -> Option<&RecordRef> {
        match self {
            Restore::Unchanged(r) | Restore::Moved(r) => r.as_ref(),
        }
    }
}

/// A bidirectional, snapshot-consistent record cursor.
///
/// Each yielded handle is an owned copy the caller keeps valid regardless
/// of later writes. Closing is dropping.
pub trait RecordIterator {
    type Error;

    /// Position at the first matching user key, or advance to the next
    /// distinct user key in the scan direction, yielding its newest
    /// visible version. `Ok(None)` at end-of-stream.
    fn next_key(&mut self) -> Result<Option<RecordRef>, Self::Error>;

    /// Advance within the current user key to the next older visible
    /// version. `Ok(None)` when none remains for this key.
    fn next_version(&mut self) -> Result<Option<RecordRef>, Self::Error>;

    /// Re-validate the cursor after arbitrary interleaved activity.
    ///
    /// `hint` is the record the caller believes was last yielded, or
    /// `None` if it has never seen one.
    fn restore(&mut self, hint: Option<&RecordRef>) -> Result<Restore, Self::Error>;
}
