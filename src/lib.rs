//! # lsm-memtable
//!
//! The in-memory mutable index of an **LSM-tree storage engine**: an
//! ordered multi-version write buffer ("memtable") and its
//! snapshot-consistent iterator. The memtable buffers the most recent
//! writes of a single index partition; flushed memtables are merged into
//! on-disk runs by an external compaction subsystem.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────┐
//! │                    Memtable                           │
//! │  ┌─────────────────────────────┐  ┌────────────────┐  │
//! │  │  Block tree                 │  │  Region ledger │  │
//! │  │  (user key ASC,             │──│  16 KiB extents│  │
//! │  │   version DESC)             │  │  tagged, bulk  │  │
//! │  └──────────────┬──────────────┘  │  release       │  │
//! │                 │                 └────────────────┘  │
//! │   version counter (bumped per insert)                 │
//! └─────────────────┼─────────────────────────────────────┘
//!                   │ watched for drift
//!         ┌─────────┴──────────┐
//!         │  MemtableIterator  │  next_key / next_version / restore
//!         │  view version ≤ V  │  (MVCC snapshot read)
//!         └────────────────────┘
//! ```
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`record`] | Immutable versioned records, key model, comparators |
//! | [`region`] | Extent budget ledger with version tags and bulk release |
//! | [`tree`] | Ordered block container with bidirectional positions |
//! | [`memtable`] | The multi-version write buffer and its cursor |
//! | [`iterator`] | The iterator capability set shared by all cursors |
//!
//! ## Key Properties
//!
//! - **Multi-version order** — records sort by user key ascending, then
//!   version *descending*: the newest record of a key is reached first.
//! - **Snapshot reads** — a cursor carries a view version; records newer
//!   than the view are invisible, older readers are never disturbed by
//!   concurrent inserts.
//! - **Dangling-cursor safety** — writers bump a version counter on every
//!   insert; cursors detect the bump, re-anchor by exact search, and
//!   `restore` picks up newly inserted records the scan would otherwise
//!   have missed.
//! - **Bulk reclamation** — tree extents are charged to a version-tagged
//!   region ledger and retired in whole tag ranges after flush, never one
//!   by one.
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use std::sync::atomic::AtomicU64;
//!
//! use lsm_memtable::iterator::{IteratorType, RecordIterator};
//! use lsm_memtable::memtable::iterator::MemtableIterator;
//! use lsm_memtable::memtable::Memtable;
//! use lsm_memtable::record::{Field, FieldType, KeyDef, Record, RecordFormat};
//! use lsm_memtable::region::Region;
//!
//! let key_def = Arc::new(KeyDef::new(vec![FieldType::Unsigned]));
//! let format = Arc::new(RecordFormat::for_key_def(&key_def));
//! let region = Arc::new(Region::new());
//! let alloc_tag = Arc::new(AtomicU64::new(1));
//!
//! let mem = Arc::new(Memtable::new(
//!     key_def,
//!     Arc::clone(&format),
//!     region,
//!     alloc_tag,
//! ));
//!
//! // Three writes to one key, versions 3, 7, 10.
//! for version in [3, 7, 10] {
//!     let rec = Record::new(
//!         &format,
//!         vec![Field::Unsigned(42)],
//!         version,
//!         b"payload".to_vec(),
//!     )
//!     .unwrap();
//!     mem.insert(&rec, mem.current_alloc_tag()).unwrap();
//! }
//!
//! // A reader at view version 8 sees version 7 as the newest visible.
//! let view = Arc::new(AtomicU64::new(8));
//! let key = Record::new(&format, vec![Field::Unsigned(42)], 0, Vec::new()).unwrap();
//! let mut cursor = MemtableIterator::open(Arc::clone(&mem), IteratorType::Ge, key, view);
//!
//! let hit = cursor.next_key().unwrap().unwrap();
//! assert_eq!(hit.version(), 7);
//! ```

pub mod iterator;
pub mod memtable;
pub mod record;
pub mod region;
pub mod tree;
