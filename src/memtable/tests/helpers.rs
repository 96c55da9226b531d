//! Shared helpers for memtable tests.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;

use tracing::Level;
use tracing_subscriber::fmt::Subscriber;

use crate::iterator::IteratorType;
use crate::memtable::iterator::MemtableIterator;
use crate::memtable::Memtable;
use crate::record::{Field, FieldType, KeyDef, Record, RecordFormat, RecordRef};
use crate::region::Region;

pub fn init_tracing() {
    let _ = Subscriber::builder()
        .with_max_level(Level::TRACE)
        .try_init();
}

/// Memtable over a single unsigned key field, backed by `region`.
pub fn unsigned_memtable_with(region: Arc<Region>) -> (Arc<RecordFormat>, Arc<Memtable>) {
    let key_def = Arc::new(KeyDef::new(vec![FieldType::Unsigned]));
    let format = Arc::new(RecordFormat::for_key_def(&key_def));
    let alloc_tag = Arc::new(AtomicU64::new(1));
    let mem = Arc::new(Memtable::new(
        key_def,
        Arc::clone(&format),
        region,
        alloc_tag,
    ));
    (format, mem)
}

/// Memtable over a single unsigned key field with an unbounded region.
pub fn unsigned_memtable() -> (Arc<RecordFormat>, Arc<Memtable>) {
    unsigned_memtable_with(Arc::new(Region::new()))
}

/// Record with a single unsigned key field and a small payload.
pub fn rec(format: &RecordFormat, key: u64, version: u64) -> RecordRef {
    Record::new(
        format,
        vec![Field::Unsigned(key)],
        version,
        format!("k{key}-v{version}").into_bytes(),
    )
    .expect("valid record")
}

/// Insert a (key, version) record and return its handle.
pub fn put(mem: &Memtable, format: &RecordFormat, key: u64, version: u64) -> RecordRef {
    let record = rec(format, key, version);
    mem.insert(&record, mem.current_alloc_tag()).expect("insert");
    record
}

/// Search key with a single unsigned field.
pub fn search_key(format: &RecordFormat, key: u64) -> RecordRef {
    Record::new(format, vec![Field::Unsigned(key)], 0, Vec::new()).expect("valid key")
}

/// Zero-field search key: scans the whole memtable.
pub fn empty_key(format: &RecordFormat) -> RecordRef {
    Record::new(format, Vec::new(), 0, Vec::new()).expect("valid key")
}

/// Shared view-version cell.
pub fn view(v: u64) -> Arc<AtomicU64> {
    Arc::new(AtomicU64::new(v))
}

pub fn open(
    mem: &Arc<Memtable>,
    iterator_type: IteratorType,
    key: RecordRef,
    view: Arc<AtomicU64>,
) -> MemtableIterator {
    MemtableIterator::open(Arc::clone(mem), iterator_type, key, view)
}

/// Assert a yielded record carries the expected key and version.
pub fn assert_yield(yielded: Option<RecordRef>, key: u64, version: u64) {
    let record = yielded.expect("expected a record, got end of stream");
    assert_eq!(record.key(), &[Field::Unsigned(key)]);
    assert_eq!(record.version(), version);
}
