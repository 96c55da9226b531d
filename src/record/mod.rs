//! # Record Module
//!
//! Records are the immutable, reference-counted entities stored by the
//! memtable. Each record carries a user key (an ordered tuple of fields),
//! a 64-bit version (LSN), and an opaque payload.
//!
//! ## Design Invariants
//!
//! - Records are immutable once constructed; handles are shared via `Arc`.
//! - The index orders records by user key ascending, then version
//!   **descending** — for one key, the newest record comes first.
//! - A record may carry a *prefix* of the index key (including zero
//!   fields) when it is used as a search key; comparison then covers only
//!   the common field count.
//! - Two records with equal user key and equal version never coexist in
//!   one memtable: versions are assigned monotonically by a single writer.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------


// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned when constructing a [`Record`] against a [`RecordFormat`].
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RecordError {
    /// A key field's type does not match the format.
    #[error("key field {index} has type {actual:?}, format expects {expected:?}")]
    KeyTypeMismatch {
        index: usize,
        expected: FieldType,
        actual: FieldType,
    },

    /// More key fields were supplied than the format defines.
    #[error("key has {given} fields, format defines {max}")]
    TooManyFields { given: usize, max: usize },
}

// ------------------------------------------------------------------------------------------------
// Key Model
// ------------------------------------------------------------------------------------------------

/// Type of a single key field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    /// Unsigned 64-bit integer field.
    Unsigned,
    /// Variable-length byte string field.
    Bytes,
}

/// A single key field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Field {
    Unsigned(u64),
    Bytes(Vec<u8>),
}

impl Field {
    /// The type tag of this field value.
    pub fn field_type(&self) -> FieldType {
        match self {
            Field::Unsigned(_) => FieldType::Unsigned,
            Field::Bytes(_) => FieldType::Bytes,
        }
    }

    /// In-memory footprint of this field, for size accounting.
    fn size(&self) -> usize {
        match self {
            Field::Unsigned(_) => std::mem::size_of::<u64>(),
            Field::Bytes(b) => b.len(),
        }
    }
}

/// Definition of an index key: the ordered types of its fields.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyDef {
    parts: Box<[FieldType]>,
}

impl KeyDef {
    pub fn new(parts: Vec<FieldType>) -> Self {
        Self {
            parts: parts.into_boxed_slice(),
        }
    }

    /// Number of fields in the index key.
    pub fn part_count(&self) -> usize {
        self.parts.len()
    }

    /// Field types of the index key.
    pub fn parts(&self) -> &[FieldType] {
        &self.parts
    }
}

/// Field layout that records of an index must follow.
///
/// Derived from the index key definition; key fields must match the
/// definition's types, the payload is opaque.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordFormat {
    key_types: Box<[FieldType]>,
}

impl RecordFormat {
    /// Build the record format for an index key definition.
    pub fn for_key_def(key_def: &KeyDef) -> Self {
        Self {
            key_types: key_def.parts().into(),
        }
    }

    /// Validate key fields against this format.
    ///
    /// Prefix keys (fewer fields than the format defines, down to zero)
    /// are accepted; they act as search keys.
    fn validate(&self, key: &[Field]) -> Result<(), RecordError> {
        if key.len() > self.key_types.len() {
            return Err(RecordError::TooManyFields {
                given: key.len(),
                max: self.key_types.len(),
            });
        }
        for (index, field) in key.iter().enumerate() {
            let expected = self.key_types[index];
            if field.field_type() != expected {
                return Err(RecordError::KeyTypeMismatch {
                    index,
                    expected,
                    actual: field.field_type(),
                });
            }
        }
        Ok(())
    }
}

// ------------------------------------------------------------------------------------------------
// Record
// ------------------------------------------------------------------------------------------------

/// Shared handle to an immutable [`Record`].
///
/// Cloning the handle is the duplicate operation; dropping it is the
/// release operation.
pub type RecordRef = Arc<Record>;

/// An immutable versioned record.
#[derive(Debug, PartialEq, Eq)]
pub struct Record {
    key: Box<[Field]>,
    version: u64,
    payload: Box<[u8]>,
}

impl Record {
    /// Construct a record, validating the key against `format`.
    pub fn new(
        format: &RecordFormat,
        key: Vec<Field>,
        version: u64,
        payload: Vec<u8>,
    ) -> Result<RecordRef, RecordError> {
        format.validate(&key)?;
        Ok(Arc::new(Record {
            key: key.into_boxed_slice(),
            version,
            payload: payload.into_boxed_slice(),
        }))
    }

    /// Key fields of this record.
    pub fn key(&self) -> &[Field] {
        &self.key
    }

    /// Number of key fields this record carries (may be a prefix of the
    /// index key, or zero for a full-scan search key).
    pub fn part_count(&self) -> usize {
        self.key.len()
    }

    /// Version (LSN) of the write that produced this record.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Opaque payload bytes.
    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    /// Byte footprint of this record, for memtable size accounting.
    pub fn size(&self) -> usize {
        std::mem::size_of::<Record>()
            + self.key.iter().map(Field::size).sum::<usize>()
            + self.payload.len()
    }
}

// ------------------------------------------------------------------------------------------------
// Comparators
// ------------------------------------------------------------------------------------------------

/// Sentinel version meaning "ignore the version field; match all versions
/// of this key" in a [`LookupKey`].
pub const IGNORE_VERSION: u64 = u64::MAX - 1;

/// A synthetic `{record, version}` pair used to position in the tree.
#[derive(Debug, Clone)]
pub struct LookupKey {
    pub record: RecordRef,
    pub version: u64,
}

impl LookupKey {
    pub fn new(record: RecordRef, version: u64) -> Self {
        Self { record, version }
    }

    /// Lookup key matching every version of `record`'s user key.
    pub fn any_version(record: RecordRef) -> Self {
        Self {
            record,
            version: IGNORE_VERSION,
        }
    }
}

fn cmp_field(a: &Field, b: &Field) -> Ordering {
    match (a, b) {
        (Field::Unsigned(x), Field::Unsigned(y)) => x.cmp(y),
        (Field::Bytes(x), Field::Bytes(y)) => x.cmp(y),
        // Mixed types violate the format; order deterministically anyway.
        (Field::Unsigned(_), Field::Bytes(_)) => Ordering::Less,
        (Field::Bytes(_), Field::Unsigned(_)) => Ordering::Greater,
    }
}

/// Compare two records by user key only, over the common field count.
///
/// Prefix keys compare equal to any record they prefix; a zero-field key
/// compares equal to everything.
pub fn compare(a: &Record, b: &Record, _format: &RecordFormat, key_def: &KeyDef) -> Ordering {
    let n = key_def
        .part_count()
        .min(a.part_count())
        .min(b.part_count());
    for i in 0..n {
        let ord = cmp_field(&a.key[i], &b.key[i]);
        if ord != Ordering::Equal {
            return ord;
        }
    }
    Ordering::Equal
}

/// Compare a stored record against a lookup key.
///
/// User key ascending first; on equal keys, versions compare in
/// **descending** order (a larger version sorts as less), unless the
/// lookup carries [`IGNORE_VERSION`], which collapses the version
/// dimension.
pub fn compare_with_key(
    elem: &Record,
    key: &LookupKey,
    format: &RecordFormat,
    key_def: &KeyDef,
) -> Ordering {
    let ord = compare(elem, &key.record, format, key_def);
    if ord != Ordering::Equal {
        return ord;
    }
    if key.version == IGNORE_VERSION {
        return Ordering::Equal;
    }
    // Descending version order: newer sorts first.
    key.version.cmp(&elem.version)
}

// ------------------------------------------------------------------------------------------------
// Tracing Helper
// ------------------------------------------------------------------------------------------------

/// Bounded display formatter for record keys, for tracing output.
pub(crate) struct KeyFmt<'a>(pub &'a [Field]);

impl fmt::Display for KeyFmt<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[")?;
        for (i, field) in self.0.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            match field {
                Field::Unsigned(v) => write!(f, "{v}")?,
                Field::Bytes(b) if b.len() <= 16 => {
                    for byte in b.iter() {
                        write!(f, "{byte:02x}")?;
                    }
                }
                Field::Bytes(b) => {
                    for byte in &b[..8] {
                        write!(f, "{byte:02x}")?;
                    }
                    write!(f, "...[{} bytes]", b.len())?;
                }
            }
        }
        write!(f, "]")
    }
}
