//! # Region Module
//!
//! A log-structured extent budget for tree node storage.
//!
//! The region hands out extent grants tagged with a monotonic version
//! tag and reclaims them **in bulk** when a tag range is retired — the
//! allocation pattern of an LSM memtable, whose node storage only ever
//! grows until the whole table is flushed and dropped.
//!
//! ## Design Invariants
//!
//! - Grants are recorded under the version tag supplied at allocation
//!   time; tags are monotonically non-decreasing.
//! - There is no per-extent free. [`Region::release`] retires every grant
//!   with a tag at or below the given one.
//! - An optional quota bounds total outstanding bytes; exceeding it fails
//!   the allocation with a typed error and no state change.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::collections::BTreeMap;
use std::sync::Mutex;

use thiserror::Error;
use tracing::trace;

// ------------------------------------------------------------------------------------------------
// Error Types
// ------------------------------------------------------------------------------------------------

/// Errors returned by [`Region`] operations.
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum RegionError {
    /// The allocation would exceed the region quota.
    #[error("region out of memory: requested {requested} bytes, used {used} of {quota}")]
    OutOfMemory {
        requested: usize,
        used: usize,
        quota: usize,
    },

    /// Internal invariant violation (poisoned lock).
    #[error("region internal error: {0}")]
    Internal(String),
}

// ------------------------------------------------------------------------------------------------
// Region
// ------------------------------------------------------------------------------------------------

/// Extent budget ledger with version-tagged grants and bulk release.
///
/// Shared between the memtables of a partition; all methods take `&self`.
pub struct Region {
    inner: Mutex<RegionInner>,
    quota: Option<usize>,
}

struct RegionInner {
    /// Outstanding bytes per version tag.
    grants: BTreeMap<u64, usize>,
    /// Total outstanding bytes.
    used: usize,
}

impl Region {
    /// Create an unbounded region.
    pub fn new() -> Self {
        Self::with_limit(None)
    }

    /// Create a region with a byte quota; allocations beyond it fail with
    /// [`RegionError::OutOfMemory`].
    pub fn with_quota(quota: usize) -> Self {
        Self::with_limit(Some(quota))
    }

    fn with_limit(quota: Option<usize>) -> Self {
        Self {
            inner: Mutex::new(RegionInner {
                grants: BTreeMap::new(),
                used: 0,
            }),
            quota,
        }
    }

    /// Record a grant of `size` bytes under `tag`.
    pub fn alloc(&self, size: usize, tag: u64) -> Result<(), RegionError> {
        let mut inner = self
            .inner
            .lock()
            .map_err(|_| RegionError::Internal("region lock poisoned".into()))?;

        if let Some(quota) = self.quota {
            if inner.used + size > quota {
                return Err(RegionError::OutOfMemory {
                    requested: size,
                    used: inner.used,
                    quota,
                });
            }
        }

        *inner.grants.entry(tag).or_insert(0) += size;
        inner.used += size;

        trace!(size, tag, used = inner.used, "region grant");
        Ok(())
    }

    /// Retire every grant with a tag at or below `max_tag`.
    ///
    /// Returns the number of bytes released.
    pub fn release(&self, max_tag: u64) -> usize {
        let mut inner = match self.inner.lock() {
            Ok(inner) => inner,
            Err(poisoned) => poisoned.into_inner(),
        };

        let kept = inner.grants.split_off(&(max_tag.saturating_add(1)));
        let released: usize = inner.grants.values().sum();
        inner.grants = kept;
        inner.used -= released;

        trace!(max_tag, released, used = inner.used, "region release");
        released
    }

    /// Total outstanding bytes.
    pub fn used(&self) -> usize {
        match self.inner.lock() {
            Ok(inner) => inner.used,
            Err(poisoned) => poisoned.into_inner().used,
        }
    }
}

impl Default for Region {
    fn default() -> Self {
        Self::new()
    }
}
