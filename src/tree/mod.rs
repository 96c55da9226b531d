//! # Tree Module
//!
//! An ordered, block-oriented container for record handles, the backing
//! store of the memtable.
//!
//! Elements live in sorted fixed-size blocks linked bidirectionally; a
//! key-ordered chain of block ids supports binary search. Block storage
//! is budgeted against the [`Region`] ledger at extent granularity.
//!
//! ## Design Invariants
//!
//! - Insert-only: elements are never removed before the tree is dropped.
//!   Blocks split but never merge, and block storage never shrinks.
//! - Because blocks are never deallocated, a *stale* [`TreePos`] (taken
//!   before later inserts) is always safe to probe: it resolves to some
//!   element or to none, never to undefined behavior. Callers that cache
//!   positions re-validate them against the element they expect.
//! - The extent charge is the only fallible step of an insert and happens
//!   before any mutation; a failed insert leaves the tree unchanged.
//! - Elements are unique under the ordering; the writer assigns versions
//!   monotonically, so ties cannot occur.

// ------------------------------------------------------------------------------------------------
// Unit tests
// ------------------------------------------------------------------------------------------------

#[cfg(test)]
mod tests;

// ------------------------------------------------------------------------------------------------
// Includes
// ------------------------------------------------------------------------------------------------

use std::cmp::Ordering;
use std::sync::Arc;

use crate::region::{Region, RegionError};

// ------------------------------------------------------------------------------------------------
// Geometry
// ------------------------------------------------------------------------------------------------

/// Size of one region extent serving block storage.
pub const EXTENT_SIZE: usize = 16 * 1024;

/// Byte size of one node block.
pub const BLOCK_SIZE: usize = 512;

const BLOCKS_PER_EXTENT: usize = EXTENT_SIZE / BLOCK_SIZE;

// ------------------------------------------------------------------------------------------------
// Ordering Context
// ------------------------------------------------------------------------------------------------

/// Comparator context for a [`BlockTree`]: element-to-element order and
/// element-to-lookup-key order.
pub trait TreeOrder {
    type Elem;
    type Key;

    fn cmp_elem(&self, a: &Self::Elem, b: &Self::Elem) -> Ordering;
    fn cmp_key(&self, elem: &Self::Elem, key: &Self::Key) -> Ordering;
}

// ------------------------------------------------------------------------------------------------
// Positions
// ------------------------------------------------------------------------------------------------

/// A position in the tree: a block id and a slot within the block.
///
/// Positions are plain values and do not borrow the tree. A position taken
/// before later inserts may no longer address the element it did; probing
/// it with [`BlockTree::get`] is always safe and returns whatever occupies
/// the slot now, or `None`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreePos {
    block: u32,
    slot: u32,
}

impl TreePos {
    /// The invalid position. [`BlockTree::prev`] of it is the last
    /// position in the tree; [`BlockTree::next`] of it stays invalid.
    pub const INVALID: TreePos = TreePos {
        block: u32::MAX,
        slot: u32::MAX,
    };

    pub fn is_invalid(&self) -> bool {
        self.block == u32::MAX
    }
}

// ------------------------------------------------------------------------------------------------
// Block Tree
// ------------------------------------------------------------------------------------------------

struct Block<T> {
    /// Sorted elements; never empty once created.
    elems: Vec<T>,
    prev: Option<u32>,
    next: Option<u32>,
}

/// Ordered block container with bidirectional positions and bounds search.
pub struct BlockTree<O: TreeOrder> {
    order: O,
    /// Block storage; blocks are created on demand and never removed.
    blocks: Vec<Block<O::Elem>>,
    /// Block ids in key order.
    chain: Vec<u32>,
    len: usize,
    region: Arc<Region>,
}

impl<O: TreeOrder> BlockTree<O> {
    pub fn new(order: O, region: Arc<Region>) -> Self {
        Self {
            order,
            blocks: Vec::new(),
            chain: Vec::new(),
            len: 0,
            region,
        }
    }

    /// Elements one block can hold.
    fn block_capacity() -> usize {
        (BLOCK_SIZE / std::mem::size_of::<O::Elem>()).max(2)
    }

    /// Charge the region for a new extent when the block pool has filled
    /// every extent charged so far.
    fn charge_for_new_block(&self, alloc_tag: u64) -> Result<(), RegionError> {
        if self.blocks.len() % BLOCKS_PER_EXTENT == 0 {
            self.region.alloc(EXTENT_SIZE, alloc_tag)?;
        }
        Ok(())
    }

    fn push_block(&mut self, prev: Option<u32>, next: Option<u32>) -> u32 {
        let id = self.blocks.len() as u32;
        self.blocks.push(Block {
            elems: Vec::with_capacity(Self::block_capacity()),
            prev,
            next,
        });
        id
    }

    /// Insert an element, charging any new extent to `alloc_tag`.
    ///
    /// The charge precedes every mutation: on error the tree is unchanged.
    pub fn insert(&mut self, elem: O::Elem, alloc_tag: u64) -> Result<(), RegionError> {
        if self.chain.is_empty() {
            self.charge_for_new_block(alloc_tag)?;
            let id = self.push_block(None, None);
            self.blocks[id as usize].elems.push(elem);
            self.chain.push(id);
            self.len = 1;
            return Ok(());
        }

        // Target block: the first whose greatest element is not below the
        // new one, or the last block when every block tops out below it.
        let chain_idx = self
            .chain
            .partition_point(|&id| {
                let block = &self.blocks[id as usize];
                self.order
                    .cmp_elem(block.elems.last().expect("blocks are never empty"), &elem)
                    == Ordering::Less
            })
            .min(self.chain.len() - 1);
        let block_id = self.chain[chain_idx];

        let slot = self.blocks[block_id as usize]
            .elems
            .partition_point(|e| self.order.cmp_elem(e, &elem) == Ordering::Less);

        debug_assert!(
            self.blocks[block_id as usize]
                .elems
                .get(slot)
                .map_or(true, |e| self.order.cmp_elem(e, &elem) != Ordering::Equal),
            "tie inserted: versions must be unique per user key"
        );

        if self.blocks[block_id as usize].elems.len() < Self::block_capacity() {
            self.blocks[block_id as usize].elems.insert(slot, elem);
            self.len += 1;
            return Ok(());
        }

        // Full block: split, moving the upper half into a fresh block
        // linked right after the old one.
        self.charge_for_new_block(alloc_tag)?;
        let half = Self::block_capacity() / 2;
        let tail = self.blocks[block_id as usize].elems.split_off(half);
        let old_next = self.blocks[block_id as usize].next;
        let new_id = self.push_block(Some(block_id), old_next);
        self.blocks[new_id as usize].elems = tail;
        self.blocks[block_id as usize].next = Some(new_id);
        if let Some(n) = old_next {
            self.blocks[n as usize].prev = Some(new_id);
        }
        self.chain.insert(chain_idx + 1, new_id);

        if slot <= half {
            self.blocks[block_id as usize].elems.insert(slot, elem);
        } else {
            self.blocks[new_id as usize].elems.insert(slot - half, elem);
        }
        self.len += 1;
        Ok(())
    }

    /// First position whose element is not below `key`, with an exact
    /// flag; invalid when every element is below `key`.
    pub fn lower_bound(&self, key: &O::Key) -> (TreePos, bool) {
        let chain_idx = self.chain.partition_point(|&id| {
            let block = &self.blocks[id as usize];
            self.order
                .cmp_key(block.elems.last().expect("blocks are never empty"), key)
                == Ordering::Less
        });
        if chain_idx == self.chain.len() {
            return (TreePos::INVALID, false);
        }
        let block_id = self.chain[chain_idx];
        let block = &self.blocks[block_id as usize];
        let slot = block
            .elems
            .partition_point(|e| self.order.cmp_key(e, key) == Ordering::Less);
        debug_assert!(slot < block.elems.len());
        let exact = self.order.cmp_key(&block.elems[slot], key) == Ordering::Equal;
        (
            TreePos {
                block: block_id,
                slot: slot as u32,
            },
            exact,
        )
    }

    /// First position whose element is above `key`; invalid when no
    /// element is.
    pub fn upper_bound(&self, key: &O::Key) -> TreePos {
        let chain_idx = self.chain.partition_point(|&id| {
            let block = &self.blocks[id as usize];
            self.order
                .cmp_key(block.elems.last().expect("blocks are never empty"), key)
                != Ordering::Greater
        });
        if chain_idx == self.chain.len() {
            return TreePos::INVALID;
        }
        let block_id = self.chain[chain_idx];
        let block = &self.blocks[block_id as usize];
        let slot = block
            .elems
            .partition_point(|e| self.order.cmp_key(e, key) != Ordering::Greater);
        debug_assert!(slot < block.elems.len());
        TreePos {
            block: block_id,
            slot: slot as u32,
        }
    }

    /// Element at `pos`, or `None` when `pos` is invalid or stale past the
    /// end of its block.
    pub fn get(&self, pos: TreePos) -> Option<&O::Elem> {
        if pos.is_invalid() {
            return None;
        }
        self.blocks.get(pos.block as usize)?.elems.get(pos.slot as usize)
    }

    /// Position of the least element; invalid on an empty tree.
    pub fn first(&self) -> TreePos {
        match self.chain.first() {
            Some(&id) => TreePos { block: id, slot: 0 },
            None => TreePos::INVALID,
        }
    }

    /// Position of the greatest element; invalid on an empty tree.
    pub fn last(&self) -> TreePos {
        match self.chain.last() {
            Some(&id) => TreePos {
                block: id,
                slot: (self.blocks[id as usize].elems.len() - 1) as u32,
            },
            None => TreePos::INVALID,
        }
    }

    /// Step forward. `next` of the invalid position stays invalid.
    pub fn next(&self, pos: TreePos) -> TreePos {
        if pos.is_invalid() {
            return TreePos::INVALID;
        }
        let Some(block) = self.blocks.get(pos.block as usize) else {
            return TreePos::INVALID;
        };
        let slot = pos.slot as usize + 1;
        if slot < block.elems.len() {
            return TreePos {
                block: pos.block,
                slot: slot as u32,
            };
        }
        match block.next {
            Some(next) => TreePos {
                block: next,
                slot: 0,
            },
            None => TreePos::INVALID,
        }
    }

    /// Step backward. `prev` of the invalid position is the last position.
    pub fn prev(&self, pos: TreePos) -> TreePos {
        if pos.is_invalid() {
            return self.last();
        }
        let Some(block) = self.blocks.get(pos.block as usize) else {
            return TreePos::INVALID;
        };
        if pos.slot > 0 {
            return TreePos {
                block: pos.block,
                slot: pos.slot - 1,
            };
        }
        match block.prev {
            Some(prev) => TreePos {
                block: prev,
                slot: (self.blocks[prev as usize].elems.len() - 1) as u32,
            },
            None => TreePos::INVALID,
        }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Elements in key order.
    pub fn iter(&self) -> impl Iterator<Item = &O::Elem> {
        self.chain
            .iter()
            .flat_map(|&id| self.blocks[id as usize].elems.iter())
    }
}
