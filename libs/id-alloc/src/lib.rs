// SPDX-License-Identifier: MPL-2.0

//! A growable bitmap id allocator.
//!
//! Ids are dense indices starting from zero. Released ids are kept on a
//! stack and handed out again, most recent first, before a never-used id is
//! taken, so both allocation and reuse are O(1). The bitmap grows lazily in
//! fixed-size steps and never beyond the limit given at construction time.

#![cfg_attr(not(test), no_std)]
#![deny(unsafe_code)]

extern crate alloc;

use alloc::vec::Vec;
use core::fmt::Debug;

use bitvec::prelude::BitVec;

/// An id allocator implemented by a growable bitmap.
/// The true bit implies that the id is allocated, and vice versa.
#[derive(Clone)]
pub struct IdAlloc {
    bitset: BitVec<u8>,
    /// Ids that were released and not yet handed out again
    recycled: Vec<usize>,
    /// No id at or above this one has ever been handed out.
    next_fresh_id: usize,
    num_allocated: usize,
    limit: usize,
}

impl IdAlloc {
    /// The number of ids the bitmap grows by when it is full.
    const GROW_STEP: usize = 64;

    /// Constructs an empty allocator that hands out ids in `0..limit`.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            bitset: BitVec::new(),
            recycled: Vec::new(),
            next_fresh_id: 0,
            num_allocated: 0,
            limit,
        }
    }

    /// Allocates and returns a free id, preferring the most recently
    /// released one.
    ///
    /// If all ids below the limit are in use, it returns `None`.
    pub fn alloc(&mut self) -> Option<usize> {
        let id = match self.recycled.pop() {
            Some(id) => id,
            None => {
                if self.next_fresh_id == self.bitset.len() && !self.grow() {
                    return None;
                }
                self.next_fresh_id += 1;
                self.next_fresh_id - 1
            }
        };

        debug_assert!(!self.bitset[id]);
        self.bitset.set(id, true);
        self.num_allocated += 1;
        Some(id)
    }

    /// Releases the allocated `id`.
    ///
    /// # Panics
    ///
    /// If the `id` has never been handed out, this method will panic.
    pub fn free(&mut self, id: usize) {
        debug_assert!(self.is_allocated(id));

        self.bitset.set(id, false);
        self.num_allocated -= 1;
        self.recycled.push(id);
    }

    /// Returns true if the `id` is allocated.
    pub fn is_allocated(&self, id: usize) -> bool {
        self.bitset.get(id).is_some_and(|bit| *bit)
    }

    /// Returns the number of ids currently allocated.
    pub fn num_allocated(&self) -> usize {
        self.num_allocated
    }

    /// Returns the upper bound (exclusive) of the ids this allocator hands out.
    pub fn limit(&self) -> usize {
        self.limit
    }

    fn grow(&mut self) -> bool {
        let old_len = self.bitset.len();
        if old_len >= self.limit {
            return false;
        }
        let new_len = (old_len + Self::GROW_STEP).min(self.limit);
        self.bitset.resize(new_len, false);
        true
    }
}

impl Debug for IdAlloc {
    fn fmt(&self, f: &mut core::fmt::Formatter) -> core::fmt::Result {
        f.debug_struct("IdAlloc")
            .field("len", &self.bitset.len())
            .field("limit", &self.limit)
            .field("num_allocated", &self.num_allocated)
            .field("recycled", &self.recycled.len())
            .field("next_fresh_id", &self.next_fresh_id)
            .finish()
    }
}
