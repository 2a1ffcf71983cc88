// Copyright 2025 Sushanth (https://github.com/sushanthpy)
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Slot banks and per-table chains
//!
//! An [`Entry`] is a fixed bank of [`ENTRY_SIZE`] reader slots. One or more
//! entries form a table's chain; the chain grows on demand up to the
//! configured segment bound and is discarded as a whole on `unlock`.
//!
//! ## Slot ownership protocol
//!
//! Each slot is a (owner, reader, timestamp) triple. The owner word
//! `allocations[i]` holds `UNALLOCATED` (-1) or a positive thread id and is
//! the slot's entire exclusion mechanism: the thread that CASes itself into
//! the word owns the slot, and ownership is the exclusive right to touch the
//! reader cell. There is no mutex anywhere in the structure.
//!
//! | Field | Written by | Read by |
//! |---|---|---|
//! | `allocations[i]` | CAS, any thread | any thread |
//! | `readers[i]` | slot owner only | slot owner only |
//! | `present[i]` | slot owner only | any thread |
//! | `times[i]` | slot owner only | any thread |
//!
//! `present[i]` mirrors `readers[i].is_some()` so that diagnostics, the lock
//! walk and the eviction pre-check can ask "is a reader parked here?"
//! without owning the slot.
//!
//! ## Chain growth fence
//!
//! `next_status` guards creation of the successor entry. It moves
//! `OPEN → ALLOCATED` (an acquirer won the right to construct `next`) or
//! `OPEN → LOCKED` (an exclusive lock forbids growth). Both transitions are
//! terminal for everyone else: losers either spin until `next` is published
//! or treat the chain as ended.

use std::cell::UnsafeCell;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU8, AtomicU64, Ordering};

use arc_swap::ArcSwapOption;

use crate::reader::TableReader;

/// Number of slots in one entry.
pub const ENTRY_SIZE: usize = 32;

/// Sentinel owner id: the slot is free.
pub(crate) const UNALLOCATED: i64 = -1;

/// Sentinel lock owner: the entry is not exclusively locked.
pub(crate) const UNLOCKED: i64 = -1;

pub(crate) const NEXT_OPEN: u8 = 0;
pub(crate) const NEXT_ALLOCATED: u8 = 1;
pub(crate) const NEXT_LOCKED: u8 = 2;

/// A fixed-size bank of reader slots; one segment of a table's chain.
pub(crate) struct Entry {
    index: usize,
    allocations: [AtomicI64; ENTRY_SIZE],
    present: [AtomicBool; ENTRY_SIZE],
    readers: [UnsafeCell<Option<Box<dyn TableReader>>>; ENTRY_SIZE],
    times: [AtomicU64; ENTRY_SIZE],
    lock_owner: AtomicI64,
    next: ArcSwapOption<Entry>,
    next_status: AtomicU8,
}

// SAFETY: `readers[i]` is only ever accessed by the thread whose id is in
// `allocations[i]`, and slot ownership transfers through acquire/release
// operations on that word. Non-owning threads read only the atomic fields.
unsafe impl Send for Entry {}
unsafe impl Sync for Entry {}

impl Entry {
    pub(crate) fn new(index: usize, now_micros: u64) -> Self {
        Self {
            index,
            allocations: std::array::from_fn(|_| AtomicI64::new(UNALLOCATED)),
            present: std::array::from_fn(|_| AtomicBool::new(false)),
            readers: std::array::from_fn(|_| UnsafeCell::new(None)),
            times: std::array::from_fn(|_| AtomicU64::new(now_micros)),
            lock_owner: AtomicI64::new(UNLOCKED),
            next: ArcSwapOption::empty(),
            next_status: AtomicU8::new(NEXT_OPEN),
        }
    }

    /// 0-based position of this entry in its chain.
    pub(crate) fn index(&self) -> usize {
        self.index
    }

    /// Attempt to take ownership of a free slot.
    pub(crate) fn try_claim(&self, slot: usize, thread: i64) -> bool {
        self.allocations[slot]
            .compare_exchange(UNALLOCATED, thread, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    pub(crate) fn owner_volatile(&self, slot: usize) -> i64 {
        self.allocations[slot].load(Ordering::Acquire)
    }

    /// Return the slot to the free state. Caller must own the slot.
    pub(crate) fn release_slot(&self, slot: usize) {
        self.allocations[slot].store(UNALLOCATED, Ordering::Release);
    }

    /// Record an acquire/release touch. Caller must own the slot.
    pub(crate) fn stamp(&self, slot: usize, micros: u64) {
        self.times[slot].store(micros, Ordering::Release);
    }

    pub(crate) fn time_volatile(&self, slot: usize) -> u64 {
        self.times[slot].load(Ordering::Acquire)
    }

    /// Whether a reader is parked or leased in the slot. Readable without
    /// owning the slot.
    pub(crate) fn has_reader(&self, slot: usize) -> bool {
        self.present[slot].load(Ordering::Acquire)
    }

    /// Park a reader in the slot.
    ///
    /// # Safety
    /// The calling thread must own `allocations[slot]`.
    pub(crate) unsafe fn install_reader(&self, slot: usize, reader: Box<dyn TableReader>) {
        unsafe {
            *self.readers[slot].get() = Some(reader);
        }
        self.present[slot].store(true, Ordering::Release);
    }

    /// Remove the slot's reader, if any.
    ///
    /// # Safety
    /// The calling thread must own `allocations[slot]`.
    pub(crate) unsafe fn take_reader(&self, slot: usize) -> Option<Box<dyn TableReader>> {
        self.present[slot].store(false, Ordering::Release);
        unsafe { (*self.readers[slot].get()).take() }
    }

    /// Borrow the slot's reader.
    ///
    /// # Safety
    /// The calling thread must own `allocations[slot]`, and the borrow must
    /// end before ownership is released.
    #[allow(clippy::mut_from_ref)]
    pub(crate) unsafe fn reader_mut(&self, slot: usize) -> Option<&mut (dyn TableReader + 'static)> {
        unsafe { (*self.readers[slot].get()).as_deref_mut() }
    }

    /// Borrow the slot's reader immutably.
    ///
    /// # Safety
    /// Same contract as [`Entry::reader_mut`].
    pub(crate) unsafe fn reader_ref(&self, slot: usize) -> Option<&(dyn TableReader + 'static)> {
        unsafe { (*self.readers[slot].get()).as_deref() }
    }

    pub(crate) fn lock_owner_volatile(&self) -> i64 {
        self.lock_owner.load(Ordering::Acquire)
    }

    pub(crate) fn try_lock_owner(&self, thread: i64) -> bool {
        self.lock_owner
            .compare_exchange(UNLOCKED, thread, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    pub(crate) fn clear_lock_owner(&self) {
        self.lock_owner.store(UNLOCKED, Ordering::Release);
    }

    pub(crate) fn next(&self) -> Option<Arc<Entry>> {
        self.next.load_full()
    }

    /// Publish the successor entry. Only the thread that won
    /// [`Entry::try_mark_next_allocated`] may call this, once.
    pub(crate) fn publish_next(&self, next: Arc<Entry>) {
        self.next.store(Some(next));
    }

    /// Win the right to construct the successor entry.
    pub(crate) fn try_mark_next_allocated(&self) -> bool {
        self.next_status
            .compare_exchange(NEXT_OPEN, NEXT_ALLOCATED, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    /// Forbid chain growth past this entry. Taken by the exclusive lock.
    pub(crate) fn try_fence_next(&self) -> bool {
        self.next_status
            .compare_exchange(NEXT_OPEN, NEXT_LOCKED, Ordering::AcqRel, Ordering::Relaxed)
            .is_ok()
    }

    pub(crate) fn next_status_volatile(&self) -> u8 {
        self.next_status.load(Ordering::Acquire)
    }
}
