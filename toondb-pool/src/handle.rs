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

//! Leased reader handles
//!
//! A [`PooledReader`] is a lease on one slot of a table's chain. While the
//! lease is open, the owner word of the backing slot holds the leasing
//! thread's id, which is what makes `Deref` access to the parked reader
//! sound without any lock.
//!
//! A lease is in one of three one-way states:
//!
//! ```text
//!   pooled ──(pool closes mid-acquire)──► orphaned
//!     │                                      │
//!     └────────── close/drop ──────► destroyed / returned
//! ```
//!
//! Closing a pooled lease parks the reader back in its slot; closing an
//! orphaned lease destroys the reader. Either way the handle is spent.
//!
//! Leases are thread-affine: the thread that acquired a lease is the only
//! one that may use and return it. `PooledReader` is `!Send`, so the
//! affinity is enforced at compile time; the owner-word check on return
//! stays as a runtime defence.

use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use tracing::error;

use crate::entry::Entry;
use crate::error::Result;
use crate::pool::ReaderPool;
use crate::reader::TableReader;

/// A leased table reader. Obtained from [`ReaderPool::get`]; returns itself
/// to the pool on drop.
pub struct PooledReader {
    pool: Arc<ReaderPool>,
    entry: Arc<Entry>,
    slot: usize,
    owner: i64,
    table: String,
    /// `Some` when the lease was detached from the pool ("born free"): the
    /// reader travels with the handle and dies with it.
    orphan: Option<Box<dyn TableReader>>,
    open: bool,
    _affine: PhantomData<*mut ()>,
}

impl std::fmt::Debug for PooledReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PooledReader")
            .field("slot", &self.slot)
            .field("owner", &self.owner)
            .field("table", &self.table)
            .field("open", &self.open)
            .finish()
    }
}

impl PooledReader {
    pub(crate) fn pooled(
        pool: Arc<ReaderPool>,
        entry: Arc<Entry>,
        slot: usize,
        owner: i64,
        table: &str,
    ) -> Self {
        Self {
            pool,
            entry,
            slot,
            owner,
            table: table.to_string(),
            orphan: None,
            open: true,
            _affine: PhantomData,
        }
    }

    pub(crate) fn orphan(
        pool: Arc<ReaderPool>,
        entry: Arc<Entry>,
        slot: usize,
        owner: i64,
        table: &str,
        reader: Box<dyn TableReader>,
    ) -> Self {
        Self {
            pool,
            entry,
            slot,
            owner,
            table: table.to_string(),
            orphan: Some(reader),
            open: true,
            _affine: PhantomData,
        }
    }

    /// Name of the table this lease reads.
    pub fn table(&self) -> &str {
        &self.table
    }

    /// Chain segment backing the lease.
    pub fn segment(&self) -> usize {
        self.entry.index()
    }

    /// Slot within the segment.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Whether the lease was detached from the pool and will destroy its
    /// reader on close.
    pub fn is_orphaned(&self) -> bool {
        self.orphan.is_some()
    }

    /// Return the lease. Equivalent to dropping the handle, but surfaces a
    /// [`crate::PoolError::Critical`] instead of logging it.
    pub fn close(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        if !self.open {
            return Ok(());
        }
        self.open = false;

        if let Some(mut reader) = self.orphan.take() {
            // detached lease: this close is the physical one
            reader.go_passive();
            return Ok(());
        }

        // SAFETY: an open pooled lease owns its slot.
        if let Some(reader) = unsafe { self.entry.reader_mut(self.slot) } {
            reader.go_passive();
        }
        self.pool
            .return_to_pool(&self.entry, self.slot, self.owner, &self.table)
    }
}

impl Deref for PooledReader {
    type Target = dyn TableReader + 'static;

    fn deref(&self) -> &Self::Target {
        if let Some(reader) = self.orphan.as_deref() {
            return reader;
        }
        // SAFETY: an open pooled lease owns its slot, and the reader stays
        // parked there for the lease lifetime.
        match unsafe { self.entry.reader_ref(self.slot) } {
            Some(reader) => reader,
            None => unreachable!("open lease without a backing reader"),
        }
    }
}

impl DerefMut for PooledReader {
    fn deref_mut(&mut self) -> &mut Self::Target {
        if let Some(reader) = self.orphan.as_deref_mut() {
            return reader;
        }
        // SAFETY: as in `Deref`; `&mut self` excludes aliased borrows.
        match unsafe { self.entry.reader_mut(self.slot) } {
            Some(reader) => reader,
            None => unreachable!("open lease without a backing reader"),
        }
    }
}

impl Drop for PooledReader {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            error!(table = %self.table, %err, "lease release failed");
        }
    }
}
