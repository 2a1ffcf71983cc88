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

//! The concurrent reader pool
//!
//! [`ReaderPool`] hands out shared, reusable leases on per-table readers.
//! Opening a reader is expensive (descriptors, mappings, metadata), so the
//! pool keeps returned readers parked in their slots and reactivates them on
//! the next acquisition. Exclusive operations (rename, drop, schema change)
//! fence a table through [`ReaderPool::lock`] / [`ReaderPool::unlock`], and
//! a periodic sweep closes readers idle past the configured TTL.
//!
//! ## Acquisition walk
//!
//! ```text
//!   entries: "trades" ─► Entry#0 ─► Entry#1 ─► … (≤ max_segments)
//!                         │ 32 slots each; CAS owner word to claim
//!                         ▼
//!            free slot? ──► stamp, open/reactivate reader, lease out
//!            none free? ──► race to allocate the next segment
//! ```
//!
//! The pool has no internal mutex. Every transition is an atomic
//! read-modify-write on an owner word, the per-entry lock word or the chain
//! growth status; the map of chains is a sharded concurrent map whose reads
//! do not block.
//!
//! ## Interplay of the three walks
//!
//! Acquisition, the exclusive lock and the eviction sweep all contend on the
//! same owner words, which is the whole synchronization story:
//!
//! - a sweep can only close a reader after CASing itself into a *free* slot,
//!   so it can never close a leased reader;
//! - a lock walk claims every slot, so meeting a slot it cannot claim means
//!   some lease (or sweep) is in flight and the lock fails without waiting;
//! - an acquirer that loses a slot race simply moves to the next slot.

use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use dashmap::DashMap;
use tracing::{debug, error, info};

use crate::config::PoolConfiguration;
use crate::entry::{ENTRY_SIZE, Entry, NEXT_ALLOCATED, UNALLOCATED, UNLOCKED};
use crate::error::{PoolError, Result};
use crate::handle::PooledReader;
use crate::listener::{EventKind, PoolEvent, PoolListener, PoolSource};
use crate::thread_id;

/// Why the pool physically closed a reader. Diagnostic only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CloseReason {
    Idle,
    PoolClose,
    NameLock,
}

impl fmt::Display for CloseReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CloseReason::Idle => f.write_str("idle"),
            CloseReason::PoolClose => f.write_str("pool close"),
            CloseReason::NameLock => f.write_str("name lock"),
        }
    }
}

/// Read-only snapshot of one table's chain, from [`ReaderPool::entries`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableEntryInfo {
    pub table: String,
    /// Segments currently in the chain.
    pub segments: usize,
    /// Slots that are owned and hold a reader.
    pub busy_slots: usize,
    /// Whether the chain is exclusively locked.
    pub locked: bool,
}

/// Concurrent pool of per-table readers. One instance per database.
///
/// All operations are lock-free in the pool itself; see the module docs for
/// how the three walks interleave. The pool is used through `Arc`:
///
/// ```rust,ignore
/// let pool = Arc::new(ReaderPool::new(configuration));
/// let reader = pool.get("trades")?;
/// // ... query through &*reader ...
/// drop(reader); // back into the pool
/// ```
pub struct ReaderPool {
    configuration: PoolConfiguration,
    entries: DashMap<String, Arc<Entry>>,
    closed: AtomicBool,
    listener: Option<Arc<dyn PoolListener>>,
}

impl ReaderPool {
    pub fn new(configuration: PoolConfiguration) -> Self {
        Self {
            configuration,
            entries: DashMap::new(),
            closed: AtomicBool::new(false),
            listener: None,
        }
    }

    pub fn with_listener(
        configuration: PoolConfiguration,
        listener: Arc<dyn PoolListener>,
    ) -> Self {
        Self {
            configuration,
            entries: DashMap::new(),
            closed: AtomicBool::new(false),
            listener: Some(listener),
        }
    }

    pub fn configuration(&self) -> &PoolConfiguration {
        &self.configuration
    }

    /// Total slot capacity per table: `max_segments × ENTRY_SIZE`.
    pub fn max_entries(&self) -> usize {
        self.configuration.max_segments() * ENTRY_SIZE
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Acquire a lease on a reader for `table`.
    ///
    /// Fails with [`PoolError::Closed`] once the pool is closed, with
    /// [`PoolError::Locked`] while another thread holds the table lock, and
    /// with [`PoolError::Unavailable`] when every slot of a full-length
    /// chain is owned. Never blocks; callers retry on `Unavailable`.
    pub fn get(self: &Arc<Self>, table: &str) -> Result<PooledReader> {
        let thread = thread_id::current();
        let mut entry = self.entry_for(table)?;

        let lock_owner = entry.lock_owner_volatile();
        if lock_owner != UNLOCKED {
            info!(table, owner = lock_owner, "table is locked");
            return Err(PoolError::Locked {
                table: table.to_string(),
                owner: lock_owner,
            });
        }

        loop {
            for slot in 0..ENTRY_SIZE {
                if !entry.try_claim(slot, thread) {
                    continue;
                }
                entry.stamp(slot, self.configuration.clock().micros());

                // SAFETY: the claim above made this thread the slot owner.
                let (reader, event) = match unsafe { entry.take_reader(slot) } {
                    Some(mut reader) => {
                        if let Err(err) = reader.go_active() {
                            // broken reader: destroy it, surrender the slot
                            drop(reader);
                            entry.release_slot(slot);
                            return Err(err);
                        }
                        (reader, EventKind::Get)
                    }
                    None => {
                        info!(table, segment = entry.index(), slot, "open reader");
                        match self.configuration.factory().open_reader(table) {
                            Ok(reader) => (reader, EventKind::Create),
                            Err(err) => {
                                entry.release_slot(slot);
                                return Err(err);
                            }
                        }
                    }
                };
                self.notify(thread, table, event, entry.index() as i32, slot as i32);

                if self.is_closed() {
                    // the pool closed under us; the lease is handed out
                    // detached and the reader dies with it
                    info!(table, "born free");
                    return Ok(PooledReader::orphan(
                        Arc::clone(self),
                        entry,
                        slot,
                        thread,
                        table,
                        reader,
                    ));
                }

                // SAFETY: still the slot owner; the lease transfers the
                // exclusive right to the caller.
                unsafe { entry.install_reader(slot, reader) };
                debug!(table, segment = entry.index(), slot, thread, "reader assigned");
                return Ok(PooledReader::pooled(
                    Arc::clone(self),
                    entry,
                    slot,
                    thread,
                    table,
                ));
            }

            // every slot of this segment is owned; grow or advance
            if entry.index() + 1 >= self.configuration.max_segments() {
                break;
            }
            let next = if let Some(next) = entry.next() {
                next
            } else if entry.try_mark_next_allocated() {
                let next = Arc::new(Entry::new(
                    entry.index() + 1,
                    self.configuration.clock().micros(),
                ));
                entry.publish_next(Arc::clone(&next));
                debug!(table, segment = next.index(), thread, "allocated chain segment");
                next
            } else if entry.next_status_volatile() == NEXT_ALLOCATED {
                // bounded wait: the winner is constructing the successor
                loop {
                    if let Some(next) = entry.next() {
                        break next;
                    }
                    std::hint::spin_loop();
                }
            } else {
                // growth fenced by an exclusive lock
                break;
            };
            entry = next;
        }

        self.notify(thread, table, EventKind::Full, -1, -1);
        info!(
            table,
            thread,
            max_segments = self.configuration.max_segments(),
            "could not get, pool is full"
        );
        Err(PoolError::Unavailable {
            table: table.to_string(),
            max_entries: self.max_entries(),
        })
    }

    /// Acquire the table-exclusive lock: claim every slot of the chain,
    /// close parked readers, and fence chain growth.
    ///
    /// Returns `Ok(false)` without waiting when any slot is leased (by any
    /// thread, including the caller) or the lock is held by another thread.
    /// Reentrant for the holding thread. Fails with [`PoolError::Closed`]
    /// once the pool is closed.
    pub fn lock(&self, table: &str) -> Result<bool> {
        let thread = thread_id::current();
        let head = self.entry_for(table)?;

        if !head.try_lock_owner(thread) && head.lock_owner_volatile() != thread {
            error!(table, owner = head.lock_owner_volatile(), "already locked");
            self.notify(thread, table, EventKind::LockBusy, -1, -1);
            return Ok(false);
        }

        let mut locked = vec![Arc::clone(&head)];
        let mut claimed: Vec<(Arc<Entry>, usize)> = Vec::new();
        let mut entry = Arc::clone(&head);
        loop {
            for slot in 0..ENTRY_SIZE {
                if entry.try_claim(slot, thread) {
                    claimed.push((Arc::clone(&entry), slot));
                    self.close_reader(
                        thread,
                        &entry,
                        slot,
                        EventKind::LockClose,
                        CloseReason::NameLock,
                        table,
                    );
                } else if entry.owner_volatile(slot) == thread {
                    if entry.has_reader(slot) {
                        // the caller still holds a live lease on this table;
                        // it must be returned before the table can be locked
                        self.abort_lock(&locked, &claimed);
                        return Ok(false);
                    }
                } else {
                    info!(
                        table,
                        segment = entry.index(),
                        slot,
                        owner = entry.owner_volatile(slot),
                        thread,
                        "could not lock, busy"
                    );
                    self.abort_lock(&locked, &claimed);
                    return Ok(false);
                }
            }

            if entry.next().is_none() {
                if entry.try_fence_next() {
                    break;
                }
                if entry.next_status_volatile() == NEXT_ALLOCATED {
                    // an acquirer won the growth race; wait for the segment
                    // it is constructing, then lock that too
                    while entry.next().is_none() {
                        std::hint::spin_loop();
                    }
                }
            }
            match entry.next() {
                Some(next) => {
                    if !next.try_lock_owner(thread) && next.lock_owner_volatile() != thread {
                        self.abort_lock(&locked, &claimed);
                        return Ok(false);
                    }
                    locked.push(Arc::clone(&next));
                    entry = next;
                }
                None => break,
            }
        }

        self.notify(thread, table, EventKind::LockSuccess, -1, -1);
        debug!(table, thread, "locked");
        Ok(true)
    }

    /// Release the table-exclusive lock and discard the chain; the next
    /// acquisition starts a fresh one.
    ///
    /// Only the lock owner may unlock: any other thread gets
    /// [`PoolError::Critical`]. Callers must not run `get` on the table
    /// concurrently with its `unlock`.
    pub fn unlock(&self, table: &str) -> Result<()> {
        let thread = thread_id::current();
        let head = match self.entries.get(table) {
            Some(entry) => Arc::clone(entry.value()),
            None => {
                info!(table, "not found, cannot unlock");
                self.notify(thread, table, EventKind::NotLocked, -1, -1);
                return Ok(());
            }
        };

        if head.lock_owner_volatile() != thread {
            self.notify(thread, table, EventKind::NotLockOwner, -1, -1);
            return Err(PoolError::Critical(format!(
                "not the lock owner of {table}"
            )));
        }

        // the lock holder owns every slot of the chain, so no lease and no
        // sweep can be mid-flight on it; dropping the map entry drops the
        // chain and anything still parked in it
        self.entries.remove(table);
        self.notify(thread, table, EventKind::Unlocked, -1, -1);
        debug!(table, "unlocked");
        Ok(())
    }

    /// Close every parked reader whose last touch precedes
    /// `deadline_micros`.
    ///
    /// With a finite deadline (the idle sweep) the result is `true` iff any
    /// reader was closed, which schedulers use to re-pace. With
    /// `deadline_micros == u64::MAX` (shutdown) the result is `true` iff
    /// nothing was left behind, i.e. the pool is fully drained.
    pub fn release_all(&self, deadline_micros: u64) -> bool {
        let thread = thread_id::current();
        let shutdown = deadline_micros == u64::MAX;
        let reason = if shutdown {
            CloseReason::PoolClose
        } else {
            CloseReason::Idle
        };
        let mut removed = false;
        let mut cas_failures = 0usize;

        // snapshot the chains so the listener runs without any map guard held
        let chains: Vec<(String, Arc<Entry>)> = self
            .entries
            .iter()
            .map(|item| (item.key().clone(), Arc::clone(item.value())))
            .collect();

        for (table, head) in &chains {
            let table = table.as_str();
            let mut cursor = Some(Arc::clone(head));
            while let Some(entry) = cursor {
                for slot in 0..ENTRY_SIZE {
                    if deadline_micros > entry.time_volatile(slot) && entry.has_reader(slot) {
                        if entry.try_claim(slot, thread) {
                            // the slot is ours; re-check now that nobody can
                            // be touching it
                            if deadline_micros > entry.time_volatile(slot)
                                && self.close_reader(
                                    thread,
                                    &entry,
                                    slot,
                                    EventKind::Expire,
                                    reason,
                                    table,
                                )
                            {
                                removed = true;
                            }
                            entry.release_slot(slot);
                        } else {
                            cas_failures += 1;
                            if shutdown {
                                info!(
                                    table,
                                    segment = entry.index(),
                                    slot,
                                    "shutting down, busy reader left behind"
                                );
                            }
                        }
                    }
                }
                cursor = entry.next();
            }
        }

        if shutdown { cas_failures == 0 } else { removed }
    }

    /// Idle sweep: close readers unused for longer than the configured TTL.
    /// Returns `true` iff any reader was closed.
    pub fn release_inactive(&self) -> bool {
        let now = self.configuration.clock().micros();
        self.release_all(now.saturating_sub(self.configuration.inactive_reader_ttl_micros()))
    }

    /// Close the pool: no further leases, and drain everything parked.
    ///
    /// Idempotent; only the first call runs the drain. Returns the drain
    /// result of that first call (`true` iff the pool emptied immediately),
    /// `false` on repeat calls. Leases still outstanding perform their own
    /// physical close when returned.
    pub fn close(&self) -> bool {
        if self
            .closed
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
        {
            info!("reader pool closed");
            self.release_all(u64::MAX)
        } else {
            false
        }
    }

    /// Number of slots that are owned and hold a reader, across all tables.
    pub fn busy_count(&self) -> usize {
        let mut count = 0;
        for item in self.entries.iter() {
            let mut cursor = Some(Arc::clone(item.value()));
            while let Some(entry) = cursor {
                for slot in 0..ENTRY_SIZE {
                    if entry.owner_volatile(slot) != UNALLOCATED && entry.has_reader(slot) {
                        count += 1;
                    }
                }
                cursor = entry.next();
            }
        }
        count
    }

    /// Read-only snapshot of every table's chain, for diagnostics.
    pub fn entries(&self) -> Vec<TableEntryInfo> {
        let mut infos = Vec::with_capacity(self.entries.len());
        for item in self.entries.iter() {
            let mut segments = 0;
            let mut busy_slots = 0;
            let locked = item.value().lock_owner_volatile() != UNLOCKED;
            let mut cursor = Some(Arc::clone(item.value()));
            while let Some(entry) = cursor {
                segments += 1;
                for slot in 0..ENTRY_SIZE {
                    if entry.owner_volatile(slot) != UNALLOCATED && entry.has_reader(slot) {
                        busy_slots += 1;
                    }
                }
                cursor = entry.next();
            }
            infos.push(TableEntryInfo {
                table: item.key().clone(),
                segments,
                busy_slots,
                locked,
            });
        }
        infos
    }

    /// Park a lease's reader back in its slot. Called from the handle; the
    /// calling thread must be the lease owner.
    pub(crate) fn return_to_pool(
        &self,
        entry: &Entry,
        slot: usize,
        owner: i64,
        table: &str,
    ) -> Result<()> {
        let thread = thread_id::current();
        if entry.owner_volatile(slot) != thread || owner != thread {
            return Err(PoolError::Critical(format!(
                "double close [table={table}, at={}:{slot}]",
                entry.index()
            )));
        }

        debug!(table, segment = entry.index(), slot, thread, "reader is back");
        self.notify(thread, table, EventKind::Return, entry.index() as i32, slot as i32);
        entry.stamp(slot, self.configuration.clock().micros());
        entry.release_slot(slot);

        if self.is_closed() {
            // racing the shutdown sweep for the final physical close: the
            // winner of this CAS destroys the reader, the loser leaves it
            if entry.try_claim(slot, thread) {
                // SAFETY: the claim above re-took the slot.
                if let Some(reader) = unsafe { entry.take_reader(slot) } {
                    drop(reader);
                }
                entry.release_slot(slot);
            }
        }
        Ok(())
    }

    /// Locate the head entry for `table`, creating the chain if absent.
    fn entry_for(&self, table: &str) -> Result<Arc<Entry>> {
        if self.is_closed() {
            info!("pool is closed");
            return Err(PoolError::Closed);
        }
        if table.is_empty() {
            return Err(PoolError::Critical("empty table name".into()));
        }
        if let Some(existing) = self.entries.get(table) {
            return Ok(Arc::clone(existing.value()));
        }
        let now = self.configuration.clock().micros();
        Ok(Arc::clone(
            self.entries
                .entry(table.to_string())
                .or_insert_with(|| Arc::new(Entry::new(0, now)))
                .value(),
        ))
    }

    /// Destroy the reader parked in a slot, if any. Caller owns the slot.
    fn close_reader(
        &self,
        thread: i64,
        entry: &Entry,
        slot: usize,
        event: EventKind,
        reason: CloseReason,
        table: &str,
    ) -> bool {
        // SAFETY: the caller owns `allocations[slot]`.
        match unsafe { entry.take_reader(slot) } {
            Some(reader) => {
                drop(reader);
                info!(table, segment = entry.index(), slot, %reason, "closed reader");
                self.notify(thread, table, event, entry.index() as i32, slot as i32);
                true
            }
            None => false,
        }
    }

    fn abort_lock(&self, locked: &[Arc<Entry>], claimed: &[(Arc<Entry>, usize)]) {
        for (entry, slot) in claimed {
            entry.release_slot(*slot);
        }
        for entry in locked {
            entry.clear_lock_owner();
        }
    }

    fn notify(&self, thread: i64, table: &str, kind: EventKind, segment: i32, slot: i32) {
        if let Some(listener) = &self.listener {
            listener.on_event(PoolEvent {
                source: PoolSource::Reader,
                thread_id: thread,
                table,
                kind,
                segment,
                slot,
            });
        }
    }
}

impl Drop for ReaderPool {
    fn drop(&mut self) {
        self.close();
    }
}
