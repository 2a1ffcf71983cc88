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

//! Pool observability hooks
//!
//! Every state change the pool makes is announced to an optional
//! [`PoolListener`] as a typed [`PoolEvent`]. Metrics exporters subscribe in
//! production; tests subscribe with [`RecordingListener`] to assert on exact
//! event sequences.

use parking_lot::Mutex;

/// Which pool emitted the event. The writer pool shares the same listener
/// shape for rename/drop coordination.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PoolSource {
    Reader,
    Writer,
}

/// Event codes emitted on the pool boundary. The set is exhaustive; nothing
/// observable happens without one of these firing.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A reader was constructed in a fresh slot.
    Create,
    /// A parked reader was reactivated and handed out.
    Get,
    /// A lease was returned to the pool.
    Return,
    /// The sweep closed an idle (or, on shutdown, parked) reader.
    Expire,
    /// Every slot of the chain was owned; acquisition failed.
    Full,
    /// The table-exclusive lock was acquired.
    LockSuccess,
    /// The table-exclusive lock is held by another thread.
    LockBusy,
    /// The lock walk closed a parked reader.
    LockClose,
    /// The table-exclusive lock was released and the chain discarded.
    Unlocked,
    /// Unlock of a table that has no chain.
    NotLocked,
    /// Unlock by a thread that does not hold the lock.
    NotLockOwner,
}

/// A single pool state change. `segment`/`slot` are `-1` for events that are
/// not tied to one slot (FULL, the lock family).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolEvent<'a> {
    pub source: PoolSource,
    pub thread_id: i64,
    pub table: &'a str,
    pub kind: EventKind,
    pub segment: i32,
    pub slot: i32,
}

/// Capability invoked on every pool state change. Called from hot paths with
/// slot ownership held; implementations must not block.
pub trait PoolListener: Send + Sync {
    fn on_event(&self, event: PoolEvent<'_>);
}

/// Owned copy of an event, as captured by [`RecordingListener`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedEvent {
    pub source: PoolSource,
    pub thread_id: i64,
    pub table: String,
    pub kind: EventKind,
    pub segment: i32,
    pub slot: i32,
}

/// Listener that buffers every event. The backbone of the test suite; also
/// useful as a scrape buffer for coarse metrics.
#[derive(Default)]
pub struct RecordingListener {
    events: Mutex<Vec<RecordedEvent>>,
}

impl RecordingListener {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything recorded so far.
    pub fn events(&self) -> Vec<RecordedEvent> {
        self.events.lock().clone()
    }

    /// Number of recorded events of one kind.
    pub fn count(&self, kind: EventKind) -> usize {
        self.events.lock().iter().filter(|e| e.kind == kind).count()
    }

    /// Events of one kind, for a single table.
    pub fn for_table(&self, table: &str, kind: EventKind) -> Vec<RecordedEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.table == table && e.kind == kind)
            .cloned()
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().clear();
    }
}

impl PoolListener for RecordingListener {
    fn on_event(&self, event: PoolEvent<'_>) {
        self.events.lock().push(RecordedEvent {
            source: event.source,
            thread_id: event.thread_id,
            table: event.table.to_string(),
            kind: event.kind,
            segment: event.segment,
            slot: event.slot,
        });
    }
}
