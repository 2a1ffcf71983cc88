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

//! Pool lifecycle integration tests
//!
//! End-to-end walks through the pool's observable behavior: reuse across
//! acquire/release cycles, capacity exhaustion, lock fencing, idle eviction
//! and shutdown draining, asserted against the exact event stream.

mod common;

use std::sync::Arc;
use std::thread;

use common::{ReaderStats, sim_factory};
use crossbeam_channel::bounded;
use toondb_pool::{
    ENTRY_SIZE, EventKind, ManualClock, MicrosecondClock, PoolConfiguration, PoolError,
    PoolListener, ReaderPool, RecordingListener,
};

struct Fixture {
    pool: Arc<ReaderPool>,
    stats: Arc<ReaderStats>,
    listener: Arc<RecordingListener>,
    clock: Arc<ManualClock>,
}

fn fixture(max_segments: usize, ttl_micros: u64) -> Fixture {
    let stats = Arc::new(ReaderStats::default());
    let listener = Arc::new(RecordingListener::new());
    let clock = Arc::new(ManualClock::new(0));
    let configuration = PoolConfiguration::new(sim_factory(Arc::clone(&stats)))
        .with_max_segments(max_segments)
        .with_inactive_reader_ttl_micros(ttl_micros)
        .with_clock(Arc::clone(&clock) as Arc<dyn MicrosecondClock>);
    let pool = Arc::new(ReaderPool::with_listener(
        configuration,
        Arc::clone(&listener) as Arc<dyn PoolListener>,
    ));
    Fixture {
        pool,
        stats,
        listener,
        clock,
    }
}

#[test]
fn test_acquire_release_cycle_reuses_reader() {
    let f = fixture(1, 1_000_000);

    let h1 = f.pool.get("trades").unwrap();
    let coords = (h1.segment(), h1.slot());
    h1.close().unwrap();

    let h2 = f.pool.get("trades").unwrap();
    assert_eq!((h2.segment(), h2.slot()), coords);

    // same underlying reader both times: opened once, reactivated once
    assert_eq!(f.stats.created(), 1);
    assert_eq!(f.stats.activations(), 1);
    assert_eq!(f.listener.count(EventKind::Create), 1);
    assert_eq!(f.listener.count(EventKind::Get), 1);
    assert_eq!(f.listener.count(EventKind::Return), 1);
}

#[test]
fn test_capacity_exhaustion_emits_full() {
    let f = fixture(2, 1_000_000);
    let capacity = 2 * ENTRY_SIZE;

    let mut held = Vec::new();
    for _ in 0..capacity {
        held.push(f.pool.get("trades").unwrap());
    }

    match f.pool.get("trades") {
        Err(PoolError::Unavailable { max_entries, .. }) => assert_eq!(max_entries, capacity),
        Err(other) => panic!("expected Unavailable, got {other}"),
        Ok(_) => panic!("expected Unavailable, got a lease"),
    }
    assert_eq!(f.listener.count(EventKind::Full), 1);

    // releasing one slot makes the next acquisition succeed
    held.pop();
    let h = f.pool.get("trades").unwrap();
    assert_eq!(h.segment(), 1);
}

#[test]
fn test_lock_fences_readers_across_threads() {
    let f = fixture(1, 1_000_000);
    let h = f.pool.get("trades").unwrap();

    // another thread cannot lock while the lease is out
    let pool = Arc::clone(&f.pool);
    let locked = thread::spawn(move || pool.lock("trades").unwrap())
        .join()
        .unwrap();
    assert!(!locked);
    assert_eq!(f.listener.count(EventKind::LockSuccess), 0);

    drop(h);

    // retry succeeds, closing the parked reader on the way
    let pool = Arc::clone(&f.pool);
    let (locked_tx, locked_rx) = bounded::<()>(1);
    let (unlock_tx, unlock_rx) = bounded::<()>(1);
    let locker = thread::spawn(move || {
        assert!(pool.lock("trades").unwrap());
        locked_tx.send(()).unwrap();
        unlock_rx.recv().unwrap();
        pool.unlock("trades").unwrap();
    });

    locked_rx.recv().unwrap();
    assert_eq!(f.listener.count(EventKind::LockClose), 1);
    assert_eq!(f.listener.count(EventKind::LockSuccess), 1);
    assert_eq!(f.stats.destroyed(), 1);

    // the fence turns acquisitions away until unlock
    assert!(matches!(
        f.pool.get("trades"),
        Err(PoolError::Locked { .. })
    ));

    unlock_tx.send(()).unwrap();
    locker.join().unwrap();
    assert_eq!(f.listener.count(EventKind::Unlocked), 1);

    // fresh chain after unlock
    let h = f.pool.get("trades").unwrap();
    assert_eq!(f.stats.created(), 2);
    drop(h);
}

#[test]
fn test_lock_reentry_with_held_lease_fails() {
    let f = fixture(1, 1_000_000);
    let h = f.pool.get("trades").unwrap();

    // same thread: the lease's slot is ours, but it still holds a reader
    assert!(!f.pool.lock("trades").unwrap());
    assert_eq!(f.listener.count(EventKind::LockSuccess), 0);

    // the lock owner word was restored; the table still acquires
    drop(f.pool.get("trades").unwrap());
    drop(h);

    assert!(f.pool.lock("trades").unwrap());
    f.pool.unlock("trades").unwrap();
}

#[test]
fn test_idle_eviction_honors_deadline() {
    let f = fixture(1, 1_000);

    // acquire and release at t=0
    drop(f.pool.get("trades").unwrap());

    // at t=2000 the reader has been idle past the ttl
    f.clock.set(2_000);
    assert!(f.pool.release_all(2_000 - 1_000));
    assert_eq!(f.listener.count(EventKind::Expire), 1);
    assert_eq!(f.stats.destroyed(), 1);

    // nothing left to evict
    f.clock.set(3_000);
    assert!(!f.pool.release_all(3_000 - 1_000));
    assert_eq!(f.listener.count(EventKind::Expire), 1);
}

#[test]
fn test_shutdown_drains_after_lease_returns() {
    let f = fixture(1, 1_000_000);
    let h = f.pool.get("trades").unwrap();

    // the outstanding lease survives the close
    f.pool.close();
    assert!(!f.pool.release_all(u64::MAX));
    assert_eq!(f.stats.destroyed(), 0);

    // returning the lease is the physical close, not a pool return
    drop(h);
    assert_eq!(f.stats.destroyed(), 1);
    assert_eq!(f.pool.busy_count(), 0);
    assert!(f.pool.release_all(u64::MAX));
}

#[test]
fn test_event_coordinates() {
    let f = fixture(1, 1_000_000);
    drop(f.pool.get("trades").unwrap());

    let creates = f.listener.for_table("trades", EventKind::Create);
    assert_eq!(creates.len(), 1);
    assert_eq!((creates[0].segment, creates[0].slot), (0, 0));
    assert!(creates[0].thread_id > 0);

    let mut held = Vec::new();
    for _ in 0..ENTRY_SIZE {
        held.push(f.pool.get("trades").unwrap());
    }
    assert!(f.pool.get("trades").is_err());

    let fulls = f.listener.for_table("trades", EventKind::Full);
    assert_eq!(fulls.len(), 1);
    assert_eq!((fulls[0].segment, fulls[0].slot), (-1, -1));
}

#[test]
fn test_tables_are_independent() {
    let f = fixture(1, 1_000_000);
    let trades = f.pool.get("trades").unwrap();

    assert!(f.pool.lock("quotes").unwrap());
    // "trades" is untouched by the "quotes" lock
    assert!(trades.is_active());
    drop(f.pool.get("trades").unwrap());
    assert!(matches!(f.pool.get("quotes"), Err(PoolError::Locked { .. })));

    f.pool.unlock("quotes").unwrap();
    drop(f.pool.get("quotes").unwrap());
}
