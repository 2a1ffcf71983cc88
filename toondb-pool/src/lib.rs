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

//! ToonDB Reader Pool
//!
//! Concurrent pool of on-disk table readers for the table-access layer.
//! Opening a table reader is expensive (file descriptors, memory-mapped
//! segments, metadata parsing) while most queries are short-lived. The
//! pool amortizes the open across many acquisitions and still lets
//! exclusive operations (rename, drop, schema change) fence off a table.
//!
//! # Architecture
//!
//! ```text
//! ┌────────────────────────────────────────────────────────────────┐
//! │                         ReaderPool                             │
//! │  entries: DashMap<table name, chain>                           │
//! │                                                                │
//! │  "trades" ──► Entry#0 ──► Entry#1 ──► …  (≤ max_segments)      │
//! │               ┌──────────────────────────────┐                 │
//! │               │ 32 × (owner, reader, touch)  │  owner word is  │
//! │               │ lock_owner   next_status     │  the only lock  │
//! │               └──────────────────────────────┘                 │
//! └────────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Threading Guarantees
//!
//! | Operation | Guarantee | Notes |
//! |-----------|-----------|-------|
//! | `get()` | Lock-free | CAS walk over slots; never waits for a lease |
//! | lease drop | Lock-free | release-store of the owner word |
//! | `lock()` / `unlock()` | Lock-free, non-blocking | fails fast when a slot is leased |
//! | `release_all()` | Lock-free | claims only free slots, never a leased one |
//! | chain growth | Bounded wait | losers spin only while the winner publishes |
//!
//! The pool contains no mutex. A leased reader is exclusively owned by the
//! leasing thread; a parked reader is owned by whichever thread CASes
//! itself into the slot's owner word.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use toondb_pool::{PoolConfiguration, PoolJanitor, ReaderPool};
//!
//! let configuration = PoolConfiguration::new(Arc::new(open_table_reader))
//!     .with_inactive_reader_ttl_micros(120_000_000)
//!     .with_max_segments(5);
//! let pool = Arc::new(ReaderPool::new(configuration));
//! let janitor = PoolJanitor::start(Arc::clone(&pool), sweep_interval)?;
//!
//! {
//!     let reader = pool.get("trades")?;
//!     // query through &*reader; dropping the lease returns it
//! }
//!
//! // exclusive rename: fence the table, do the filesystem work, release
//! if pool.lock("trades")? {
//!     rename_table_dir("trades", "trades_old")?;
//!     pool.unlock("trades")?;
//! }
//!
//! janitor.stop();
//! pool.close();
//! ```

pub mod clock;
pub mod config;
mod entry;
pub mod error;
pub mod handle;
pub mod janitor;
pub mod listener;
pub mod pool;
pub mod reader;
pub mod thread_id;

pub use clock::{ManualClock, MicrosecondClock, OsClock};
pub use config::{
    DEFAULT_INACTIVE_READER_TTL_MICROS, DEFAULT_MAX_SEGMENTS, PoolConfiguration,
};
pub use entry::ENTRY_SIZE;
pub use error::{PoolError, Result};
pub use handle::PooledReader;
pub use janitor::PoolJanitor;
pub use listener::{
    EventKind, PoolEvent, PoolListener, PoolSource, RecordedEvent, RecordingListener,
};
pub use pool::{ReaderPool, TableEntryInfo};
pub use reader::{ReaderFactory, TableReader};

/// Crate version
pub const TOONDB_POOL_VERSION: &str = env!("CARGO_PKG_VERSION");
