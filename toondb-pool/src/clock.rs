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

//! Monotonic microsecond clocks
//!
//! The pool never reads wall-clock time directly; it takes a
//! [`MicrosecondClock`] capability through its configuration. Production code
//! uses [`OsClock`]; tests drive eviction deadlines deterministically with
//! [`ManualClock`].

use std::sync::OnceLock;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

/// Monotonic microsecond source.
///
/// Implementations must be monotonic: two reads on the same thread never go
/// backwards. Absolute origin is unspecified; only differences matter.
pub trait MicrosecondClock: Send + Sync {
    fn micros(&self) -> u64;
}

/// Monotonic clock counting microseconds since the first read in this
/// process.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsClock;

static PROCESS_EPOCH: OnceLock<Instant> = OnceLock::new();

impl MicrosecondClock for OsClock {
    fn micros(&self) -> u64 {
        PROCESS_EPOCH.get_or_init(Instant::now).elapsed().as_micros() as u64
    }
}

/// Hand-driven clock for deterministic tests.
#[derive(Debug, Default)]
pub struct ManualClock {
    now: AtomicU64,
}

impl ManualClock {
    pub fn new(start_micros: u64) -> Self {
        Self {
            now: AtomicU64::new(start_micros),
        }
    }

    pub fn set(&self, micros: u64) {
        self.now.store(micros, Ordering::Release);
    }

    pub fn advance(&self, delta_micros: u64) {
        self.now.fetch_add(delta_micros, Ordering::AcqRel);
    }
}

impl MicrosecondClock for ManualClock {
    fn micros(&self) -> u64 {
        self.now.load(Ordering::Acquire)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_os_clock_monotonic() {
        let clock = OsClock;
        let a = clock.micros();
        let b = clock.micros();
        assert!(b >= a);
    }

    #[test]
    fn test_manual_clock() {
        let clock = ManualClock::new(1_000);
        assert_eq!(clock.micros(), 1_000);
        clock.advance(500);
        assert_eq!(clock.micros(), 1_500);
        clock.set(10_000);
        assert_eq!(clock.micros(), 10_000);
    }
}
