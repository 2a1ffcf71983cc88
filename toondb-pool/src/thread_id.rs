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

//! Dense positive thread identifiers
//!
//! Slot ownership words hold either `UNALLOCATED` (-1) or the id of the
//! owning thread, so ids must be small positive integers. The standard
//! library's `ThreadId` is opaque; this module assigns its own ids from a
//! process-wide counter, one per thread, on first use.

use std::sync::atomic::{AtomicI64, Ordering};

static NEXT_THREAD_ID: AtomicI64 = AtomicI64::new(1);

thread_local! {
    static CURRENT_THREAD_ID: i64 = NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed);
}

/// Id of the calling thread. Stable for the thread's lifetime, never reused
/// within a process run, always positive.
pub fn current() -> i64 {
    CURRENT_THREAD_ID.with(|id| *id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_id_is_positive_and_stable() {
        let a = current();
        let b = current();
        assert!(a > 0);
        assert_eq!(a, b);
    }

    #[test]
    fn test_ids_are_distinct_across_threads() {
        let mine = current();
        let handles: Vec<_> = (0..8)
            .map(|_| thread::spawn(current))
            .collect();
        let mut seen = vec![mine];
        for handle in handles {
            let id = handle.join().unwrap();
            assert!(!seen.contains(&id), "thread id {} reused", id);
            seen.push(id);
        }
    }
}
