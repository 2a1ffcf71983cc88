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

//! Pool configuration

use std::sync::Arc;

use crate::clock::{MicrosecondClock, OsClock};
use crate::reader::ReaderFactory;

/// How long a parked reader may sit unused before the idle sweep closes it.
pub const DEFAULT_INACTIVE_READER_TTL_MICROS: u64 = 120_000_000;

/// Default bound on the number of segments in a table's chain.
pub const DEFAULT_MAX_SEGMENTS: usize = 5;

/// Immutable pool configuration: eviction TTL, chain bound, and the two
/// injected capabilities (reader factory and clock).
#[derive(Clone)]
pub struct PoolConfiguration {
    inactive_reader_ttl_micros: u64,
    max_segments: usize,
    factory: Arc<dyn ReaderFactory>,
    clock: Arc<dyn MicrosecondClock>,
}

impl PoolConfiguration {
    pub fn new(factory: Arc<dyn ReaderFactory>) -> Self {
        Self {
            inactive_reader_ttl_micros: DEFAULT_INACTIVE_READER_TTL_MICROS,
            max_segments: DEFAULT_MAX_SEGMENTS,
            factory,
            clock: Arc::new(OsClock),
        }
    }

    pub fn with_inactive_reader_ttl_micros(mut self, ttl_micros: u64) -> Self {
        self.inactive_reader_ttl_micros = ttl_micros;
        self
    }

    /// Bound on chain length per table. Clamped to at least one segment.
    pub fn with_max_segments(mut self, max_segments: usize) -> Self {
        self.max_segments = max_segments.max(1);
        self
    }

    pub fn with_clock(mut self, clock: Arc<dyn MicrosecondClock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn inactive_reader_ttl_micros(&self) -> u64 {
        self.inactive_reader_ttl_micros
    }

    pub fn max_segments(&self) -> usize {
        self.max_segments
    }

    pub fn factory(&self) -> &Arc<dyn ReaderFactory> {
        &self.factory
    }

    pub fn clock(&self) -> &Arc<dyn MicrosecondClock> {
        &self.clock
    }
}
