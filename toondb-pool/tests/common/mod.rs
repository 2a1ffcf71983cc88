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

//! Shared test scaffolding: an instrumented simulated reader.

#![allow(dead_code)]

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use toondb_pool::{PoolError, ReaderFactory, Result, TableReader};

/// Counters shared between a factory and every reader it opened.
#[derive(Default)]
pub struct ReaderStats {
    pub created: AtomicUsize,
    pub destroyed: AtomicUsize,
    pub activations: AtomicUsize,
    pub fail_activation: AtomicBool,
}

impl ReaderStats {
    pub fn created(&self) -> usize {
        self.created.load(Ordering::Acquire)
    }

    pub fn destroyed(&self) -> usize {
        self.destroyed.load(Ordering::Acquire)
    }

    pub fn activations(&self) -> usize {
        self.activations.load(Ordering::Acquire)
    }
}

/// In-memory stand-in for an on-disk table reader. Destruction is counted
/// in `Drop`, so a double physical close would show up as
/// `destroyed > created`.
pub struct SimReader {
    stats: Arc<ReaderStats>,
    active: bool,
}

impl SimReader {
    fn open(stats: Arc<ReaderStats>) -> Self {
        stats.created.fetch_add(1, Ordering::AcqRel);
        Self {
            stats,
            active: true,
        }
    }
}

impl TableReader for SimReader {
    fn go_active(&mut self) -> Result<()> {
        if self.stats.fail_activation.load(Ordering::Acquire) {
            return Err(PoolError::Reader("cannot refresh txn range".into()));
        }
        self.stats.activations.fetch_add(1, Ordering::AcqRel);
        self.active = true;
        Ok(())
    }

    fn go_passive(&mut self) {
        self.active = false;
    }

    fn is_active(&self) -> bool {
        self.active
    }
}

impl Drop for SimReader {
    fn drop(&mut self) {
        self.stats.destroyed.fetch_add(1, Ordering::AcqRel);
    }
}

pub fn sim_factory(stats: Arc<ReaderStats>) -> Arc<dyn ReaderFactory> {
    Arc::new(move |_table: &str| {
        Ok(Box::new(SimReader::open(Arc::clone(&stats))) as Box<dyn TableReader>)
    })
}
