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

//! Background idle-eviction
//!
//! [`PoolJanitor`] owns a thread that periodically runs the pool's idle
//! sweep. A sweep that evicted something reschedules at half the interval
//! (more work is likely waiting behind it); an empty sweep returns to the
//! full interval. The janitor stops on [`PoolJanitor::stop`], on drop, or
//! when it observes the pool closed.

use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use crossbeam_channel::{Sender, bounded};
use parking_lot::Mutex;
use tracing::debug;

use crate::error::Result;
use crate::pool::ReaderPool;

pub struct PoolJanitor {
    shutdown: Sender<()>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl PoolJanitor {
    /// Spawn the sweep thread. `interval` is the pacing between idle
    /// sweeps; the eviction deadline itself comes from the pool's TTL.
    pub fn start(pool: Arc<ReaderPool>, interval: Duration) -> Result<Self> {
        let (shutdown, signal) = bounded::<()>(1);
        let worker = std::thread::Builder::new()
            .name("toondb-pool-janitor".to_string())
            .spawn(move || {
                let mut pace = interval;
                loop {
                    match signal.recv_timeout(pace) {
                        Ok(()) | Err(crossbeam_channel::RecvTimeoutError::Disconnected) => break,
                        Err(crossbeam_channel::RecvTimeoutError::Timeout) => {
                            if pool.is_closed() {
                                break;
                            }
                            let swept = pool.release_inactive();
                            pace = if swept { interval / 2 } else { interval };
                        }
                    }
                }
                debug!("janitor stopped");
            })?;

        Ok(Self {
            shutdown,
            worker: Mutex::new(Some(worker)),
        })
    }

    /// Stop the sweep thread and wait for it to exit. Idempotent.
    pub fn stop(&self) {
        let _ = self.shutdown.send(());
        if let Some(worker) = self.worker.lock().take() {
            let _ = worker.join();
        }
    }
}

impl Drop for PoolJanitor {
    fn drop(&mut self) {
        self.stop();
    }
}
