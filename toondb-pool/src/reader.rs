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

//! The table-reader collaborator seam
//!
//! The pool does not know how a reader maps table files, parses metadata or
//! serves queries; it only drives the reader's active/passive lifecycle and
//! decides when a reader is destroyed. Everything else lives behind
//! [`TableReader`], and construction lives behind [`ReaderFactory`].
//!
//! Reader lifecycle as the pool sees it:
//!
//! ```text
//!   factory.open_reader() ──► active ──► go_passive ──► parked in slot
//!                               ▲                           │
//!                               └──────── go_active ────────┘
//!
//!   drop(Box<dyn TableReader>) = physical close (at most once, by ownership)
//! ```

use crate::error::Result;

/// An open on-disk table reader leased through the pool.
///
/// Physical destruction is `Drop`: the pool relinquishes the box exactly once
/// per reader, so implementations release file descriptors and mappings in
/// their `Drop` impl.
pub trait TableReader: Send {
    /// Reactivate a parked reader before it is handed out again, e.g.
    /// refresh the visible transaction range. Failure makes the pool destroy
    /// the reader instead of leasing it.
    fn go_active(&mut self) -> Result<()>;

    /// Suspend background work without releasing on-disk resources. Called
    /// when a lease is returned; the reader stays parked in its slot.
    fn go_passive(&mut self);

    /// Whether the reader is currently in its active state.
    fn is_active(&self) -> bool;
}

/// Opens a reader for a table by name. Invoked on first acquisition of a
/// slot; the cost of the open is arbitrary I/O and runs with the slot
/// already claimed, so it never blocks other slots.
pub trait ReaderFactory: Send + Sync {
    fn open_reader(&self, table: &str) -> Result<Box<dyn TableReader>>;
}

impl<F> ReaderFactory for F
where
    F: Fn(&str) -> Result<Box<dyn TableReader>> + Send + Sync,
{
    fn open_reader(&self, table: &str) -> Result<Box<dyn TableReader>> {
        self(table)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    struct NullReader {
        active: bool,
    }

    impl TableReader for NullReader {
        fn go_active(&mut self) -> Result<()> {
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

    #[test]
    fn test_closure_is_a_factory() {
        let factory: Arc<dyn ReaderFactory> = Arc::new(|_table: &str| {
            Ok(Box::new(NullReader { active: true }) as Box<dyn TableReader>)
        });

        let mut reader = factory.open_reader("trades").unwrap();
        assert!(reader.is_active());
        reader.go_passive();
        assert!(!reader.is_active());
        reader.go_active().unwrap();
        assert!(reader.is_active());
    }
}
