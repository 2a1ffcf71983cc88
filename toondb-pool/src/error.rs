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

//! Error types for the reader pool

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PoolError {
    /// The pool has been closed; no further readers will be handed out.
    #[error("reader pool is closed")]
    Closed,

    /// Another thread holds the exclusive table lock.
    #[error("table '{table}' is locked [owner={owner}]")]
    Locked { table: String, owner: i64 },

    /// Every slot of every segment of the table's chain is owned.
    #[error("no reader available for table '{table}' [max_entries={max_entries}]")]
    Unavailable { table: String, max_entries: usize },

    /// Invariant violation, e.g. a double close or an unlock by a thread
    /// that does not hold the lock. Non-recoverable.
    #[error("critical pool fault: {0}")]
    Critical(String),

    /// The underlying reader rejected a state transition.
    #[error("reader error: {0}")]
    Reader(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, PoolError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = PoolError::Locked {
            table: "trades".into(),
            owner: 7,
        };
        assert_eq!(err.to_string(), "table 'trades' is locked [owner=7]");

        let err = PoolError::Unavailable {
            table: "quotes".into(),
            max_entries: 160,
        };
        assert!(err.to_string().contains("max_entries=160"));
    }

    #[test]
    fn test_io_error_conversion() {
        fn open() -> Result<()> {
            Err(io::Error::new(io::ErrorKind::NotFound, "no such table dir"))?;
            Ok(())
        }
        assert!(matches!(open(), Err(PoolError::Io(_))));
    }
}
