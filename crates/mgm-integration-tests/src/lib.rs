//! Integration test crate for the referral backend.
//!
//! The scenarios in `tests/` exercise end-to-end flows across the
//! workspace crates without a running daemon. This library only holds
//! shared fixtures.
//!
//! Run all integration tests:
//! ```sh
//! cargo test -p mgm-integration-tests
//! ```

use std::path::{Path, PathBuf};

use rusqlite::Connection;

/// Simulated timestamp for deterministic testing.
pub const TEST_TIMESTAMP: u64 = 1_700_000_000;

/// A database file under the system temp dir, removed on drop together
/// with its WAL and shared-memory files.
pub struct TempDb {
    path: PathBuf,
}

impl TempDb {
    pub fn new(label: &str) -> Self {
        let path = std::env::temp_dir().join(format!("mgm-{label}-{}.db", ulid::Ulid::new()));
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a fresh connection with the standard pragmas and migrations.
    pub fn connect(&self) -> mgm_db::Result<Connection> {
        mgm_db::open(&self.path)
    }
}

impl Drop for TempDb {
    fn drop(&mut self) {
        for suffix in ["", "-wal", "-shm"] {
            let mut file = self.path.clone().into_os_string();
            file.push(suffix);
            let _ = std::fs::remove_file(file);
        }
    }
}
