//! # mgm-db
//!
//! Store for the referral backend, backed by a single SQLite database
//! at `$MGM_DATA_DIR/mgm.db`.
//!
//! ## Schema
//!
//! - WAL mode mandatory
//! - Foreign keys enforced
//! - All timestamps are Unix epoch seconds (u64)
//! - Schema version stored in `PRAGMA user_version`
//!
//! Every invariant the referral core relies on for mutual exclusion is a
//! store constraint: the referral edge unique index and the
//! `(idem_key, scope)` primary key on idempotency records.

pub mod migrations;
pub mod queries;
pub mod schema;

use rusqlite::Connection;
use std::path::Path;

/// Current schema version.
pub const SCHEMA_VERSION: u32 = 1;

/// Database error types.
#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("migration failed: {0}")]
    Migration(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("constraint violation: {0}")]
    Constraint(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}

pub type Result<T> = std::result::Result<T, DbError>;

/// Open or create the database at the given path.
///
/// Configures WAL mode, foreign keys, and runs any pending migrations.
pub fn open(path: &Path) -> Result<Connection> {
    let conn = Connection::open(path)?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Open an in-memory database (for testing).
pub fn open_memory() -> Result<Connection> {
    let conn = Connection::open_in_memory()?;
    configure(&conn)?;
    migrations::run(&conn)?;
    Ok(conn)
}

/// Configure SQLite pragmas.
fn configure(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "PRAGMA journal_mode = WAL;
         PRAGMA foreign_keys = ON;
         PRAGMA busy_timeout = 5000;
         PRAGMA synchronous = NORMAL;
         PRAGMA cache_size = -8000;",
    )?;
    Ok(())
}

/// Map a failed insert to [`DbError::Constraint`] when it hit a UNIQUE or
/// PRIMARY KEY constraint. Foreign-key and other failures stay `Sqlite`.
pub(crate) fn map_unique_violation(err: rusqlite::Error, what: &str) -> DbError {
    let is_unique = matches!(
        &err,
        rusqlite::Error::SqliteFailure(e, _)
            if e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || e.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
    );
    if is_unique {
        DbError::Constraint(what.to_string())
    } else {
        DbError::Sqlite(err)
    }
}

/// Map `QueryReturnedNoRows` to [`DbError::NotFound`].
pub(crate) fn map_not_found(err: rusqlite::Error, what: &str) -> DbError {
    match err {
        rusqlite::Error::QueryReturnedNoRows => DbError::NotFound(what.to_string()),
        other => DbError::Sqlite(other),
    }
}

/// Turn a `NotFound` into `None`.
pub(crate) fn optional<T>(result: Result<T>) -> Result<Option<T>> {
    match result {
        Ok(v) => Ok(Some(v)),
        Err(DbError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}
