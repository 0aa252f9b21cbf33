//! Idempotency record query functions.
//!
//! A record is inserted `pending` and finalized to `completed` with the
//! captured result. Once completed it is never modified.

use rusqlite::Connection;

use super::campaigns::conversion_error;
use crate::{map_not_found, DbError, Result};

/// Lifecycle of an idempotency record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdempotencyStatus {
    Pending,
    Completed,
}

impl IdempotencyStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }

    fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }
}

/// A raw idempotency row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyRow {
    pub key: String,
    pub scope: String,
    pub status: IdempotencyStatus,
    pub result_json: Option<String>,
    pub created_at: u64,
}

/// Outcome of [`insert_or_get`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InsertOutcome {
    /// A fresh pending record was written; the caller owns execution.
    Inserted,
    /// A record already existed for `(key, scope)`.
    Existing(IdempotencyRow),
}

/// Insert a pending record, or return the one already stored.
///
/// One `INSERT OR IGNORE` decides ownership; there is no separate
/// exists-then-insert window.
pub fn insert_or_get(
    conn: &Connection,
    key: &str,
    scope: &str,
    created_at: u64,
) -> Result<InsertOutcome> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO idempotency_records (idem_key, scope, status, created_at)
         VALUES (?1, ?2, ?3, ?4)",
        rusqlite::params![key, scope, IdempotencyStatus::Pending.as_str(), created_at as i64],
    )?;
    if inserted == 1 {
        Ok(InsertOutcome::Inserted)
    } else {
        get(conn, key, scope).map(InsertOutcome::Existing)
    }
}

/// Get a record by composite key.
pub fn get(conn: &Connection, key: &str, scope: &str) -> Result<IdempotencyRow> {
    conn.query_row(
        "SELECT idem_key, scope, status, result_json, created_at
         FROM idempotency_records WHERE idem_key = ?1 AND scope = ?2",
        [key, scope],
        |row| {
            let status: String = row.get(2)?;
            let status = IdempotencyStatus::parse(&status).ok_or_else(|| {
                conversion_error(2, format!("unknown idempotency status '{status}'"))
            })?;
            Ok(IdempotencyRow {
                key: row.get(0)?,
                scope: row.get(1)?,
                status,
                result_json: row.get(3)?,
                created_at: row.get::<_, i64>(4)? as u64,
            })
        },
    )
    .map_err(|e| map_not_found(e, "idempotency record"))
}

/// Finalize a pending record with its captured result.
pub fn complete(conn: &Connection, key: &str, scope: &str, result_json: &str) -> Result<()> {
    let updated = conn.execute(
        "UPDATE idempotency_records SET status = ?1, result_json = ?2
         WHERE idem_key = ?3 AND scope = ?4 AND status = ?5",
        rusqlite::params![
            IdempotencyStatus::Completed.as_str(),
            result_json,
            key,
            scope,
            IdempotencyStatus::Pending.as_str(),
        ],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(
            "pending idempotency record".into(),
        ));
    }
    Ok(())
}

/// Count records in a scope.
pub fn count_for_scope(conn: &Connection, scope: &str) -> Result<u64> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM idempotency_records WHERE scope = ?1",
        [scope],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}
