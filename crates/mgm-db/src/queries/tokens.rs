//! Attribution token query functions.

use mgm_types::AttributionToken;
use rusqlite::{Connection, Row};

use crate::{map_not_found, map_unique_violation, optional, Result};

/// Insert a token.
pub fn insert(conn: &Connection, token: &AttributionToken) -> Result<()> {
    conn.execute(
        "INSERT INTO attribution_tokens (token, campaign_id, referrer_type, referrer_id,
                                         expires_at, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            token.token,
            token.campaign_id,
            token.referrer_type,
            token.referrer_id,
            token.expire_time as i64,
            token.create_time as i64,
        ],
    )
    .map_err(|e| map_unique_violation(e, "attribution token"))?;
    Ok(())
}

/// Get a token by value, regardless of expiry.
pub fn get(conn: &Connection, token: &str) -> Result<AttributionToken> {
    conn.query_row(
        "SELECT token, campaign_id, referrer_type, referrer_id, expires_at, created_at
         FROM attribution_tokens WHERE token = ?1",
        [token],
        read_token,
    )
    .map_err(|e| map_not_found(e, "attribution token"))
}

/// Get a token by value, `None` if absent.
pub fn find(conn: &Connection, token: &str) -> Result<Option<AttributionToken>> {
    optional(get(conn, token))
}

/// Delete every token whose expiry is strictly before `before`.
/// Returns the number of rows removed.
///
/// Cutoffs past `i64::MAX` are clamped, since no stored expiry can exceed it.
pub fn delete_expired(conn: &Connection, before: u64) -> Result<usize> {
    let before = i64::try_from(before).unwrap_or(i64::MAX);
    let deleted = conn.execute(
        "DELETE FROM attribution_tokens WHERE expires_at < ?1",
        [before],
    )?;
    Ok(deleted)
}

/// Count all stored tokens.
pub fn count(conn: &Connection) -> Result<u64> {
    let n: i64 = conn.query_row("SELECT COUNT(*) FROM attribution_tokens", [], |row| {
        row.get(0)
    })?;
    Ok(n as u64)
}

fn read_token(row: &Row<'_>) -> rusqlite::Result<AttributionToken> {
    Ok(AttributionToken {
        token: row.get(0)?,
        campaign_id: row.get(1)?,
        referrer_type: row.get(2)?,
        referrer_id: row.get(3)?,
        expire_time: row.get::<_, i64>(4)? as u64,
        create_time: row.get::<_, i64>(5)? as u64,
    })
}
