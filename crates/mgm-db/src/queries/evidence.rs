//! Qualification evidence query functions.

use mgm_types::Evidence;
use rusqlite::Connection;

use crate::{map_unique_violation, DbError, Result};

/// Record the evidence that qualified a referral.
pub fn insert(
    conn: &Connection,
    referral_id: &str,
    evidence: &Evidence,
    created_at: u64,
) -> Result<()> {
    let attrs_json = serde_json::to_string(&evidence.attrs)
        .map_err(|e| DbError::Serialization(e.to_string()))?;
    conn.execute(
        "INSERT INTO qualification_evidence (referral_id, evidence_type, evidence_id,
                                             occurred_at, attrs_json, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        rusqlite::params![
            referral_id,
            evidence.evidence_type,
            evidence.id,
            evidence.occur_time as i64,
            attrs_json,
            created_at as i64,
        ],
    )
    .map_err(|e| map_unique_violation(e, "qualification evidence"))?;
    Ok(())
}

/// List evidence recorded against a referral, oldest first.
pub fn list_for_referral(conn: &Connection, referral_id: &str) -> Result<Vec<EvidenceRow>> {
    let mut stmt = conn.prepare(
        "SELECT referral_id, evidence_type, evidence_id, occurred_at, attrs_json, created_at
         FROM qualification_evidence WHERE referral_id = ?1 ORDER BY created_at",
    )?;

    let rows = stmt
        .query_map([referral_id], |row| {
            Ok(EvidenceRow {
                referral_id: row.get(0)?,
                evidence_type: row.get(1)?,
                evidence_id: row.get(2)?,
                occurred_at: row.get::<_, i64>(3)? as u64,
                attrs_json: row.get(4)?,
                created_at: row.get::<_, i64>(5)? as u64,
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    Ok(rows)
}

/// A raw evidence row from the database.
#[derive(Debug)]
pub struct EvidenceRow {
    pub referral_id: String,
    pub evidence_type: String,
    pub evidence_id: String,
    pub occurred_at: u64,
    pub attrs_json: String,
    pub created_at: u64,
}
