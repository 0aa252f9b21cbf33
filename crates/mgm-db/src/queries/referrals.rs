//! Referral query functions.

use mgm_types::{AttributionStrategy, Referral, ReferralState, Subject};
use rusqlite::{Connection, Row};

use super::campaigns::conversion_error;
use crate::{map_not_found, map_unique_violation, optional, DbError, Result};

const COLUMNS: &str = "id, campaign_id, referrer_type, referrer_id, referee_type, referee_id,
     token, source, state, created_at, qualified_at, rewarded_at";

/// Insert a referral.
///
/// Fails with [`DbError::Constraint`] if the
/// `(campaign, referrer, referee)` edge already exists.
pub fn insert(conn: &Connection, referral: &Referral) -> Result<()> {
    conn.execute(
        "INSERT INTO referrals (id, campaign_id, referrer_type, referrer_id, referee_type,
                                referee_id, token, source, state, created_at,
                                qualified_at, rewarded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)",
        rusqlite::params![
            referral.id,
            referral.campaign_id,
            referral.referrer_type,
            referral.referrer_id,
            referral.referee_type,
            referral.referee_id,
            referral.token,
            referral.source,
            referral.state.as_str(),
            referral.create_time as i64,
            referral.qualify_time.map(|t| t as i64),
            referral.reward_time.map(|t| t as i64),
        ],
    )
    .map_err(|e| map_unique_violation(e, "referral edge"))?;
    Ok(())
}

/// Get a referral by id.
pub fn get(conn: &Connection, id: &str) -> Result<Referral> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM referrals WHERE id = ?1"),
        [id],
        read_referral,
    )
    .map_err(|e| map_not_found(e, "referral"))
}

/// Get a referral by id, `None` if absent.
pub fn find(conn: &Connection, id: &str) -> Result<Option<Referral>> {
    optional(get(conn, id))
}

/// Whether the exact `(campaign, referrer, referee)` edge exists.
pub fn exists(
    conn: &Connection,
    campaign_id: &str,
    referrer: &Subject,
    referee: &Subject,
) -> Result<bool> {
    let found: bool = conn.query_row(
        "SELECT EXISTS(
             SELECT 1 FROM referrals
             WHERE campaign_id = ?1 AND referrer_type = ?2 AND referrer_id = ?3
               AND referee_type = ?4 AND referee_id = ?5)",
        rusqlite::params![
            campaign_id,
            referrer.subject_type,
            referrer.id,
            referee.subject_type,
            referee.id,
        ],
        |row| row.get(0),
    )?;
    Ok(found)
}

/// Find the referral that owns `referee` within a campaign.
///
/// Several referrers may have bound the same referee; `strategy` picks the
/// earliest (`FIRST`) or the latest (`LAST`) by creation time, then id.
pub fn find_by_referee(
    conn: &Connection,
    campaign_id: &str,
    referee: &Subject,
    strategy: AttributionStrategy,
) -> Result<Option<Referral>> {
    let order = match strategy {
        AttributionStrategy::First => "ASC",
        AttributionStrategy::Last => "DESC",
    };
    let sql = format!(
        "SELECT {COLUMNS} FROM referrals
         WHERE campaign_id = ?1 AND referee_type = ?2 AND referee_id = ?3
         ORDER BY created_at {order}, id {order} LIMIT 1"
    );
    let result = conn
        .query_row(
            &sql,
            rusqlite::params![campaign_id, referee.subject_type, referee.id],
            read_referral,
        )
        .map_err(|e| map_not_found(e, "referral"));
    optional(result)
}

/// Compare-and-set a referral's state and timestamps.
///
/// Only succeeds if the stored state still equals `expected`; otherwise
/// returns [`DbError::NotFound`].
pub fn update_state(
    conn: &Connection,
    id: &str,
    expected: ReferralState,
    new_state: ReferralState,
    qualify_time: Option<u64>,
    reward_time: Option<u64>,
) -> Result<()> {
    let updated = conn.execute(
        "UPDATE referrals SET state = ?1, qualified_at = ?2, rewarded_at = ?3
         WHERE id = ?4 AND state = ?5",
        rusqlite::params![
            new_state.as_str(),
            qualify_time.map(|t| t as i64),
            reward_time.map(|t| t as i64),
            id,
            expected.as_str(),
        ],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound(
            "referral not found or state changed".into(),
        ));
    }
    Ok(())
}

/// Count referrals in a campaign.
pub fn count_for_campaign(conn: &Connection, campaign_id: &str) -> Result<u64> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM referrals WHERE campaign_id = ?1",
        [campaign_id],
        |row| row.get(0),
    )?;
    Ok(n as u64)
}

fn read_referral(row: &Row<'_>) -> rusqlite::Result<Referral> {
    let state: String = row.get(8)?;
    let state = ReferralState::parse(&state)
        .ok_or_else(|| conversion_error(8, format!("unknown referral state '{state}'")))?;

    Ok(Referral {
        id: row.get(0)?,
        campaign_id: row.get(1)?,
        referrer_type: row.get(2)?,
        referrer_id: row.get(3)?,
        referee_type: row.get(4)?,
        referee_id: row.get(5)?,
        token: row.get(6)?,
        source: row.get(7)?,
        state,
        create_time: row.get::<_, i64>(9)? as u64,
        qualify_time: row.get::<_, Option<i64>>(10)?.map(|t| t as u64),
        reward_time: row.get::<_, Option<i64>>(11)?.map(|t| t as u64),
    })
}
