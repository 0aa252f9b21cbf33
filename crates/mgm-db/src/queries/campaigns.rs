//! Campaign query functions.

use mgm_types::{AttributionStrategy, Campaign};
use rusqlite::{Connection, Row};

use crate::{map_not_found, map_unique_violation, optional, DbError, Result};

const COLUMNS: &str = "id, name, active, window_days, attribution_strategy, self_block,
     budget_limit, config_json, created_at";

/// Insert a new campaign.
pub fn insert(conn: &Connection, campaign: &Campaign) -> Result<()> {
    let config_json = serde_json::to_string(&campaign.config)
        .map_err(|e| DbError::Serialization(e.to_string()))?;
    conn.execute(
        "INSERT INTO campaigns (id, name, active, window_days, attribution_strategy, self_block,
                                budget_limit, config_json, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
        rusqlite::params![
            campaign.id,
            campaign.name,
            campaign.active,
            campaign.window_days,
            campaign.attribution_strategy.as_str(),
            campaign.self_block,
            campaign.budget_limit.map(|b| b as i64),
            config_json,
            campaign.create_time as i64,
        ],
    )
    .map_err(|e| map_unique_violation(e, "campaign id"))?;
    Ok(())
}

/// Get a campaign by id.
pub fn get(conn: &Connection, id: &str) -> Result<Campaign> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM campaigns WHERE id = ?1"),
        [id],
        read_campaign,
    )
    .map_err(|e| map_not_found(e, "campaign"))
}

/// Get a campaign by id, `None` if absent.
pub fn find(conn: &Connection, id: &str) -> Result<Option<Campaign>> {
    optional(get(conn, id))
}

/// Activate or deactivate a campaign.
pub fn set_active(conn: &Connection, id: &str, active: bool) -> Result<()> {
    let updated = conn.execute(
        "UPDATE campaigns SET active = ?1 WHERE id = ?2",
        rusqlite::params![active, id],
    )?;
    if updated == 0 {
        return Err(DbError::NotFound("campaign".into()));
    }
    Ok(())
}

fn read_campaign(row: &Row<'_>) -> rusqlite::Result<Campaign> {
    let strategy: String = row.get(4)?;
    let attribution_strategy = AttributionStrategy::parse(&strategy).ok_or_else(|| {
        conversion_error(4, format!("unknown attribution strategy '{strategy}'"))
    })?;
    let config_json: String = row.get(7)?;
    let config = serde_json::from_str(&config_json)
        .map_err(|e| conversion_error(7, format!("campaign config: {e}")))?;

    Ok(Campaign {
        id: row.get(0)?,
        name: row.get(1)?,
        active: row.get(2)?,
        window_days: row.get(3)?,
        attribution_strategy,
        self_block: row.get(5)?,
        budget_limit: row.get::<_, Option<i64>>(6)?.map(|b| b as u64),
        config,
        create_time: row.get::<_, i64>(8)? as u64,
    })
}

/// Build a column conversion error carrying a [`DbError::Serialization`].
pub(crate) fn conversion_error(column: usize, detail: String) -> rusqlite::Error {
    rusqlite::Error::FromSqlConversionFailure(
        column,
        rusqlite::types::Type::Text,
        Box::new(DbError::Serialization(detail)),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queries::fixtures::{campaign, test_db};

    #[test]
    fn test_insert_and_get() {
        let conn = test_db();
        let mut c = campaign("c1");
        c.budget_limit = Some(50_000);
        c.attribution_strategy = AttributionStrategy::Last;
        c.config.insert("tier".into(), serde_json::json!("gold"));
        insert(&conn, &c).expect("insert");

        let loaded = get(&conn, "c1").expect("get");
        assert_eq!(loaded, c);
    }

    #[test]
    fn test_find_missing() {
        let conn = test_db();
        assert!(find(&conn, "nope").expect("find").is_none());
        assert!(matches!(get(&conn, "nope"), Err(DbError::NotFound(_))));
    }

    #[test]
    fn test_duplicate_id_is_constraint() {
        let conn = test_db();
        insert(&conn, &campaign("c1")).expect("insert");
        let result = insert(&conn, &campaign("c1"));
        assert!(matches!(result, Err(DbError::Constraint(_))));
    }

    #[test]
    fn test_set_active() {
        let conn = test_db();
        insert(&conn, &campaign("c1")).expect("insert");
        set_active(&conn, "c1", false).expect("deactivate");
        assert!(!get(&conn, "c1").expect("get").active);
        assert!(matches!(
            set_active(&conn, "missing", true),
            Err(DbError::NotFound(_))
        ));
    }
}
