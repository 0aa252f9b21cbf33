//! Campaign command handlers.

use rusqlite::Connection;
use serde::Deserialize;
use serde_json::Value;

use super::{parse_params, to_json, Result};
use crate::DaemonState;

#[derive(Deserialize)]
struct CampaignIdParams {
    campaign_id: String,
}

/// Create a campaign. `params` is the campaign config object itself.
pub fn create_campaign(state: &DaemonState, conn: &Connection, params: &Value) -> Result {
    let campaign_id = state.manager.create_campaign_from_json(conn, params)?;
    Ok(serde_json::json!({ "campaign_id": campaign_id }))
}

/// Get a campaign, or `null` if unknown.
pub fn get_campaign(state: &DaemonState, conn: &Connection, params: &Value) -> Result {
    let p: CampaignIdParams = parse_params(params)?;
    to_json(&state.manager.get_campaign(conn, &p.campaign_id)?)
}
