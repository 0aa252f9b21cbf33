//! Maintenance command handlers.

use rusqlite::Connection;
use serde::Deserialize;
use serde_json::Value;

use super::{parse_params, Result};
use crate::rpc::RpcError;
use crate::DaemonState;

#[derive(Deserialize, Default)]
struct SweepParams {
    /// Cutoff; defaults to now.
    #[serde(default)]
    before: Option<u64>,
}

/// Delete tokens that expired before the cutoff.
pub fn delete_expired_tokens(state: &DaemonState, conn: &Connection, params: &Value) -> Result {
    let p: SweepParams = if params.is_null() {
        SweepParams::default()
    } else {
        parse_params(params)?
    };
    let before = p.before.unwrap_or_else(|| state.clock.now());
    if i64::try_from(before).is_err() {
        return Err(RpcError::invalid_params("before is out of range"));
    }
    let deleted = state.manager.delete_expired_tokens(conn, before)?;
    Ok(serde_json::json!({ "deleted": deleted, "before": before }))
}
