//! Token and referral command handlers.

use mgm_referral::TokenOptions;
use mgm_types::{Evidence, Subject};
use rusqlite::Connection;
use serde::Deserialize;
use serde_json::Value;

use super::{parse_params, to_json, Result};
use crate::DaemonState;

#[derive(Deserialize)]
struct TokenParams {
    campaign_id: String,
    referrer: Subject,
    #[serde(default)]
    source: Option<String>,
}

#[derive(Deserialize)]
struct ValidateParams {
    token: String,
}

#[derive(Deserialize)]
struct BindParams {
    campaign_id: String,
    referrer: Subject,
    referee: Subject,
    #[serde(default = "default_source")]
    source: String,
    #[serde(default)]
    token: Option<String>,
    idempotency_key: String,
}

#[derive(Deserialize)]
struct IngestParams {
    campaign_id: String,
    referee: Subject,
    evidence: Evidence,
    idempotency_key: String,
}

#[derive(Deserialize)]
struct ReferralIdParams {
    referral_id: String,
}

#[derive(Deserialize)]
struct RevokeParams {
    referral_id: String,
    idempotency_key: String,
}

fn default_source() -> String {
    "direct".to_string()
}

/// Issue an attribution token for a referrer.
pub fn generate_referral_token(state: &DaemonState, conn: &Connection, params: &Value) -> Result {
    let p: TokenParams = parse_params(params)?;
    let opts = TokenOptions { source: p.source };
    let token = state
        .manager
        .generate_referral_token(conn, &p.campaign_id, &p.referrer, &opts)?;
    to_json(&token)
}

/// Look up a live token; `null` when unknown or expired.
pub fn validate_token(state: &DaemonState, conn: &Connection, params: &Value) -> Result {
    let p: ValidateParams = parse_params(params)?;
    to_json(&state.manager.validate_token(conn, &p.token)?)
}

pub fn bind_referral(state: &DaemonState, conn: &Connection, params: &Value) -> Result {
    let p: BindParams = parse_params(params)?;
    let referral_id = state.manager.bind_referral(
        conn,
        &p.campaign_id,
        &p.referrer,
        &p.referee,
        &p.source,
        p.token.as_deref(),
        &p.idempotency_key,
    )?;
    Ok(serde_json::json!({ "referral_id": referral_id }))
}

pub fn ingest_evidence(state: &DaemonState, conn: &Connection, params: &Value) -> Result {
    let p: IngestParams = parse_params(params)?;
    let result = state.manager.ingest_evidence(
        conn,
        &p.campaign_id,
        &p.referee,
        &p.evidence,
        &p.idempotency_key,
    )?;
    to_json(&result)
}

/// Get a referral, or `null` if unknown.
pub fn get_referral(state: &DaemonState, conn: &Connection, params: &Value) -> Result {
    let p: ReferralIdParams = parse_params(params)?;
    to_json(&state.manager.get_referral(conn, &p.referral_id)?)
}

pub fn revoke_referral(state: &DaemonState, conn: &Connection, params: &Value) -> Result {
    let p: RevokeParams = parse_params(params)?;
    let referral = state
        .manager
        .revoke_referral(conn, &p.referral_id, &p.idempotency_key)?;
    to_json(&referral)
}
