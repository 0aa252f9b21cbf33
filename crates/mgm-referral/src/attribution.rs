//! Attribution token issuance and validation.
//!
//! A token links a referrer to a campaign for `campaign.window_days` days.
//! Expired tokens are indistinguishable from unknown ones: both validate
//! to `None`.

use std::sync::Arc;

use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine;
use mgm_db::queries::tokens;
use mgm_types::{AttributionToken, Campaign, Subject};
use rusqlite::Connection;
use tracing::debug;

use crate::{Clock, Result};

/// Random bytes per token value (32 URL-safe chars).
pub const TOKEN_BYTES: usize = 24;

/// Issues and validates attribution tokens.
#[derive(Clone)]
pub struct AttributionService {
    clock: Arc<dyn Clock>,
}

impl AttributionService {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Issue a token for `referrer` valid for the campaign's window.
    pub fn generate_token(
        &self,
        conn: &Connection,
        campaign: &Campaign,
        referrer: &Subject,
    ) -> Result<AttributionToken> {
        let now = self.clock.now();
        let token = AttributionToken {
            token: new_token_value(),
            campaign_id: campaign.id.clone(),
            referrer_type: referrer.subject_type.clone(),
            referrer_id: referrer.id.clone(),
            expire_time: now.saturating_add(campaign.window_secs()),
            create_time: now,
        };
        tokens::insert(conn, &token)?;
        debug!(
            campaign_id = %campaign.id,
            referrer = %referrer,
            expire_time = token.expire_time,
            "Issued attribution token"
        );
        Ok(token)
    }

    /// Return the token only if it exists and has not expired.
    pub fn validate_token(&self, conn: &Connection, token: &str) -> Result<Option<AttributionToken>> {
        let now = self.clock.now();
        Ok(tokens::find(conn, token)?.filter(|t| t.is_live_at(now)))
    }

    /// Delete tokens that expired strictly before `before`.
    pub fn delete_expired_tokens(&self, conn: &Connection, before: u64) -> Result<usize> {
        let deleted = tokens::delete_expired(conn, before)?;
        if deleted > 0 {
            debug!(deleted, before, "Swept expired attribution tokens");
        }
        Ok(deleted)
    }
}

fn new_token_value() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::RngCore::fill_bytes(&mut rand::rngs::OsRng, &mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}
