//! Caller-facing referral use-cases.
//!
//! Every mutating use-case except campaign creation and token issuance is
//! wrapped in [`IdempotencyCache::get_or_store`] with its own scope, so a
//! retried request with the same key returns the first outcome.

use std::sync::Arc;

use mgm_db::queries::{campaigns, evidence as evidence_q};
use mgm_types::{
    AttributionToken, Campaign, CampaignId, Evidence, IssueResult, QualificationResult, Referral,
    ReferralId, ReferralState, RewardIntent, Subject, SCOPE_BIND_REFERRAL, SCOPE_INGEST_EVIDENCE,
    SCOPE_ISSUE_REWARD, SCOPE_REVOKE_REFERRAL,
};
use rusqlite::Connection;
use tracing::{debug, info, warn};

use crate::{
    AttributionService, CampaignConfig, Clock, IdGenerator, IdempotencyCache, ReferralError,
    ReferralService, Result, RewardIssuer,
};

/// Source states from which evidence may qualify a referral.
pub const QUALIFYING_STATES: &[ReferralState] = &[ReferralState::Attributed];

/// Options for token issuance.
#[derive(Debug, Clone, Default)]
pub struct TokenOptions {
    /// Where the referrer intends to share the token (for logs only).
    pub source: Option<String>,
}

/// Composes the services into the referral program's use-cases.
#[derive(Clone)]
pub struct ReferralManager {
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
    attribution: AttributionService,
    referrals: ReferralService,
    idempotency: IdempotencyCache,
}

impl ReferralManager {
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self {
            attribution: AttributionService::new(clock.clone()),
            referrals: ReferralService::new(clock.clone(), ids.clone()),
            idempotency: IdempotencyCache::new(clock.clone()),
            clock,
            ids,
        }
    }

    /// Validate `config` and persist a new campaign.
    pub fn create_campaign(&self, conn: &Connection, config: CampaignConfig) -> Result<CampaignId> {
        let new = config.validate()?;
        let campaign = Campaign {
            id: self.ids.generate(),
            name: new.name,
            active: new.active,
            window_days: new.window_days,
            attribution_strategy: new.attribution_strategy,
            self_block: new.self_block,
            budget_limit: new.budget_limit,
            config: new.config,
            create_time: self.clock.now(),
        };
        campaigns::insert(conn, &campaign)?;
        info!(campaign_id = %campaign.id, name = %campaign.name, "Campaign created");
        Ok(campaign.id)
    }

    /// [`Self::create_campaign`] from untyped JSON.
    pub fn create_campaign_from_json(
        &self,
        conn: &Connection,
        config: &serde_json::Value,
    ) -> Result<CampaignId> {
        self.create_campaign(conn, CampaignConfig::from_json(config)?)
    }

    pub fn get_campaign(&self, conn: &Connection, campaign_id: &str) -> Result<Option<Campaign>> {
        Ok(campaigns::find(conn, campaign_id)?)
    }

    /// Issue an attribution token; the campaign must exist and be active.
    pub fn generate_referral_token(
        &self,
        conn: &Connection,
        campaign_id: &str,
        referrer: &Subject,
        opts: &TokenOptions,
    ) -> Result<AttributionToken> {
        let campaign = active_campaign(conn, campaign_id)?;
        let token = self.attribution.generate_token(conn, &campaign, referrer)?;
        info!(
            campaign_id = %campaign.id,
            referrer = %referrer,
            source = opts.source.as_deref().unwrap_or("-"),
            "Referral token issued"
        );
        Ok(token)
    }

    pub fn validate_token(&self, conn: &Connection, token: &str) -> Result<Option<AttributionToken>> {
        self.attribution.validate_token(conn, token)
    }

    /// Bind `referrer -> referee` exactly once per `idem_key`.
    ///
    /// A supplied token is kept only if it is live and was issued to the
    /// same referrer for the same campaign.
    #[allow(clippy::too_many_arguments)]
    pub fn bind_referral(
        &self,
        conn: &Connection,
        campaign_id: &str,
        referrer: &Subject,
        referee: &Subject,
        source: &str,
        token: Option<&str>,
        idem_key: &str,
    ) -> Result<ReferralId> {
        self.idempotency
            .get_or_store(conn, idem_key, SCOPE_BIND_REFERRAL, |tx| {
                let campaign = active_campaign(tx, campaign_id)?;
                let token = match token {
                    Some(t) => self.matching_token(tx, &campaign, referrer, t)?,
                    None => None,
                };
                let referral = self.referrals.bind_referral(
                    tx,
                    &campaign,
                    referrer,
                    referee,
                    source,
                    token.as_deref(),
                )?;
                Ok(referral.id)
            })
    }

    /// Evaluate `evidence` for `referee`'s referral exactly once per
    /// `idem_key`.
    pub fn ingest_evidence(
        &self,
        conn: &Connection,
        campaign_id: &str,
        referee: &Subject,
        evidence: &Evidence,
        idem_key: &str,
    ) -> Result<QualificationResult> {
        self.idempotency
            .get_or_store(conn, idem_key, SCOPE_INGEST_EVIDENCE, |tx| {
                let campaign = campaigns::find(tx, campaign_id)?
                    .ok_or_else(|| ReferralError::CampaignNotFound(campaign_id.to_string()))?;

                let Some(referral) = self.referrals.find_for_referee(tx, &campaign, referee)? else {
                    return Ok(QualificationResult::no_referral());
                };
                if !QUALIFYING_STATES.contains(&referral.state) {
                    debug!(referral_id = %referral.id, state = %referral.state, "Evidence ignored");
                    return Ok(QualificationResult::already_processed());
                }

                let qualified =
                    self.referrals
                        .update_state(tx, &referral, ReferralState::Qualified)?;
                evidence_q::insert(tx, &qualified.id, evidence, self.clock.now())?;
                info!(
                    referral_id = %qualified.id,
                    evidence_type = %evidence.evidence_type,
                    evidence_id = %evidence.id,
                    "Referral qualified"
                );
                Ok(QualificationResult::qualified(qualified.id))
            })
    }

    pub fn get_referral(&self, conn: &Connection, referral_id: &str) -> Result<Option<Referral>> {
        self.referrals.get_referral(conn, referral_id)
    }

    /// Cancel a referral. Replays return the referral as it was revoked.
    pub fn revoke_referral(
        &self,
        conn: &Connection,
        referral_id: &str,
        idem_key: &str,
    ) -> Result<Referral> {
        self.idempotency
            .get_or_store(conn, idem_key, SCOPE_REVOKE_REFERRAL, |tx| {
                let referral = self.require_referral(tx, referral_id)?;
                self.referrals
                    .update_state(tx, &referral, ReferralState::Revoked)
            })
    }

    /// Pay out a QUALIFIED referral through `issuer` and mark it REWARDED.
    ///
    /// Issuance and the REWARDED write commit or roll back together, with
    /// the write lock held across the issuer call.
    pub fn reward_referral(
        &self,
        conn: &Connection,
        referral_id: &str,
        issuer: &dyn RewardIssuer,
        idem_key: &str,
    ) -> Result<IssueResult> {
        self.idempotency
            .get_or_store(conn, idem_key, SCOPE_ISSUE_REWARD, |tx| {
                let referral = self.require_referral(tx, referral_id)?;
                if referral.state != ReferralState::Qualified {
                    return Err(ReferralError::IllegalTransition {
                        from: referral.state,
                        to: ReferralState::Rewarded,
                    });
                }
                let campaign = campaigns::find(tx, &referral.campaign_id)?.ok_or_else(|| {
                    ReferralError::CampaignNotFound(referral.campaign_id.clone())
                })?;

                let intent = RewardIntent {
                    referral_id: referral.id.clone(),
                    campaign_id: campaign.id.clone(),
                    referrer: referral.referrer(),
                    referee: referral.referee(),
                    budget_limit: campaign.budget_limit,
                };
                let issued = issuer.issue_reward(&intent, idem_key)?;
                self.referrals
                    .update_state(tx, &referral, ReferralState::Rewarded)?;
                info!(
                    referral_id = %referral.id,
                    reward_id = %issued.reward_id,
                    "Referral rewarded"
                );
                Ok(issued)
            })
    }

    /// Maintenance sweep; see [`AttributionService::delete_expired_tokens`].
    pub fn delete_expired_tokens(&self, conn: &Connection, before: u64) -> Result<usize> {
        self.attribution.delete_expired_tokens(conn, before)
    }

    fn require_referral(&self, conn: &Connection, referral_id: &str) -> Result<Referral> {
        self.referrals
            .get_referral(conn, referral_id)?
            .ok_or_else(|| ReferralError::ReferralNotFound(referral_id.to_string()))
    }

    fn matching_token(
        &self,
        conn: &Connection,
        campaign: &Campaign,
        referrer: &Subject,
        token: &str,
    ) -> Result<Option<String>> {
        match self.attribution.validate_token(conn, token)? {
            Some(t) if t.campaign_id == campaign.id && t.referrer().same_as(referrer) => {
                Ok(Some(t.token))
            }
            Some(_) => {
                warn!(campaign_id = %campaign.id, referrer = %referrer, "Token belongs to another campaign or referrer, ignoring");
                Ok(None)
            }
            None => {
                warn!(campaign_id = %campaign.id, referrer = %referrer, "Token unknown or expired, ignoring");
                Ok(None)
            }
        }
    }
}

/// Load a campaign that exists and is active.
fn active_campaign(conn: &Connection, campaign_id: &str) -> Result<Campaign> {
    match campaigns::find(conn, campaign_id)? {
        Some(c) if c.active => Ok(c),
        _ => Err(ReferralError::CampaignNotFound(campaign_id.to_string())),
    }
}
