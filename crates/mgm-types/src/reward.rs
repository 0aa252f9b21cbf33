//! Reward-issuance contract types.
//!
//! Issuance itself lives outside this workspace; these are the values
//! exchanged across the `RewardIssuer` seam.

use serde::{Deserialize, Serialize};

use crate::{CampaignId, ReferralId, Subject};

/// What the external issuer is asked to pay out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RewardIntent {
    pub referral_id: ReferralId,
    pub campaign_id: CampaignId,
    pub referrer: Subject,
    pub referee: Subject,
    pub budget_limit: Option<u64>,
}

/// Issuer's answer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueResult {
    pub reward_id: String,
    pub status: String,
}
