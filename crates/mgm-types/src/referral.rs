//! Referral structures and qualification results.

use serde::{Deserialize, Serialize};

use crate::{CampaignId, ReferralId, Subject, Timestamp};

/// Lifecycle state of a referral.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, ts_rs::TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReferralState {
    Created,
    /// Edge established, awaiting qualification.
    Attributed,
    Qualified,
    Rewarded,
    Revoked,
}

impl ReferralState {
    pub const ALL: [ReferralState; 5] = [
        Self::Created,
        Self::Attributed,
        Self::Qualified,
        Self::Rewarded,
        Self::Revoked,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Created => "CREATED",
            Self::Attributed => "ATTRIBUTED",
            Self::Qualified => "QUALIFIED",
            Self::Rewarded => "REWARDED",
            Self::Revoked => "REVOKED",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|state| state.as_str() == s)
    }

    /// No transition leaves a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Rewarded | Self::Revoked)
    }
}

impl std::fmt::Display for ReferralState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A directed, campaign-scoped edge from referrer to referee.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
pub struct Referral {
    pub id: ReferralId,
    pub campaign_id: CampaignId,
    pub referrer_type: String,
    pub referrer_id: String,
    pub referee_type: String,
    pub referee_id: String,
    pub token: Option<String>,
    pub source: String,
    pub state: ReferralState,
    pub create_time: Timestamp,
    pub qualify_time: Option<Timestamp>,
    pub reward_time: Option<Timestamp>,
}

impl Referral {
    pub fn referrer(&self) -> Subject {
        Subject::new(self.referrer_type.clone(), self.referrer_id.clone())
    }

    pub fn referee(&self) -> Subject {
        Subject::new(self.referee_type.clone(), self.referee_id.clone())
    }
}

/// Outcome of evidence ingestion.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[serde(rename_all = "snake_case")]
pub enum QualificationStatus {
    Qualified,
    Noop,
}

/// Result returned by evidence ingestion; also the value captured by the
/// idempotency cache for replays.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
pub struct QualificationResult {
    pub status: QualificationStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default)]
    pub referral_id: Option<ReferralId>,
}

impl QualificationResult {
    pub const NO_REFERRAL: &'static str = "No referral found";
    pub const ALREADY_PROCESSED: &'static str = "Referral already processed";

    pub fn qualified(referral_id: impl Into<ReferralId>) -> Self {
        Self {
            status: QualificationStatus::Qualified,
            reason: None,
            referral_id: Some(referral_id.into()),
        }
    }

    pub fn no_referral() -> Self {
        Self {
            status: QualificationStatus::Noop,
            reason: Some(Self::NO_REFERRAL.to_string()),
            referral_id: None,
        }
    }

    /// The referral exists but has left the qualifying states. Carries no
    /// id, same as [`Self::no_referral`].
    pub fn already_processed() -> Self {
        Self {
            status: QualificationStatus::Noop,
            reason: Some(Self::ALREADY_PROCESSED.to_string()),
            referral_id: None,
        }
    }
}
