//! Campaign structures.

use serde::{Deserialize, Serialize};

use crate::{CampaignId, Timestamp, SECS_PER_DAY};

/// Which referral wins when several referrers bound the same referee.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AttributionStrategy {
    /// Earliest binding wins.
    #[default]
    First,
    /// Most recent binding wins.
    Last,
}

impl AttributionStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::First => "FIRST",
            Self::Last => "LAST",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "FIRST" => Some(Self::First),
            "LAST" => Some(Self::Last),
            _ => None,
        }
    }
}

/// A referral campaign.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize, ts_rs::TS)]
pub struct Campaign {
    pub id: CampaignId,
    pub name: String,
    pub active: bool,
    /// Attribution window; tokens live this many days.
    pub window_days: u32,
    pub attribution_strategy: AttributionStrategy,
    /// Forbid referrer == referee.
    pub self_block: bool,
    /// Reward budget in minor units. `None` = unlimited.
    pub budget_limit: Option<u64>,
    #[ts(type = "Record<string, unknown>")]
    pub config: serde_json::Map<String, serde_json::Value>,
    pub create_time: Timestamp,
}

impl Campaign {
    /// Length of the attribution window in seconds.
    pub fn window_secs(&self) -> u64 {
        u64::from(self.window_days) * SECS_PER_DAY
    }
}
