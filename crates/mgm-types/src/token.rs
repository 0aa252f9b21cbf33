//! Attribution token structures.

use serde::{Deserialize, Serialize};

use crate::{CampaignId, Subject, Timestamp};

/// A short-lived credential binding a referrer to a campaign.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ts_rs::TS)]
pub struct AttributionToken {
    pub token: String,
    pub campaign_id: CampaignId,
    pub referrer_type: String,
    pub referrer_id: String,
    pub expire_time: Timestamp,
    pub create_time: Timestamp,
}

impl AttributionToken {
    pub fn referrer(&self) -> Subject {
        Subject::new(self.referrer_type.clone(), self.referrer_id.clone())
    }

    /// A token is live strictly before its expire time.
    pub fn is_live_at(&self, now: Timestamp) -> bool {
        self.expire_time > now
    }
}
