//! Referral edges and the lifecycle state machine.
//!
//! ```text
//! CREATED ──► ATTRIBUTED ──► QUALIFIED ──► REWARDED
//!    │            │              │
//!    └────────────┴──────────────┴──────► REVOKED
//! ```
//!
//! REWARDED and REVOKED are terminal. Requesting the current state again
//! is a no-op that leaves timestamps untouched.

use std::sync::Arc;

use mgm_db::queries::referrals;
use mgm_db::DbError;
use mgm_types::{Campaign, Referral, ReferralState, Subject};
use rusqlite::Connection;
use tracing::{debug, info};

use crate::{Clock, IdGenerator, ReferralError, Result};

/// What applying a transition does.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// Write the new state.
    Apply,
    /// Already in the requested state.
    Noop,
}

/// Check `from -> to` against the transition table.
pub fn transition(from: ReferralState, to: ReferralState) -> Result<Transition> {
    use ReferralState::*;

    if from == to {
        return Ok(Transition::Noop);
    }
    if from.is_terminal() {
        return Err(ReferralError::IllegalTransition { from, to });
    }
    let legal = match from {
        Created => matches!(to, Attributed | Revoked),
        Attributed => matches!(to, Qualified | Revoked),
        Qualified => matches!(to, Rewarded | Revoked),
        Rewarded | Revoked => false,
    };
    if legal {
        Ok(Transition::Apply)
    } else {
        Err(ReferralError::IllegalTransition { from, to })
    }
}

/// Creates referral edges and moves them through their lifecycle.
#[derive(Clone)]
pub struct ReferralService {
    clock: Arc<dyn Clock>,
    ids: Arc<dyn IdGenerator>,
}

impl ReferralService {
    pub fn new(clock: Arc<dyn Clock>, ids: Arc<dyn IdGenerator>) -> Self {
        Self { clock, ids }
    }

    /// Create an ATTRIBUTED referral from `referrer` to `referee`.
    ///
    /// Not idempotent: a second call with the same tuple fails
    /// [`ReferralError::DuplicateReferral`]. Route through
    /// [`crate::ReferralManager::bind_referral`] for exactly-once delivery.
    pub fn bind_referral(
        &self,
        conn: &Connection,
        campaign: &Campaign,
        referrer: &Subject,
        referee: &Subject,
        source: &str,
        token: Option<&str>,
    ) -> Result<Referral> {
        if campaign.self_block && referrer.same_as(referee) {
            return Err(ReferralError::SelfReferralNotAllowed);
        }
        if referrals::exists(conn, &campaign.id, referrer, referee)? {
            return Err(ReferralError::DuplicateReferral);
        }

        let referral = Referral {
            id: self.ids.generate(),
            campaign_id: campaign.id.clone(),
            referrer_type: referrer.subject_type.clone(),
            referrer_id: referrer.id.clone(),
            referee_type: referee.subject_type.clone(),
            referee_id: referee.id.clone(),
            token: token.map(str::to_string),
            source: source.to_string(),
            state: ReferralState::Attributed,
            create_time: self.clock.now(),
            qualify_time: None,
            reward_time: None,
        };

        // The unique index catches a concurrent binder that passed `exists`
        match referrals::insert(conn, &referral) {
            Ok(()) => {}
            Err(DbError::Constraint(_)) => return Err(ReferralError::DuplicateReferral),
            Err(e) => return Err(e.into()),
        }

        info!(
            referral_id = %referral.id,
            campaign_id = %campaign.id,
            referrer = %referrer,
            referee = %referee,
            "Referral bound"
        );
        Ok(referral)
    }

    /// Move `referral` to `new_state` and return the updated record.
    ///
    /// QUALIFIED stamps `qualify_time` and REWARDED stamps `reward_time`,
    /// each only if unset. The write is compare-and-set on the state
    /// `referral` was read in.
    pub fn update_state(
        &self,
        conn: &Connection,
        referral: &Referral,
        new_state: ReferralState,
    ) -> Result<Referral> {
        if transition(referral.state, new_state)? == Transition::Noop {
            debug!(referral_id = %referral.id, state = %new_state, "State unchanged");
            return Ok(referral.clone());
        }

        let now = self.clock.now();
        let mut next = referral.clone();
        next.state = new_state;
        match new_state {
            ReferralState::Qualified => {
                next.qualify_time.get_or_insert(now);
            }
            ReferralState::Rewarded => {
                next.reward_time.get_or_insert(now);
            }
            _ => {}
        }

        referrals::update_state(
            conn,
            &referral.id,
            referral.state,
            new_state,
            next.qualify_time,
            next.reward_time,
        )
        .map_err(|e| match e {
            DbError::NotFound(_) => ReferralError::StaleState(referral.id.clone()),
            other => other.into(),
        })?;

        info!(
            referral_id = %referral.id,
            from = %referral.state,
            to = %new_state,
            "Referral state changed"
        );
        Ok(next)
    }

    pub fn get_referral(&self, conn: &Connection, id: &str) -> Result<Option<Referral>> {
        Ok(referrals::find(conn, id)?)
    }

    /// The referral owning `referee` in `campaign`, chosen by the
    /// campaign's attribution strategy.
    pub fn find_for_referee(
        &self,
        conn: &Connection,
        campaign: &Campaign,
        referee: &Subject,
    ) -> Result<Option<Referral>> {
        Ok(referrals::find_by_referee(
            conn,
            &campaign.id,
            referee,
            campaign.attribution_strategy,
        )?)
    }
}
