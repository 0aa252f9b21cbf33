//! External reward issuance seam.

use mgm_types::{IssueResult, RewardIntent};

use crate::Result;

/// Issues rewards and ledger records for qualified referrals.
///
/// Implementations live outside this crate. The same `idem_key` the
/// caller gave the manager is forwarded, so the issuer can dedupe on its
/// side if the manager retries after a failure between issuance and the
/// REWARDED transition.
///
/// `issue_reward` runs inside the reward transaction and holds the
/// database write lock until it returns. Other writers wait up to the
/// busy timeout, so issuers should answer well within it.
pub trait RewardIssuer: Send + Sync {
    fn issue_reward(&self, intent: &RewardIntent, idem_key: &str) -> Result<IssueResult>;
}
