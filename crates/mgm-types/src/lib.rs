//! # mgm-types
//!
//! Shared domain types for the member-get-member referral backend.
//!
//! All timestamps are Unix epoch seconds (`u64`). Identifiers are ULID
//! strings (26 chars, Crockford Base32), except attribution tokens which
//! are opaque URL-safe strings.

pub mod campaign;
pub mod referral;
pub mod reward;
pub mod subject;
pub mod token;

pub use campaign::{AttributionStrategy, Campaign};
pub use referral::{QualificationResult, QualificationStatus, Referral, ReferralState};
pub use reward::{IssueResult, RewardIntent};
pub use subject::{Evidence, Subject};
pub use token::AttributionToken;

/// Common type aliases.
pub type CampaignId = String;
pub type ReferralId = String;
pub type Timestamp = u64;

/// Seconds in one attribution-window day.
pub const SECS_PER_DAY: u64 = 24 * 60 * 60;

/// Maximum length of a caller-supplied idempotency key, in bytes.
pub const MAX_IDEMPOTENCY_KEY_LEN: usize = 128;

/// Idempotency scope used by the bind-referral use-case.
pub const SCOPE_BIND_REFERRAL: &str = "bind_referral";

/// Idempotency scope used by the ingest-evidence use-case.
pub const SCOPE_INGEST_EVIDENCE: &str = "ingest_evidence";

/// Idempotency scope used by the revoke-referral use-case.
pub const SCOPE_REVOKE_REFERRAL: &str = "revoke_referral";

/// Idempotency scope used by the issue-reward use-case.
pub const SCOPE_ISSUE_REWARD: &str = "issue_reward";

#[cfg(test)]
mod tests {
    #[test]
    #[ignore] // Run manually to generate bindings
    fn export_ts_bindings() {
        use ts_rs::TS;
        let dir = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../bindings");
        std::fs::create_dir_all(&dir).expect("create bindings dir");
        crate::campaign::Campaign::export_all_to(&dir).expect("export Campaign");
        crate::referral::Referral::export_all_to(&dir).expect("export Referral");
        crate::referral::QualificationResult::export_all_to(&dir)
            .expect("export QualificationResult");
        crate::token::AttributionToken::export_all_to(&dir).expect("export AttributionToken");
    }
}
