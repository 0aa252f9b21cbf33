//! # mgm-referral
//!
//! Orchestration core for the member-get-member referral program.
//!
//! This crate implements:
//!
//! - [`clock`] / [`id`] - injectable time source and ULID generator
//! - [`attribution`] - TTL-bound attribution tokens
//! - [`referral`] - referral edges and the lifecycle state machine
//! - [`idempotency`] - at-most-once wrapper keyed by `(key, scope)`
//! - [`manager`] - caller-facing use-cases composed from the above
//!
//! ## Concurrency
//!
//! Nothing here holds an in-process lock. Each use-case is one
//! synchronous store round-trip on the caller's connection; mutual
//! exclusion comes from store constraints (the referral edge unique index
//! and the idempotency primary key) and SQLite's writer serialization.

pub mod attribution;
pub mod clock;
pub mod config;
pub mod id;
pub mod idempotency;
pub mod manager;
pub mod referral;
pub mod reward;

pub use attribution::AttributionService;
pub use clock::{Clock, FixedClock, SystemClock};
pub use config::{CampaignConfig, ConfigError, NewCampaign};
pub use id::{IdGenerator, UlidGenerator};
pub use idempotency::IdempotencyCache;
pub use manager::{ReferralManager, TokenOptions};
pub use referral::{ReferralService, Transition};
pub use reward::RewardIssuer;

use mgm_db::DbError;
use mgm_types::ReferralState;

/// Error types for referral operations.
#[derive(Debug, thiserror::Error)]
pub enum ReferralError {
    /// The campaign does not exist or is not active.
    #[error("campaign not found or inactive: {0}")]
    CampaignNotFound(String),

    /// Referrer and referee are the same subject in a self-blocking campaign.
    #[error("self-referral not allowed")]
    SelfReferralNotAllowed,

    /// The `(campaign, referrer, referee)` edge already exists.
    #[error("duplicate referral")]
    DuplicateReferral,

    /// Caller input failed validation.
    #[error("invalid config: {0}")]
    InvalidConfig(#[from] ConfigError),

    /// The state machine forbids this jump.
    #[error("illegal transition {from} -> {to}")]
    IllegalTransition {
        /// Current state.
        from: ReferralState,
        /// Requested state.
        to: ReferralState,
    },

    /// The referral changed state between read and write.
    #[error("referral {0} changed state concurrently")]
    StaleState(String),

    /// No referral with this id.
    #[error("referral not found: {0}")]
    ReferralNotFound(String),

    /// A pending idempotency record exists for this key.
    #[error("operation in progress for key '{key}' in scope '{scope}'")]
    IdempotencyInProgress {
        /// Idempotency key.
        key: String,
        /// Operation scope.
        scope: String,
    },

    /// A captured result could not be encoded or decoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// The external reward issuer failed.
    #[error("reward issuance failed: {0}")]
    Reward(String),

    /// Store failure.
    #[error("database error: {0}")]
    Db(#[from] DbError),
}

impl From<rusqlite::Error> for ReferralError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Db(DbError::Sqlite(err))
    }
}

/// Convenience result type for referral operations.
pub type Result<T> = std::result::Result<T, ReferralError>;
