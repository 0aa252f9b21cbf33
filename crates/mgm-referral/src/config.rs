//! Typed campaign configuration and input validation.
//!
//! `create_campaign` accepts a [`CampaignConfig`], which is validated up
//! front into a [`NewCampaign`]. Untyped JSON input goes through
//! [`CampaignConfig::from_json`] first, so type mismatches and unknown
//! fields surface as [`ConfigError::Malformed`].

use mgm_types::{AttributionStrategy, MAX_IDEMPOTENCY_KEY_LEN};
use serde::{Deserialize, Serialize};

/// Maximum campaign name length, in characters.
pub const MAX_NAME_LEN: usize = 200;

/// Maximum attribution window (ten years).
pub const MAX_WINDOW_DAYS: u32 = 3650;

/// Validation failures.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("campaign name is required")]
    MissingName,

    #[error("campaign name is {len} chars, max {max}")]
    NameTooLong { len: usize, max: usize },

    #[error("window_days {days} exceeds max {max}")]
    WindowTooLong { days: u32, max: u32 },

    #[error("malformed campaign config: {0}")]
    Malformed(String),

    #[error("invalid idempotency key: {0}")]
    InvalidIdempotencyKey(&'static str),
}

/// Campaign creation input.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CampaignConfig {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub active: bool,
    #[serde(default = "default_window_days")]
    pub window_days: u32,
    #[serde(default)]
    pub attribution_strategy: AttributionStrategy,
    #[serde(default = "default_true")]
    pub self_block: bool,
    /// Minor units.
    #[serde(default)]
    pub budget_limit: Option<u64>,
    #[serde(default)]
    pub config: serde_json::Map<String, serde_json::Value>,
}

fn default_true() -> bool {
    true
}

fn default_window_days() -> u32 {
    30
}

impl Default for CampaignConfig {
    fn default() -> Self {
        Self {
            name: None,
            active: true,
            window_days: default_window_days(),
            attribution_strategy: AttributionStrategy::First,
            self_block: true,
            budget_limit: None,
            config: serde_json::Map::new(),
        }
    }
}

/// A validated campaign, ready to be assigned an id and persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct NewCampaign {
    pub name: String,
    pub active: bool,
    pub window_days: u32,
    pub attribution_strategy: AttributionStrategy,
    pub self_block: bool,
    pub budget_limit: Option<u64>,
    pub config: serde_json::Map<String, serde_json::Value>,
}

impl CampaignConfig {
    /// Named config with defaults for everything else.
    pub fn named(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    /// Parse loosely-typed JSON into a config.
    pub fn from_json(value: &serde_json::Value) -> Result<Self, ConfigError> {
        serde_json::from_value(value.clone()).map_err(|e| ConfigError::Malformed(e.to_string()))
    }

    /// Check required fields and bounds.
    pub fn validate(self) -> Result<NewCampaign, ConfigError> {
        let name = self
            .name
            .map(|n| n.trim().to_string())
            .filter(|n| !n.is_empty())
            .ok_or(ConfigError::MissingName)?;
        let len = name.chars().count();
        if len > MAX_NAME_LEN {
            return Err(ConfigError::NameTooLong {
                len,
                max: MAX_NAME_LEN,
            });
        }
        if self.window_days > MAX_WINDOW_DAYS {
            return Err(ConfigError::WindowTooLong {
                days: self.window_days,
                max: MAX_WINDOW_DAYS,
            });
        }

        Ok(NewCampaign {
            name,
            active: self.active,
            window_days: self.window_days,
            attribution_strategy: self.attribution_strategy,
            self_block: self.self_block,
            budget_limit: self.budget_limit,
            config: self.config,
        })
    }
}

/// Keys must be non-blank and at most [`MAX_IDEMPOTENCY_KEY_LEN`] bytes.
pub fn validate_idempotency_key(key: &str) -> Result<(), ConfigError> {
    if key.trim().is_empty() {
        return Err(ConfigError::InvalidIdempotencyKey("must not be empty"));
    }
    if key.len() > MAX_IDEMPOTENCY_KEY_LEN {
        return Err(ConfigError::InvalidIdempotencyKey("must be <= 128 bytes"));
    }
    Ok(())
}
