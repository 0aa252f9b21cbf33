//! SQL schema definitions.

/// Complete schema for the v1 database.
pub const SCHEMA_V1: &str = r#"
-- ============================================================
-- Campaigns
-- ============================================================

CREATE TABLE IF NOT EXISTS campaigns (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    active INTEGER NOT NULL DEFAULT 1,
    window_days INTEGER NOT NULL CHECK (window_days >= 0),
    attribution_strategy TEXT NOT NULL CHECK (attribution_strategy IN ('FIRST', 'LAST')),
    self_block INTEGER NOT NULL DEFAULT 1,
    budget_limit INTEGER,
    config_json TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL
);

-- ============================================================
-- Attribution tokens
-- ============================================================

CREATE TABLE IF NOT EXISTS attribution_tokens (
    token TEXT PRIMARY KEY,
    campaign_id TEXT NOT NULL REFERENCES campaigns(id),
    referrer_type TEXT NOT NULL,
    referrer_id TEXT NOT NULL,
    expires_at INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_tokens_expires ON attribution_tokens(expires_at);

-- ============================================================
-- Referrals
-- ============================================================

CREATE TABLE IF NOT EXISTS referrals (
    id TEXT PRIMARY KEY,
    campaign_id TEXT NOT NULL REFERENCES campaigns(id),
    referrer_type TEXT NOT NULL,
    referrer_id TEXT NOT NULL,
    referee_type TEXT NOT NULL,
    referee_id TEXT NOT NULL,
    token TEXT,
    source TEXT NOT NULL,
    state TEXT NOT NULL
        CHECK (state IN ('CREATED', 'ATTRIBUTED', 'QUALIFIED', 'REWARDED', 'REVOKED')),
    created_at INTEGER NOT NULL,
    qualified_at INTEGER,
    rewarded_at INTEGER,
    UNIQUE (campaign_id, referrer_type, referrer_id, referee_type, referee_id)
);

CREATE INDEX IF NOT EXISTS idx_referrals_referee
    ON referrals(campaign_id, referee_type, referee_id);

CREATE TABLE IF NOT EXISTS qualification_evidence (
    referral_id TEXT NOT NULL REFERENCES referrals(id),
    evidence_type TEXT NOT NULL,
    evidence_id TEXT NOT NULL,
    occurred_at INTEGER NOT NULL,
    attrs_json TEXT NOT NULL DEFAULT '{}',
    created_at INTEGER NOT NULL,
    PRIMARY KEY (referral_id, evidence_type, evidence_id)
);

-- ============================================================
-- Idempotency
-- ============================================================

CREATE TABLE IF NOT EXISTS idempotency_records (
    idem_key TEXT NOT NULL,
    scope TEXT NOT NULL,
    status TEXT NOT NULL CHECK (status IN ('pending', 'completed')),
    result_json TEXT,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (idem_key, scope)
);
"#;
