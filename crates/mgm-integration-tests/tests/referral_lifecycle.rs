//! Integration test: full referral lifecycle.
//!
//! Walks one referral from campaign creation to payout:
//! 1. Create a campaign from JSON config
//! 2. Issue a token to the referrer and validate it
//! 3. Bind the referee with the token (and replay the bind)
//! 4. Ingest qualifying evidence (and replay it)
//! 5. Reward through an external issuer
//! 6. Verify terminal state and stored rows

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use mgm_db::queries::{evidence, idempotency, referrals};
use mgm_integration_tests::{TempDb, TEST_TIMESTAMP};
use mgm_referral::{
    Clock, FixedClock, ReferralError, ReferralManager, RewardIssuer, TokenOptions, UlidGenerator,
};
use mgm_types::{
    Evidence, IssueResult, QualificationStatus, ReferralState, RewardIntent, Subject,
    SCOPE_BIND_REFERRAL, SCOPE_INGEST_EVIDENCE, SCOPE_ISSUE_REWARD, SECS_PER_DAY,
};

/// Records every intent it is asked to pay.
#[derive(Default)]
struct LedgerIssuer {
    calls: AtomicUsize,
    intents: std::sync::Mutex<Vec<RewardIntent>>,
}

impl RewardIssuer for LedgerIssuer {
    fn issue_reward(
        &self,
        intent: &RewardIntent,
        idem_key: &str,
    ) -> mgm_referral::Result<IssueResult> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.intents
            .lock()
            .map_err(|e| ReferralError::Reward(e.to_string()))?
            .push(intent.clone());
        Ok(IssueResult {
            reward_id: format!("ledger-{idem_key}"),
            status: "issued".into(),
        })
    }
}

/// Always fails, as a ledger outage would.
struct DownIssuer;

impl RewardIssuer for DownIssuer {
    fn issue_reward(&self, _: &RewardIntent, _: &str) -> mgm_referral::Result<IssueResult> {
        Err(ReferralError::Reward("ledger unavailable".into()))
    }
}

fn purchase(id: &str, at: u64) -> Evidence {
    let mut attrs = serde_json::Map::new();
    attrs.insert("amount".into(), serde_json::json!(4_999));
    Evidence {
        evidence_type: "first_purchase".into(),
        id: id.into(),
        occur_time: at,
        attrs,
    }
}

#[test]
fn referral_from_campaign_to_reward() {
    let db = TempDb::new("lifecycle");
    let conn = db.connect().expect("open");
    let clock = Arc::new(FixedClock::new(TEST_TIMESTAMP));
    let manager = ReferralManager::new(clock.clone(), Arc::new(UlidGenerator));

    // Step 1: campaign
    let campaign_id = manager
        .create_campaign_from_json(
            &conn,
            &serde_json::json!({
                "name": "  Bring a friend  ",
                "window_days": 14,
                "budget_limit": 250_000,
            }),
        )
        .expect("create campaign");
    let campaign = manager
        .get_campaign(&conn, &campaign_id)
        .expect("get")
        .expect("campaign exists");
    assert_eq!(campaign.name, "Bring a friend");
    assert!(campaign.active);
    assert!(campaign.self_block);

    // Step 2: token
    let alice = Subject::new("user", "alice");
    let bob = Subject::new("user", "bob");
    let opts = TokenOptions {
        source: Some("share_sheet".into()),
    };
    let token = manager
        .generate_referral_token(&conn, &campaign_id, &alice, &opts)
        .expect("token");
    assert_eq!(token.expire_time, TEST_TIMESTAMP + 14 * SECS_PER_DAY);

    clock.advance(3 * SECS_PER_DAY);
    let live = manager
        .validate_token(&conn, &token.token)
        .expect("validate")
        .expect("token still live");
    assert_eq!(live.referrer(), alice);

    // Step 3: bind, then replay
    let referral_id = manager
        .bind_referral(
            &conn,
            &campaign_id,
            &alice,
            &bob,
            "share_sheet",
            Some(&token.token),
            "signup-bob",
        )
        .expect("bind");
    let replayed = manager
        .bind_referral(
            &conn,
            &campaign_id,
            &alice,
            &bob,
            "share_sheet",
            Some(&token.token),
            "signup-bob",
        )
        .expect("replay bind");
    assert_eq!(replayed, referral_id);
    assert_eq!(
        referrals::count_for_campaign(&conn, &campaign_id).expect("count"),
        1
    );

    // Step 4: qualify, then replay
    clock.advance(SECS_PER_DAY);
    let qualified_at = clock.now();
    let result = manager
        .ingest_evidence(&conn, &campaign_id, &bob, &purchase("order-1", qualified_at), "order-1")
        .expect("ingest");
    assert_eq!(result.status, QualificationStatus::Qualified);
    assert_eq!(result.referral_id.as_deref(), Some(referral_id.as_str()));

    clock.advance(60);
    let replay = manager
        .ingest_evidence(&conn, &campaign_id, &bob, &purchase("order-1", qualified_at), "order-1")
        .expect("replay ingest");
    assert_eq!(replay, result);

    let rows = evidence::list_for_referral(&conn, &referral_id).expect("evidence");
    assert_eq!(rows.len(), 1);

    // Step 5: reward
    let ledger = LedgerIssuer::default();
    let down = manager.reward_referral(&conn, &referral_id, &DownIssuer, "payout-bob");
    assert!(matches!(down, Err(ReferralError::Reward(_))));
    let still = manager
        .get_referral(&conn, &referral_id)
        .expect("get")
        .expect("referral");
    assert_eq!(still.state, ReferralState::Qualified);

    let issued = manager
        .reward_referral(&conn, &referral_id, &ledger, "payout-bob")
        .expect("reward");
    assert_eq!(issued.reward_id, "ledger-payout-bob");
    let again = manager
        .reward_referral(&conn, &referral_id, &ledger, "payout-bob")
        .expect("replay reward");
    assert_eq!(again, issued);
    assert_eq!(ledger.calls.load(Ordering::SeqCst), 1);

    let intents = ledger.intents.lock().expect("lock");
    assert_eq!(intents[0].referrer, alice);
    assert_eq!(intents[0].referee, bob);
    assert_eq!(intents[0].budget_limit, Some(250_000));
    drop(intents);

    // Step 6: terminal state and stored rows
    let done = manager
        .get_referral(&conn, &referral_id)
        .expect("get")
        .expect("referral");
    assert_eq!(done.state, ReferralState::Rewarded);
    assert_eq!(done.qualify_time, Some(qualified_at));
    assert_eq!(done.reward_time, Some(qualified_at + 60));
    assert_eq!(done.token.as_deref(), Some(token.token.as_str()));

    let revoke = manager.revoke_referral(&conn, &referral_id, "revoke-bob");
    assert!(matches!(
        revoke,
        Err(ReferralError::IllegalTransition {
            from: ReferralState::Rewarded,
            to: ReferralState::Revoked,
        })
    ));

    assert_eq!(idempotency::count_for_scope(&conn, SCOPE_BIND_REFERRAL).expect("n"), 1);
    assert_eq!(idempotency::count_for_scope(&conn, SCOPE_INGEST_EVIDENCE).expect("n"), 1);
    assert_eq!(idempotency::count_for_scope(&conn, SCOPE_ISSUE_REWARD).expect("n"), 1);
}

#[test]
fn revoked_referral_stays_revoked() {
    let conn = mgm_db::open_memory().expect("open");
    let clock = Arc::new(FixedClock::new(TEST_TIMESTAMP));
    let manager = ReferralManager::new(clock, Arc::new(UlidGenerator));
    let campaign_id = manager
        .create_campaign_from_json(&conn, &serde_json::json!({"name": "Winter"}))
        .expect("campaign");

    let alice = Subject::new("user", "alice");
    let bob = Subject::new("user", "bob");
    let referral_id = manager
        .bind_referral(&conn, &campaign_id, &alice, &bob, "link", None, "bind")
        .expect("bind");

    let revoked = manager
        .revoke_referral(&conn, &referral_id, "fraud-review-1")
        .expect("revoke");
    let replay = manager
        .revoke_referral(&conn, &referral_id, "fraud-review-1")
        .expect("replay");
    assert_eq!(revoked, replay);

    let result = manager
        .ingest_evidence(&conn, &campaign_id, &bob, &purchase("o-9", TEST_TIMESTAMP), "o-9")
        .expect("ingest");
    assert_eq!(result.status, QualificationStatus::Noop);
    assert_eq!(result.reason.as_deref(), Some("Referral already processed"));

    let reward = manager.reward_referral(&conn, &referral_id, &LedgerIssuer::default(), "pay");
    assert!(matches!(reward, Err(ReferralError::IllegalTransition { .. })));
}

#[test]
fn inactive_campaign_blocks_new_binds_but_not_evidence() {
    let conn = mgm_db::open_memory().expect("open");
    let clock = Arc::new(FixedClock::new(TEST_TIMESTAMP));
    let manager = ReferralManager::new(clock, Arc::new(UlidGenerator));
    let campaign_id = manager
        .create_campaign_from_json(&conn, &serde_json::json!({"name": "Sunset"}))
        .expect("campaign");

    let alice = Subject::new("user", "alice");
    let bob = Subject::new("user", "bob");
    let carol = Subject::new("user", "carol");
    manager
        .bind_referral(&conn, &campaign_id, &alice, &bob, "link", None, "bind-bob")
        .expect("bind");

    mgm_db::queries::campaigns::set_active(&conn, &campaign_id, false).expect("deactivate");

    let late = manager.bind_referral(&conn, &campaign_id, &alice, &carol, "link", None, "bind-carol");
    assert!(matches!(late, Err(ReferralError::CampaignNotFound(_))));

    let result = manager
        .ingest_evidence(&conn, &campaign_id, &bob, &purchase("o-1", TEST_TIMESTAMP), "o-1")
        .expect("ingest");
    assert_eq!(result.status, QualificationStatus::Qualified);
}

/// Tries to take the write lock from a second connection while issuing.
struct LockCheckIssuer {
    path: std::path::PathBuf,
    lock_free: std::sync::Mutex<Option<bool>>,
}

impl RewardIssuer for LockCheckIssuer {
    fn issue_reward(&self, _: &RewardIntent, idem_key: &str) -> mgm_referral::Result<IssueResult> {
        let other = rusqlite::Connection::open(&self.path)?;
        other.busy_timeout(std::time::Duration::ZERO)?;
        let free = other.execute_batch("BEGIN IMMEDIATE; ROLLBACK;").is_ok();
        *self
            .lock_free
            .lock()
            .map_err(|e| ReferralError::Reward(e.to_string()))? = Some(free);
        Ok(IssueResult {
            reward_id: format!("ledger-{idem_key}"),
            status: "issued".into(),
        })
    }
}

#[test]
fn issuer_runs_under_reward_write_lock() {
    let db = TempDb::new("issuer-lock");
    let conn = db.connect().expect("open");
    let manager = ReferralManager::new(
        Arc::new(FixedClock::new(TEST_TIMESTAMP)),
        Arc::new(UlidGenerator),
    );
    let campaign_id = manager
        .create_campaign_from_json(&conn, &serde_json::json!({"name": "Locked"}))
        .expect("campaign");
    let alice = Subject::new("user", "alice");
    let bob = Subject::new("user", "bob");
    let referral_id = manager
        .bind_referral(&conn, &campaign_id, &alice, &bob, "link", None, "bind")
        .expect("bind");
    manager
        .ingest_evidence(&conn, &campaign_id, &bob, &purchase("o-1", TEST_TIMESTAMP), "o-1")
        .expect("ingest");

    let issuer = LockCheckIssuer {
        path: db.path().to_path_buf(),
        lock_free: std::sync::Mutex::new(None),
    };
    manager
        .reward_referral(&conn, &referral_id, &issuer, "pay-bob")
        .expect("reward");

    // Other writers are shut out for as long as the issuer runs
    assert_eq!(*issuer.lock_free.lock().expect("lock"), Some(false));
    let done = manager
        .get_referral(&conn, &referral_id)
        .expect("get")
        .expect("referral");
    assert_eq!(done.state, ReferralState::Rewarded);
}
