//! Integration test: attribution window and the expiry sweep.

use std::sync::Arc;

use mgm_db::queries::tokens;
use mgm_integration_tests::{TempDb, TEST_TIMESTAMP};
use mgm_referral::{CampaignConfig, Clock, FixedClock, ReferralManager, TokenOptions, UlidGenerator};
use mgm_types::{Subject, SECS_PER_DAY};

fn setup(db: &TempDb) -> (rusqlite::Connection, Arc<FixedClock>, ReferralManager) {
    let conn = db.connect().expect("open");
    let clock = Arc::new(FixedClock::new(TEST_TIMESTAMP));
    let manager = ReferralManager::new(clock.clone(), Arc::new(UlidGenerator));
    (conn, clock, manager)
}

#[test]
fn seven_day_window() {
    let db = TempDb::new("window");
    let (conn, clock, manager) = setup(&db);
    let mut cfg = CampaignConfig::named("Weekly");
    cfg.window_days = 7;
    let campaign_id = manager.create_campaign(&conn, cfg).expect("campaign");

    let alice = Subject::new("user", "alice");
    let token = manager
        .generate_referral_token(&conn, &campaign_id, &alice, &TokenOptions::default())
        .expect("token");

    clock.set(TEST_TIMESTAMP + 6 * SECS_PER_DAY);
    assert!(manager.validate_token(&conn, &token.token).expect("v").is_some());

    clock.set(TEST_TIMESTAMP + 8 * SECS_PER_DAY);
    assert!(manager.validate_token(&conn, &token.token).expect("v").is_none());

    // An expired token presented at bind time is dropped, the bind succeeds
    let bob = Subject::new("user", "bob");
    let referral_id = manager
        .bind_referral(&conn, &campaign_id, &alice, &bob, "link", Some(&token.token), "bind-bob")
        .expect("bind");
    let referral = manager
        .get_referral(&conn, &referral_id)
        .expect("get")
        .expect("referral");
    assert!(referral.token.is_none());
}

#[test]
fn sweep_removes_only_expired_tokens() {
    let db = TempDb::new("sweep");
    let (conn, clock, manager) = setup(&db);

    let mut daily = CampaignConfig::named("Daily");
    daily.window_days = 1;
    let daily = manager.create_campaign(&conn, daily).expect("campaign");
    let monthly = manager
        .create_campaign(&conn, CampaignConfig::named("Monthly"))
        .expect("campaign");

    let opts = TokenOptions::default();
    for id in ["alice", "bob", "carol"] {
        manager
            .generate_referral_token(&conn, &daily, &Subject::new("user", id), &opts)
            .expect("token");
    }
    let keeper = manager
        .generate_referral_token(&conn, &monthly, &Subject::new("user", "dave"), &opts)
        .expect("token");
    assert_eq!(tokens::count(&conn).expect("count"), 4);

    // Exactly at expiry nothing is "before" the cutoff yet
    let expiry = TEST_TIMESTAMP + SECS_PER_DAY;
    assert_eq!(manager.delete_expired_tokens(&conn, expiry).expect("sweep"), 0);

    clock.set(expiry + 1);
    assert_eq!(
        manager.delete_expired_tokens(&conn, clock.now()).expect("sweep"),
        3
    );
    assert_eq!(
        manager.delete_expired_tokens(&conn, clock.now()).expect("sweep"),
        0
    );
    assert_eq!(tokens::count(&conn).expect("count"), 1);
    assert!(manager
        .validate_token(&conn, &keeper.token)
        .expect("validate")
        .is_some());
}
