//! At-most-once execution keyed by `(key, scope)`.
//!
//! [`IdempotencyCache::get_or_store`] opens an IMMEDIATE transaction,
//! claims the key with a single insert-or-return-existing, runs the
//! operation on the same transaction, finalizes the record with the
//! captured result and commits. The claim, the operation's writes and the
//! finalize step land together or not at all:
//!
//! - a crash or failed operation rolls everything back, so a retry with
//!   the same key executes cleanly;
//! - concurrent first calls serialize on SQLite's write lock, and the
//!   loser's insert is ignored, so it re-reads and returns the winner's
//!   stored result.
//!
//! Results that serialize to a JSON object are stored as-is. Scalars,
//! booleans, arrays and `None` are wrapped as `{"result": value}`.

use std::sync::Arc;

use mgm_db::queries::idempotency::{self, IdempotencyStatus, InsertOutcome};
use rusqlite::{Connection, Transaction, TransactionBehavior};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{debug, warn};

use crate::config::validate_idempotency_key;
use crate::{Clock, ReferralError, Result};

/// Envelope field for non-object results.
pub const ENVELOPE_FIELD: &str = "result";

/// Generic exactly-once wrapper around store-mutating operations.
#[derive(Clone)]
pub struct IdempotencyCache {
    clock: Arc<dyn Clock>,
}

impl IdempotencyCache {
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }

    /// Run `operation` at most once for `(key, scope)`.
    ///
    /// If a completed record exists, its stored result is returned and
    /// `operation` is not invoked. `conn` must not already be inside a
    /// transaction; `operation` receives the transaction's connection and
    /// must do all of its writes through it.
    pub fn get_or_store<T, F>(
        &self,
        conn: &Connection,
        key: &str,
        scope: &str,
        operation: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce(&Connection) -> Result<T>,
    {
        validate_idempotency_key(key)?;

        let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;
        match idempotency::insert_or_get(&tx, key, scope, self.clock.now())? {
            InsertOutcome::Existing(row) => match row.status {
                IdempotencyStatus::Completed => {
                    let stored = row.result_json.ok_or_else(|| {
                        ReferralError::Serialization(format!(
                            "completed record ({key}, {scope}) has no result"
                        ))
                    })?;
                    let value = decode_result(&stored)?;
                    tx.commit()?;
                    debug!(key, scope, "Idempotent replay");
                    Ok(value)
                }
                IdempotencyStatus::Pending => {
                    warn!(key, scope, "Idempotency record still pending");
                    Err(ReferralError::IdempotencyInProgress {
                        key: key.to_string(),
                        scope: scope.to_string(),
                    })
                }
            },
            InsertOutcome::Inserted => {
                // On error `tx` drops and rolls back the claim with the op's writes
                let value = operation(&*tx)?;
                let stored = encode_result(&value)?;
                idempotency::complete(&tx, key, scope, &stored)?;
                tx.commit()?;
                debug!(key, scope, "Idempotent operation executed");
                Ok(value)
            }
        }
    }
}

/// Serialize a result for storage.
pub fn encode_result<T: Serialize>(value: &T) -> Result<String> {
    let json = serde_json::to_value(value).map_err(|e| ReferralError::Serialization(e.to_string()))?;
    let stored = if json.is_object() {
        json
    } else {
        serde_json::json!({ ENVELOPE_FIELD: json })
    };
    serde_json::to_string(&stored).map_err(|e| ReferralError::Serialization(e.to_string()))
}

/// Inverse of [`encode_result`].
pub fn decode_result<T: DeserializeOwned>(stored: &str) -> Result<T> {
    let json: serde_json::Value =
        serde_json::from_str(stored).map_err(|e| ReferralError::Serialization(e.to_string()))?;
    if let Some(inner) = json
        .as_object()
        .filter(|map| map.len() == 1)
        .and_then(|map| map.get(ENVELOPE_FIELD))
    {
        if let Ok(value) = serde_json::from_value(inner.clone()) {
            return Ok(value);
        }
    }
    serde_json::from_value(json).map_err(|e| ReferralError::Serialization(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::FixedClock;
    use mgm_types::{QualificationResult, SCOPE_BIND_REFERRAL, SCOPE_INGEST_EVIDENCE};
    use std::cell::Cell;

    fn setup() -> (Connection, IdempotencyCache) {
        let conn = mgm_db::open_memory().expect("open");
        let cache = IdempotencyCache::new(Arc::new(FixedClock::new(1_000)));
        (conn, cache)
    }

    #[test]
    fn test_operation_runs_once() {
        let (conn, cache) = setup();
        let calls = Cell::new(0);
        let results: Vec<String> = (0..5)
            .map(|i| {
                cache
                    .get_or_store(&conn, "k1", SCOPE_BIND_REFERRAL, |_| {
                        calls.set(calls.get() + 1);
                        Ok(format!("value-{i}"))
                    })
                    .expect("get_or_store")
            })
            .collect();

        assert_eq!(calls.get(), 1);
        assert!(results.iter().all(|r| r == "value-0"));
    }

    #[test]
    fn test_scopes_run_independently() {
        let (conn, cache) = setup();
        let calls = Cell::new(0);
        for scope in [SCOPE_BIND_REFERRAL, SCOPE_INGEST_EVIDENCE, SCOPE_BIND_REFERRAL] {
            cache
                .get_or_store(&conn, "shared-key", scope, |_| {
                    calls.set(calls.get() + 1);
                    Ok(calls.get())
                })
                .expect("get_or_store");
        }
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_failed_operation_leaves_no_record() {
        let (conn, cache) = setup();
        let failed: Result<String> = cache.get_or_store(&conn, "k1", "s", |c| {
            c.execute("CREATE TABLE side_effect (x INTEGER)", [])?;
            Err(ReferralError::DuplicateReferral)
        });
        assert!(matches!(failed, Err(ReferralError::DuplicateReferral)));
        assert!(matches!(
            idempotency::get(&conn, "k1", "s"),
            Err(mgm_db::DbError::NotFound(_))
        ));
        // The operation's own write was rolled back too
        let tables: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM sqlite_master WHERE name = 'side_effect'",
                [],
                |row| row.get(0),
            )
            .expect("query");
        assert_eq!(tables, 0);

        let retried: String = cache
            .get_or_store(&conn, "k1", "s", |_| Ok("ok".to_string()))
            .expect("retry");
        assert_eq!(retried, "ok");
    }

    #[test]
    fn test_pending_record_reports_in_progress() {
        let (conn, cache) = setup();
        idempotency::insert_or_get(&conn, "k1", "s", 1).expect("claim");
        let result: Result<u32> = cache.get_or_store(&conn, "k1", "s", |_| Ok(1));
        assert!(matches!(
            result,
            Err(ReferralError::IdempotencyInProgress { .. })
        ));
    }

    #[test]
    fn test_invalid_key_rejected() {
        let (conn, cache) = setup();
        let result: Result<u32> = cache.get_or_store(&conn, " ", "s", |_| Ok(1));
        assert!(matches!(result, Err(ReferralError::InvalidConfig(_))));
    }

    #[test]
    fn test_envelope_encoding() {
        assert_eq!(encode_result(&"r1").expect("enc"), r#"{"result":"r1"}"#);
        assert_eq!(encode_result(&true).expect("enc"), r#"{"result":true}"#);
        assert_eq!(encode_result(&None::<String>).expect("enc"), r#"{"result":null}"#);

        let q = QualificationResult::qualified("r1");
        let stored = encode_result(&q).expect("enc");
        assert!(stored.contains(r#""status":"qualified""#));
        assert!(!stored.contains(r#""result""#));
    }

    #[test]
    fn test_replay_returns_unwrapped_values() {
        let (conn, cache) = setup();
        let first: Option<String> = cache
            .get_or_store(&conn, "k-none", "s", |_| Ok(None))
            .expect("first");
        let replay: Option<String> = cache
            .get_or_store(&conn, "k-none", "s", |_| Ok(Some("late".into())))
            .expect("replay");
        assert_eq!(first, None);
        assert_eq!(replay, None);

        let q = QualificationResult::no_referral();
        let stored: QualificationResult = cache
            .get_or_store(&conn, "k-obj", "s", |_| Ok(q.clone()))
            .expect("first");
        let replay: QualificationResult = cache
            .get_or_store(&conn, "k-obj", "s", |_| Ok(QualificationResult::qualified("x")))
            .expect("replay");
        assert_eq!(stored, q);
        assert_eq!(replay, q);
    }
}
