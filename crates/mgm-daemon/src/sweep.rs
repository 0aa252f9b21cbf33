//! Periodic deletion of expired attribution tokens.

use std::sync::Arc;
use std::time::Duration;

use rusqlite::Connection;
use tokio::sync::broadcast;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use crate::DaemonState;

/// Sweep every `sweep.interval_secs` until shutdown. The first sweep runs
/// immediately. Each pass runs on the blocking pool.
pub async fn run(state: Arc<DaemonState>, mut shutdown: broadcast::Receiver<()>) -> anyhow::Result<()> {
    let db_path = state.db_path.clone();
    let mut conn = tokio::task::spawn_blocking(move || mgm_db::open(&db_path)).await??;
    let period = Duration::from_secs(state.config.sweep.interval_secs.max(1));
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    info!(interval_secs = period.as_secs(), "Token sweep started");
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let pass_state = state.clone();
                let (held, outcome) = tokio::task::spawn_blocking(move || {
                    let outcome = sweep_once(&pass_state, &conn);
                    (conn, outcome)
                })
                .await?;
                conn = held;
                match outcome {
                    Ok(deleted) => debug!(deleted, "Token sweep pass complete"),
                    Err(e) => warn!("Token sweep failed: {}", e),
                }
            }
            _ = shutdown.recv() => break,
        }
    }
    info!("Token sweep stopped");
    Ok(())
}

/// One pass: delete tokens that expired before the current time.
pub fn sweep_once(state: &DaemonState, conn: &Connection) -> mgm_referral::Result<usize> {
    state.manager.delete_expired_tokens(conn, state.clock.now())
}
