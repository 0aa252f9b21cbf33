//! mgm-daemon: the referral backend daemon.
//!
//! Single OS process running a Tokio async runtime. Clients talk to the
//! daemon via newline-delimited JSON-RPC 2.0 over a Unix socket. Every
//! client session gets its own SQLite connection, so concurrent clients
//! coordinate only through the store's constraints and transactions.

mod commands;
mod config;
mod rpc;
mod sweep;

use std::path::PathBuf;
use std::sync::Arc;

use mgm_referral::{Clock, IdGenerator, ReferralManager, SystemClock, UlidGenerator};
use tokio::sync::broadcast;
use tracing::{error, info};

use crate::config::DaemonConfig;
use crate::rpc::RpcServer;

/// Daemon-wide shared state.
pub struct DaemonState {
    /// Configuration.
    pub config: DaemonConfig,
    /// SQLite database file; sessions open their own connections to it.
    pub db_path: PathBuf,
    /// Time source shared with the manager.
    pub clock: Arc<dyn Clock>,
    /// Referral use-cases.
    pub manager: ReferralManager,
    /// Shutdown signal sender.
    pub shutdown_tx: broadcast::Sender<()>,
}

impl DaemonState {
    pub fn new(
        config: DaemonConfig,
        db_path: PathBuf,
        clock: Arc<dyn Clock>,
        ids: Arc<dyn IdGenerator>,
    ) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);
        Self {
            config,
            db_path,
            manager: ReferralManager::new(clock.clone(), ids),
            clock,
            shutdown_tx,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load config (the log level lives there)
    let config = DaemonConfig::load()?;

    // 2. Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(config.log_directive().parse()?),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "MGM daemon starting");

    let data_dir = config.data_dir();
    std::fs::create_dir_all(&data_dir)?;

    // 3. Create or migrate the database before any session opens it
    let db_path = config.db_path();
    drop(mgm_db::open(&db_path)?);
    info!(path = ?db_path, "Database ready");

    // 4. Build daemon state
    let socket_path = config.socket_path();
    let state = Arc::new(DaemonState::new(
        config,
        db_path,
        Arc::new(SystemClock),
        Arc::new(UlidGenerator),
    ));

    // 5. Start the expired-token sweep
    let sweep_task = if state.config.sweep.enabled {
        let rx = state.shutdown_tx.subscribe();
        Some(tokio::spawn(sweep::run(state.clone(), rx)))
    } else {
        info!("Token sweep disabled");
        None
    };

    // 6. Run the RPC server until shutdown
    let rpc_server = RpcServer::new(state.clone(), socket_path.clone());
    let mut shutdown_rx = state.shutdown_tx.subscribe();
    tokio::select! {
        result = rpc_server.run() => {
            if let Err(e) = result {
                error!("RPC server error: {}", e);
            }
        }
        _ = shutdown_rx.recv() => {
            info!("Shutdown signal received");
        }
        _ = tokio::signal::ctrl_c() => {
            info!("Ctrl-C received, shutting down");
        }
    }

    // Graceful shutdown
    info!("Daemon shutting down gracefully");
    let _ = state.shutdown_tx.send(());
    if let Some(task) = sweep_task {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Sweep task error: {}", e),
            Err(e) => error!("Sweep task panicked: {}", e),
        }
    }

    let _ = std::fs::remove_file(&socket_path);

    info!("Daemon stopped");
    Ok(())
}
