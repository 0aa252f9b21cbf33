//! JSON-RPC server over Unix socket.
//!
//! Listens on a Unix domain socket, accepts connections, and dispatches
//! JSON-RPC method calls to the appropriate command handlers. Each
//! connection owns one SQLite connection for its lifetime.

use std::path::PathBuf;
use std::sync::Arc;

use mgm_referral::{ConfigError, ReferralError};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{UnixListener, UnixStream};
use tracing::{debug, error, info, warn};

use crate::commands;
use crate::DaemonState;

/// JSON-RPC request.
#[derive(Debug, Deserialize)]
pub struct RpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Method name.
    pub method: String,
    /// Parameters.
    #[serde(default)]
    pub params: serde_json::Value,
}

/// JSON-RPC response.
#[derive(Debug, Serialize)]
pub struct RpcResponse {
    /// JSON-RPC version.
    pub jsonrpc: String,
    /// Request ID.
    pub id: serde_json::Value,
    /// Result or error.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
}

/// JSON-RPC error object.
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct RpcError {
    pub code: i32,
    /// Error name.
    pub message: String,
    /// Optional structured data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl RpcResponse {
    /// Create a success response.
    pub fn success(id: serde_json::Value, result: serde_json::Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response.
    pub fn error(id: serde_json::Value, error: RpcError) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id,
            result: None,
            error: Some(error),
        }
    }
}

impl RpcError {
    fn new(code: i32, message: &str, data: Option<serde_json::Value>) -> Self {
        Self {
            code,
            message: message.to_string(),
            data,
        }
    }

    // Standard JSON-RPC errors

    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self::new(-32700, "PARSE_ERROR", None)
    }

    /// Invalid request (-32600).
    pub fn invalid_request() -> Self {
        Self::new(-32600, "INVALID_REQUEST", None)
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self::new(
            -32601,
            "METHOD_NOT_FOUND",
            Some(serde_json::json!({"method": method})),
        )
    }

    /// Invalid params (-32602).
    pub fn invalid_params(detail: &str) -> Self {
        Self::new(
            -32602,
            "INVALID_PARAMS",
            Some(serde_json::json!({"detail": detail})),
        )
    }

    /// Internal error (-32603).
    pub fn internal_error(detail: &str) -> Self {
        Self::new(
            -32603,
            "INTERNAL_ERROR",
            Some(serde_json::json!({"detail": detail})),
        )
    }

    // Referral errors

    /// Campaign missing or inactive (-32020).
    pub fn campaign_not_found(campaign_id: &str) -> Self {
        Self::new(
            -32020,
            "CAMPAIGN_NOT_FOUND",
            Some(serde_json::json!({"campaign_id": campaign_id})),
        )
    }

    /// Self-referral in a self-blocking campaign (-32021).
    pub fn self_referral_not_allowed() -> Self {
        Self::new(-32021, "SELF_REFERRAL_NOT_ALLOWED", None)
    }

    /// Referral edge already exists (-32022).
    pub fn duplicate_referral() -> Self {
        Self::new(-32022, "DUPLICATE_REFERRAL", None)
    }

    /// State machine rejected the transition (-32023).
    pub fn illegal_transition(detail: serde_json::Value) -> Self {
        Self::new(-32023, "ILLEGAL_TRANSITION", Some(detail))
    }

    /// Unknown referral id (-32024).
    pub fn referral_not_found(referral_id: &str) -> Self {
        Self::new(
            -32024,
            "REFERRAL_NOT_FOUND",
            Some(serde_json::json!({"referral_id": referral_id})),
        )
    }

    /// Another request holds this idempotency key (-32025).
    pub fn idempotency_in_progress(key: &str, scope: &str) -> Self {
        Self::new(
            -32025,
            "IDEMPOTENCY_IN_PROGRESS",
            Some(serde_json::json!({"key": key, "scope": scope})),
        )
    }

    /// Campaign config failed validation (-32026).
    pub fn config_invalid(detail: &str) -> Self {
        Self::new(
            -32026,
            "CONFIG_INVALID",
            Some(serde_json::json!({"detail": detail})),
        )
    }
}

impl From<ReferralError> for RpcError {
    fn from(err: ReferralError) -> Self {
        match err {
            ReferralError::CampaignNotFound(id) => Self::campaign_not_found(&id),
            ReferralError::SelfReferralNotAllowed => Self::self_referral_not_allowed(),
            ReferralError::DuplicateReferral => Self::duplicate_referral(),
            ReferralError::InvalidConfig(ConfigError::InvalidIdempotencyKey(detail)) => {
                Self::invalid_params(detail)
            }
            ReferralError::InvalidConfig(e) => Self::config_invalid(&e.to_string()),
            ReferralError::IllegalTransition { from, to } => {
                Self::illegal_transition(serde_json::json!({"from": from, "to": to}))
            }
            ReferralError::StaleState(id) => Self::illegal_transition(
                serde_json::json!({"referral_id": id, "detail": "state changed concurrently"}),
            ),
            ReferralError::ReferralNotFound(id) => Self::referral_not_found(&id),
            ReferralError::IdempotencyInProgress { key, scope } => {
                Self::idempotency_in_progress(&key, &scope)
            }
            other @ (ReferralError::Serialization(_)
            | ReferralError::Reward(_)
            | ReferralError::Db(_)) => {
                error!("Internal error: {}", other);
                Self::internal_error(&other.to_string())
            }
        }
    }
}

/// The RPC server.
pub struct RpcServer {
    state: Arc<DaemonState>,
    socket_path: PathBuf,
}

impl RpcServer {
    /// Create a new RPC server.
    pub fn new(state: Arc<DaemonState>, socket_path: PathBuf) -> Self {
        Self { state, socket_path }
    }

    /// Bind the socket and serve until the task is dropped.
    pub async fn run(&self) -> anyhow::Result<()> {
        // Remove stale socket file
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        info!("IPC server listening on {:?}", self.socket_path);
        self.serve(listener).await
    }

    /// Accept connections on an already-bound listener.
    pub async fn serve(&self, listener: UnixListener) -> anyhow::Result<()> {
        loop {
            match listener.accept().await {
                Ok((stream, _addr)) => {
                    let state = self.state.clone();
                    tokio::spawn(async move {
                        if let Err(e) = handle_connection(state, stream).await {
                            warn!("Connection error: {}", e);
                        }
                    });
                }
                Err(e) => {
                    error!("Accept error: {}", e);
                }
            }
        }
    }
}

/// Handle a single client connection.
///
/// SQLite calls block, up to the busy timeout under write contention, so
/// the session's connection is moved onto the blocking pool for each
/// request and handed back with the response.
async fn handle_connection(state: Arc<DaemonState>, stream: UnixStream) -> anyhow::Result<()> {
    let db_path = state.db_path.clone();
    let mut conn = tokio::task::spawn_blocking(move || mgm_db::open(&db_path)).await??;
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    debug!("Client session opened");
    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break; // EOF
        }
        if line.trim().is_empty() {
            continue;
        }

        let response = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => {
                let session = state.clone();
                let (returned, response) = tokio::task::spawn_blocking(move || {
                    let response = dispatch_request(&session, &conn, request);
                    (conn, response)
                })
                .await?;
                conn = returned;
                response
            }
            Err(_) => RpcResponse::error(serde_json::Value::Null, RpcError::parse_error()),
        };

        let mut response_json = serde_json::to_string(&response)?;
        response_json.push('\n');
        writer.write_all(response_json.as_bytes()).await?;
        writer.flush().await?;
    }
    debug!("Client session closed");

    Ok(())
}

/// Dispatch a JSON-RPC request to the appropriate command handler.
pub fn dispatch_request(state: &DaemonState, conn: &Connection, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    let method = request.method.as_str();

    if request.jsonrpc != "2.0" {
        return RpcResponse::error(id, RpcError::invalid_request());
    }

    debug!("Dispatching RPC method: {}", method);

    let params = &request.params;
    let result = match method {
        // Campaigns
        "create_campaign" => commands::campaign::create_campaign(state, conn, params),
        "get_campaign" => commands::campaign::get_campaign(state, conn, params),

        // Tokens
        "generate_referral_token" => {
            commands::referral::generate_referral_token(state, conn, params)
        }
        "validate_token" => commands::referral::validate_token(state, conn, params),

        // Referrals
        "bind_referral" => commands::referral::bind_referral(state, conn, params),
        "ingest_evidence" => commands::referral::ingest_evidence(state, conn, params),
        "get_referral" => commands::referral::get_referral(state, conn, params),
        "revoke_referral" => commands::referral::revoke_referral(state, conn, params),

        // Maintenance
        "delete_expired_tokens" => {
            commands::maintenance::delete_expired_tokens(state, conn, params)
        }

        _ => Err(RpcError::method_not_found(method)),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(err) => RpcResponse::error(id, err),
    }
}
