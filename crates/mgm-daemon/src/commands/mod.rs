//! IPC command handlers.
//!
//! Each submodule implements the commands for one IPC category. Handlers
//! are synchronous: one request is one short store round-trip on the
//! session's connection.

pub mod campaign;
pub mod maintenance;
pub mod referral;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use crate::rpc::RpcError;

pub type Result = std::result::Result<Value, RpcError>;

/// Decode `params` into a typed request.
fn parse_params<T: DeserializeOwned>(params: &Value) -> std::result::Result<T, RpcError> {
    serde_json::from_value(params.clone()).map_err(|e| RpcError::invalid_params(&e.to_string()))
}

fn to_json<T: Serialize>(value: &T) -> Result {
    serde_json::to_value(value).map_err(|e| RpcError::internal_error(&e.to_string()))
}
