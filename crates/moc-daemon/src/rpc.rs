//! JSON-RPC server over Unix socket.
//!
//! Listens on a Unix domain socket, accepts connections, and dispatches
//! newline-delimited JSON-RPC calls to the command handlers. A connection
//! that calls `subscribe_events` is switched to notification streaming
//! until the client hangs up. Requests naming a `caller` are checked by
//! [`crate::auth`] before dispatch.

use std::path::PathBuf;
use std::sync::Arc;

use moc_manager::ManagerError;
use moc_types::ErrorKind;
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::net::UnixListener;
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};

use crate::auth;
use crate::commands;
use crate::events::EventFilter;
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
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct RpcError {
    /// Error code.
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
    // Standard JSON-RPC errors

    /// Parse error (-32700).
    pub fn parse_error() -> Self {
        Self {
            code: -32700,
            message: "PARSE_ERROR".to_string(),
            data: None,
        }
    }

    /// Invalid request (-32600).
    pub fn invalid_request() -> Self {
        Self {
            code: -32600,
            message: "INVALID_REQUEST".to_string(),
            data: None,
        }
    }

    /// Method not found (-32601).
    pub fn method_not_found(method: &str) -> Self {
        Self {
            code: -32601,
            message: "METHOD_NOT_FOUND".to_string(),
            data: Some(serde_json::json!({"method": method})),
        }
    }

    /// Invalid params (-32602).
    pub fn invalid_params(detail: &str) -> Self {
        Self {
            code: -32602,
            message: "INVALID_PARAMS".to_string(),
            data: Some(serde_json::json!({"detail": detail})),
        }
    }

    /// Internal error (-32603).
    pub fn internal_error(detail: &str) -> Self {
        Self {
            code: -32603,
            message: "INTERNAL_ERROR".to_string(),
            data: Some(serde_json::json!({"detail": detail})),
        }
    }

    /// Caller failed request authentication.
    pub fn unauthorized(detail: &str) -> Self {
        Self {
            code: Self::code_for(ErrorKind::Authorization),
            message: ErrorKind::Authorization.as_str().to_string(),
            data: Some(serde_json::json!({"detail": detail})),
        }
    }

    // Protocol errors, one code per error kind

    /// Code used for protocol errors of `kind`.
    pub fn code_for(kind: ErrorKind) -> i32 {
        match kind {
            ErrorKind::InputValidation => -32010,
            ErrorKind::Authorization => -32020,
            ErrorKind::StateInvariant => -32030,
            ErrorKind::Quorum => -32040,
        }
    }
}

impl From<ManagerError> for RpcError {
    fn from(err: ManagerError) -> Self {
        let kind = err.kind();
        Self {
            code: Self::code_for(kind),
            message: kind.as_str().to_string(),
            data: Some(serde_json::json!({"detail": err.to_string()})),
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

    /// Run the server, accepting connections.
    pub async fn run(&self) -> anyhow::Result<()> {
        // Remove stale socket file
        let _ = std::fs::remove_file(&self.socket_path);

        let listener = UnixListener::bind(&self.socket_path)?;
        info!(path = ?self.socket_path, "IPC server listening");

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
async fn handle_connection(
    state: Arc<DaemonState>,
    stream: tokio::net::UnixStream,
) -> anyhow::Result<()> {
    let (reader, mut writer) = stream.into_split();
    let mut reader = BufReader::new(reader);
    let mut line = String::new();

    loop {
        line.clear();
        let bytes_read = reader.read_line(&mut line).await?;
        if bytes_read == 0 {
            break; // EOF
        }

        let request = match serde_json::from_str::<RpcRequest>(&line) {
            Ok(request) => request,
            Err(_) => {
                let response = RpcResponse::error(serde_json::Value::Null, RpcError::parse_error());
                write_message(&mut writer, &response).await?;
                continue;
            }
        };

        if request.method == "subscribe_events" {
            let filter: EventFilter = if request.params.is_null() {
                EventFilter::default()
            } else {
                match serde_json::from_value(request.params.clone()) {
                    Ok(filter) => filter,
                    Err(e) => {
                        let err = RpcError::invalid_params(&e.to_string());
                        write_message(&mut writer, &RpcResponse::error(request.id, err)).await?;
                        continue;
                    }
                }
            };
            // Subscribe before acknowledging so no event slips in between.
            let mut events = state.event_bus.subscribe();
            let ack = serde_json::json!({
                "subscribed": true,
                "sequence": state.event_bus.sequence(),
            });
            write_message(&mut writer, &RpcResponse::success(request.id, ack)).await?;
            debug!(?filter, "connection switched to event streaming");

            loop {
                line.clear();
                tokio::select! {
                    read = reader.read_line(&mut line) => {
                        if read? == 0 {
                            return Ok(());
                        }
                    }
                    received = events.recv() => match received {
                        Ok(notification) => {
                            if filter.matches(&notification) {
                                let message = serde_json::json!({
                                    "jsonrpc": "2.0",
                                    "method": "event",
                                    "params": notification,
                                });
                                write_message(&mut writer, &message).await?;
                            }
                        }
                        Err(RecvError::Lagged(skipped)) => {
                            warn!(skipped, "event subscriber lagged");
                        }
                        Err(RecvError::Closed) => return Ok(()),
                    }
                }
            }
        }

        let response = dispatch_request(state.clone(), request).await;
        write_message(&mut writer, &response).await?;
    }

    Ok(())
}

/// Write one newline-terminated JSON message.
async fn write_message<W, T>(writer: &mut W, message: &T) -> anyhow::Result<()>
where
    W: AsyncWrite + Unpin,
    T: Serialize,
{
    let mut json = serde_json::to_string(message)?;
    json.push('\n');
    writer.write_all(json.as_bytes()).await?;
    writer.flush().await?;
    Ok(())
}

/// Dispatch a JSON-RPC request to the appropriate command handler.
pub async fn dispatch_request(state: Arc<DaemonState>, request: RpcRequest) -> RpcResponse {
    let id = request.id.clone();
    if request.jsonrpc != "2.0" {
        return RpcResponse::error(id, RpcError::invalid_request());
    }
    let method = request.method.as_str();
    let params = match auth::authenticate(&state.nonces, method, &request.params).await {
        Ok(params) => params,
        Err(err) => return RpcResponse::error(id, err),
    };
    let params = &params;

    debug!(method, "dispatching RPC method");

    let result = match method {
        // Oracle registry
        "register_oracle" => commands::oracle::register_oracle(&state, params).await,
        "set_oracle_name" => commands::oracle::set_oracle_name(&state, params).await,
        "remove_oracle" => commands::oracle::remove_oracle(&state, params).await,
        "subscribe" => commands::oracle::subscribe(&state, params).await,
        "unsubscribe" => commands::oracle::unsubscribe(&state, params).await,
        "get_oracle_registration_info" => {
            commands::oracle::get_oracle_registration_info(&state, params).await
        }
        "get_oracle_owner" => commands::oracle::get_oracle_owner(&state, params).await,
        "is_subscribed" => commands::oracle::is_subscribed(&state, params).await,
        "can_remove_oracle" => commands::oracle::can_remove_oracle(&state, params).await,
        "list_oracles" => commands::oracle::list_oracles(&state).await,

        // Staking
        "approve" => commands::staking::approve(&state, params).await,
        "deposit" => commands::staking::deposit(&state, params).await,
        "stake_at" => commands::staking::stake_at(&state, params).await,
        "withdraw" => commands::staking::withdraw(&state, params).await,
        "withdraw_from" => commands::staking::withdraw_from(&state, params).await,
        "withdraw_shares" => commands::staking::withdraw_shares(&state, params).await,
        "distribute" => commands::staking::distribute(&state, params).await,
        "lock_stake" => commands::staking::lock_stake(&state, params).await,
        "withdraw_delayed" => commands::staking::withdraw_delayed(&state, params).await,
        "get_balance" => commands::staking::get_balance(&state, params).await,
        "pending_withdrawals" => commands::staking::pending_withdrawals(&state, params).await,

        // Prices and rounds
        "publish_price" => commands::price::publish_price(&state, params).await,
        "emergency_publish" => commands::price::emergency_publish(&state, params).await,
        "switch_round" => commands::price::switch_round(&state, params).await,
        "peek" => commands::price::peek(&state, params).await,
        "get_price" => commands::price::get_price(&state, params).await,
        "get_round_info" => commands::price::get_round_info(&state, params).await,
        "get_oracle_round_info" => commands::price::get_oracle_round_info(&state, params).await,
        "encode_price_message" => commands::price::encode_price_message(params).await,

        // Governance
        "execute_change" => commands::governance::execute_change(&state, params).await,
        "get_pair_config" => commands::governance::get_pair_config(&state, params).await,

        // Diagnostics
        "get_status" => commands::diagnostics::get_status(&state).await,
        "shutdown" => commands::diagnostics::shutdown(&state).await,

        _ => Err(RpcError::method_not_found(method)),
    };

    match result {
        Ok(value) => RpcResponse::success(id, value),
        Err(err) => RpcResponse::error(id, err),
    }
}
