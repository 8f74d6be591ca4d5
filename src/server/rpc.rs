//! JSON-RPC 2.0 line protocol.
//!
//! One JSON object per line in each direction. Requests are handled
//! concurrently, so a start call waiting on the network does not hold up
//! other methods. Session updates and ranking changes are pushed to the
//! client as notifications on the same output stream.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use super::{handle_method, SharedState, METHODS};
use crate::error::RpcError;
use crate::session::{ClaimId, SessionView};

#[cfg(test)]
#[path = "rpc_tests.rs"]
mod rpc_tests;

/// Notification sent whenever a session changes.
pub const SESSION_UPDATED: &str = "session/updated";

/// Notification sent whenever the claim ranking changes.
pub const RANKING_CHANGED: &str = "ranking/changed";

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version (must be "2.0").
    pub jsonrpc: String,
    /// Request identifier (None for notifications).
    pub id: Option<Value>,
    /// The method name to invoke.
    pub method: String,
    /// Optional parameters for the method.
    #[serde(default)]
    pub params: Option<Value>,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Serialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Request identifier (null if it could not be read).
    pub id: Value,
    /// The result on success (mutually exclusive with error).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// The error on failure (mutually exclusive with result).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC 2.0 error object.
#[derive(Debug, Serialize)]
pub struct JsonRpcError {
    /// Error code (negative for predefined errors).
    pub code: i32,
    /// Human-readable error message.
    pub message: String,
    /// Optional additional error data.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

/// Server-to-client notification.
#[derive(Debug, Serialize)]
pub struct JsonRpcNotification {
    /// JSON-RPC version (always "2.0").
    pub jsonrpc: String,
    /// Notification name.
    pub method: String,
    /// Notification payload.
    pub params: Value,
}

/// Server information returned during initialization.
#[derive(Debug, Serialize)]
pub struct ServerInfo {
    /// The server name identifier.
    pub name: String,
    /// The server version string.
    pub version: String,
}

/// Result of the initialize handshake.
#[derive(Debug, Serialize)]
pub struct InitializeResult {
    /// Server identification information.
    #[serde(rename = "serverInfo")]
    pub server_info: ServerInfo,
    /// Methods the server answers.
    pub methods: Vec<String>,
    /// Notifications the server emits.
    pub notifications: Vec<String>,
    /// Mining parameters in effect.
    pub settings: Value,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Option<Value>, result: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<Value>, code: i32, message: impl Into<String>) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            id: id.unwrap_or(Value::Null),
            result: None,
            error: Some(JsonRpcError {
                code,
                message: message.into(),
                data: None,
            }),
        }
    }

    /// Error response for a failed method call.
    ///
    /// Session errors carry their fixed user-facing message, with the kind
    /// and technical detail in `data`.
    pub fn from_error(id: Option<Value>, err: &RpcError) -> Self {
        let mut response = Self::error(id, err.code(), err.to_string());
        if let (RpcError::Session(session_err), Some(error)) = (err, response.error.as_mut()) {
            error.message = session_err.user_message().to_string();
            error.data = Some(json!({
                "kind": session_err.kind(),
                "detail": session_err.to_string(),
            }));
        }
        response
    }
}

impl JsonRpcNotification {
    /// Create a notification
    pub fn new(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: "2.0".to_string(),
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC server running over a line-oriented byte stream.
pub struct RpcServer {
    /// Shared application state.
    state: SharedState,
}

impl RpcServer {
    /// Create a new RPC server
    pub fn new(state: SharedState) -> Self {
        Self { state }
    }

    /// Run the server using async stdio
    pub async fn run(&self) -> std::io::Result<()> {
        info!("Claim session server starting...");
        let stdin = BufReader::new(tokio::io::stdin());
        self.serve(stdin, tokio::io::stdout()).await
    }

    /// Serve requests from `reader` until EOF, writing to `writer`.
    pub async fn serve<R, W>(&self, reader: R, writer: W) -> std::io::Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin + Send + 'static,
    {
        let (out_tx, out_rx) = mpsc::unbounded_channel::<String>();
        let writer_task = tokio::spawn(write_lines(writer, out_rx));

        let notifier = tokio::spawn(forward_notifications(
            self.state.controller.subscribe_updates(),
            self.state.controller.subscribe_ranking(),
            out_tx.clone(),
        ));

        let mut requests = JoinSet::new();
        let mut lines = reader.lines();

        while let Some(line) = lines.next_line().await? {
            let trimmed = line.trim();
            if trimmed.is_empty() {
                continue;
            }

            debug!(request = %trimmed, "Received request");

            match serde_json::from_str::<JsonRpcRequest>(trimmed) {
                Ok(request) => {
                    let state = Arc::clone(&self.state);
                    let out = out_tx.clone();
                    requests.spawn(async move {
                        if let Some(response) = handle_request(&state, request).await {
                            send_line(&out, &response);
                        }
                    });
                }
                Err(e) => {
                    error!(error = %e, "Failed to parse request");
                    send_line(
                        &out_tx,
                        &JsonRpcResponse::error(None, -32700, format!("Parse error: {}", e)),
                    );
                }
            }

            // reap finished handlers
            while requests.try_join_next().is_some() {}
        }

        info!("EOF received, shutting down");
        while requests.join_next().await.is_some() {}
        notifier.abort();
        drop(out_tx);

        writer_task
            .await
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
    }
}

/// Handle a single JSON-RPC request.
///
/// Returns `None` for notifications (requests without id).
pub async fn handle_request(state: &SharedState, request: JsonRpcRequest) -> Option<JsonRpcResponse> {
    let is_notification = request.id.is_none();

    if request.jsonrpc != "2.0" {
        let err = RpcError::InvalidRequest {
            message: format!("unsupported jsonrpc version '{}'", request.jsonrpc),
        };
        return (!is_notification).then(|| JsonRpcResponse::from_error(request.id, &err));
    }

    match request.method.as_str() {
        "initialize" => Some(handle_initialize(state, request.id)),
        "initialized" => {
            debug!("Received initialized notification");
            None
        }
        "ping" => Some(JsonRpcResponse::success(
            request.id,
            Value::Object(Default::default()),
        )),
        method => {
            let result = handle_method(state, method, request.params).await;
            if is_notification {
                if let Err(e) = result {
                    debug!(method = %method, error = %e, "Notification failed, ignoring");
                }
                return None;
            }
            Some(match result {
                Ok(value) => JsonRpcResponse::success(request.id, value),
                Err(e) => {
                    warn!(method = %method, error = %e, "Method call failed");
                    JsonRpcResponse::from_error(request.id, &e)
                }
            })
        }
    }
}

fn handle_initialize(state: &SharedState, id: Option<Value>) -> JsonRpcResponse {
    info!("Handling initialize request");
    let settings = state.controller.settings();

    let result = InitializeResult {
        server_info: ServerInfo {
            name: env!("CARGO_PKG_NAME").to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        },
        methods: METHODS.iter().map(|m| m.to_string()).collect(),
        notifications: vec![SESSION_UPDATED.to_string(), RANKING_CHANGED.to_string()],
        settings: json!({
            "semantics": settings.semantics,
            "depth": settings.depth,
            "breadth": settings.breadth,
        }),
    };

    match serde_json::to_value(result) {
        Ok(val) => JsonRpcResponse::success(id, val),
        Err(e) => {
            error!(error = %e, "Failed to serialize initialize result");
            JsonRpcResponse::error(id, -32603, format!("Internal error: {}", e))
        }
    }
}

fn send_line<T: Serialize>(out: &mpsc::UnboundedSender<String>, message: &T) {
    match serde_json::to_string(message) {
        Ok(line) => {
            if out.send(line).is_err() {
                debug!("Output closed, dropping message");
            }
        }
        Err(e) => error!(error = %e, "Failed to serialize outgoing message"),
    }
}

async fn write_lines<W>(mut writer: W, mut lines: mpsc::UnboundedReceiver<String>) -> std::io::Result<()>
where
    W: AsyncWrite + Unpin,
{
    while let Some(line) = lines.recv().await {
        debug!(message = %line, "Sending message");
        writer.write_all(line.as_bytes()).await?;
        writer.write_all(b"\n").await?;
        writer.flush().await?;
    }
    Ok(())
}

async fn forward_notifications(
    mut updates: broadcast::Receiver<SessionView>,
    mut ranking: watch::Receiver<Vec<ClaimId>>,
    out: mpsc::UnboundedSender<String>,
) {
    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(view) => match serde_json::to_value(&view) {
                    Ok(params) => send_line(&out, &JsonRpcNotification::new(SESSION_UPDATED, params)),
                    Err(e) => error!(error = %e, "Failed to serialize session update"),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "Session updates lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            },
            changed = ranking.changed() => {
                if changed.is_err() {
                    break;
                }
                let order = ranking.borrow_and_update().clone();
                send_line(&out, &JsonRpcNotification::new(RANKING_CHANGED, json!({ "ranking": order })));
            }
        }
    }
}
