use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::path::PathBuf;
use tracing::info;

use super::SharedState;
use crate::error::{RpcError, RpcResult};
use crate::session::ClaimId;

/// Route a method call to its handler.
pub async fn handle_method(
    state: &SharedState,
    method: &str,
    params: Option<Value>,
) -> RpcResult<Value> {
    info!(method = %method, "Routing method call");

    match method {
        // Claim list
        "claims/generate" => handle_generate(state, params).await,
        "claims/load" => handle_load(state, params).await,
        "claims/reset" => handle_reset(state).await,
        "claims/ranking" => handle_ranking(state).await,
        // Session lifecycle
        "claims/start" => handle_start(state, params).await,
        "claims/select" => handle_select(state, params).await,
        "claims/session" => handle_session(state, params).await,
        // Conversation
        "conversation/send" => handle_send(state, params).await,
        // Export / import
        "framework/export" => handle_export(state, params).await,
        "framework/import" => handle_import(state, params).await,
        // Attachments
        "files/attach" => handle_attach(state, params).await,
        "files/detach" => handle_detach(state, params).await,
        _ => Err(RpcError::UnknownMethod {
            method: method.to_string(),
        }),
    }
}

/// Methods served by [`handle_method`].
pub const METHODS: &[&str] = &[
    "claims/generate",
    "claims/load",
    "claims/reset",
    "claims/ranking",
    "claims/start",
    "claims/select",
    "claims/session",
    "conversation/send",
    "framework/export",
    "framework/import",
    "files/attach",
    "files/detach",
];

// ============================================================================
// Parameters
// ============================================================================

/// Parameters naming one claim.
#[derive(Debug, Deserialize)]
pub struct ClaimParams {
    /// Position of the claim in the claim list.
    pub claim_id: ClaimId,
}

/// Parameters for `claims/generate`.
#[derive(Debug, Deserialize)]
pub struct GenerateParams {
    /// Question the claims should answer.
    pub question: String,
}

/// Parameters for `claims/load`.
#[derive(Debug, Deserialize)]
pub struct LoadParams {
    /// Claim texts in display order.
    pub claims: Vec<String>,
}

/// Parameters for `conversation/send`.
#[derive(Debug, Deserialize)]
pub struct SendParams {
    /// Finished claim the message is about.
    pub claim_id: ClaimId,
    /// Message text.
    pub text: String,
}

/// Parameters for `framework/export`.
#[derive(Debug, Deserialize)]
pub struct ExportParams {
    /// Claim whose framework is exported.
    pub claim_id: ClaimId,
    /// Write the document here instead of returning it.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Parameters for `framework/import`; exactly one source is required.
#[derive(Debug, Deserialize)]
pub struct ImportParams {
    /// Inline exported document.
    #[serde(default)]
    pub document: Option<String>,
    /// Path of an exported document.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

/// Parameters for `files/attach`.
#[derive(Debug, Deserialize)]
pub struct AttachParams {
    /// File to upload.
    pub path: PathBuf,
}

/// Parameters for `files/detach`.
#[derive(Debug, Deserialize)]
pub struct DetachParams {
    /// Name under which the file was attached.
    pub file_name: String,
}

/// One entry of a claim listing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClaimEntry {
    /// Position in the claim list.
    pub claim_id: ClaimId,
    /// Claim text.
    pub text: String,
}

fn entries(claims: Vec<(ClaimId, String)>) -> Vec<ClaimEntry> {
    claims
        .into_iter()
        .map(|(claim_id, text)| ClaimEntry { claim_id, text })
        .collect()
}

// ============================================================================
// Claim list
// ============================================================================

/// Handle claims/generate
async fn handle_generate(state: &SharedState, params: Option<Value>) -> RpcResult<Value> {
    let params: GenerateParams = parse_arguments("claims/generate", params)?;
    let claims = state.controller.generate_claims(&params.question).await?;
    Ok(json!({ "claims": entries(claims) }))
}

/// Handle claims/load
async fn handle_load(state: &SharedState, params: Option<Value>) -> RpcResult<Value> {
    let params: LoadParams = parse_arguments("claims/load", params)?;
    let claims = state.controller.load_claims(params.claims).await;
    Ok(json!({ "claims": entries(claims) }))
}

/// Handle claims/reset
async fn handle_reset(state: &SharedState) -> RpcResult<Value> {
    state.controller.reset().await;
    Ok(json!({}))
}

/// Handle claims/ranking
async fn handle_ranking(state: &SharedState) -> RpcResult<Value> {
    let claims = state.controller.claims().await;
    let ranking = state.controller.ranking().await;
    Ok(json!({ "ranking": ranking, "claims": entries(claims) }))
}

// ============================================================================
// Session lifecycle
// ============================================================================

/// Handle claims/start
async fn handle_start(state: &SharedState, params: Option<Value>) -> RpcResult<Value> {
    execute_handler("claims/start", params, |p: ClaimParams| {
        state.controller.start(p.claim_id)
    })
    .await
}

/// Handle claims/select
async fn handle_select(state: &SharedState, params: Option<Value>) -> RpcResult<Value> {
    execute_handler("claims/select", params, |p: ClaimParams| {
        state.controller.select_claim(p.claim_id)
    })
    .await
}

/// Handle claims/session
async fn handle_session(state: &SharedState, params: Option<Value>) -> RpcResult<Value> {
    execute_handler("claims/session", params, |p: ClaimParams| {
        state.controller.session(p.claim_id)
    })
    .await
}

/// Handle conversation/send
async fn handle_send(state: &SharedState, params: Option<Value>) -> RpcResult<Value> {
    let params: SendParams = parse_arguments("conversation/send", params)?;
    let view = state
        .controller
        .send_message(params.claim_id, &params.text)
        .await?;
    serde_json::to_value(view).map_err(RpcError::Json)
}

// ============================================================================
// Export / import
// ============================================================================

/// Handle framework/export
async fn handle_export(state: &SharedState, params: Option<Value>) -> RpcResult<Value> {
    let params: ExportParams = parse_arguments("framework/export", params)?;
    let document = state.controller.export_framework(params.claim_id).await?;

    match params.path {
        Some(path) => {
            tokio::fs::write(&path, &document)
                .await
                .map_err(|e| RpcError::ExecutionFailed {
                    message: format!("Failed to write {}: {}", path.display(), e),
                })?;
            info!(claim_id = %params.claim_id, path = %path.display(), "Framework exported");
            Ok(json!({ "path": path }))
        }
        None => Ok(json!({ "document": document })),
    }
}

/// Handle framework/import
async fn handle_import(state: &SharedState, params: Option<Value>) -> RpcResult<Value> {
    let params: ImportParams = parse_arguments("framework/import", params)?;

    let document = match (params.document, params.path) {
        (Some(document), None) => document,
        (None, Some(path)) => tokio::fs::read_to_string(&path).await.map_err(|e| {
            RpcError::ExecutionFailed {
                message: format!("Failed to read {}: {}", path.display(), e),
            }
        })?,
        _ => {
            return Err(RpcError::InvalidParameters {
                method: "framework/import".to_string(),
                message: "exactly one of `document` or `path` is required".to_string(),
            })
        }
    };

    let view = state.controller.import_framework(&document).await?;
    serde_json::to_value(view).map_err(RpcError::Json)
}

// ============================================================================
// Attachments
// ============================================================================

/// Handle files/attach
async fn handle_attach(state: &SharedState, params: Option<Value>) -> RpcResult<Value> {
    let params: AttachParams = parse_arguments("files/attach", params)?;
    let attached = state.controller.attach_file(&params.path).await?;
    let attachments = state.controller.attachments().await;
    Ok(json!({ "file_name": attached.file_name, "attachments": attachments }))
}

/// Handle files/detach
async fn handle_detach(state: &SharedState, params: Option<Value>) -> RpcResult<Value> {
    let params: DetachParams = parse_arguments("files/detach", params)?;
    let removed = state.controller.detach_file(&params.file_name).await;
    let attachments = state.controller.attachments().await;
    Ok(json!({ "removed": removed, "attachments": attachments }))
}

// ============================================================================
// Helper functions
// ============================================================================

/// Helper to parse arguments with consistent error handling
fn parse_arguments<T: serde::de::DeserializeOwned>(
    method: &str,
    params: Option<Value>,
) -> RpcResult<T> {
    match params {
        Some(args) => serde_json::from_value(args).map_err(|e| RpcError::InvalidParameters {
            method: method.to_string(),
            message: e.to_string(),
        }),
        None => Err(RpcError::InvalidParameters {
            method: method.to_string(),
            message: "Missing params".to_string(),
        }),
    }
}

/// Parse typed parameters, run the operation and serialize its result.
///
/// Operation errors keep their own type so the RPC layer can report the
/// session error kind.
async fn execute_handler<P, R, E, F, Fut>(
    method: &str,
    params: Option<Value>,
    operation: F,
) -> RpcResult<Value>
where
    P: serde::de::DeserializeOwned,
    R: Serialize,
    E: Into<RpcError>,
    F: FnOnce(P) -> Fut,
    Fut: std::future::Future<Output = Result<R, E>>,
{
    let params: P = parse_arguments(method, params)?;
    let result = operation(params).await.map_err(Into::into)?;
    serde_json::to_value(result).map_err(RpcError::Json)
}
