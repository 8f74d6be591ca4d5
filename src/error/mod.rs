use thiserror::Error;

use crate::messages;
use crate::session::{ClaimId, SessionStatus};

/// Application-level errors
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Session error: {0}")]
    Session(#[from] SessionError),

    #[error("API error: {0}")]
    Api(#[from] ApiError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("RPC protocol error: {0}")]
    Rpc(#[from] RpcError),

    #[error("Internal error: {message}")]
    Internal { message: String },
}

/// Session lifecycle errors.
///
/// Every variant is terminal for the operation that produced it; nothing is
/// retried automatically.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("Session busy: claim {running} is still running")]
    SessionBusy { running: ClaimId },

    #[error("Transport failure: {message}")]
    TransportFailure { message: String },

    #[error("Remote analysis failed for claim {claim_id}")]
    RemoteFailed { claim_id: ClaimId },

    #[error("Malformed snapshot for claim {claim_id}: {reason}")]
    MalformedSnapshot { claim_id: ClaimId, reason: String },

    #[error("Schema violation: {message}")]
    SchemaViolation { message: String },

    #[error("Unknown claim: {claim_id}")]
    UnknownClaim { claim_id: ClaimId },

    #[error("Channel lost for claim {claim_id}: {reason}")]
    ChannelLost { claim_id: ClaimId, reason: String },

    #[error("Claim {claim_id} has no completed framework")]
    NotCompleted { claim_id: ClaimId },

    #[error("Claim {claim_id} changed while the request was in flight")]
    Superseded { claim_id: ClaimId },

    #[error("Claim {claim_id} cannot start while {status}")]
    InvalidTransition {
        claim_id: ClaimId,
        status: SessionStatus,
    },
}

impl SessionError {
    /// Stable name of the error kind.
    pub fn kind(&self) -> &'static str {
        match self {
            SessionError::SessionBusy { .. } => "session_busy",
            SessionError::TransportFailure { .. } => "transport_failure",
            SessionError::RemoteFailed { .. } => "remote_failed",
            SessionError::MalformedSnapshot { .. } => "malformed_snapshot",
            SessionError::SchemaViolation { .. } => "schema_violation",
            SessionError::UnknownClaim { .. } => "unknown_claim",
            SessionError::ChannelLost { .. } => "channel_lost",
            SessionError::NotCompleted { .. } => "not_completed",
            SessionError::Superseded { .. } => "superseded",
            SessionError::InvalidTransition { .. } => "invalid_transition",
        }
    }

    /// Fixed, human-readable status line shown to the user for this outcome.
    pub fn user_message(&self) -> &'static str {
        match self {
            SessionError::SessionBusy { .. } => messages::SESSION_BUSY,
            SessionError::TransportFailure { .. } => messages::START_FAILED,
            SessionError::RemoteFailed { .. } => messages::ANALYSIS_FAILED,
            SessionError::MalformedSnapshot { .. } => messages::MALFORMED_UPDATE,
            SessionError::SchemaViolation { .. } => messages::MALFORMED_UPDATE,
            SessionError::UnknownClaim { .. } => messages::UNKNOWN_CLAIM,
            SessionError::ChannelLost { .. } => messages::CHANNEL_LOST,
            SessionError::NotCompleted { .. } => messages::NOT_COMPLETED,
            SessionError::Superseded { .. } => messages::SUPERSEDED,
            SessionError::InvalidTransition { .. } => messages::INVALID_TRANSITION,
        }
    }
}

/// Argumentation framework validation errors
#[derive(Debug, Error)]
pub enum FrameworkError {
    #[error("Expected exactly one topic argument, found {count}")]
    TopicCount { count: usize },

    #[error("Edge {src} -> {dst} references an unknown argument")]
    DanglingEdge { src: String, dst: String },

    #[error("Argument {id}: {field} out of range ({value})")]
    OutOfRange {
        id: String,
        field: &'static str,
        value: String,
    },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl FrameworkError {
    /// Structurally well-formed payload whose graph breaks a snapshot invariant.
    pub fn is_malformed_snapshot(&self) -> bool {
        matches!(
            self,
            FrameworkError::TopicCount { .. } | FrameworkError::DanglingEdge { .. }
        )
    }
}

/// Remote argument-mining API errors
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Service unavailable: {message} (retries: {retries})")]
    Unavailable { message: String, retries: u32 },

    #[error("API error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Invalid response: {message}")]
    InvalidResponse { message: String },

    #[error("Request rejected with status '{status}'")]
    Rejected { status: String },

    #[error("Request timeout after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("File error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

/// Streaming channel errors
#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("Connection failed: {message}")]
    Connect { message: String },

    #[error("Handshake rejected: {message}")]
    Handshake { message: String },

    #[error("Protocol error: {message}")]
    Protocol { message: String },

    #[error("Channel closed")]
    Closed,

    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),
}

/// JSON-RPC protocol errors
#[derive(Debug, Error)]
pub enum RpcError {
    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unknown method: {method}")]
    UnknownMethod { method: String },

    #[error("Invalid parameters for {method}: {message}")]
    InvalidParameters { method: String, message: String },

    #[error("Execution failed: {message}")]
    ExecutionFailed { message: String },

    #[error("{0}")]
    Session(#[from] SessionError),

    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RpcError {
    /// JSON-RPC error code.
    pub fn code(&self) -> i32 {
        match self {
            RpcError::InvalidRequest { .. } => -32600,
            RpcError::UnknownMethod { .. } => -32601,
            RpcError::InvalidParameters { .. } => -32602,
            RpcError::Json(_) => -32603,
            RpcError::Session(SessionError::SessionBusy { .. }) => -32001,
            RpcError::Session(SessionError::UnknownClaim { .. }) => -32002,
            RpcError::Session(SessionError::NotCompleted { .. }) => -32003,
            RpcError::Session(_) => -32004,
            RpcError::ExecutionFailed { .. } => -32000,
        }
    }
}

impl From<FrameworkError> for AppError {
    fn from(err: FrameworkError) -> Self {
        AppError::Session(SessionError::SchemaViolation {
            message: err.to_string(),
        })
    }
}

impl From<AppError> for RpcError {
    fn from(err: AppError) -> Self {
        RpcError::ExecutionFailed {
            message: err.to_string(),
        }
    }
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

/// Result type alias for session operations
pub type SessionResult<T> = Result<T, SessionError>;

/// Result type alias for framework conversions
pub type FrameworkResult<T> = Result<T, FrameworkError>;

/// Result type alias for remote API operations
pub type ApiResult<T> = Result<T, ApiError>;

/// Result type alias for channel operations
pub type ChannelResult<T> = Result<T, ChannelError>;

/// Result type alias for RPC operations
pub type RpcResult<T> = Result<T, RpcError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_app_error_display() {
        let err = AppError::Config {
            message: "missing key".to_string(),
        };
        assert_eq!(err.to_string(), "Configuration error: missing key");

        let err = AppError::Internal {
            message: "unexpected".to_string(),
        };
        assert_eq!(err.to_string(), "Internal error: unexpected");
    }

    #[test]
    fn test_session_error_display() {
        let err = SessionError::SessionBusy {
            running: ClaimId(2),
        };
        assert_eq!(err.to_string(), "Session busy: claim 2 is still running");

        let err = SessionError::UnknownClaim {
            claim_id: ClaimId(9),
        };
        assert_eq!(err.to_string(), "Unknown claim: 9");

        let err = SessionError::ChannelLost {
            claim_id: ClaimId(0),
            reason: "stream closed".to_string(),
        };
        assert_eq!(err.to_string(), "Channel lost for claim 0: stream closed");

        let err = SessionError::InvalidTransition {
            claim_id: ClaimId(1),
            status: SessionStatus::Done,
        };
        assert_eq!(err.to_string(), "Claim 1 cannot start while done");
        assert_eq!(err.kind(), "invalid_transition");

        let err = SessionError::Superseded {
            claim_id: ClaimId(0),
        };
        assert_eq!(err.kind(), "superseded");
        assert_eq!(err.user_message(), messages::SUPERSEDED);
    }

    #[test]
    fn test_session_error_user_messages_are_fixed() {
        let busy = SessionError::SessionBusy {
            running: ClaimId(0),
        };
        assert_eq!(busy.user_message(), messages::SESSION_BUSY);

        let transport = SessionError::TransportFailure {
            message: "connection refused".to_string(),
        };
        assert_eq!(transport.user_message(), messages::START_FAILED);

        let remote = SessionError::RemoteFailed {
            claim_id: ClaimId(1),
        };
        assert_eq!(remote.user_message(), messages::ANALYSIS_FAILED);
    }

    #[test]
    fn test_framework_error_classification() {
        assert!(FrameworkError::TopicCount { count: 0 }.is_malformed_snapshot());
        assert!(FrameworkError::DanglingEdge {
            src: "a".to_string(),
            dst: "b".to_string(),
        }
        .is_malformed_snapshot());
        assert!(!FrameworkError::OutOfRange {
            id: "a".to_string(),
            field: "strength",
            value: "1.5".to_string(),
        }
        .is_malformed_snapshot());
    }

    #[test]
    fn test_api_error_display() {
        let err = ApiError::Unavailable {
            message: "server down".to_string(),
            retries: 3,
        };
        assert_eq!(err.to_string(), "Service unavailable: server down (retries: 3)");

        let err = ApiError::Api {
            status: 401,
            message: "unauthorized".to_string(),
        };
        assert_eq!(err.to_string(), "API error: 401 - unauthorized");

        let err = ApiError::Rejected {
            status: "error".to_string(),
        };
        assert_eq!(err.to_string(), "Request rejected with status 'error'");

        let err = ApiError::Timeout { timeout_ms: 5000 };
        assert_eq!(err.to_string(), "Request timeout after 5000ms");
    }

    #[test]
    fn test_rpc_error_display() {
        let err = RpcError::UnknownMethod {
            method: "claims/fly".to_string(),
        };
        assert_eq!(err.to_string(), "Unknown method: claims/fly");

        let err = RpcError::InvalidParameters {
            method: "claims/start".to_string(),
            message: "missing claim_id".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Invalid parameters for claims/start: missing claim_id"
        );
    }

    #[test]
    fn test_framework_error_conversion_to_app_error() {
        let app_err: AppError = FrameworkError::TopicCount { count: 2 }.into();
        assert!(matches!(
            app_err,
            AppError::Session(SessionError::SchemaViolation { .. })
        ));
    }

    #[test]
    fn test_app_error_conversion_to_rpc_error() {
        let app_err = AppError::Config {
            message: "test error".to_string(),
        };
        let rpc_err: RpcError = app_err.into();
        assert!(matches!(rpc_err, RpcError::ExecutionFailed { .. }));
        assert!(rpc_err.to_string().contains("Configuration error"));
    }

    #[test]
    fn test_rpc_error_codes() {
        assert_eq!(
            RpcError::UnknownMethod {
                method: "x".to_string()
            }
            .code(),
            -32601
        );
        let busy: RpcError = SessionError::SessionBusy {
            running: ClaimId(0),
        }
        .into();
        assert_eq!(busy.code(), -32001);
        let lost: RpcError = SessionError::ChannelLost {
            claim_id: ClaimId(0),
            reason: "closed".to_string(),
        }
        .into();
        assert_eq!(lost.code(), -32004);
        assert_eq!(lost.to_string(), "Channel lost for claim 0: closed");
    }

    #[test]
    fn test_session_error_kinds() {
        assert_eq!(
            SessionError::NotCompleted {
                claim_id: ClaimId(1)
            }
            .kind(),
            "not_completed"
        );
        assert_eq!(
            SessionError::RemoteFailed {
                claim_id: ClaimId(1)
            }
            .kind(),
            "remote_failed"
        );
    }

    #[test]
    fn test_session_error_conversion_to_app_error() {
        let err: AppError = SessionError::NotCompleted {
            claim_id: ClaimId(4),
        }
        .into();
        assert!(matches!(err, AppError::Session(_)));
    }
}
