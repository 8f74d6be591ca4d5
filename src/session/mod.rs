//! Claim sessions and the registry that owns them.
//!
//! This module provides:
//! - Identifiers for claims and analysis attempts
//! - The monotonic session status machine
//! - [`SessionRegistry`], the single owner of all session state
//!
//! Session fields are private. Only the registry's transition methods
//! change them, and readers get clones or [`SessionView`]s.

mod registry;

pub use registry::*;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::api::Message;
use crate::framework::{to_percent, PercentFramework, Snapshot};

// ============================================================================
// Identifiers
// ============================================================================

/// Claim identity: its position in the claim list.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ClaimId(pub usize);

impl std::fmt::Display for ClaimId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Unique identifier for one analysis attempt of a claim.
///
/// Events are tagged with the attempt that opened their channel, so events
/// from an earlier connection can never touch a later attempt. Imports and
/// conversation turns mint one too, so a reply built from an older state
/// is recognised as stale.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct AttemptId(pub String);

impl AttemptId {
    /// Create a new unique attempt ID.
    pub fn new() -> Self {
        Self(format!("attempt_{}", uuid::Uuid::new_v4()))
    }
}

impl Default for AttemptId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for AttemptId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Status
// ============================================================================

/// Lifecycle state of a session: `Idle → Running → {Done | Failed}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    /// Created, never started
    Idle,
    /// Remote computation in flight
    Running,
    /// Finished with a framework and confidence
    Done,
    /// Finished without a result
    Failed,
}

impl SessionStatus {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Running => "running",
            SessionStatus::Done => "done",
            SessionStatus::Failed => "failed",
        }
    }

    /// `Done` and `Failed` accept no further channel events.
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Done | SessionStatus::Failed)
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for SessionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "idle" => Ok(SessionStatus::Idle),
            "running" => Ok(SessionStatus::Running),
            "done" => Ok(SessionStatus::Done),
            "failed" => Ok(SessionStatus::Failed),
            _ => Err(format!("Unknown session status: {}", s)),
        }
    }
}

// ============================================================================
// Session
// ============================================================================

/// One tracked attempt to compute a framework for a claim.
#[derive(Debug, Clone)]
pub struct Session {
    claim_id: ClaimId,
    claim_text: String,
    status: SessionStatus,
    attempt_id: Option<AttemptId>,
    channel_token: Option<String>,
    latest_framework: Option<Snapshot>,
    confidence: Option<u8>,
    transcript: Vec<Message>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl Session {
    fn idle(claim_id: ClaimId, claim_text: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            claim_id,
            claim_text: claim_text.into(),
            status: SessionStatus::Idle,
            attempt_id: None,
            channel_token: None,
            latest_framework: None,
            confidence: None,
            transcript: Vec::new(),
            created_at: now,
            updated_at: now,
        }
    }

    /// Claim identity.
    pub fn claim_id(&self) -> ClaimId {
        self.claim_id
    }

    /// Claim text as submitted.
    pub fn claim_text(&self) -> &str {
        &self.claim_text
    }

    /// Current lifecycle state.
    pub fn status(&self) -> SessionStatus {
        self.status
    }

    /// Attempt that produced the session's current state.
    pub fn attempt_id(&self) -> Option<&AttemptId> {
        self.attempt_id.as_ref()
    }

    /// Token authenticating the session's streaming connection.
    pub fn channel_token(&self) -> Option<&str> {
        self.channel_token.as_deref()
    }

    /// Latest published framework snapshot.
    pub fn latest_framework(&self) -> Option<&Snapshot> {
        self.latest_framework.as_ref()
    }

    /// Cached confidence, set once the session is `Done`.
    pub fn confidence(&self) -> Option<u8> {
        self.confidence
    }

    /// Messages exchanged for this claim.
    pub fn transcript(&self) -> &[Message] {
        &self.transcript
    }

    /// When the session record was created.
    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    /// When the session record last changed.
    pub fn updated_at(&self) -> DateTime<Utc> {
        self.updated_at
    }

    /// Serializable read-only view, framework at percentage scale.
    pub fn view(&self) -> SessionView {
        SessionView {
            claim_id: self.claim_id,
            claim_text: self.claim_text.clone(),
            status: self.status,
            confidence: self.confidence,
            framework: self.latest_framework.as_deref().map(to_percent),
            transcript: self.transcript.clone(),
            updated_at: self.updated_at,
        }
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
    }
}

/// Serializable snapshot of a session for observers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionView {
    /// Claim identity.
    pub claim_id: ClaimId,
    /// Claim text as submitted.
    pub claim_text: String,
    /// Current lifecycle state.
    pub status: SessionStatus,
    /// Confidence percentage, once finished.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub confidence: Option<u8>,
    /// Latest framework at percentage scale.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub framework: Option<PercentFramework>,
    /// Messages exchanged for this claim.
    pub transcript: Vec<Message>,
    /// When the session last changed.
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_round_trip_str() {
        for status in [
            SessionStatus::Idle,
            SessionStatus::Running,
            SessionStatus::Done,
            SessionStatus::Failed,
        ] {
            assert_eq!(status.as_str().parse::<SessionStatus>(), Ok(status));
        }
        assert!("paused".parse::<SessionStatus>().is_err());
    }

    #[test]
    fn test_status_terminal() {
        assert!(!SessionStatus::Idle.is_terminal());
        assert!(!SessionStatus::Running.is_terminal());
        assert!(SessionStatus::Done.is_terminal());
        assert!(SessionStatus::Failed.is_terminal());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_string(&SessionStatus::Running).unwrap();
        assert_eq!(json, "\"running\"");
    }

    #[test]
    fn test_claim_id_is_transparent() {
        assert_eq!(serde_json::to_string(&ClaimId(3)).unwrap(), "3");
        let id: ClaimId = serde_json::from_str("7").unwrap();
        assert_eq!(id, ClaimId(7));
    }

    #[test]
    fn test_attempt_ids_are_unique() {
        let a = AttemptId::new();
        let b = AttemptId::new();
        assert_ne!(a, b);
        assert!(a.to_string().starts_with("attempt_"));
    }

    #[test]
    fn test_idle_session_view() {
        let session = Session::idle(ClaimId(1), "Coffee is healthy");
        let view = session.view();
        assert_eq!(view.status, SessionStatus::Idle);
        assert_eq!(view.claim_text, "Coffee is healthy");
        assert!(view.framework.is_none());
        assert!(view.confidence.is_none());
    }
}
