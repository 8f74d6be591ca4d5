use std::collections::HashMap;
use tracing::debug;

use super::{AttemptId, ClaimId, Session, SessionStatus};
use crate::api::Message;
use crate::error::{SessionError, SessionResult};
use crate::framework::{merge, Snapshot};
use crate::messages;

/// Owner of the claim list and every session created from it.
///
/// At most one session is `Running` at a time, and only that session can
/// hold the channel focus.
#[derive(Debug, Default)]
pub struct SessionRegistry {
    claims: Vec<String>,
    sessions: HashMap<ClaimId, Session>,
    focus: Option<ClaimId>,
}

impl SessionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the claim list, discarding every session.
    pub fn load_claims(&mut self, claims: Vec<String>) {
        self.reset();
        self.claims = claims;
    }

    /// Drop the claim list and all sessions.
    pub fn reset(&mut self) {
        self.claims.clear();
        self.sessions.clear();
        self.focus = None;
    }

    /// Claim list in arrival order.
    pub fn claims(&self) -> Vec<(ClaimId, String)> {
        self.claims
            .iter()
            .enumerate()
            .map(|(i, text)| (ClaimId(i), text.clone()))
            .collect()
    }

    /// Number of claims in the list.
    pub fn len(&self) -> usize {
        self.claims.len()
    }

    /// Whether the claim list is empty.
    pub fn is_empty(&self) -> bool {
        self.claims.is_empty()
    }

    /// Text of a claim.
    pub fn claim_text(&self, claim_id: ClaimId) -> SessionResult<&str> {
        self.claims
            .get(claim_id.0)
            .map(String::as_str)
            .ok_or(SessionError::UnknownClaim { claim_id })
    }

    /// Existing session, if the claim was ever interacted with.
    pub fn session(&self, claim_id: ClaimId) -> Option<&Session> {
        self.sessions.get(&claim_id)
    }

    /// Session for a claim, created `Idle` on first access.
    pub fn session_or_idle(&mut self, claim_id: ClaimId) -> SessionResult<&Session> {
        let text = self.claim_text(claim_id)?.to_string();
        Ok(self
            .sessions
            .entry(claim_id)
            .or_insert_with(|| Session::idle(claim_id, text)))
    }

    /// The session currently `Running`, if any.
    pub fn running(&self) -> Option<ClaimId> {
        self.sessions
            .values()
            .find(|s| s.status == SessionStatus::Running)
            .map(|s| s.claim_id)
    }

    /// The claim bound to the streaming channel.
    pub fn focus(&self) -> Option<ClaimId> {
        self.focus
    }

    /// Confidence per claim, `None` for claims without a finished analysis.
    pub fn confidences(&self) -> HashMap<ClaimId, Option<u8>> {
        (0..self.claims.len())
            .map(ClaimId)
            .map(|id| (id, self.sessions.get(&id).and_then(|s| s.confidence)))
            .collect()
    }

    /// Start a new attempt: `Idle | Failed → Running`.
    ///
    /// Fails with `SessionBusy` if another claim is running and with
    /// `InvalidTransition` if the target is `Running` or `Done`. In both
    /// cases no session is touched.
    pub fn begin(&mut self, claim_id: ClaimId) -> SessionResult<AttemptId> {
        let text = self.claim_text(claim_id)?.to_string();

        if let Some(running) = self.running().filter(|r| *r != claim_id) {
            return Err(SessionError::SessionBusy { running });
        }

        if let Some(session) = self.sessions.get(&claim_id) {
            if matches!(session.status, SessionStatus::Running | SessionStatus::Done) {
                return Err(SessionError::InvalidTransition {
                    claim_id,
                    status: session.status,
                });
            }
        }

        let attempt = AttemptId::new();
        let mut session = Session::idle(claim_id, text.clone());
        session.status = SessionStatus::Running;
        session.attempt_id = Some(attempt.clone());
        session.transcript.push(Message::user(text));
        self.sessions.insert(claim_id, session);

        debug!(claim_id = %claim_id, attempt = %attempt, "Session running");
        Ok(attempt)
    }

    /// Bind the channel token to a running attempt and focus it.
    pub fn bind_channel(&mut self, claim_id: ClaimId, attempt: &AttemptId, token: String) -> bool {
        let Some(session) = Self::accepting(&mut self.sessions, claim_id, attempt) else {
            return false;
        };
        session.channel_token = Some(token);
        session.transcript.push(Message::ai(messages::ANALYSIS_STARTED));
        session.touch();
        self.focus = Some(claim_id);
        true
    }

    /// Replace the running attempt's framework with a progress snapshot.
    pub fn apply_progress(
        &mut self,
        claim_id: ClaimId,
        attempt: &AttemptId,
        snapshot: Snapshot,
    ) -> bool {
        if self.focus != Some(claim_id) {
            return false;
        }
        let Some(session) = Self::accepting(&mut self.sessions, claim_id, attempt) else {
            return false;
        };
        session.latest_framework = Some(merge(session.latest_framework.as_ref(), snapshot));
        session.touch();
        true
    }

    /// Finish the running attempt: `Running → Done`, confidence from the topic.
    pub fn complete(&mut self, claim_id: ClaimId, attempt: &AttemptId, snapshot: Snapshot) -> bool {
        if self.focus != Some(claim_id) {
            return false;
        }
        let Some(session) = Self::accepting(&mut self.sessions, claim_id, attempt) else {
            return false;
        };
        let confidence = snapshot.confidence();
        session.latest_framework = Some(merge(session.latest_framework.as_ref(), snapshot));
        session.confidence = Some(confidence);
        session.status = SessionStatus::Done;
        session
            .transcript
            .push(Message::ai(messages::analysis_completed(confidence)));
        session.touch();
        self.focus = None;
        true
    }

    /// Fail the running attempt: `Running → Failed`, posting `notice`.
    pub fn fail(&mut self, claim_id: ClaimId, attempt: &AttemptId, notice: &str) -> bool {
        let Some(session) = Self::accepting(&mut self.sessions, claim_id, attempt) else {
            return false;
        };
        session.status = SessionStatus::Failed;
        session.transcript.push(Message::ai(notice));
        session.touch();
        if self.focus == Some(claim_id) {
            self.focus = None;
        }
        true
    }

    /// Replace a finished session's framework and transcript after a
    /// conversation turn. Status stays `Done`.
    ///
    /// `attempt` is the attempt the turn was built from. A turn built from
    /// an older attempt, or from a session that was since replaced, fails
    /// with `Superseded`. Each applied turn starts a new attempt, which is
    /// returned.
    pub fn revise(
        &mut self,
        claim_id: ClaimId,
        attempt: &AttemptId,
        snapshot: Snapshot,
        transcript: Vec<Message>,
    ) -> SessionResult<AttemptId> {
        let session = self
            .sessions
            .get_mut(&claim_id)
            .filter(|s| s.attempt_id.as_ref() == Some(attempt))
            .ok_or(SessionError::Superseded { claim_id })?;
        if session.status != SessionStatus::Done {
            return Err(SessionError::NotCompleted { claim_id });
        }

        let next = AttemptId::new();
        session.attempt_id = Some(next.clone());
        session.confidence = Some(snapshot.confidence());
        session.latest_framework = Some(merge(session.latest_framework.as_ref(), snapshot));
        session.transcript = transcript;
        session.touch();
        Ok(next)
    }

    /// Append a claim whose analysis is already known (imported framework).
    pub fn insert_completed(&mut self, snapshot: Snapshot) -> ClaimId {
        let claim_id = ClaimId(self.claims.len());
        let text = snapshot.topic().label.clone();
        self.claims.push(text.clone());

        let mut session = Session::idle(claim_id, text.clone());
        session.attempt_id = Some(AttemptId::new());
        session.confidence = Some(snapshot.confidence());
        session.latest_framework = Some(snapshot);
        session.status = SessionStatus::Done;
        session.transcript.push(Message::user(text));
        session
            .transcript
            .push(Message::ai(messages::FRAMEWORK_IMPORTED));
        self.sessions.insert(claim_id, session);
        claim_id
    }

    /// The session if it is running the given attempt.
    fn accepting<'a>(
        sessions: &'a mut HashMap<ClaimId, Session>,
        claim_id: ClaimId,
        attempt: &AttemptId,
    ) -> Option<&'a mut Session> {
        sessions.get_mut(&claim_id).filter(|s| {
            s.status == SessionStatus::Running && s.attempt_id.as_ref() == Some(attempt)
        })
    }
}
