//! Session lifecycle controller.
//!
//! [`SessionController`] is the single logical owner of claim sessions. It
//! serializes every transition through one `RwLock`, drives the remote start
//! and conversation calls, owns the push-channel subscription of the focused
//! session and publishes each change to observers:
//!
//! - a [`SessionView`] on the `updates` broadcast channel
//! - the recomputed ranking on the `ranking` watch channel

use futures::FutureExt;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::ops::ControlFlow;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::{broadcast, watch, RwLock};
use tracing::{debug, error, info, warn};

use crate::api::{
    AttachedFile, ConversationRequest, Message, MiningApi, MiningStatus, MiningStatusEvent,
    StartMiningRequest, MINING_STATUS_EVENT,
};
use crate::channel::{ChannelHandler, ChannelManager, ChannelSignal, Subscription};
use crate::config::MiningSettings;
use crate::error::{ApiError, FrameworkError, SessionError, SessionResult};
use crate::framework::{export_json, from_remote, import_json, to_remote, Snapshot};
use crate::messages;
use crate::ranking::rank;
use crate::session::{
    AttemptId, ClaimId, SessionRegistry, SessionStatus, SessionView,
};

/// Capacity of the session update broadcast channel.
const UPDATE_CHANNEL_CAPACITY: usize = 64;

/// Result of a `start` call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "outcome", content = "session", rename_all = "snake_case")]
pub enum StartOutcome {
    /// A new attempt is running and the channel is open.
    Started(SessionView),
    /// The claim was already analysed; nothing was sent.
    Cached(SessionView),
    /// The claim is the one currently running; its partial state.
    InProgress(SessionView),
}

impl StartOutcome {
    /// Session state carried by the outcome.
    pub fn view(&self) -> &SessionView {
        match self {
            StartOutcome::Started(view)
            | StartOutcome::Cached(view)
            | StartOutcome::InProgress(view) => view,
        }
    }
}

#[derive(Default)]
struct ControllerState {
    registry: SessionRegistry,
    subscription: Option<Subscription>,
    /// Parsed attachment contents by file name.
    attachments: BTreeMap<String, String>,
}

/// Owner of all claim sessions and of the push-channel subscription.
pub struct SessionController {
    api: Arc<dyn MiningApi>,
    channel: ChannelManager,
    api_key: String,
    settings: MiningSettings,
    state: RwLock<ControllerState>,
    ranking: watch::Sender<Vec<ClaimId>>,
    updates: broadcast::Sender<SessionView>,
}

impl SessionController {
    /// Create a controller with an empty claim list.
    pub fn new(
        api: Arc<dyn MiningApi>,
        channel: ChannelManager,
        api_key: impl Into<String>,
        settings: MiningSettings,
    ) -> Self {
        let (ranking, _) = watch::channel(Vec::new());
        let (updates, _) = broadcast::channel(UPDATE_CHANNEL_CAPACITY);
        Self {
            api,
            channel,
            api_key: api_key.into(),
            settings,
            state: RwLock::new(ControllerState::default()),
            ranking,
            updates,
        }
    }

    /// Mining parameters sent with every start request.
    pub fn settings(&self) -> MiningSettings {
        self.settings
    }

    // ========================================================================
    // Claim list
    // ========================================================================

    /// Replace the claim list. Existing sessions and the channel are dropped.
    pub async fn load_claims(&self, claims: Vec<String>) -> Vec<(ClaimId, String)> {
        let mut state = self.state.write().await;
        self.close_channel(&mut state);
        state.registry.load_claims(claims);
        info!(claims = state.registry.len(), "Claim list loaded");
        self.publish_ranking(&state);
        state.registry.claims()
    }

    /// Ask the engine for candidate claims and load them as the claim list.
    pub async fn generate_claims(&self, question: &str) -> SessionResult<Vec<(ClaimId, String)>> {
        let claims = self
            .api
            .generate_claims(question)
            .await
            .map_err(transport_failure)?;
        Ok(self.load_claims(claims).await)
    }

    /// Current claim list in arrival order.
    pub async fn claims(&self) -> Vec<(ClaimId, String)> {
        self.state.read().await.registry.claims()
    }

    /// Discard the claim list and all sessions, closing the channel.
    pub async fn reset(&self) {
        let mut state = self.state.write().await;
        self.close_channel(&mut state);
        state.registry.reset();
        info!("Sessions reset");
        self.publish_ranking(&state);
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Start the analysis of a claim.
    ///
    /// Rejected with `SessionBusy` while another claim is running. A `Done`
    /// claim returns its cached result and a `Running` claim its partial
    /// state. `Idle` and `Failed` claims get a fresh attempt.
    pub async fn start(self: &Arc<Self>, claim_id: ClaimId) -> SessionResult<StartOutcome> {
        let (attempt, request) = {
            let mut state = self.state.write().await;

            if let Some(running) = state.registry.running().filter(|r| *r != claim_id) {
                warn!(claim_id = %claim_id, running = %running, "Start rejected, session busy");
                return Err(SessionError::SessionBusy { running });
            }

            let session = state.registry.session_or_idle(claim_id)?;
            match session.status() {
                SessionStatus::Done => {
                    debug!(claim_id = %claim_id, "Returning cached analysis");
                    return Ok(StartOutcome::Cached(session.view()));
                }
                SessionStatus::Running => return Ok(StartOutcome::InProgress(session.view())),
                SessionStatus::Idle | SessionStatus::Failed => {}
            }

            let attempt = state.registry.begin(claim_id)?;
            // every fresh attempt gets a fresh connection
            state.subscription = None;

            let request = StartMiningRequest {
                statement: state.registry.claim_text(claim_id)?.to_string(),
                api_key: self.api_key.clone(),
                semantics: self.settings.semantics,
                depth: self.settings.depth,
                breadth: self.settings.breadth,
                files: state.attachments.values().cloned().collect(),
            };
            self.publish(&state, claim_id);
            (attempt, request)
        };

        info!(
            claim_id = %claim_id,
            attempt = %attempt,
            files = request.files.len(),
            "Starting analysis"
        );

        let token = match self.api.start_mining(request).await {
            Ok(response) if response.is_started() => match response.token {
                Some(token) => token,
                None => {
                    let err = ApiError::InvalidResponse {
                        message: "started response without a token".to_string(),
                    };
                    return Err(self.abort_start(claim_id, &attempt, err).await);
                }
            },
            Ok(response) => {
                let err = ApiError::Rejected {
                    status: response.status,
                };
                return Err(self.abort_start(claim_id, &attempt, err).await);
            }
            Err(err) => return Err(self.abort_start(claim_id, &attempt, err).await),
        };

        {
            let mut state = self.state.write().await;
            if !state.registry.bind_channel(claim_id, &attempt, token.clone()) {
                debug!(claim_id = %claim_id, "Attempt superseded before the channel opened");
                return Err(SessionError::Superseded { claim_id });
            }
            self.publish(&state, claim_id);
        }

        let handler = self.event_handler(claim_id, attempt.clone());
        let subscription = self
            .channel
            .subscribe(&token, MINING_STATUS_EVENT, handler)
            .await;

        let mut state = self.state.write().await;
        match subscription {
            Ok(subscription) => {
                let current = state
                    .registry
                    .session(claim_id)
                    .and_then(|s| s.attempt_id())
                    == Some(&attempt);
                if !current {
                    debug!(claim_id = %claim_id, "Attempt superseded while the channel opened");
                    return Err(SessionError::Superseded { claim_id });
                }
                state.subscription = Some(subscription);
                view_of(&state.registry, claim_id).map(StartOutcome::Started)
            }
            Err(err) => {
                if state.registry.fail(claim_id, &attempt, messages::CHANNEL_LOST) {
                    self.publish(&state, claim_id);
                }
                error!(claim_id = %claim_id, error = %err, "Could not open channel");
                Err(SessionError::ChannelLost {
                    claim_id,
                    reason: err.to_string(),
                })
            }
        }
    }

    /// Apply one channel signal to the session running `attempt`.
    ///
    /// Returns `Break` once the attempt is over. Malformed payloads are
    /// returned as errors and leave the session unchanged.
    pub async fn on_channel_event(
        &self,
        claim_id: ClaimId,
        attempt: &AttemptId,
        signal: ChannelSignal,
    ) -> SessionResult<ControlFlow<()>> {
        let payload = match signal {
            ChannelSignal::Event(payload) => payload,
            ChannelSignal::Closed => {
                return Ok(self.lose_channel(claim_id, attempt, "stream closed").await);
            }
            ChannelSignal::IdleTimeout(limit) => {
                let reason = format!("no event for {}ms", limit.as_millis());
                return Ok(self.lose_channel(claim_id, attempt, &reason).await);
            }
        };

        let event: MiningStatusEvent =
            serde_json::from_value(payload).map_err(|e| SessionError::SchemaViolation {
                message: format!("invalid {} payload: {}", MINING_STATUS_EVENT, e),
            })?;

        if event.status == MiningStatus::Failed {
            let mut state = self.state.write().await;
            if state.registry.fail(claim_id, attempt, messages::ANALYSIS_FAILED) {
                warn!(
                    claim_id = %claim_id,
                    error = %SessionError::RemoteFailed { claim_id },
                    "Analysis failed"
                );
                self.publish(&state, claim_id);
            }
            return Ok(ControlFlow::Break(()));
        }

        let wire = event
            .framework()
            .map_err(|message| SessionError::SchemaViolation { message })?;
        let snapshot = from_remote(wire)
            .map_err(|e| snapshot_error(claim_id, e))?
            .into_snapshot();
        let prediction = match event.status {
            MiningStatus::Completed => Some(
                event
                    .require_prediction()
                    .map_err(|message| SessionError::SchemaViolation { message })?,
            ),
            _ => None,
        };

        let mut state = self.state.write().await;
        let applied = match event.status {
            MiningStatus::Completed => state.registry.complete(claim_id, attempt, snapshot),
            _ => state.registry.apply_progress(claim_id, attempt, snapshot),
        };

        if !applied {
            debug!(claim_id = %claim_id, attempt = %attempt, "Discarding event for inactive attempt");
            return Ok(ControlFlow::Break(()));
        }

        self.publish(&state, claim_id);
        if event.status == MiningStatus::Completed {
            info!(
                claim_id = %claim_id,
                confidence = ?state.registry.session(claim_id).and_then(|s| s.confidence()),
                prediction = ?prediction,
                "Analysis completed"
            );
            Ok(ControlFlow::Break(()))
        } else {
            debug!(claim_id = %claim_id, "Progress snapshot applied");
            Ok(ControlFlow::Continue(()))
        }
    }

    /// Show a claim: cached result for `Done`, partial state for `Running`,
    /// the failed state for `Failed`. An `Idle` claim is started.
    pub async fn select_claim(self: &Arc<Self>, claim_id: ClaimId) -> SessionResult<StartOutcome> {
        let status = {
            let mut state = self.state.write().await;
            let session = state.registry.session_or_idle(claim_id)?;
            match session.status() {
                SessionStatus::Idle => None,
                SessionStatus::Running => Some(StartOutcome::InProgress(session.view())),
                SessionStatus::Done | SessionStatus::Failed => {
                    Some(StartOutcome::Cached(session.view()))
                }
            }
        };

        match status {
            Some(outcome) => Ok(outcome),
            None => self.start(claim_id).await,
        }
    }

    /// Read-only view of one claim's session.
    pub async fn session(&self, claim_id: ClaimId) -> SessionResult<SessionView> {
        let mut state = self.state.write().await;
        Ok(state.registry.session_or_idle(claim_id)?.view())
    }

    // ========================================================================
    // Conversation
    // ========================================================================

    /// Send a user message about a finished claim and apply the engine's
    /// revised framework.
    ///
    /// The reply is applied only if the session is still the one the
    /// request was built from. A reset, a reload or another turn applied in
    /// the meantime makes the reply `Superseded`.
    pub async fn send_message(&self, claim_id: ClaimId, text: &str) -> SessionResult<SessionView> {
        let (attempt, request) = {
            let state = self.state.read().await;
            state.registry.claim_text(claim_id)?;
            let session = state
                .registry
                .session(claim_id)
                .filter(|s| s.status() == SessionStatus::Done)
                .ok_or(SessionError::NotCompleted { claim_id })?;
            let framework = session
                .latest_framework()
                .ok_or(SessionError::NotCompleted { claim_id })?;
            let attempt = session
                .attempt_id()
                .cloned()
                .ok_or(SessionError::NotCompleted { claim_id })?;

            let mut transcript = session.transcript().to_vec();
            transcript.push(Message::user(text));

            let request = ConversationRequest {
                messages: transcript,
                af: to_remote(framework),
                api_key: self.api_key.clone(),
                semantics: self.settings.semantics,
            };
            (attempt, request)
        };

        let response = self
            .api
            .continue_conversation(request)
            .await
            .map_err(transport_failure)?;

        if response.status == "error" {
            return Err(SessionError::TransportFailure {
                message: response
                    .message
                    .unwrap_or_else(|| "conversation turn rejected".to_string()),
            });
        }

        let snapshot = from_remote(response.af)
            .map_err(|e| snapshot_error(claim_id, e))?
            .into_snapshot();

        let mut state = self.state.write().await;
        if let Err(err) = state
            .registry
            .revise(claim_id, &attempt, snapshot, response.messages)
        {
            warn!(claim_id = %claim_id, error = %err, "Discarding conversation reply");
            return Err(err);
        }
        info!(
            claim_id = %claim_id,
            prediction = response.prediction,
            "Conversation turn applied"
        );
        self.publish(&state, claim_id);
        view_of(&state.registry, claim_id)
    }

    // ========================================================================
    // Export / import
    // ========================================================================

    /// Export a claim's latest framework as percentage-scale JSON.
    pub async fn export_framework(&self, claim_id: ClaimId) -> SessionResult<String> {
        let state = self.state.read().await;
        state.registry.claim_text(claim_id)?;
        let framework = state
            .registry
            .session(claim_id)
            .and_then(|s| s.latest_framework())
            .ok_or(SessionError::NotCompleted { claim_id })?;
        export_json(framework).map_err(|e| SessionError::SchemaViolation {
            message: e.to_string(),
        })
    }

    /// Import an exported framework as a new, already finished claim.
    pub async fn import_framework(&self, document: &str) -> SessionResult<SessionView> {
        let snapshot: Snapshot = import_json(document)
            .map_err(|e| SessionError::SchemaViolation {
                message: e.to_string(),
            })?
            .into_snapshot();

        let mut state = self.state.write().await;
        let claim_id = state.registry.insert_completed(snapshot);
        info!(claim_id = %claim_id, "Framework imported");
        self.publish(&state, claim_id);
        view_of(&state.registry, claim_id)
    }

    // ========================================================================
    // Attachments
    // ========================================================================

    /// Upload a file and forward its parsed text with every later start.
    pub async fn attach_file(&self, path: &Path) -> SessionResult<AttachedFile> {
        let attached = self
            .api
            .attach_file(path)
            .await
            .map_err(transport_failure)?;

        let mut state = self.state.write().await;
        state
            .attachments
            .insert(attached.file_name.clone(), attached.parsed_content.clone());
        info!(file = %attached.file_name, "File attached");
        Ok(attached)
    }

    /// Forget an attachment. Returns whether it was present.
    pub async fn detach_file(&self, file_name: &str) -> bool {
        self.state.write().await.attachments.remove(file_name).is_some()
    }

    /// Names of the current attachments.
    pub async fn attachments(&self) -> Vec<String> {
        self.state.read().await.attachments.keys().cloned().collect()
    }

    // ========================================================================
    // Observers
    // ========================================================================

    /// Claim ids ordered by confidence.
    pub async fn ranking(&self) -> Vec<ClaimId> {
        let state = self.state.read().await;
        rank(&state.registry.claims(), &state.registry.confidences())
    }

    /// Receiver that sees every ranking change.
    pub fn subscribe_ranking(&self) -> watch::Receiver<Vec<ClaimId>> {
        self.ranking.subscribe()
    }

    /// Receiver for session updates.
    pub fn subscribe_updates(&self) -> broadcast::Receiver<SessionView> {
        self.updates.subscribe()
    }

    // ========================================================================
    // Internals
    // ========================================================================

    fn event_handler(self: &Arc<Self>, claim_id: ClaimId, attempt: AttemptId) -> ChannelHandler {
        let controller = Arc::downgrade(self);
        Arc::new(move |signal| {
            let controller = controller.clone();
            let attempt = attempt.clone();
            async move {
                let Some(controller) = controller.upgrade() else {
                    return ControlFlow::Break(());
                };
                match controller.on_channel_event(claim_id, &attempt, signal).await {
                    Ok(flow) => flow,
                    Err(err) => {
                        warn!(claim_id = %claim_id, error = %err, "Dropping channel update");
                        ControlFlow::Continue(())
                    }
                }
            }
            .boxed()
        })
    }

    async fn abort_start(
        &self,
        claim_id: ClaimId,
        attempt: &AttemptId,
        err: ApiError,
    ) -> SessionError {
        error!(claim_id = %claim_id, error = %err, "Start request failed");
        let mut state = self.state.write().await;
        if state.registry.fail(claim_id, attempt, messages::START_FAILED) {
            self.publish(&state, claim_id);
        }
        transport_failure(err)
    }

    async fn lose_channel(
        &self,
        claim_id: ClaimId,
        attempt: &AttemptId,
        reason: &str,
    ) -> ControlFlow<()> {
        let mut state = self.state.write().await;
        if state.registry.fail(claim_id, attempt, messages::CHANNEL_LOST) {
            let err = SessionError::ChannelLost {
                claim_id,
                reason: reason.to_string(),
            };
            warn!(claim_id = %claim_id, error = %err, "Session failed");
            self.publish(&state, claim_id);
        }
        ControlFlow::Break(())
    }

    fn close_channel(&self, state: &mut ControllerState) {
        self.channel.close_all();
        if state.subscription.take().is_some() {
            debug!("Channel subscription closed");
        }
    }

    fn publish(&self, state: &ControllerState, claim_id: ClaimId) {
        if let Some(session) = state.registry.session(claim_id) {
            // no receivers is fine
            let _ = self.updates.send(session.view());
        }
        self.publish_ranking(state);
    }

    fn publish_ranking(&self, state: &ControllerState) {
        let ranking = rank(&state.registry.claims(), &state.registry.confidences());
        self.ranking.send_if_modified(|current| {
            if *current == ranking {
                false
            } else {
                *current = ranking;
                true
            }
        });
    }
}

fn view_of(registry: &SessionRegistry, claim_id: ClaimId) -> SessionResult<SessionView> {
    registry
        .session(claim_id)
        .map(|s| s.view())
        .ok_or(SessionError::UnknownClaim { claim_id })
}

fn transport_failure(err: ApiError) -> SessionError {
    SessionError::TransportFailure {
        message: err.to_string(),
    }
}

fn snapshot_error(claim_id: ClaimId, err: FrameworkError) -> SessionError {
    if err.is_malformed_snapshot() {
        SessionError::MalformedSnapshot {
            claim_id,
            reason: err.to_string(),
        }
    } else {
        SessionError::SchemaViolation {
            message: err.to_string(),
        }
    }
}
