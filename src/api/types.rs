use serde::{Deserialize, Serialize};

use crate::framework::FractionFramework;
use crate::messages::{AI_SENDER, USER_SENDER};

/// One message in a claim's conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// `"user"` or `"ai"`.
    pub sender: String,
    /// Message body.
    pub text: String,
}

impl Message {
    /// Create a user message
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: USER_SENDER.to_string(),
            text: text.into(),
        }
    }

    /// Create a message from the analysis side
    pub fn ai(text: impl Into<String>) -> Self {
        Self {
            sender: AI_SENDER.to_string(),
            text: text.into(),
        }
    }
}

/// Strength-aggregation algorithm requested from the engine.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Semantics {
    /// Quadratic energy
    Qe,
    /// DF-QuAD
    #[default]
    Dfquad,
    /// Euler-based
    Eb,
}

impl Semantics {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Semantics::Qe => "qe",
            Semantics::Dfquad => "dfquad",
            Semantics::Eb => "eb",
        }
    }
}

impl std::fmt::Display for Semantics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for Semantics {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "qe" => Ok(Semantics::Qe),
            "dfquad" => Ok(Semantics::Dfquad),
            "eb" => Ok(Semantics::Eb),
            _ => Err(format!("Unknown semantics: {}", s)),
        }
    }
}

// ============================================================================
// Start mining
// ============================================================================

/// Request to start a mining analysis for one claim
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StartMiningRequest {
    /// Claim text to analyse.
    pub statement: String,
    /// Key forwarded to the engine.
    pub api_key: String,
    /// Strength-aggregation algorithm.
    pub semantics: Semantics,
    /// Argument tree depth, 1..=2.
    pub depth: u8,
    /// Arguments per level, 1..=4.
    pub breadth: u8,
    /// Parsed contents of the attached files.
    pub files: Vec<String>,
}

/// Response to a start request
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct StartMiningResponse {
    /// `"started"` on success
    pub status: String,
    /// Streaming token, present when started
    pub token: Option<String>,
}

impl StartMiningResponse {
    /// Status value signalling an accepted start.
    pub const STARTED: &'static str = "started";

    /// Whether the engine accepted the request.
    pub fn is_started(&self) -> bool {
        self.status == Self::STARTED
    }
}

// ============================================================================
// Streaming events
// ============================================================================

/// Name of the push event carrying mining progress.
pub const MINING_STATUS_EVENT: &str = "mining_status";

/// Progress state reported by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MiningStatus {
    /// Partial framework, more to come.
    InProgress,
    /// Final framework.
    Completed,
    /// The engine gave up.
    Failed,
}

/// Payload of a `mining_status` event.
///
/// `af` is kept raw: it is only read for `in_progress` and `completed`, so a
/// `failed` event carrying a partial graph still gets through. `prediction`
/// is required on `completed` events only.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct MiningStatusEvent {
    /// Progress state.
    pub status: MiningStatus,
    /// Framework at fraction scale, unparsed.
    pub af: Option<serde_json::Value>,
    /// Engine confidence in `[0, 1]`.
    pub prediction: Option<f64>,
}

impl MiningStatusEvent {
    /// The engine's confidence, required for completion.
    pub fn require_prediction(&self) -> Result<f64, String> {
        match self.prediction {
            Some(p) if (0.0..=1.0).contains(&p) => Ok(p),
            Some(p) => Err(format!("prediction {} outside [0, 1]", p)),
            None => Err("missing field `prediction`".to_string()),
        }
    }

    /// Parse the attached framework, required for progress and completion.
    pub fn framework(&self) -> Result<FractionFramework, String> {
        match &self.af {
            Some(af) => serde_json::from_value(af.clone()).map_err(|e| e.to_string()),
            None => Err("missing field `af`".to_string()),
        }
    }
}

// ============================================================================
// Conversation
// ============================================================================

/// Request to continue the conversation about a finished claim
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConversationRequest {
    /// Full transcript, ending with the new user message.
    pub messages: Vec<Message>,
    /// Current framework at fraction scale.
    pub af: FractionFramework,
    /// Key forwarded to the engine.
    pub api_key: String,
    /// Strength-aggregation algorithm.
    pub semantics: Semantics,
}

/// Response to a conversation turn
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct ConversationResponse {
    /// `"error"` when the turn was rejected.
    pub status: String,
    /// Updated transcript.
    pub messages: Vec<Message>,
    /// Revised framework at fraction scale.
    pub af: FractionFramework,
    /// Engine confidence in `[0, 1]`.
    pub prediction: f64,
    /// Error detail, if any.
    #[serde(default)]
    pub message: Option<String>,
}

// ============================================================================
// Single-shot calls
// ============================================================================

/// Parsed text of an uploaded file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedFile {
    /// Name of the uploaded file.
    pub file_name: String,
    /// Text extracted by the engine.
    pub parsed_content: String,
}

/// Request to generate candidate claims for a question
#[derive(Debug, Clone, Serialize)]
pub struct GenerateClaimsRequest {
    /// Question to generate claims for.
    pub question: String,
}

/// Generated candidate claims
#[derive(Debug, Clone, Deserialize)]
pub struct GenerateClaimsResponse {
    /// Candidate claim texts.
    pub claims: Vec<String>,
}
