//! Centralized user-facing status messages
//!
//! Every lifecycle outcome maps to exactly one fixed line of text. The
//! controller appends these to the claim's transcript, and the RPC layer
//! forwards them unchanged.

/// Sender name used for messages produced by the analysis side.
pub const AI_SENDER: &str = "ai";

/// Sender name used for messages typed by the user.
pub const USER_SENDER: &str = "user";

/// Posted when a start call was accepted and the channel is open.
pub const ANALYSIS_STARTED: &str = "Ok, please hold on while I reason about your input...";

/// Posted when the start call itself failed (network, HTTP, or rejected).
pub const START_FAILED: &str = "Something unexpected happened, please reload and try again.";

/// Posted when the remote engine reported a failed analysis.
pub const ANALYSIS_FAILED: &str = "Sorry, something went wrong. Please reload and try again.";

/// Returned when another claim already occupies the shared channel.
pub const SESSION_BUSY: &str =
    "Another claim is still being analysed. Please wait for it to finish before starting a new one.";

/// Returned when an update could not be applied to the session.
pub const MALFORMED_UPDATE: &str =
    "Received an analysis update that could not be read. The previous result is kept.";

/// Returned for claim identifiers outside the current claim list.
pub const UNKNOWN_CLAIM: &str = "That claim is not part of the current claim list.";

/// Posted when the push channel dropped or went silent while running.
pub const CHANNEL_LOST: &str =
    "The connection to the reasoning service was lost. Please start the claim again.";

/// Returned when a finished analysis is required but not available.
pub const NOT_COMPLETED: &str = "This claim has no finished analysis yet.";

/// Returned when the claim list or the claim changed under a pending request.
pub const SUPERSEDED: &str =
    "This claim changed while your request was in progress. Please try again.";

/// Returned when a claim is asked to start from a state that does not allow it.
pub const INVALID_TRANSITION: &str = "This claim cannot be started in its current state.";

/// Posted after an example or exported framework has been imported.
pub const FRAMEWORK_IMPORTED: &str = "I have loaded the reasoning trace for the statement you provided. See the arguments for details. Feel free to let me know if you have any thoughts on the arguments, and I will update my prediction accordingly.";

/// Completion message carrying the final confidence percentage.
pub fn analysis_completed(confidence: u8) -> String {
    format!(
        "I have finished reasoning about your input. Overall, my confidence in the provided input is {}%. See the arguments for details. Feel free to let me know if you have any thoughts on the arguments, and I will update my prediction accordingly.",
        confidence
    )
}
