//! Client for the remote argument-mining service.
//!
//! The service computes the frameworks; this crate only starts analyses,
//! continues conversations and makes the single-shot helper calls. The
//! [`MiningApi`] trait is the seam the controller talks to.

mod client;
mod types;

pub use client::MiningClient;
pub use types::*;

use async_trait::async_trait;
use std::path::Path;

use crate::error::ApiResult;

/// Remote calls used by the session controller.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait MiningApi: Send + Sync {
    /// Start mining a claim; the response carries the streaming token.
    async fn start_mining(&self, request: StartMiningRequest) -> ApiResult<StartMiningResponse>;

    /// Send a conversation turn together with the current framework.
    async fn continue_conversation(
        &self,
        request: ConversationRequest,
    ) -> ApiResult<ConversationResponse>;

    /// Generate candidate claims for a question.
    async fn generate_claims(&self, question: &str) -> ApiResult<Vec<String>>;

    /// Upload a file and get its extracted text.
    async fn attach_file(&self, path: &Path) -> ApiResult<AttachedFile>;
}
