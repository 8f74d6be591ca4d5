//! # Arg Claim Sessions
//!
//! Session orchestration for streamed argument-mining analyses. A list of
//! candidate claims is analysed one at a time by a remote engine that
//! streams quantitative bipolar argumentation frameworks back over a shared
//! push channel. This crate owns the per-claim sessions, the channel, the
//! framework snapshots and the confidence ranking.
//!
//! ## Features
//!
//! - **Session lifecycle**: `Idle → Running → {Done | Failed}` with at most
//!   one running claim
//! - **Push channel**: socket.io subscription tied to the focused session,
//!   cancelled on drop
//! - **Framework snapshots**: validated, immutable, shared via `Arc`
//! - **Ranking**: stable confidence ordering recomputed on every change
//! - **Conversation**: follow-up messages revise a finished framework
//! - **Export/import**: percentage-scale JSON documents
//!
//! ## Architecture
//!
//! ```text
//! JSON-RPC client → RpcServer (stdio) → SessionController
//!                                          ↓            ↓
//!                                   MiningApi (HTTP)  ChannelManager (socket.io)
//! ```
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use arg_claim_sessions::{AppState, Config, RpcServer};
//! use arg_claim_sessions::api::MiningClient;
//! use arg_claim_sessions::channel::SocketIoConnector;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::from_env()?;
//!     let api = Arc::new(MiningClient::new(&config.api, config.request.clone())?);
//!     let connector = Arc::new(SocketIoConnector::new(
//!         &config.api.base_url,
//!         config.channel.namespace.clone(),
//!     ));
//!     let state = Arc::new(AppState::new(config, api, connector));
//!     RpcServer::new(state).run().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]

/// Remote argument-mining API client and wire types.
pub mod api;
/// Push channel subscriptions over socket.io.
pub mod channel;
/// Configuration management.
pub mod config;
/// Session lifecycle controller.
pub mod controller;
/// Error types and result aliases for the application.
pub mod error;
/// Argumentation framework model and scale conversion.
pub mod framework;
/// Fixed user-facing status messages.
pub mod messages;
/// Confidence ranking of claims.
pub mod ranking;
/// JSON-RPC server implementation and request handling.
pub mod server;
/// Claim sessions and their registry.
pub mod session;

pub use config::Config;
pub use controller::{SessionController, StartOutcome};
pub use error::{AppError, AppResult};
pub use server::{AppState, RpcServer, SharedState};
