//! Client core for the AgentX app builder.
//!
//! The centerpiece is the progress stream: a chat message is POSTed to the
//! project's chat endpoint and the agent reports back on a `data:`-framed
//! stream of JSON records. [`StreamDispatcher`] reassembles those records
//! across arbitrary chunk boundaries and hands each one to a callback.
//!
//! ```no_run
//! use agentx_client::prelude::*;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), ClientError> {
//! let client = ApiClient::from_env()?;
//! let project = client.create_project().await?;
//!
//! let outcome = client
//!     .stream_chat(
//!         project.id,
//!         "Build a todo app",
//!         StreamHandlers::new()
//!             .on_message(|m| println!("{m}"))
//!             .on_file_write(|a| println!("wrote {:?}", a.files))
//!             .on_complete(|c| println!("done: {}", c.summary))
//!             .on_error(|e| eprintln!("failed: {e}")),
//!     )
//!     .await;
//! println!("{outcome:?}");
//! # Ok(())
//! # }
//! ```

/// Credential store and token refresh.
pub mod auth;
/// Chat transcript with progress placeholders.
pub mod chat;
/// HTTP client for the AgentX API.
pub mod client;
/// Client configuration.
pub mod config;
/// Progress stream dispatcher.
pub mod dispatch;
/// Public error type.
pub mod errors;
/// Progress stream wire records and callback payloads.
pub mod event;
/// Process-wide logging setup.
pub mod observability;
/// Common imports for typical usage.
pub mod prelude;
/// Project and sandbox file models.
pub mod project;
/// Line framing for `data:` streams.
pub mod sse;

pub use auth::{CredentialStore, InMemoryCredentials};
pub use chat::{ChatMessage, ChatSession, MessageStatus, Role, SendReport, Transcript};
pub use client::{ApiClient, ApiClientBuilder};
pub use config::ClientConfig;
pub use dispatch::{DispatchState, StreamDispatcher, StreamHandlers, StreamOutcome};
pub use errors::ClientError;
pub use event::{Completion, FileActivity, StreamEvent, TerminalActivity};
pub use observability::{ObservabilitySettings, init_observability, init_observability_with};
pub use project::{EntryKind, FileContent, FileEntry, Project};
