//! Common imports for typical client usage.
pub use crate::{
    ApiClient, ChatSession, ClientConfig, ClientError, Completion, FileActivity, FileEntry,
    InMemoryCredentials, StreamHandlers, StreamOutcome, TerminalActivity,
};
