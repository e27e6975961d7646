//! Wire records emitted on the chat progress stream.
//!
//! Only the current protocol revision is accepted. Records tagged with the
//! older `file_creation` / `file_update` actions fail validation and are
//! skipped by the dispatcher like any other malformed record.

use serde::{Deserialize, Serialize};

/// One record of the progress stream, tagged by its `action` field.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Free-form progress update.
    Message {
        #[serde(default)]
        message: String,
        #[serde(default)]
        timestamp: Option<f64>,
    },
    /// The agent wrote files in the sandbox.
    FileWrite {
        #[serde(default)]
        message: String,
        #[serde(default)]
        timestamp: Option<f64>,
        #[serde(default)]
        data: Option<FilesPayload>,
    },
    /// The agent read files from the sandbox.
    FileRead {
        #[serde(default)]
        message: String,
        #[serde(default)]
        timestamp: Option<f64>,
        #[serde(default)]
        data: Option<FilesPayload>,
    },
    /// The agent ran a terminal command.
    Terminal {
        #[serde(default)]
        message: String,
        #[serde(default)]
        timestamp: Option<f64>,
        #[serde(default)]
        data: Option<TerminalPayload>,
    },
    /// Terminal success record.
    Complete {
        #[serde(default)]
        message: String,
        #[serde(default)]
        timestamp: Option<f64>,
        #[serde(default)]
        data: Option<CompletePayload>,
    },
    /// Terminal failure record.
    Error {
        #[serde(default)]
        message: String,
        #[serde(default)]
        timestamp: Option<f64>,
    },
}

impl StreamEvent {
    /// Parses and validates one record payload (the JSON after `data:`).
    pub fn parse(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }

    /// Returns the wire `action` tag.
    pub fn action(&self) -> &'static str {
        match self {
            Self::Message { .. } => "message",
            Self::FileWrite { .. } => "file_write",
            Self::FileRead { .. } => "file_read",
            Self::Terminal { .. } => "terminal",
            Self::Complete { .. } => "complete",
            Self::Error { .. } => "error",
        }
    }

    /// Returns the human-readable progress message.
    pub fn message(&self) -> &str {
        match self {
            Self::Message { message, .. }
            | Self::FileWrite { message, .. }
            | Self::FileRead { message, .. }
            | Self::Terminal { message, .. }
            | Self::Complete { message, .. }
            | Self::Error { message, .. } => message,
        }
    }

    /// Returns the informational timestamp, if any.
    pub fn timestamp(&self) -> Option<f64> {
        match self {
            Self::Message { timestamp, .. }
            | Self::FileWrite { timestamp, .. }
            | Self::FileRead { timestamp, .. }
            | Self::Terminal { timestamp, .. }
            | Self::Complete { timestamp, .. }
            | Self::Error { timestamp, .. } => *timestamp,
        }
    }

    /// True for `complete` and `error`, after which no record is processed.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Complete { .. } | Self::Error { .. })
    }
}

/// `data` of `file_write` / `file_read` records.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilesPayload {
    #[serde(default)]
    pub files: Vec<String>,
}

/// `data` of `terminal` records.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TerminalPayload {
    #[serde(default)]
    pub command: Option<String>,
    #[serde(default)]
    pub output: Option<String>,
}

/// `data` of `complete` records.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CompletePayload {
    #[serde(default)]
    pub sandbox_id: Option<String>,
    #[serde(default)]
    pub summary: Option<String>,
    /// Generated project title.
    #[serde(default)]
    pub title: Option<String>,
    /// Preview URL of the running sandbox.
    #[serde(default)]
    pub url: Option<String>,
    /// Files the run wrote.
    #[serde(default)]
    pub files: Vec<String>,
}

/// Argument of the file write/read callbacks.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct FileActivity {
    pub files: Vec<String>,
    pub message: String,
}

/// Argument of the terminal callback. Command and output pass through as sent.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TerminalActivity {
    pub command: Option<String>,
    pub output: Option<String>,
    pub message: String,
}

/// Argument of the completion callback.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Completion {
    pub sandbox_id: Option<String>,
    /// Summary from the payload, or the record message when none was sent.
    pub summary: String,
    pub title: Option<String>,
    pub url: Option<String>,
    pub files: Vec<String>,
}

impl FileActivity {
    pub(crate) fn from_record(data: Option<FilesPayload>, message: String) -> Self {
        Self {
            files: data.unwrap_or_default().files,
            message,
        }
    }
}

impl TerminalActivity {
    pub(crate) fn from_record(data: Option<TerminalPayload>, message: String) -> Self {
        let data = data.unwrap_or_default();
        Self {
            command: data.command,
            output: data.output,
            message,
        }
    }
}

impl Completion {
    pub(crate) fn from_record(data: Option<CompletePayload>, message: String) -> Self {
        let data = data.unwrap_or_default();
        let summary = data.summary.filter(|s| !s.is_empty()).unwrap_or(message);
        Self {
            sandbox_id: data.sandbox_id.filter(|s| !s.is_empty()),
            summary,
            title: data.title.filter(|s| !s.is_empty()),
            url: data.url.filter(|s| !s.is_empty()),
            files: data.files,
        }
    }
}
