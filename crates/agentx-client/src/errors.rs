use std::time::Duration;

/// Errors produced by the AgentX client.
///
/// Fetch helpers return these through `Result`; the stream dispatcher hands
/// them to the error callback instead of returning them.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ClientError {
    /// Invalid client configuration.
    #[error("config error: {0}")]
    Config(String),
    /// Invalid caller input (for example an empty chat message).
    #[error("validation error: {0}")]
    Validation(String),
    /// Network failure or a broken response body.
    #[error("transport error: {message}")]
    Transport { message: String },
    /// Server answered with a non-success HTTP status.
    #[error("request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    /// A streaming response arrived without a body.
    #[error("response has no body")]
    MissingBody,
    /// A response body did not match the expected shape.
    #[error("decode error: {message}")]
    Decode { message: String },
    /// The server reported a failure through an `error` stream record.
    #[error("{message}")]
    Server { message: String },
    /// No stream bytes arrived within the idle timeout.
    #[error("stream timed out after {}s without data", after.as_secs())]
    TimedOut { after: Duration },
    /// The access token was rejected and could not be refreshed.
    #[error("session expired, sign in again")]
    SessionExpired,
}

impl ClientError {
    /// Creates a transport error.
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }

    /// Creates a status error.
    pub fn status(status: u16, body: impl Into<String>) -> Self {
        Self::Status {
            status,
            body: body.into(),
        }
    }

    /// Creates a decode error.
    pub fn decode(message: impl Into<String>) -> Self {
        Self::Decode {
            message: message.into(),
        }
    }

    /// Creates a server-signaled error.
    pub fn server(message: impl Into<String>) -> Self {
        Self::Server {
            message: message.into(),
        }
    }

    /// Returns the human-readable message for this error.
    pub fn message(&self) -> String {
        match self {
            Self::Config(message) | Self::Validation(message) => message.clone(),
            Self::Transport { message }
            | Self::Decode { message }
            | Self::Server { message } => message.clone(),
            Self::Status { body, .. } => body.clone(),
            other => other.to_string(),
        }
    }

    /// Returns the HTTP status when the error came from a response status.
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// True for failures that end the user's session.
    pub fn is_session_expired(&self) -> bool {
        matches!(self, Self::SessionExpired)
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(value: reqwest::Error) -> Self {
        if value.is_decode() {
            ClientError::decode(value.to_string())
        } else {
            ClientError::transport(value.to_string())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_error_displays_bare_message() {
        let err = ClientError::server("boom");
        assert_eq!(err.to_string(), "boom");
        assert_eq!(err.message(), "boom");
    }

    #[test]
    fn status_error_exposes_code_and_body() {
        let err = ClientError::status(502, "bad gateway");
        assert_eq!(err.status_code(), Some(502));
        assert_eq!(err.message(), "bad gateway");
        assert!(err.to_string().contains("502"));
    }

    #[test]
    fn timed_out_reports_seconds() {
        let err = ClientError::TimedOut {
            after: Duration::from_secs(5),
        };
        assert_eq!(err.to_string(), "stream timed out after 5s without data");
        assert!(!err.is_session_expired());
    }
}
