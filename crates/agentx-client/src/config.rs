use std::time::Duration;

use crate::errors::ClientError;

const DEFAULT_BASE_URL: &str = "http://localhost:8000";

/// Configuration for [`crate::ApiClient`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClientConfig {
    /// API origin, for example `http://localhost:8000`.
    pub base_url: String,
    /// HTTP timeout for non-streaming requests.
    pub timeout: Duration,
    /// Longest wait for the next chunk of a progress stream. `None` waits forever.
    pub stream_idle_timeout: Option<Duration>,
    /// `User-Agent` header value.
    pub user_agent: String,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(30),
            stream_idle_timeout: Some(Duration::from_secs(300)),
            user_agent: format!("agentx-client/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

impl ClientConfig {
    /// Creates a config for the given API origin with default timeouts.
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    /// Builds a config from the environment.
    ///
    /// - `AGENTX_API_URL`: API origin (default `http://localhost:8000`).
    /// - `AGENTX_HTTP_TIMEOUT_SECS`: request timeout (default 30).
    /// - `AGENTX_STREAM_IDLE_TIMEOUT_SECS`: stream idle timeout, `0` disables (default 300).
    pub fn from_env() -> Result<Self, ClientError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup(
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, ClientError> {
        let mut config = Self::default();
        if let Some(url) = lookup("AGENTX_API_URL").filter(|u| !u.trim().is_empty()) {
            config.base_url = url.trim().to_string();
        }
        if let Some(secs) = parse_secs(&lookup, "AGENTX_HTTP_TIMEOUT_SECS")? {
            config.timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_secs(&lookup, "AGENTX_STREAM_IDLE_TIMEOUT_SECS")? {
            config.stream_idle_timeout = (secs > 0).then(|| Duration::from_secs(secs));
        }
        Ok(config)
    }

    /// Overrides the API origin.
    pub fn base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the request timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the stream idle timeout.
    pub fn stream_idle_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.stream_idle_timeout = timeout;
        self
    }

    /// Overrides the `User-Agent` header.
    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    pub(crate) fn validate(&self) -> Result<(), ClientError> {
        let base = self.base_url.trim();
        if base.is_empty() {
            return Err(ClientError::Config("base_url must not be empty".into()));
        }
        if !(base.starts_with("http://") || base.starts_with("https://")) {
            return Err(ClientError::Config(format!(
                "base_url must start with http:// or https://, got {base}"
            )));
        }
        if self.timeout.is_zero() {
            return Err(ClientError::Config("timeout must be greater than 0".into()));
        }
        Ok(())
    }

    pub(crate) fn url(&self, path: &str) -> String {
        format!(
            "{}/{}",
            self.base_url.trim().trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    pub(crate) fn new_project_url(&self) -> String {
        self.url("project/new")
    }

    pub(crate) fn project_details_url(&self, project_id: uuid::Uuid) -> String {
        self.url(&format!("project/{project_id}/details"))
    }

    pub(crate) fn chat_url(&self, project_id: uuid::Uuid) -> String {
        self.url(&format!("project/{project_id}/chat"))
    }

    pub(crate) fn files_url(&self, sandbox_id: &str) -> String {
        self.url(&format!("sandbox/{sandbox_id}/files"))
    }

    pub(crate) fn file_content_url(&self, sandbox_id: &str) -> String {
        self.url(&format!("sandbox/{sandbox_id}/files/content"))
    }

    pub(crate) fn refresh_url(&self) -> String {
        self.url("auth/refresh")
    }
}

fn parse_secs(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<u64>, ClientError> {
    match lookup(key) {
        Some(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| ClientError::Config(format!("invalid {key}={raw}: {e}"))),
        _ => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_env() {
        let config = ClientConfig::from_lookup(lookup(&[])).expect("config");
        assert_eq!(config, ClientConfig::default());
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.stream_idle_timeout, Some(Duration::from_secs(300)));
    }

    #[test]
    fn env_overrides_are_parsed() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("AGENTX_API_URL", "https://api.example.com/"),
            ("AGENTX_HTTP_TIMEOUT_SECS", "5"),
            ("AGENTX_STREAM_IDLE_TIMEOUT_SECS", "0"),
        ]))
        .expect("config");
        assert_eq!(config.base_url, "https://api.example.com/");
        assert_eq!(config.timeout, Duration::from_secs(5));
        assert_eq!(config.stream_idle_timeout, None);
    }

    #[test]
    fn invalid_numbers_are_config_errors() {
        let err = ClientConfig::from_lookup(lookup(&[("AGENTX_HTTP_TIMEOUT_SECS", "soon")]))
            .expect_err("invalid");
        assert!(matches!(err, ClientError::Config(m) if m.contains("AGENTX_HTTP_TIMEOUT_SECS")));
    }

    #[test]
    fn urls_join_without_double_slashes() {
        let config = ClientConfig::new("http://host:8000/");
        let id = uuid::Uuid::nil();
        assert_eq!(
            config.chat_url(id),
            format!("http://host:8000/project/{id}/chat")
        );
        assert_eq!(config.refresh_url(), "http://host:8000/auth/refresh");
        assert_eq!(
            config.file_content_url("sb-1"),
            "http://host:8000/sandbox/sb-1/files/content"
        );
    }

    #[test]
    fn validate_rejects_bad_origin() {
        assert!(ClientConfig::new("").validate().is_err());
        assert!(ClientConfig::new("localhost:8000").validate().is_err());
        assert!(ClientConfig::new("http://localhost:8000").validate().is_ok());
        assert!(
            ClientConfig::default()
                .timeout(Duration::ZERO)
                .validate()
                .is_err()
        );
    }
}
