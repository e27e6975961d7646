use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::StatusCode;
use reqwest::header::ACCEPT;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use crate::auth::{CredentialStore, InMemoryCredentials, TokenRefresher};
use crate::config::ClientConfig;
use crate::dispatch::{StreamDispatcher, StreamHandlers, StreamOutcome};
use crate::errors::ClientError;
use crate::project::{FileContent, FileEntry, Project};

type SessionListener = Arc<dyn Fn() + Send + Sync>;

struct ClientInner {
    http: reqwest::Client,
    config: ClientConfig,
    credentials: Arc<dyn CredentialStore>,
    refresher: TokenRefresher,
    on_session_expired: Option<SessionListener>,
}

/// HTTP client for the AgentX API.
///
/// Cheap to clone; clones share the connection pool, credentials, and the
/// refresh lock.
#[derive(Clone)]
pub struct ApiClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.inner.config.base_url)
            .finish_non_exhaustive()
    }
}

/// Builder for [`ApiClient`].
pub struct ApiClientBuilder {
    config: ClientConfig,
    credentials: Option<Arc<dyn CredentialStore>>,
    on_session_expired: Option<SessionListener>,
}

impl ApiClientBuilder {
    /// Sets the credential store. Defaults to an anonymous in-memory store.
    pub fn credentials(mut self, credentials: Arc<dyn CredentialStore>) -> Self {
        self.credentials = Some(credentials);
        self
    }

    /// Registers a listener fired when the session cannot be recovered
    /// (the host typically routes back to its login screen).
    pub fn on_session_expired(mut self, listener: impl Fn() + Send + Sync + 'static) -> Self {
        self.on_session_expired = Some(Arc::new(listener));
        self
    }

    /// Validates the configuration and builds the client.
    pub fn build(self) -> Result<ApiClient, ClientError> {
        self.config.validate()?;
        // No client-wide timeout: it would also cap long progress streams.
        let http = reqwest::Client::builder()
            .connect_timeout(self.config.timeout)
            .user_agent(self.config.user_agent.clone())
            .build()
            .map_err(|e| ClientError::Config(format!("failed to build HTTP client: {e}")))?;
        Ok(ApiClient {
            inner: Arc::new(ClientInner {
                http,
                config: self.config,
                credentials: self
                    .credentials
                    .unwrap_or_else(|| Arc::new(InMemoryCredentials::anonymous())),
                refresher: TokenRefresher::default(),
                on_session_expired: self.on_session_expired,
            }),
        })
    }
}

#[derive(serde::Serialize)]
struct ChatRequest<'a> {
    message: &'a str,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ReadFileBody {
    Content(FileContent),
    Raw(String),
}

impl ApiClient {
    pub fn builder(config: ClientConfig) -> ApiClientBuilder {
        ApiClientBuilder {
            config,
            credentials: None,
            on_session_expired: None,
        }
    }

    /// Builds an anonymous client from `AGENTX_*` environment variables.
    pub fn from_env() -> Result<Self, ClientError> {
        Self::builder(ClientConfig::from_env()?).build()
    }

    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    pub fn credentials(&self) -> &Arc<dyn CredentialStore> {
        &self.inner.credentials
    }

    /// Creates a new project.
    pub async fn create_project(&self) -> Result<Project, ClientError> {
        let project: Project = self.get_json(self.inner.config.new_project_url()).await?;
        info!(project_id = %project.id, "project created");
        Ok(project)
    }

    /// Fetches project details.
    pub async fn project_details(&self, project_id: uuid::Uuid) -> Result<Project, ClientError> {
        self.get_json(self.inner.config.project_details_url(project_id))
            .await
    }

    /// Fetches the flat file listing of a sandbox.
    pub async fn list_files(&self, sandbox_id: &str) -> Result<Vec<FileEntry>, ClientError> {
        let entries: Vec<FileEntry> = self.get_json(self.inner.config.files_url(sandbox_id)).await?;
        debug!(sandbox_id, entries = entries.len(), "sandbox listing fetched");
        Ok(entries)
    }

    /// Reads one sandbox file as text.
    pub async fn read_file(&self, sandbox_id: &str, path: &str) -> Result<FileContent, ClientError> {
        let url = self.inner.config.file_content_url(sandbox_id);
        let timeout = self.inner.config.timeout;
        let response = self
            .send_authorized(|http| {
                http.get(url.as_str())
                    .query(&[("path", path)])
                    .timeout(timeout)
            })
            .await?;
        let response = ensure_success(response).await?;
        let body: ReadFileBody = response
            .json()
            .await
            .map_err(|e| ClientError::decode(format!("invalid file content response: {e}")))?;
        Ok(match body {
            ReadFileBody::Content(content) => content,
            ReadFileBody::Raw(content) => FileContent {
                path: path.to_string(),
                content,
            },
        })
    }

    /// Sends a chat message and dispatches the progress stream to `handlers`.
    ///
    /// Never fails: an empty message, a rejected request, a lost connection,
    /// or an idle timeout reach the error callback once and yield
    /// [`StreamOutcome::Failed`].
    pub async fn stream_chat(
        &self,
        project_id: uuid::Uuid,
        message: &str,
        handlers: StreamHandlers,
    ) -> StreamOutcome {
        let mut dispatcher = StreamDispatcher::new(handlers);
        if message.trim().is_empty() {
            return dispatcher.fail(ClientError::Validation(
                "chat message must not be empty".into(),
            ));
        }

        let url = self.inner.config.chat_url(project_id);
        let body = ChatRequest { message };
        let open_timeout = self.open_timeout();
        info!(%project_id, "opening progress stream");
        let open = async {
            let response = self
                .send_authorized(|http| {
                    http.post(url.as_str())
                        .header(ACCEPT, "text/event-stream")
                        .json(&body)
                })
                .await?;
            ensure_success(response).await
        };
        let opened = match tokio::time::timeout(open_timeout, open).await {
            Ok(opened) => opened,
            Err(_) => {
                warn!(
                    %project_id,
                    timeout_ms = open_timeout.as_millis() as u64,
                    "progress stream did not open in time"
                );
                return dispatcher.fail(ClientError::TimedOut {
                    after: open_timeout,
                });
            }
        };
        let response = match opened {
            Ok(response) if response.content_length() == Some(0) => {
                return dispatcher.fail(ClientError::MissingBody);
            }
            Ok(response) => response,
            Err(e) => {
                warn!(%project_id, error = %e, "progress stream failed to open");
                return dispatcher.fail(e);
            }
        };

        let outcome = dispatcher
            .drive(
                response.bytes_stream(),
                self.inner.config.stream_idle_timeout,
            )
            .await;
        info!(%project_id, ?outcome, "progress stream finished");
        outcome
    }

    /// Bound on waiting for the stream's response headers, token refresh
    /// included: the idle timeout when set, the request timeout otherwise.
    fn open_timeout(&self) -> Duration {
        self.inner
            .config
            .stream_idle_timeout
            .unwrap_or(self.inner.config.timeout)
    }

    async fn get_json<T: DeserializeOwned>(&self, url: String) -> Result<T, ClientError> {
        let timeout = self.inner.config.timeout;
        let response = self
            .send_authorized(|http| http.get(url.as_str()).timeout(timeout))
            .await?;
        let response = ensure_success(response).await?;
        response
            .json()
            .await
            .map_err(|e| ClientError::decode(format!("invalid response from {url}: {e}")))
    }

    /// Sends a request with the current bearer token.
    ///
    /// A 401 triggers one token refresh and one retry. A refresh failure or a
    /// second 401 clears the credentials, notifies the session listener, and
    /// returns [`ClientError::SessionExpired`].
    async fn send_authorized(
        &self,
        build: impl Fn(&reqwest::Client) -> reqwest::RequestBuilder,
    ) -> Result<reqwest::Response, ClientError> {
        let token = self.inner.credentials.access_token();
        let response = self.execute(&build, token.as_deref()).await?;
        if response.status() != StatusCode::UNAUTHORIZED {
            return Ok(response);
        }

        debug!(url = %response.url(), "access token rejected, refreshing");
        let refreshed = self
            .inner
            .refresher
            .refresh(
                &self.inner.http,
                &self.inner.config.refresh_url(),
                self.inner.credentials.as_ref(),
                token.as_deref(),
                self.inner.config.timeout,
            )
            .await;
        let fresh = match refreshed {
            Ok(fresh) => fresh,
            Err(e) => {
                warn!(error = %e, "token refresh failed");
                self.expire_session();
                return Err(ClientError::SessionExpired);
            }
        };

        let retried = self.execute(&build, Some(&fresh)).await?;
        if retried.status() == StatusCode::UNAUTHORIZED {
            warn!(url = %retried.url(), "request rejected after token refresh");
            self.expire_session();
            return Err(ClientError::SessionExpired);
        }
        Ok(retried)
    }

    async fn execute(
        &self,
        build: &impl Fn(&reqwest::Client) -> reqwest::RequestBuilder,
        token: Option<&str>,
    ) -> Result<reqwest::Response, ClientError> {
        let mut request = build(&self.inner.http);
        if let Some(token) = token {
            request = request.bearer_auth(token);
        }
        request
            .send()
            .await
            .map_err(|e| ClientError::transport(format!("request failed: {e}")))
    }

    fn expire_session(&self) {
        self.inner.credentials.clear();
        if let Some(listener) = &self.inner.on_session_expired {
            listener();
        }
    }
}

async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, ClientError> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| "<unreadable body>".to_string());
    Err(ClientError::status(status.as_u16(), body))
}
