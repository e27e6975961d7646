//! Credentials and access-token refresh.

use std::sync::{PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::errors::ClientError;

/// Source of the bearer tokens attached to privileged requests.
pub trait CredentialStore: Send + Sync {
    fn access_token(&self) -> Option<String>;
    fn refresh_token(&self) -> Option<String>;
    /// Stores a freshly issued access token.
    fn set_access_token(&self, token: String);
    /// Forgets both tokens.
    fn clear(&self);
}

#[derive(Debug, Default, Clone)]
struct Tokens {
    access: Option<String>,
    refresh: Option<String>,
}

/// Process-local credential store.
#[derive(Debug, Default)]
pub struct InMemoryCredentials {
    tokens: RwLock<Tokens>,
}

impl InMemoryCredentials {
    pub fn new(access_token: Option<String>, refresh_token: Option<String>) -> Self {
        Self {
            tokens: RwLock::new(Tokens {
                access: access_token,
                refresh: refresh_token,
            }),
        }
    }

    /// Store holding no tokens; requests go out unauthenticated.
    pub fn anonymous() -> Self {
        Self::default()
    }
}

impl CredentialStore for InMemoryCredentials {
    fn access_token(&self) -> Option<String> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .access
            .clone()
    }

    fn refresh_token(&self) -> Option<String> {
        self.tokens
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .refresh
            .clone()
    }

    fn set_access_token(&self, token: String) {
        self.tokens
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .access = Some(token);
    }

    fn clear(&self) {
        *self.tokens.write().unwrap_or_else(PoisonError::into_inner) = Tokens::default();
    }
}

#[derive(Serialize)]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

#[derive(Deserialize)]
struct RefreshResponse {
    access_token: String,
}

/// Single-flight access-token refresh.
///
/// Callers that hit a 401 at the same time queue on one lock; whoever gets it
/// second finds the token already rotated and reuses it.
#[derive(Debug, Default)]
pub(crate) struct TokenRefresher {
    lock: tokio::sync::Mutex<()>,
}

impl TokenRefresher {
    /// Returns a usable access token after `rejected` was refused.
    pub(crate) async fn refresh(
        &self,
        http: &reqwest::Client,
        url: &str,
        credentials: &dyn CredentialStore,
        rejected: Option<&str>,
        timeout: Duration,
    ) -> Result<String, ClientError> {
        let _guard = self.lock.lock().await;

        if let Some(current) = credentials.access_token()
            && Some(current.as_str()) != rejected
        {
            debug!("access token already refreshed by a concurrent request");
            return Ok(current);
        }

        let Some(refresh_token) = credentials.refresh_token() else {
            warn!("no refresh token available");
            return Err(ClientError::SessionExpired);
        };

        // Runs under the lock; must not outlive the request timeout.
        let response = http
            .post(url)
            .timeout(timeout)
            .json(&RefreshRequest {
                refresh_token: &refresh_token,
            })
            .send()
            .await
            .map_err(|e| ClientError::transport(format!("token refresh failed: {e}")))?;
        let status = response.status();
        if !status.is_success() {
            let body = response
                .text()
                .await
                .unwrap_or_else(|_| "<unreadable body>".to_string());
            warn!(status = status.as_u16(), "token refresh rejected");
            return Err(ClientError::status(status.as_u16(), body));
        }
        let body: RefreshResponse = response
            .json()
            .await
            .map_err(|e| ClientError::decode(format!("invalid refresh response: {e}")))?;
        credentials.set_access_token(body.access_token.clone());
        debug!("access token refreshed");
        Ok(body.access_token)
    }
}
