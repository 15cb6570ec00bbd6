//! Sync transport
//!
//! The boundary between the client sync stack and the state server.
//! [`HttpTransport`] talks to `synapse-server` over HTTP; tests substitute
//! in-process implementations.

use std::future::Future;
use std::time::Duration;

use reqwest::{Client, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::debug;

use crate::config::Config;
use crate::domain::Domain;
use crate::error::{SyncError, SyncResult};
use crate::protocol::{ErrorBody, PullResponse, PushAccepted, PushConflict, PushRequest};

/// Result of a pull that reached the server
#[derive(Debug, Clone, PartialEq)]
pub enum PullOutcome {
    /// Current server record (possibly empty)
    Loaded(PullResponse),
    /// No valid session; nothing to sync against
    Unauthenticated,
}

/// Result of a push that reached the server
#[derive(Debug, Clone, PartialEq)]
pub enum PushOutcome {
    /// Server stored the snapshot under a new version
    Accepted(PushAccepted),
    /// Server holds a newer version; nothing was written
    Conflict(PushConflict),
    /// No valid session; nothing to sync against
    Unauthenticated,
}

impl PushOutcome {
    pub fn is_conflict(&self) -> bool {
        matches!(self, PushOutcome::Conflict(_))
    }

    pub fn is_accepted(&self) -> bool {
        matches!(self, PushOutcome::Accepted(_))
    }
}

/// Carries pull/push requests to the state server
pub trait SyncTransport: Send + Sync + 'static {
    /// Fetch the current server record for a domain
    fn pull(&self, domain: Domain) -> impl Future<Output = SyncResult<PullOutcome>> + Send;

    /// Offer a full snapshot to the server
    fn push(
        &self,
        domain: Domain,
        request: PushRequest,
    ) -> impl Future<Output = SyncResult<PushOutcome>> + Send;
}

/// HTTP transport for `synapse-server`
///
/// Without a server URL or session token every call resolves to
/// `Unauthenticated` without touching the network.
#[derive(Debug, Clone)]
pub struct HttpTransport {
    client: Client,
    base_url: Option<String>,
    token: Option<String>,
}

impl HttpTransport {
    /// Create a transport for a server and session
    pub fn new(
        base_url: Option<String>,
        token: Option<String>,
        timeout: Duration,
    ) -> SyncResult<Self> {
        let base_url = base_url.map(|url| url.trim_end_matches('/').to_string());
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| SyncError::Transport {
                url: base_url.clone().unwrap_or_default(),
                source,
            })?;

        Ok(Self {
            client,
            base_url,
            token,
        })
    }

    /// Create a transport from client configuration
    ///
    /// Disabled sync yields a transport with no target.
    pub fn from_config(config: &Config) -> SyncResult<Self> {
        let base_url = config
            .sync_enabled
            .then(|| config.server_url.clone())
            .flatten();
        Self::new(
            base_url,
            config.session_token.clone(),
            config.request_timeout(),
        )
    }

    /// Whether calls can reach a server at all
    pub fn has_target(&self) -> bool {
        self.base_url.is_some() && self.token.is_some()
    }

    /// Endpoint URL and bearer token for a domain
    fn target(&self, domain: Domain) -> Option<(String, &str)> {
        let base = self.base_url.as_ref()?;
        let token = self.token.as_deref()?;
        Some((format!("{}/api/{}", base, domain), token))
    }
}

impl SyncTransport for HttpTransport {
    async fn pull(&self, domain: Domain) -> SyncResult<PullOutcome> {
        let Some((url, token)) = self.target(domain) else {
            debug!(domain = %domain, "No sync target, skipping pull");
            return Ok(PullOutcome::Unauthenticated);
        };

        let response = self
            .client
            .get(&url)
            .bearer_auth(token)
            .send()
            .await
            .map_err(|source| SyncError::Transport {
                url: url.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => {
                let body: Value = read_json(&url, response).await?;
                Ok(PullOutcome::Loaded(PullResponse::from_json(domain, body)?))
            }
            StatusCode::UNAUTHORIZED => Ok(PullOutcome::Unauthenticated),
            _ => Err(status_error(&url, response).await),
        }
    }

    async fn push(&self, domain: Domain, request: PushRequest) -> SyncResult<PushOutcome> {
        let Some((url, token)) = self.target(domain) else {
            debug!(domain = %domain, "No sync target, skipping push");
            return Ok(PushOutcome::Unauthenticated);
        };

        let response = self
            .client
            .post(&url)
            .bearer_auth(token)
            .json(&request.to_json(domain))
            .send()
            .await
            .map_err(|source| SyncError::Transport {
                url: url.clone(),
                source,
            })?;

        match response.status() {
            StatusCode::OK => Ok(PushOutcome::Accepted(read_json(&url, response).await?)),
            StatusCode::CONFLICT => Ok(PushOutcome::Conflict(read_json(&url, response).await?)),
            StatusCode::UNAUTHORIZED => Ok(PushOutcome::Unauthenticated),
            _ => Err(status_error(&url, response).await),
        }
    }
}

async fn read_json<T: DeserializeOwned>(url: &str, response: Response) -> SyncResult<T> {
    let bytes = response
        .bytes()
        .await
        .map_err(|source| SyncError::Transport {
            url: url.to_string(),
            source,
        })?;

    serde_json::from_slice(&bytes).map_err(|e| SyncError::InvalidResponse {
        url: url.to_string(),
        details: e.to_string(),
    })
}

async fn status_error(url: &str, response: Response) -> SyncError {
    let status = response.status();
    let text = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ErrorBody>(&text)
        .map(|body| body.message)
        .unwrap_or_else(|_| {
            if text.is_empty() {
                status.canonical_reason().unwrap_or("unknown error").to_string()
            } else {
                text
            }
        });

    SyncError::Server {
        url: url.to_string(),
        status: status.as_u16(),
        message,
    }
}
