//! `reqwest`-backed [`Requester`].

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::Method;
use tokio_util::sync::CancellationToken;

use super::{ApiError, Requester};
use crate::config::ApiConfig;

/// Sends requests to the backend over HTTP(S).
///
/// Each call is bounded by the configured timeout and abandoned early when
/// the caller's token is cancelled.
pub struct HttpRequester {
    client: reqwest::Client,
    base_url: String,
    token: Option<String>,
    timeout: Duration,
}

impl HttpRequester {
    /// Creates a requester from the API configuration.
    ///
    /// `token` overrides `config.token` when set.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built (e.g. no TLS
    /// backend available).
    pub fn new(config: &ApiConfig, token: Option<String>) -> Result<Self, reqwest::Error> {
        let timeout = Duration::from_secs(config.timeout_secs);
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("envops-mcp/", env!("CARGO_PKG_VERSION")))
            .build()?;

        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            token: token.or_else(|| config.token.clone()),
            timeout,
        })
    }

    fn map_error(&self, e: &reqwest::Error) -> ApiError {
        if e.is_timeout() {
            ApiError::Timeout(self.timeout)
        } else if e.is_connect() {
            ApiError::Connection(e.to_string())
        } else {
            ApiError::Request(e.to_string())
        }
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        content_type: Option<&str>,
        body: Option<Vec<u8>>,
    ) -> Result<Vec<u8>, ApiError> {
        let url = format!("{}{uri}", self.base_url);
        let mut request = self
            .client
            .request(method, &url)
            .header(ACCEPT, "application/json");

        if let Some(token) = &self.token {
            request = request.bearer_auth(token);
        }
        if let Some(content_type) = content_type {
            request = request.header(CONTENT_TYPE, content_type);
        }
        if let Some(body) = body {
            request = request.body(body);
        }

        let response = request.send().await.map_err(|e| self.map_error(&e))?;
        let status = response.status();
        let bytes = response.bytes().await.map_err(|e| self.map_error(&e))?;

        if !status.is_success() {
            return Err(ApiError::status(status, &String::from_utf8_lossy(&bytes)));
        }

        Ok(bytes.to_vec())
    }
}

#[async_trait]
impl Requester for HttpRequester {
    async fn request(
        &self,
        ctx: &CancellationToken,
        method: Method,
        uri: &str,
        content_type: Option<&str>,
        body: Option<Vec<u8>>,
    ) -> Result<Vec<u8>, ApiError> {
        if ctx.is_cancelled() {
            return Err(ApiError::Cancelled);
        }

        tracing::debug!(%method, uri, "Backend request");

        tokio::select! {
            () = ctx.cancelled() => Err(ApiError::Cancelled),
            result = self.send(method.clone(), uri, content_type, body) => {
                if let Err(e) = &result {
                    tracing::debug!(%method, uri, error = %e, "Backend request failed");
                }
                result
            }
        }
    }
}
