//! Backend API client used by the MCP tools and resources.
//!
//! Everything here sits behind a single seam, the [`Requester`] trait:
//! the domain managers ([`EnvironmentManager`], [`OrgManager`],
//! [`LogManager`], [`VolumeManager`]) translate domain calls into HTTP
//! requests and decode the JSON answers. Tests swap the requester for an
//! in-memory fake.
//!
//! # Error Text
//!
//! [`ApiError`] messages embed the HTTP status code and reason phrase
//! (`HTTP 404 Not Found: ...`). The MCP error taxonomy classifies failures by
//! matching on that text, so the wording is part of the contract.

mod environments;
mod http;
mod logs;
mod orgs;
mod volumes;

pub use environments::{
    Environment, EnvironmentFilter, EnvironmentManager, EnvironmentStatus, LifecycleAction,
    Project, Service,
};
pub use http::HttpRequester;
pub use logs::LogManager;
pub use orgs::{Org, OrgManager, OrgSelection};
pub use volumes::{Snapshot, Volume, VolumeManager};

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Method, StatusCode, Url};
use serde::Deserialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

/// Path prefix of every backend endpoint.
pub const API_PREFIX: &str = "/api/v1";

/// Longest response body excerpt kept in an error message.
const MAX_ERROR_BODY: usize = 200;

/// Errors returned by the backend API layer.
#[derive(Debug, Error)]
pub enum ApiError {
    /// The backend answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Status {
        /// Response status.
        status: StatusCode,
        /// Excerpt of the response body.
        body: String,
    },

    /// The backend could not be reached.
    #[error("connection failed: {0}")]
    Connection(String),

    /// The request exceeded the configured timeout.
    #[error("request timed out after {}s", .0.as_secs())]
    Timeout(Duration),

    /// Any other request failure.
    #[error("request failed: {0}")]
    Request(String),

    /// The caller's context was cancelled before the call completed.
    #[error("request cancelled")]
    Cancelled,

    /// The response body was not the expected JSON.
    #[error("invalid response body: {0}")]
    Decode(#[from] serde_json::Error),
}

impl ApiError {
    /// Builds a status error, truncating long bodies.
    #[must_use]
    pub fn status(status: StatusCode, body: &str) -> Self {
        let body = body.trim();
        let body = match body.char_indices().nth(MAX_ERROR_BODY) {
            Some((idx, _)) => format!("{}...", &body[..idx]),
            None => body.to_string(),
        };
        Self::Status { status, body }
    }

    /// Returns the HTTP status code, if the backend answered at all.
    #[must_use]
    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(status.as_u16()),
            _ => None,
        }
    }

    /// Whether the backend refused the request as invalid for the current
    /// state of the target (400, 409, 422).
    #[must_use]
    pub fn is_rejection(&self) -> bool {
        matches!(self.status_code(), Some(400 | 409 | 422))
    }
}

/// Performs raw requests against the backend API.
///
/// `uri` is the path plus query string relative to the configured base URL.
/// Implementations must return the raw response body on success and an
/// [`ApiError`] otherwise. When `ctx` is cancelled, in-flight calls are
/// abandoned with [`ApiError::Cancelled`].
#[async_trait]
pub trait Requester: Send + Sync {
    /// Sends one request and returns the response body.
    async fn request(
        &self,
        ctx: &CancellationToken,
        method: Method,
        uri: &str,
        content_type: Option<&str>,
        body: Option<Vec<u8>>,
    ) -> Result<Vec<u8>, ApiError>;
}

/// Builds a request URI under [`API_PREFIX`] from path segments and query
/// pairs.
///
/// Each segment is percent-encoded on its own, so `/`, `?`, `#` and `%`
/// inside a segment never change the shape of the path.
///
/// # Errors
///
/// Returns an error if the base URL cannot carry a path.
pub fn endpoint(segments: &[&str], query: &[(&str, String)]) -> Result<String, ApiError> {
    let mut url = Url::parse(&format!("http://backend.invalid{API_PREFIX}"))
        .map_err(|e| ApiError::Request(format!("invalid endpoint base: {e}")))?;
    url.path_segments_mut()
        .map_err(|()| ApiError::Request("endpoint base cannot carry a path".to_string()))?
        .extend(segments);

    if !query.is_empty() {
        url.query_pairs_mut()
            .extend_pairs(query.iter().map(|(k, v)| (*k, v.as_str())));
    }

    Ok(match url.query() {
        Some(q) => format!("{}?{q}", url.path()),
        None => url.path().to_string(),
    })
}

/// `{"data": ...}` wrapper used by every backend response.
#[derive(Debug, Deserialize)]
pub(crate) struct Envelope<T> {
    pub(crate) data: T,
}

/// Decodes a `{"data": ...}` response body.
pub(crate) fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T, ApiError> {
    let envelope: Envelope<T> = serde_json::from_slice(bytes)?;
    Ok(envelope.data)
}

/// The collaborators handed to tools and resources.
///
/// Cloning is cheap; every manager shares the same requester and org
/// selection.
#[derive(Clone)]
pub struct Backend {
    /// Environment lifecycle operations.
    pub environments: EnvironmentManager,
    /// Organization listing and selection.
    pub orgs: OrgManager,
    /// Service log retrieval.
    pub logs: LogManager,
    /// Volume and snapshot operations.
    pub volumes: VolumeManager,
}

impl Backend {
    /// Creates the managers over a shared requester.
    #[must_use]
    pub fn new(requester: Arc<dyn Requester>, org: OrgSelection) -> Self {
        Self {
            environments: EnvironmentManager::new(Arc::clone(&requester), org.clone()),
            orgs: OrgManager::new(Arc::clone(&requester), org.clone()),
            logs: LogManager::new(Arc::clone(&requester), org.clone()),
            volumes: VolumeManager::new(requester, org),
        }
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_encodes_query() {
        let uri = endpoint(
            &["application"],
            &[("name", "my app".to_string()), ("org", "acme".to_string())],
        )
        .unwrap();
        assert_eq!(uri, "/api/v1/application?name=my+app&org=acme");
    }

    #[test]
    fn endpoint_without_query() {
        let uri = endpoint(&["org"], &[]).unwrap();
        assert_eq!(uri, "/api/v1/org");
    }

    #[test]
    fn endpoint_encodes_segments() {
        let uri = endpoint(&["application", "a/b", "x#y", "%2e%2e"], &[]).unwrap();
        assert_eq!(uri, "/api/v1/application/a%2Fb/x%23y/%252e%252e");
    }

    #[test]
    fn status_error_text_carries_code_and_reason() {
        let err = ApiError::status(StatusCode::NOT_FOUND, "no such application");
        let text = err.to_string();
        assert!(text.contains("404"));
        assert!(text.to_lowercase().contains("not found"));
        assert_eq!(err.status_code(), Some(404));
    }

    #[test]
    fn status_error_truncates_body() {
        let body = "x".repeat(500);
        let ApiError::Status { body, .. } = ApiError::status(StatusCode::BAD_GATEWAY, &body) else {
            panic!("expected status error");
        };
        assert!(body.len() < 250);
        assert!(body.ends_with("..."));
    }

    #[test]
    fn rejection_statuses() {
        assert!(ApiError::status(StatusCode::CONFLICT, "").is_rejection());
        assert!(ApiError::status(StatusCode::UNPROCESSABLE_ENTITY, "").is_rejection());
        assert!(!ApiError::status(StatusCode::NOT_FOUND, "").is_rejection());
        assert!(!ApiError::Cancelled.is_rejection());
    }

    #[test]
    fn decode_unwraps_data() {
        let value: Vec<u32> = decode(br#"{"data": [1, 2, 3]}"#).unwrap();
        assert_eq!(value, vec![1, 2, 3]);
        assert!(decode::<Vec<u32>>(b"[1]").is_err());
    }
}
