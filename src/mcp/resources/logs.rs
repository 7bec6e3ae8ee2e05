//! `logs://{environment_id}/{service_name}[?tail=N]`

use std::collections::HashMap;
use std::io::Cursor;
use std::sync::LazyLock;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::{Resource, ResourceContent, ResourceDefinition, ResourceTemplate};
use crate::api::LogManager;
use crate::mcp::error::{CallError, ToolError};
use crate::mcp::tools::{IDENTIFIER_CHARS, MAX_TAIL, MIN_IDENTIFIER_LEN};

const URI_TEMPLATE: &str = "logs://{environment_id}/{service_name}";
const MIME_TYPE: &str = "text/plain";

/// Both segments follow the identifier rule of the tools.
static LOGS_URI: LazyLock<Regex> = LazyLock::new(|| {
    let segment = format!("([{IDENTIFIER_CHARS}]{{{MIN_IDENTIFIER_LEN},}})");
    Regex::new(&format!(r"^logs://{segment}/{segment}(?:\?(.*))?$")).unwrap()
});

/// A parsed `logs://` URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogsUri {
    /// Environment ID.
    pub environment_id: String,
    /// Service name.
    pub service_name: String,
    /// Query parameters. Pairs without `=` are dropped.
    pub query: HashMap<String, String>,
}

impl LogsUri {
    /// Matches `uri` against the pattern.
    ///
    /// Returns `None` unless there are exactly two segments, each at least
    /// three characters from `[A-Za-z0-9._-]`.
    #[must_use]
    pub fn parse(uri: &str) -> Option<Self> {
        let captures = LOGS_URI.captures(uri)?;
        let query = captures
            .get(3)
            .map(|q| parse_query(q.as_str()))
            .unwrap_or_default();

        Some(Self {
            environment_id: captures[1].to_string(),
            service_name: captures[2].to_string(),
            query,
        })
    }

    /// The `tail` parameter.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `tail` is present but not an integer in
    /// `1..=10000`.
    pub fn tail(&self) -> Result<Option<u32>, ToolError> {
        let Some(raw) = self.query.get("tail") else {
            return Ok(None);
        };
        raw.parse::<u32>()
            .ok()
            .filter(|tail| (1..=MAX_TAIL).contains(tail))
            .map(Some)
            .ok_or_else(|| {
                ToolError::validation(
                    "read_resource",
                    format!("Invalid tail value '{raw}': expected an integer from 1 to {MAX_TAIL}"),
                )
            })
    }
}

/// Splits `a=1&b=2`. Pairs without `=` are dropped.
fn parse_query(query: &str) -> HashMap<String, String> {
    query
        .split('&')
        .filter_map(|pair| pair.split_once('='))
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

/// Service logs as a resource.
pub struct LogsResource {
    logs: LogManager,
}

impl LogsResource {
    /// Creates the resource.
    #[must_use]
    pub const fn new(logs: LogManager) -> Self {
        Self { logs }
    }
}

#[async_trait]
impl Resource for LogsResource {
    fn definition(&self) -> ResourceDefinition {
        ResourceDefinition {
            uri: URI_TEMPLATE.to_string(),
            name: "Service logs".to_string(),
            description: "Recent log output of a service in an environment".to_string(),
            mime_type: MIME_TYPE.to_string(),
            metadata: Some(json!({
                "query_parameters": {
                    "tail": "Number of lines from the end of the log (1-10000)"
                }
            })),
        }
    }

    fn template(&self) -> ResourceTemplate {
        ResourceTemplate {
            uri_template: format!("{URI_TEMPLATE}{{?tail}}"),
            name: "Service logs".to_string(),
            description: "Recent log output of a service in an environment".to_string(),
            mime_type: MIME_TYPE.to_string(),
        }
    }

    fn is_available(&self, uri: &str) -> bool {
        LOGS_URI.is_match(uri)
    }

    async fn get_content(
        &self,
        ctx: &CancellationToken,
        uri: &str,
    ) -> Result<ResourceContent, CallError> {
        let parsed = LogsUri::parse(uri).ok_or_else(|| {
            ToolError::validation(
                "read_resource",
                format!("Invalid URI format: {uri} (expected {URI_TEMPLATE}[?tail=N])"),
            )
        })?;
        let tail = parsed.tail()?;

        let bytes = self
            .logs
            .fetch(ctx, &parsed.environment_id, &parsed.service_name, tail)
            .await?;

        Ok(ResourceContent {
            reader: Box::new(Cursor::new(bytes)),
            mime_type: MIME_TYPE.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::io::AsyncReadExt;

    use super::*;
    use crate::api::testing::FakeRequester;
    use crate::api::{Backend, OrgSelection};
    use crate::mcp::error::ErrorKind;

    #[test]
    fn parses_segments_and_tail() {
        let uri = LogsUri::parse("logs://env-123/web-server?tail=50").unwrap();
        assert_eq!(uri.environment_id, "env-123");
        assert_eq!(uri.service_name, "web-server");
        assert_eq!(uri.tail().unwrap(), Some(50));
    }

    #[test]
    fn rejects_wrong_shapes() {
        assert!(LogsUri::parse("logs://env/svc/extra").is_none());
        assert!(LogsUri::parse("logs://").is_none());
        assert!(LogsUri::parse("logs://env-1").is_none());
        assert!(LogsUri::parse("file://env/svc").is_none());
    }

    #[test]
    fn segments_follow_identifier_rule() {
        assert!(LogsUri::parse("logs://../x").is_none());
        assert!(LogsUri::parse("logs://env-1/web#x").is_none());
        assert!(LogsUri::parse("logs://%2e%2e/x").is_none());
        assert!(LogsUri::parse("logs://env-1/ab").is_none());
        assert!(LogsUri::parse("logs://env-1/web/../../org").is_none());
        assert!(LogsUri::parse("logs://env_1.a/web-server").is_some());
    }

    #[test]
    fn malformed_query_pairs_dropped() {
        let uri = LogsUri::parse("logs://env-1/web?verbose&tail=5&=x").unwrap();
        assert!(!uri.query.contains_key("verbose"));
        assert_eq!(uri.tail().unwrap(), Some(5));
    }

    #[test]
    fn bad_tail_is_validation_error() {
        let uri = LogsUri::parse("logs://env-1/web?tail=lots").unwrap();
        assert_eq!(uri.tail().unwrap_err().kind(), ErrorKind::Validation);
    }

    #[tokio::test]
    async fn content_streams_log_bytes() {
        let fake = Arc::new(FakeRequester::default());
        fake.respond_raw("boot ok\n");
        let backend = Backend::new(fake.clone(), OrgSelection::new(None));
        let resource = LogsResource::new(backend.logs);

        let mut content = resource
            .get_content(&CancellationToken::new(), "logs://env-1/web?tail=10")
            .await
            .unwrap();
        let mut text = String::new();
        content.reader.read_to_string(&mut text).await.unwrap();

        assert_eq!(text, "boot ok\n");
        assert_eq!(content.mime_type, "text/plain");
        assert_eq!(
            fake.calls()[0].uri,
            "/api/v1/application/env-1/services/web/logs?tail=10"
        );
    }

    #[tokio::test]
    async fn unmatched_uri_is_rejected() {
        let fake = Arc::new(FakeRequester::default());
        let resource = LogsResource::new(Backend::new(fake.clone(), OrgSelection::new(None)).logs);

        assert!(!resource.is_available("logs://env/svc/extra"));
        let err = resource
            .get_content(&CancellationToken::new(), "logs://env/svc/extra")
            .await
            .err()
            .unwrap()
            .into_tool_error("read_resource", "logs://env/svc/extra");
        assert!(err.message().contains("Invalid URI format"));
        assert!(fake.calls().is_empty());
    }
}
