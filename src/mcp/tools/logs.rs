//! Log retrieval tool.

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::{object_schema, Args, Tool, ToolDefinition};
use crate::api::LogManager;
use crate::mcp::error::{CallError, ToolError};

const NAME: &str = "get_logs";

/// Largest accepted `tail`.
pub const MAX_TAIL: u32 = 10_000;

/// `get_logs`: recent output of one service.
pub struct LogsTool {
    logs: LogManager,
}

impl LogsTool {
    /// Creates the tool.
    #[must_use]
    pub const fn new(logs: LogManager) -> Self {
        Self { logs }
    }
}

#[async_trait]
impl Tool for LogsTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            NAME,
            "Fetch the recent log output of a service in an environment.",
            object_schema(
                json!({
                    "environment_id": { "type": "string", "description": "Environment ID" },
                    "service_name": { "type": "string", "description": "Service name" },
                    "tail": {
                        "type": "integer",
                        "minimum": 1,
                        "maximum": MAX_TAIL,
                        "description": "Number of lines from the end of the log"
                    }
                }),
                &["environment_id", "service_name"],
            ),
        )
    }

    async fn execute(&self, ctx: &CancellationToken, arguments: Value) -> Result<String, CallError> {
        let args = Args::new(NAME, arguments)?;
        let env_id = args.identifier("environment_id")?;
        let service = args.identifier("service_name")?;
        let tail = args.optional_u32("tail", 1..=MAX_TAIL)?;

        let bytes = self
            .logs
            .fetch(ctx, env_id, service, tail)
            .await
            .map_err(|e| ToolError::classify_api(NAME, e, env_id))?;

        let text = String::from_utf8_lossy(&bytes);
        if text.trim().is_empty() {
            return Ok(format!(
                "No logs available for service {service} in environment {env_id}."
            ));
        }
        Ok(text.into_owned())
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::api::testing::FakeRequester;
    use crate::api::{Backend, OrgSelection};

    fn tool(fake: &Arc<FakeRequester>) -> LogsTool {
        LogsTool::new(Backend::new(fake.clone(), OrgSelection::new(None)).logs)
    }

    #[tokio::test]
    async fn returns_log_text() {
        let fake = Arc::new(FakeRequester::default());
        fake.respond_raw("GET / 200\nGET /health 200\n");

        let text = tool(&fake)
            .execute(
                &CancellationToken::new(),
                json!({"environment_id": "env-123", "service_name": "web", "tail": 2}),
            )
            .await
            .unwrap();
        assert_eq!(text, "GET / 200\nGET /health 200\n");
        assert_eq!(
            fake.calls()[0].uri,
            "/api/v1/application/env-123/services/web/logs?tail=2"
        );
    }

    #[tokio::test]
    async fn empty_logs_are_described() {
        let fake = Arc::new(FakeRequester::default());
        fake.respond_raw("");
        let text = tool(&fake)
            .execute(
                &CancellationToken::new(),
                json!({"environment_id": "env-123", "service_name": "worker"}),
            )
            .await
            .unwrap();
        assert_eq!(text, "No logs available for service worker in environment env-123.");
    }

    #[tokio::test]
    async fn zero_tail_rejected() {
        let fake = Arc::new(FakeRequester::default());
        let result = tool(&fake)
            .execute(
                &CancellationToken::new(),
                json!({"environment_id": "env-123", "service_name": "web", "tail": 0}),
            )
            .await;
        assert!(result.is_err());
        assert!(fake.calls().is_empty());
    }
}
