//! Remote session bridging.

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::{object_schema, Args, Tool, ToolDefinition};
use crate::api::{EnvironmentManager, EnvironmentStatus};
use crate::mcp::error::{CallError, ToolError};

const NAME: &str = "telepresence_connect";

/// `telepresence_connect`: instructions for bridging a local machine into
/// an environment's cluster namespace.
pub struct TelepresenceTool {
    environments: EnvironmentManager,
}

impl TelepresenceTool {
    /// Creates the tool.
    #[must_use]
    pub const fn new(environments: EnvironmentManager) -> Self {
        Self { environments }
    }
}

#[async_trait]
impl Tool for TelepresenceTool {
    fn definition(&self) -> ToolDefinition {
        ToolDefinition::new(
            NAME,
            "Get the commands to connect this machine to a running environment with \
             Telepresence, so cluster services resolve locally.",
            object_schema(
                json!({
                    "environment_id": { "type": "string", "description": "Environment ID" }
                }),
                &["environment_id"],
            ),
        )
    }

    async fn execute(&self, ctx: &CancellationToken, arguments: Value) -> Result<String, CallError> {
        let args = Args::new(NAME, arguments)?;
        let env_id = args.identifier("environment_id")?;

        let environment = self
            .environments
            .get_by_id(ctx, env_id)
            .await
            .map_err(|e| ToolError::classify_api(NAME, e, env_id))?;

        let status = environment.status();
        if status != EnvironmentStatus::Running {
            return Ok(format!(
                "Cannot connect to environment {env_id}: environment is {status}, not running"
            ));
        }

        let namespace = environment
            .namespace
            .as_deref()
            .unwrap_or(environment.id.as_str());

        Ok(format!(
            "Environment {env_id} is running in namespace {namespace}.\n\
             Telepresence keeps a long-lived session, so run these from a terminal:\n\n    \
             envops telepresence connect {env_id}\n    \
             telepresence list --namespace {namespace}\n\n\
             Disconnect with: telepresence quit"
        ))
    }
}
