//! Service introspection tools.
//!
//! `exec_service` and `port_forward` need an interactive or long-lived
//! session, which a request/response protocol cannot carry. They validate
//! their arguments and answer with the equivalent CLI command.

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::{object_schema, to_pretty, Args, Tool, ToolDefinition};
use crate::api::EnvironmentManager;
use crate::mcp::error::{CallError, ToolError};

/// Operations served by [`ServiceTool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServiceOp {
    /// `get_services`
    List,
    /// `exec_service`
    Exec,
    /// `port_forward`
    PortForward,
}

impl ServiceOp {
    /// Every operation, in registration order.
    pub const ALL: [Self; 3] = [Self::List, Self::Exec, Self::PortForward];

    /// Tool name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::List => "get_services",
            Self::Exec => "exec_service",
            Self::PortForward => "port_forward",
        }
    }
}

/// Service listing and session guidance.
pub struct ServiceTool {
    op: ServiceOp,
    environments: EnvironmentManager,
}

impl ServiceTool {
    /// Creates the tool for `op`.
    #[must_use]
    pub const fn new(op: ServiceOp, environments: EnvironmentManager) -> Self {
        Self { op, environments }
    }

    async fn list(&self, ctx: &CancellationToken, args: &Args) -> Result<String, CallError> {
        let op = self.op.name();
        let env_id = args.identifier("environment_id")?;
        let environment = self
            .environments
            .get_by_id(ctx, env_id)
            .await
            .map_err(|e| ToolError::classify_api(op, e, env_id))?;

        if environment.services.is_empty() {
            return Ok(format!("Environment {env_id} has no services."));
        }
        to_pretty(
            op,
            &json!({
                "environment_id": env_id,
                "count": environment.services.len(),
                "services": environment.services,
            }),
        )
    }
}

fn exec_guidance(args: &Args) -> Result<String, CallError> {
    let env_id = args.identifier("environment_id")?;
    let service = args.identifier("service_name")?;
    let command = args.required_str("command")?;

    Ok(format!(
        "Command execution needs an interactive session and is not available over MCP.\n\
         Run it from a terminal instead:\n\n    \
         envops exec {env_id} {service} -- {command}"
    ))
}

fn port_forward_guidance(args: &Args) -> Result<String, CallError> {
    let env_id = args.identifier("environment_id")?;
    let service = args.identifier("service_name")?;
    let port = args
        .optional_u32("port", 1..=u32::from(u16::MAX))?
        .ok_or_else(|| ToolError::validation("port_forward", "Missing required parameter: port"))?;
    let local_port = args
        .optional_u32("local_port", 1..=u32::from(u16::MAX))?
        .unwrap_or(port);

    Ok(format!(
        "Port forwarding keeps a long-lived connection open and is not available over MCP.\n\
         Run it from a terminal instead:\n\n    \
         envops port-forward {env_id} {service} {local_port}:{port}\n\n\
         The service will then be reachable at localhost:{local_port}."
    ))
}

#[async_trait]
impl Tool for ServiceTool {
    fn definition(&self) -> ToolDefinition {
        let target = json!({
            "environment_id": { "type": "string", "description": "Environment ID" },
            "service_name": { "type": "string", "description": "Service name" }
        });
        let with = |extra: Value| {
            let mut properties = target.clone();
            if let (Some(properties), Some(extra)) = (properties.as_object_mut(), extra.as_object())
            {
                properties.extend(extra.clone());
            }
            properties
        };

        match self.op {
            ServiceOp::List => ToolDefinition::new(
                self.op.name(),
                "List the services of an environment with their ports and URLs.",
                object_schema(
                    json!({
                        "environment_id": { "type": "string", "description": "Environment ID" }
                    }),
                    &["environment_id"],
                ),
            ),
            ServiceOp::Exec => ToolDefinition::new(
                self.op.name(),
                "Get the CLI command to run a command inside a service container. \
                 Interactive execution is not performed over MCP.",
                object_schema(
                    with(json!({
                        "command": { "type": "string", "description": "Command to run" }
                    })),
                    &["environment_id", "service_name", "command"],
                ),
            ),
            ServiceOp::PortForward => ToolDefinition::new(
                self.op.name(),
                "Get the CLI command to forward a local port to a service. \
                 The forward itself is not opened over MCP.",
                object_schema(
                    with(json!({
                        "port": {
                            "type": "integer", "minimum": 1, "maximum": 65535,
                            "description": "Service port"
                        },
                        "local_port": {
                            "type": "integer", "minimum": 1, "maximum": 65535,
                            "description": "Local port (defaults to the service port)"
                        }
                    })),
                    &["environment_id", "service_name", "port"],
                ),
            ),
        }
    }

    async fn execute(&self, ctx: &CancellationToken, arguments: Value) -> Result<String, CallError> {
        let args = Args::new(self.op.name(), arguments)?;
        match self.op {
            ServiceOp::List => self.list(ctx, &args).await,
            ServiceOp::Exec => exec_guidance(&args),
            ServiceOp::PortForward => port_forward_guidance(&args),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::api::testing::FakeRequester;
    use crate::api::{Backend, OrgSelection};

    fn tool(fake: &Arc<FakeRequester>, op: ServiceOp) -> ServiceTool {
        ServiceTool::new(op, Backend::new(fake.clone(), OrgSelection::new(None)).environments)
    }

    #[tokio::test]
    async fn lists_services() {
        let fake = Arc::new(FakeRequester::default());
        fake.respond(json!({"data": {
            "id": "env-123",
            "services": [{"name": "web", "ports": [8080], "url": "https://web.example.com"}]
        }}));

        let text = tool(&fake, ServiceOp::List)
            .execute(&CancellationToken::new(), json!({"environment_id": "env-123"}))
            .await
            .unwrap();
        let value: Value = serde_json::from_str(&text).unwrap();
        assert_eq!(value["count"], 1);
        assert_eq!(value["services"][0]["ports"][0], 8080);
    }

    #[tokio::test]
    async fn exec_returns_guidance_without_calling_backend() {
        let fake = Arc::new(FakeRequester::default());
        let text = tool(&fake, ServiceOp::Exec)
            .execute(
                &CancellationToken::new(),
                json!({"environment_id": "env-123", "service_name": "web", "command": "ls -la"}),
            )
            .await
            .unwrap();
        assert!(text.contains("envops exec env-123 web -- ls -la"));
        assert!(fake.calls().is_empty());
    }

    #[tokio::test]
    async fn port_forward_defaults_local_port() {
        let fake = Arc::new(FakeRequester::default());
        let text = tool(&fake, ServiceOp::PortForward)
            .execute(
                &CancellationToken::new(),
                json!({"environment_id": "env-123", "service_name": "api", "port": 5432}),
            )
            .await
            .unwrap();
        assert!(text.contains("envops port-forward env-123 api 5432:5432"));
    }

    #[tokio::test]
    async fn port_forward_rejects_bad_port() {
        let fake = Arc::new(FakeRequester::default());
        let result = tool(&fake, ServiceOp::PortForward)
            .execute(
                &CancellationToken::new(),
                json!({"environment_id": "env-123", "service_name": "api", "port": 70000}),
            )
            .await;
        assert!(result.is_err());
    }
}
