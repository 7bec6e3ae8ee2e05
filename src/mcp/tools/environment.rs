//! Environment listing and lifecycle tools.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::{object_schema, to_pretty, Args, Tool, ToolDefinition};
use crate::api::{
    Environment, EnvironmentFilter, EnvironmentManager, LifecycleAction, Project, Service,
};
use crate::mcp::error::{CallError, ToolError};

/// Largest accepted `page_size`.
const MAX_PAGE_SIZE: u32 = 100;

/// Operations served by [`EnvironmentTool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentOp {
    /// `get_environments`
    List,
    /// `get_environment`
    Get,
    /// `restart_environment`, `stop_environment`, ...
    Lifecycle(LifecycleAction),
}

impl EnvironmentOp {
    /// Every operation, in registration order.
    pub const ALL: [Self; 7] = [
        Self::List,
        Self::Get,
        Self::Lifecycle(LifecycleAction::Restart),
        Self::Lifecycle(LifecycleAction::Stop),
        Self::Lifecycle(LifecycleAction::Cancel),
        Self::Lifecycle(LifecycleAction::Rebuild),
        Self::Lifecycle(LifecycleAction::Revive),
    ];

    /// Tool name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::List => "get_environments",
            Self::Get => "get_environment",
            Self::Lifecycle(LifecycleAction::Restart) => "restart_environment",
            Self::Lifecycle(LifecycleAction::Stop) => "stop_environment",
            Self::Lifecycle(LifecycleAction::Cancel) => "cancel_environment",
            Self::Lifecycle(LifecycleAction::Rebuild) => "rebuild_environment",
            Self::Lifecycle(LifecycleAction::Revive) => "revive_environment",
        }
    }
}

/// Environment listing, inspection and lifecycle.
pub struct EnvironmentTool {
    op: EnvironmentOp,
    environments: EnvironmentManager,
}

impl EnvironmentTool {
    /// Creates the tool for `op`.
    #[must_use]
    pub const fn new(op: EnvironmentOp, environments: EnvironmentManager) -> Self {
        Self { op, environments }
    }

    async fn list(&self, ctx: &CancellationToken, args: &Args) -> Result<String, CallError> {
        let filter = EnvironmentFilter {
            name: args.optional_str("name")?.map(str::to_string),
            org_name: args.optional_str("org_name")?.map(str::to_string),
            repo_name: args.optional_str("repo_name")?.map(str::to_string),
            branch: args.optional_str("branch")?.map(str::to_string),
            page: args.optional_u32("page", 1..=u32::MAX)?,
            page_size: args.optional_u32("page_size", 1..=MAX_PAGE_SIZE)?,
        };

        let environments = self
            .environments
            .list(ctx, &filter)
            .await
            .map_err(|e| ToolError::classify_api(self.op.name(), e, ""))?;

        if environments.is_empty() {
            return Ok("No environments found matching the given filters.".to_string());
        }

        let views: Vec<_> = environments.iter().map(EnvironmentView::from).collect();
        to_pretty(
            self.op.name(),
            &json!({
                "count": views.len(),
                "page": filter.page.unwrap_or(1),
                "environments": views,
            }),
        )
    }

    async fn get(&self, ctx: &CancellationToken, args: &Args) -> Result<String, CallError> {
        let id = args.identifier("environment_id")?;
        let environment = self
            .environments
            .get_by_id(ctx, id)
            .await
            .map_err(|e| ToolError::classify_api(self.op.name(), e, id))?;
        to_pretty(self.op.name(), &EnvironmentView::from(&environment))
    }

    /// Runs a state change.
    ///
    /// A state that forbids the action, or a backend rejection of it, is
    /// reported as content rather than as an error.
    async fn lifecycle(
        &self,
        ctx: &CancellationToken,
        args: &Args,
        action: LifecycleAction,
    ) -> Result<String, CallError> {
        let op = self.op.name();
        let id = args.identifier("environment_id")?;
        let verb = action.verb();

        let environment = self
            .environments
            .get_by_id(ctx, id)
            .await
            .map_err(|e| ToolError::classify_api(op, e, id))?;

        if let Some(reason) = action.precondition(environment.status()) {
            tracing::debug!(tool = op, environment = id, %reason, "Lifecycle action refused");
            return Ok(format!("Cannot {verb} environment {id}: {reason}"));
        }

        match self.environments.apply(ctx, id, action).await {
            Ok(()) => Ok(accepted_message(action, id)),
            Err(e) if e.is_rejection() => Ok(format!("Cannot {verb} environment {id}: {e}")),
            Err(e) => Err(ToolError::classify_api(op, e, id).into()),
        }
    }
}

fn accepted_message(action: LifecycleAction, id: &str) -> String {
    match action {
        LifecycleAction::Restart => format!("Restart of environment {id} started."),
        LifecycleAction::Stop => format!("Environment {id} is stopping."),
        LifecycleAction::Cancel => format!("Cancelled the build in progress for environment {id}."),
        LifecycleAction::Rebuild => format!("Rebuild of environment {id} started."),
        LifecycleAction::Revive => format!("Environment {id} is being revived."),
    }
}

#[async_trait]
impl Tool for EnvironmentTool {
    fn definition(&self) -> ToolDefinition {
        let id_only = || {
            object_schema(
                json!({
                    "environment_id": {
                        "type": "string",
                        "description": "Environment ID (at least 3 characters)"
                    }
                }),
                &["environment_id"],
            )
        };

        match self.op {
            EnvironmentOp::List => ToolDefinition::new(
                self.op.name(),
                "List environments, optionally filtered by name, organization, repository \
                 or branch. Results are paginated.",
                object_schema(
                    json!({
                        "name": { "type": "string", "description": "Environment name" },
                        "org_name": {
                            "type": "string",
                            "description": "Organization (defaults to the selected org)"
                        },
                        "repo_name": { "type": "string", "description": "Repository name" },
                        "branch": { "type": "string", "description": "Branch name" },
                        "page": { "type": "integer", "minimum": 1, "description": "Page number" },
                        "page_size": {
                            "type": "integer",
                            "minimum": 1,
                            "maximum": MAX_PAGE_SIZE,
                            "description": "Results per page"
                        }
                    }),
                    &[],
                ),
            ),
            EnvironmentOp::Get => ToolDefinition::new(
                self.op.name(),
                "Get the details of an environment: status, URL, repositories and services.",
                id_only(),
            ),
            EnvironmentOp::Lifecycle(action) => {
                let description = match action {
                    LifecycleAction::Restart => "Restart all services of an environment.",
                    LifecycleAction::Stop => "Stop a running environment.",
                    LifecycleAction::Cancel => "Cancel the build or deploy in progress.",
                    LifecycleAction::Rebuild => "Rebuild an environment from source.",
                    LifecycleAction::Revive => "Bring back a deleted environment.",
                };
                ToolDefinition::new(self.op.name(), description, id_only())
            }
        }
    }

    async fn execute(&self, ctx: &CancellationToken, arguments: Value) -> Result<String, CallError> {
        let args = Args::new(self.op.name(), arguments)?;
        match self.op {
            EnvironmentOp::List => self.list(ctx, &args).await,
            EnvironmentOp::Get => self.get(ctx, &args).await,
            EnvironmentOp::Lifecycle(action) => self.lifecycle(ctx, &args, action).await,
        }
    }
}

/// What the tools show of an environment.
#[derive(Serialize)]
struct EnvironmentView<'a> {
    id: &'a str,
    name: &'a str,
    org_name: &'a str,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    url: Option<&'a str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    namespace: Option<&'a str>,
    projects: &'a [Project],
    services: &'a [Service],
    #[serde(skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
}

impl<'a> From<&'a Environment> for EnvironmentView<'a> {
    fn from(env: &'a Environment) -> Self {
        Self {
            id: &env.id,
            name: &env.name,
            org_name: &env.org_name,
            status: env.status().to_string(),
            url: env.url.as_deref(),
            namespace: env.namespace.as_deref(),
            projects: &env.projects,
            services: &env.services,
            created_at: env.created_at,
        }
    }
}
