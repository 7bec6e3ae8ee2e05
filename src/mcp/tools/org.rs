//! Organization tools.

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::{object_schema, to_pretty, Args, Tool, ToolDefinition};
use crate::api::OrgManager;
use crate::mcp::error::{CallError, ToolError};

/// Operations served by [`OrgTool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrgOp {
    /// `get_orgs`
    List,
    /// `get_org`
    Current,
    /// `set_org`
    Select,
}

impl OrgOp {
    /// Every operation, in registration order.
    pub const ALL: [Self; 3] = [Self::List, Self::Current, Self::Select];

    /// Tool name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::List => "get_orgs",
            Self::Current => "get_org",
            Self::Select => "set_org",
        }
    }
}

/// Organization listing and selection.
pub struct OrgTool {
    op: OrgOp,
    orgs: OrgManager,
}

impl OrgTool {
    /// Creates the tool for `op`.
    #[must_use]
    pub const fn new(op: OrgOp, orgs: OrgManager) -> Self {
        Self { op, orgs }
    }
}

#[async_trait]
impl Tool for OrgTool {
    fn definition(&self) -> ToolDefinition {
        match self.op {
            OrgOp::List => ToolDefinition::new(
                self.op.name(),
                "List the organizations accessible with the configured token.",
                object_schema(json!({}), &[]),
            ),
            OrgOp::Current => ToolDefinition::new(
                self.op.name(),
                "Show the organization that requests are currently scoped to.",
                object_schema(json!({}), &[]),
            ),
            OrgOp::Select => ToolDefinition::new(
                self.op.name(),
                "Select the organization that subsequent requests are scoped to.",
                object_schema(
                    json!({
                        "org_name": { "type": "string", "description": "Organization name" }
                    }),
                    &["org_name"],
                ),
            ),
        }
    }

    async fn execute(&self, ctx: &CancellationToken, arguments: Value) -> Result<String, CallError> {
        let op = self.op.name();
        let args = Args::new(op, arguments)?;

        match self.op {
            OrgOp::List => {
                let orgs = self
                    .orgs
                    .list(ctx)
                    .await
                    .map_err(|e| ToolError::classify_api(op, e, ""))?;
                let current = self.orgs.current();
                let entries: Vec<_> = orgs
                    .iter()
                    .map(|org| {
                        json!({
                            "name": org.name,
                            "selected": current.as_deref() == Some(org.name.as_str()),
                        })
                    })
                    .collect();
                to_pretty(op, &json!({ "count": entries.len(), "orgs": entries }))
            }
            OrgOp::Current => Ok(match self.orgs.current() {
                Some(org) => format!("Current organization: {org}"),
                None => "No organization selected. Use set_org to select one.".to_string(),
            }),
            OrgOp::Select => {
                let name = args.required_str("org_name")?;
                let selected = self
                    .orgs
                    .select(ctx, name)
                    .await
                    .map_err(|e| ToolError::classify_api(op, e, name))?;
                match selected {
                    Some(org) => {
                        tracing::info!(org = %org.name, "Organization selected");
                        Ok(format!("Organization set to {}", org.name))
                    }
                    None => Err(ToolError::not_found(op, "organization", name).into()),
                }
            }
        }
    }
}
