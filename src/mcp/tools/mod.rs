//! Tools exposed through `tools/list` and `tools/call`.
//!
//! Tools are grouped by domain. One type per domain serves several tool
//! names, picking its behaviour from the operation it was built for:
//!
//! | Domain        | Type                | Tools                                                       |
//! |---------------|---------------------|-------------------------------------------------------------|
//! | Environments  | [`EnvironmentTool`] | `get_environments`, `get_environment`, lifecycle operations |
//! | Organizations | [`OrgTool`]         | `get_orgs`, `get_org`, `set_org`                            |
//! | Logs          | [`LogsTool`]        | `get_logs`                                                  |
//! | Services      | [`ServiceTool`]     | `get_services`, `exec_service`, `port_forward`              |
//! | Volumes       | [`VolumeTool`]      | volume and snapshot operations                              |
//! | Remote        | [`TelepresenceTool`]| `telepresence_connect`                                      |
//!
//! Every tool validates its arguments before it calls a collaborator.

mod args;
mod environment;
mod logs;
mod org;
mod services;
mod telepresence;
mod volumes;

pub use args::Args;
pub(crate) use args::{IDENTIFIER_CHARS, MIN_IDENTIFIER_LEN};
pub use environment::{EnvironmentOp, EnvironmentTool};
pub use logs::{LogsTool, MAX_TAIL};
pub use org::{OrgOp, OrgTool};
pub use services::{ServiceOp, ServiceTool};
pub use telepresence::TelepresenceTool;
pub use volumes::{VolumeOp, VolumeTool};

use std::sync::Arc;

use async_trait::async_trait;
use indexmap::IndexMap;
use serde::Serialize;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::api::Backend;
use crate::error::ServerError;
use crate::mcp::error::{CallError, ToolError};

/// A tool definition for the `tools/list` response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

impl ToolDefinition {
    fn new(name: &str, description: &str, input_schema: Value) -> Self {
        Self {
            name: name.to_string(),
            description: description.to_string(),
            input_schema,
        }
    }
}

/// A named, invocable operation.
#[async_trait]
pub trait Tool: Send + Sync {
    /// Describes the tool. `definition().name` is its registry key.
    fn definition(&self) -> ToolDefinition;

    /// Runs the tool.
    ///
    /// `arguments` is the raw `arguments` member of the call. Collaborator
    /// calls observe `ctx` and abort when it is cancelled.
    ///
    /// # Errors
    ///
    /// Returns a validation error for bad arguments, or the collaborator
    /// failure otherwise.
    async fn execute(&self, ctx: &CancellationToken, arguments: Value) -> Result<String, CallError>;
}

/// Tools keyed by name, in registration order.
#[derive(Default)]
pub struct ToolRegistry {
    tools: IndexMap<String, Arc<dyn Tool>>,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl ToolRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a tool under its definition's name.
    ///
    /// # Errors
    ///
    /// Returns [`ServerError::DuplicateTool`] if the name is taken.
    pub fn register(&mut self, tool: Arc<dyn Tool>) -> Result<(), ServerError> {
        let name = tool.definition().name;
        if self.tools.contains_key(&name) {
            return Err(ServerError::DuplicateTool(name));
        }
        self.tools.insert(name, tool);
        Ok(())
    }

    /// Looks up a tool by name.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Definitions of every tool, in registration order.
    #[must_use]
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools.values().map(|tool| tool.definition()).collect()
    }

    /// Registered names, in registration order.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        self.tools.keys().cloned().collect()
    }

    /// Number of registered tools.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tools.len()
    }

    /// Whether no tool is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }
}

/// Builds the full tool set over `backend`.
///
/// # Errors
///
/// Returns an error if two tools share a name.
pub fn build_registry(backend: &Backend) -> Result<ToolRegistry, ServerError> {
    let mut registry = ToolRegistry::new();

    for op in EnvironmentOp::ALL {
        registry.register(Arc::new(EnvironmentTool::new(
            op,
            backend.environments.clone(),
        )))?;
    }
    for op in OrgOp::ALL {
        registry.register(Arc::new(OrgTool::new(op, backend.orgs.clone())))?;
    }
    registry.register(Arc::new(LogsTool::new(backend.logs.clone())))?;
    for op in ServiceOp::ALL {
        registry.register(Arc::new(ServiceTool::new(op, backend.environments.clone())))?;
    }
    for op in VolumeOp::ALL {
        registry.register(Arc::new(VolumeTool::new(op, backend.volumes.clone())))?;
    }
    registry.register(Arc::new(TelepresenceTool::new(
        backend.environments.clone(),
    )))?;

    Ok(registry)
}

/// Pretty-prints a tool result.
fn to_pretty<T: Serialize>(operation: &str, value: &T) -> Result<String, CallError> {
    serde_json::to_string_pretty(value).map_err(|e| {
        ToolError::unknown(operation, format!("failed to serialise result: {e}")).into()
    })
}

/// JSON schema of an object with the given properties.
fn object_schema(properties: Value, required: &[&str]) -> Value {
    serde_json::json!({
        "type": "object",
        "properties": properties,
        "required": required,
    })
}
