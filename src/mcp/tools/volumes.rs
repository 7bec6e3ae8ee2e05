//! Volume and snapshot tools.

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio_util::sync::CancellationToken;

use super::{object_schema, to_pretty, Args, Tool, ToolDefinition};
use crate::api::{ApiError, VolumeManager};
use crate::mcp::error::{CallError, ToolError};

/// Operations served by [`VolumeTool`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VolumeOp {
    /// `get_volumes`
    ListVolumes,
    /// `get_snapshots`
    ListSnapshots,
    /// `reset_volume`
    Reset,
    /// `create_snapshot`
    CreateSnapshot,
    /// `load_snapshot`
    LoadSnapshot,
}

impl VolumeOp {
    /// Every operation, in registration order.
    pub const ALL: [Self; 5] = [
        Self::ListVolumes,
        Self::ListSnapshots,
        Self::Reset,
        Self::CreateSnapshot,
        Self::LoadSnapshot,
    ];

    /// Tool name.
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::ListVolumes => "get_volumes",
            Self::ListSnapshots => "get_snapshots",
            Self::Reset => "reset_volume",
            Self::CreateSnapshot => "create_snapshot",
            Self::LoadSnapshot => "load_snapshot",
        }
    }
}

/// Volume and snapshot lifecycle.
pub struct VolumeTool {
    op: VolumeOp,
    volumes: VolumeManager,
}

impl VolumeTool {
    /// Creates the tool for `op`.
    #[must_use]
    pub const fn new(op: VolumeOp, volumes: VolumeManager) -> Self {
        Self { op, volumes }
    }

    /// Turns the outcome of a state change into content, keeping backend
    /// rejections readable.
    fn outcome(
        &self,
        result: Result<(), ApiError>,
        env_id: &str,
        refused: &str,
        done: String,
    ) -> Result<String, CallError> {
        match result {
            Ok(()) => Ok(done),
            Err(e) if e.is_rejection() => Ok(format!("Cannot {refused}: {e}")),
            Err(e) => Err(ToolError::classify_api(self.op.name(), e, env_id).into()),
        }
    }
}

#[async_trait]
impl Tool for VolumeTool {
    fn definition(&self) -> ToolDefinition {
        let env = json!({ "type": "string", "description": "Environment ID" });

        match self.op {
            VolumeOp::ListVolumes => ToolDefinition::new(
                self.op.name(),
                "List the persistent volumes of an environment.",
                object_schema(json!({ "environment_id": env }), &["environment_id"]),
            ),
            VolumeOp::ListSnapshots => ToolDefinition::new(
                self.op.name(),
                "List the volume snapshots of an environment.",
                object_schema(json!({ "environment_id": env }), &["environment_id"]),
            ),
            VolumeOp::Reset => ToolDefinition::new(
                self.op.name(),
                "Reset a volume to its initial contents. Data on the volume is lost.",
                object_schema(
                    json!({
                        "environment_id": env,
                        "volume_name": { "type": "string", "description": "Volume name" }
                    }),
                    &["environment_id", "volume_name"],
                ),
            ),
            VolumeOp::CreateSnapshot => ToolDefinition::new(
                self.op.name(),
                "Snapshot all volumes of an environment.",
                object_schema(
                    json!({
                        "environment_id": env,
                        "note": { "type": "string", "description": "Optional note" }
                    }),
                    &["environment_id"],
                ),
            ),
            VolumeOp::LoadSnapshot => ToolDefinition::new(
                self.op.name(),
                "Restore the volumes of an environment from a snapshot.",
                object_schema(
                    json!({
                        "environment_id": env,
                        "sequence_number": {
                            "type": "integer",
                            "minimum": 0,
                            "description": "Snapshot sequence number (see get_snapshots)"
                        }
                    }),
                    &["environment_id", "sequence_number"],
                ),
            ),
        }
    }

    async fn execute(&self, ctx: &CancellationToken, arguments: Value) -> Result<String, CallError> {
        let op = self.op.name();
        let args = Args::new(op, arguments)?;
        let env_id = args.identifier("environment_id")?;

        match self.op {
            VolumeOp::ListVolumes => {
                let volumes = self
                    .volumes
                    .volumes(ctx, env_id)
                    .await
                    .map_err(|e| ToolError::classify_api(op, e, env_id))?;
                if volumes.is_empty() {
                    return Ok(format!("Environment {env_id} has no volumes."));
                }
                to_pretty(op, &json!({ "count": volumes.len(), "volumes": volumes }))
            }
            VolumeOp::ListSnapshots => {
                let snapshots = self
                    .volumes
                    .snapshots(ctx, env_id)
                    .await
                    .map_err(|e| ToolError::classify_api(op, e, env_id))?;
                if snapshots.is_empty() {
                    return Ok(format!("Environment {env_id} has no snapshots."));
                }
                to_pretty(op, &json!({ "count": snapshots.len(), "snapshots": snapshots }))
            }
            VolumeOp::Reset => {
                let volume = args.identifier("volume_name")?;
                let result = self.volumes.reset_volume(ctx, env_id, volume).await;
                self.outcome(
                    result,
                    env_id,
                    &format!("reset volume {volume} of environment {env_id}"),
                    format!("Volume {volume} of environment {env_id} is being reset."),
                )
            }
            VolumeOp::CreateSnapshot => {
                let note = args.optional_str("note")?;
                let result = self.volumes.create_snapshot(ctx, env_id, note).await;
                self.outcome(
                    result,
                    env_id,
                    &format!("snapshot environment {env_id}"),
                    format!("Snapshot of environment {env_id} requested."),
                )
            }
            VolumeOp::LoadSnapshot => {
                let sequence = args.required_u64("sequence_number")?;
                let result = self.volumes.load_snapshot(ctx, env_id, sequence).await;
                self.outcome(
                    result,
                    env_id,
                    &format!("load snapshot {sequence} into environment {env_id}"),
                    format!("Loading snapshot {sequence} into environment {env_id}."),
                )
            }
        }
    }
}
