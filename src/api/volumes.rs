//! Volume and snapshot operations.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;

use super::{decode, endpoint, ApiError, OrgSelection, Requester};

/// A persistent volume attached to a service.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Volume {
    /// Volume name.
    pub name: String,
    /// Service that mounts the volume.
    #[serde(default)]
    pub service_name: Option<String>,
    /// Mount path inside the container.
    #[serde(default)]
    pub mount_path: Option<String>,
    /// Size, as reported by the backend (e.g. `5Gi`).
    #[serde(default)]
    pub size: Option<String>,
}

/// A point-in-time copy of an environment's volumes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Monotonic sequence number within the environment.
    pub sequence_number: u64,
    /// Backend status (`creating`, `ready`, `failed`, ...).
    #[serde(default)]
    pub status: String,
    /// Free-form note.
    #[serde(default)]
    pub note: Option<String>,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Volume operations.
#[derive(Clone)]
pub struct VolumeManager {
    requester: Arc<dyn Requester>,
    org: OrgSelection,
}

impl VolumeManager {
    pub(crate) fn new(requester: Arc<dyn Requester>, org: OrgSelection) -> Self {
        Self { requester, org }
    }

    async fn call(
        &self,
        ctx: &CancellationToken,
        method: Method,
        segments: &[&str],
        body: Option<serde_json::Value>,
    ) -> Result<Vec<u8>, ApiError> {
        let uri = endpoint(segments, &self.org.query())?;
        match body {
            Some(body) => {
                let bytes = serde_json::to_vec(&body)?;
                self.requester
                    .request(ctx, method, &uri, Some("application/json"), Some(bytes))
                    .await
            }
            None => self.requester.request(ctx, method, &uri, None, None).await,
        }
    }

    /// Lists the volumes of an environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    pub async fn volumes(&self, ctx: &CancellationToken, env_id: &str) -> Result<Vec<Volume>, ApiError> {
        let body = self
            .call(ctx, Method::GET, &["application", env_id, "volumes"], None)
            .await?;
        decode(&body)
    }

    /// Lists the snapshots of an environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    pub async fn snapshots(
        &self,
        ctx: &CancellationToken,
        env_id: &str,
    ) -> Result<Vec<Snapshot>, ApiError> {
        let body = self
            .call(ctx, Method::GET, &["application", env_id, "snapshots"], None)
            .await?;
        decode(&body)
    }

    /// Resets a volume to its initial contents.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the request.
    pub async fn reset_volume(
        &self,
        ctx: &CancellationToken,
        env_id: &str,
        volume: &str,
    ) -> Result<(), ApiError> {
        self.call(
            ctx,
            Method::POST,
            &["application", env_id, "volumes", volume, "reset"],
            None,
        )
        .await?;
        Ok(())
    }

    /// Creates a snapshot of all volumes.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the request.
    pub async fn create_snapshot(
        &self,
        ctx: &CancellationToken,
        env_id: &str,
        note: Option<&str>,
    ) -> Result<(), ApiError> {
        self.call(
            ctx,
            Method::POST,
            &["application", env_id, "snapshots"],
            Some(json!({ "note": note })),
        )
        .await?;
        Ok(())
    }

    /// Restores the volumes from snapshot `sequence_number`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the request.
    pub async fn load_snapshot(
        &self,
        ctx: &CancellationToken,
        env_id: &str,
        sequence_number: u64,
    ) -> Result<(), ApiError> {
        let sequence_number = sequence_number.to_string();
        self.call(
            ctx,
            Method::POST,
            &["application", env_id, "snapshots", sequence_number.as_str(), "load"],
            None,
        )
        .await?;
        Ok(())
    }
}
