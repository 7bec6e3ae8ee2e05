//! Environment listing and lifecycle operations.

use std::fmt;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use reqwest::Method;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use super::{decode, endpoint, ApiError, OrgSelection, Requester};

/// A preview environment as returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Environment {
    /// Unique identifier.
    pub id: String,
    /// Display name.
    #[serde(default)]
    pub name: String,
    /// Owning organization.
    #[serde(default)]
    pub org_name: String,
    /// Public URL of the environment, once deployed.
    #[serde(default)]
    pub url: Option<String>,
    /// Kubernetes namespace the environment runs in.
    #[serde(default)]
    pub namespace: Option<String>,
    /// All services are up.
    #[serde(default)]
    pub ready: bool,
    /// Stopped by a user or by the sleep policy.
    #[serde(default)]
    pub stopped: bool,
    /// A build or deploy is in progress.
    #[serde(default)]
    pub processing: bool,
    /// Retired (the source branch went away).
    #[serde(default)]
    pub retired: bool,
    /// Deleted.
    #[serde(default)]
    pub deleted: bool,
    /// Source repositories.
    #[serde(default)]
    pub projects: Vec<Project>,
    /// Services running in the environment.
    #[serde(default)]
    pub services: Vec<Service>,
    /// Creation time.
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

impl Environment {
    /// Derives a single status from the backend flags.
    ///
    /// Terminal flags win over transient ones.
    #[must_use]
    pub const fn status(&self) -> EnvironmentStatus {
        if self.deleted {
            EnvironmentStatus::Deleted
        } else if self.retired {
            EnvironmentStatus::Retired
        } else if self.processing {
            EnvironmentStatus::Processing
        } else if self.stopped {
            EnvironmentStatus::Stopped
        } else if self.ready {
            EnvironmentStatus::Running
        } else {
            EnvironmentStatus::Starting
        }
    }
}

/// A source repository attached to an environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Repository name.
    pub repo_name: String,
    /// Branch the environment was built from.
    #[serde(default)]
    pub branch: String,
    /// Commit currently deployed.
    #[serde(default)]
    pub commit_hash: Option<String>,
    /// Pull request that triggered the environment.
    #[serde(default)]
    pub pull_request_number: Option<u64>,
}

/// A service inside an environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Service {
    /// Service name.
    pub name: String,
    /// Exposed container ports.
    #[serde(default)]
    pub ports: Vec<u16>,
    /// Public URL, if the service is exposed.
    #[serde(default)]
    pub url: Option<String>,
}

/// Coarse environment status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnvironmentStatus {
    /// Up and serving.
    Running,
    /// Deploying for the first time.
    Starting,
    /// Building or deploying.
    Processing,
    /// Stopped.
    Stopped,
    /// Retired.
    Retired,
    /// Deleted.
    Deleted,
}

impl fmt::Display for EnvironmentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Running => "running",
            Self::Starting => "starting",
            Self::Processing => "processing",
            Self::Stopped => "stopped",
            Self::Retired => "retired",
            Self::Deleted => "deleted",
        };
        f.write_str(s)
    }
}

/// State-changing operations on an environment.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    /// Restart all services.
    Restart,
    /// Stop the environment.
    Stop,
    /// Cancel the build or deploy in progress.
    Cancel,
    /// Rebuild from source.
    Rebuild,
    /// Bring back a deleted environment.
    Revive,
}

impl LifecycleAction {
    /// Verb used in messages and the endpoint path.
    #[must_use]
    pub const fn verb(self) -> &'static str {
        match self {
            Self::Restart => "restart",
            Self::Stop => "stop",
            Self::Cancel => "cancel",
            Self::Rebuild => "rebuild",
            Self::Revive => "revive",
        }
    }

    /// Returns why the action cannot run in `status`, if it can't.
    #[must_use]
    pub fn precondition(self, status: EnvironmentStatus) -> Option<String> {
        use EnvironmentStatus as S;

        match (self, status) {
            (Self::Revive, S::Deleted) => None,
            (Self::Revive, other) => Some(format!("environment is {other}, not deleted")),
            (_, S::Deleted) => Some("environment is deleted; revive it first".to_string()),
            (Self::Restart, S::Processing) => {
                Some("a build is in progress; cancel it or wait for it to finish".to_string())
            }
            (Self::Stop, S::Stopped) => Some("environment is already stopped".to_string()),
            (Self::Stop, S::Processing) => {
                Some("a build is in progress; cancel it first".to_string())
            }
            (Self::Cancel, status) if status != S::Processing => {
                Some(format!("nothing to cancel, environment is {status}"))
            }
            _ => None,
        }
    }
}

/// Filters for [`EnvironmentManager::list`].
#[derive(Debug, Clone, Default)]
pub struct EnvironmentFilter {
    /// Environment name.
    pub name: Option<String>,
    /// Organization; overrides the selected org.
    pub org_name: Option<String>,
    /// Repository name.
    pub repo_name: Option<String>,
    /// Branch name.
    pub branch: Option<String>,
    /// 1-based page number.
    pub page: Option<u32>,
    /// Page size.
    pub page_size: Option<u32>,
}

impl EnvironmentFilter {
    fn query(&self, org: &OrgSelection) -> Vec<(&'static str, String)> {
        let mut query = Vec::new();
        let strings = [
            ("name", &self.name),
            ("repo_name", &self.repo_name),
            ("branch", &self.branch),
        ];
        for (key, value) in strings {
            if let Some(value) = value {
                query.push((key, value.clone()));
            }
        }
        if let Some(org) = self.org_name.clone().or_else(|| org.current()) {
            query.push(("org", org));
        }
        if let Some(page) = self.page {
            query.push(("page", page.to_string()));
        }
        if let Some(size) = self.page_size {
            query.push(("page_size", size.to_string()));
        }
        query
    }
}

/// Environment operations.
#[derive(Clone)]
pub struct EnvironmentManager {
    requester: Arc<dyn Requester>,
    org: OrgSelection,
}

impl EnvironmentManager {
    pub(crate) fn new(requester: Arc<dyn Requester>, org: OrgSelection) -> Self {
        Self { requester, org }
    }

    /// Lists environments matching `filter`.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    pub async fn list(
        &self,
        ctx: &CancellationToken,
        filter: &EnvironmentFilter,
    ) -> Result<Vec<Environment>, ApiError> {
        let uri = endpoint(&["application"], &filter.query(&self.org))?;
        let body = self
            .requester
            .request(ctx, Method::GET, &uri, None, None)
            .await?;
        decode(&body)
    }

    /// Fetches one environment.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the response is malformed.
    pub async fn get_by_id(&self, ctx: &CancellationToken, id: &str) -> Result<Environment, ApiError> {
        let uri = endpoint(&["application", id], &self.org.query())?;
        let body = self
            .requester
            .request(ctx, Method::GET, &uri, None, None)
            .await?;
        decode(&body)
    }

    /// Runs a lifecycle action with exactly one `POST`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend rejects the request.
    pub async fn apply(
        &self,
        ctx: &CancellationToken,
        id: &str,
        action: LifecycleAction,
    ) -> Result<(), ApiError> {
        let uri = endpoint(&["application", id, action.verb()], &self.org.query())?;
        self.requester
            .request(ctx, Method::POST, &uri, None, None)
            .await?;
        Ok(())
    }
}
