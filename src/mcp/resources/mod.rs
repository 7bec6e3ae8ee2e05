//! Resources exposed through `resources/list` and `resources/read`.
//!
//! A resource owns a URI pattern. [`Resource::is_available`] and
//! [`Resource::get_content`] apply the same match, so a URI that a resource
//! claims is always one it can parse. The registry scans resources in
//! registration order and the first match wins.

mod logs;

pub use logs::{LogsResource, LogsUri};

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tokio::io::AsyncRead;
use tokio_util::sync::CancellationToken;

use crate::api::Backend;
use crate::mcp::error::CallError;

/// A resource entry for the `resources/list` response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDefinition {
    /// URI, or the human-facing URI template for parameterised resources.
    pub uri: String,
    /// Display name.
    pub name: String,
    /// What the resource provides.
    pub description: String,
    /// MIME type of the content.
    pub mime_type: String,
    /// Extra information, such as accepted query parameters.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
}

/// A resource template for the `resources/templates/list` response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceTemplate {
    /// RFC 6570 URI template.
    pub uri_template: String,
    /// Display name.
    pub name: String,
    /// What the resource provides.
    pub description: String,
    /// MIME type of the content.
    pub mime_type: String,
}

/// Content returned by [`Resource::get_content`].
pub struct ResourceContent {
    /// The content bytes.
    pub reader: Box<dyn AsyncRead + Send + Unpin>,
    /// MIME type of the content.
    pub mime_type: String,
}

/// A URI-addressable, read-only data source.
#[async_trait]
pub trait Resource: Send + Sync {
    /// Static metadata.
    fn definition(&self) -> ResourceDefinition;

    /// URI template for discovery.
    fn template(&self) -> ResourceTemplate;

    /// Whether `uri` matches this resource's pattern.
    fn is_available(&self, uri: &str) -> bool;

    /// Opens the content at `uri`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if `uri` does not match the pattern, or
    /// the collaborator failure otherwise.
    async fn get_content(
        &self,
        ctx: &CancellationToken,
        uri: &str,
    ) -> Result<ResourceContent, CallError>;
}

/// Resources in registration order.
#[derive(Default)]
pub struct ResourceRegistry {
    resources: Vec<Arc<dyn Resource>>,
}

impl ResourceRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a resource.
    pub fn register(&mut self, resource: Arc<dyn Resource>) {
        self.resources.push(resource);
    }

    /// First resource that accepts `uri`.
    #[must_use]
    pub fn find(&self, uri: &str) -> Option<Arc<dyn Resource>> {
        self.resources
            .iter()
            .find(|resource| resource.is_available(uri))
            .cloned()
    }

    /// Definitions of every resource.
    #[must_use]
    pub fn definitions(&self) -> Vec<ResourceDefinition> {
        self.resources.iter().map(|r| r.definition()).collect()
    }

    /// Templates of every resource.
    #[must_use]
    pub fn templates(&self) -> Vec<ResourceTemplate> {
        self.resources.iter().map(|r| r.template()).collect()
    }

    /// Number of registered resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.resources.len()
    }

    /// Whether no resource is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

/// Builds the resource set over `backend`.
#[must_use]
pub fn build_registry(backend: &Backend) -> ResourceRegistry {
    let mut registry = ResourceRegistry::new();
    registry.register(Arc::new(LogsResource::new(backend.logs.clone())));
    registry
}
