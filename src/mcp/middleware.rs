//! Request interceptors run before dispatch.
//!
//! Middleware sees every validated request in registration order. The first
//! one to fail short-circuits the request with a "Middleware error" response.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

use crate::config::ServerSettings;
use crate::mcp::protocol::JsonRpcRequest;

/// A middleware rejected a request.
#[derive(Debug, Error)]
#[error("{middleware}: {reason}")]
pub struct MiddlewareError {
    /// Name of the rejecting middleware.
    pub middleware: &'static str,
    /// Why the request was rejected.
    pub reason: String,
}

/// A request interceptor.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Short name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Inspects a request before it is dispatched.
    ///
    /// # Errors
    ///
    /// Returns an error to reject the request.
    async fn handle(&self, request: &JsonRpcRequest) -> Result<(), MiddlewareError>;
}

/// Emits one `audit` event per request.
#[derive(Debug, Default)]
pub struct AuditMiddleware;

#[async_trait]
impl Middleware for AuditMiddleware {
    fn name(&self) -> &'static str {
        "audit"
    }

    async fn handle(&self, request: &JsonRpcRequest) -> Result<(), MiddlewareError> {
        let tool = request
            .params
            .as_ref()
            .filter(|_| request.method == "tools/call")
            .and_then(|p| p.get("name"))
            .and_then(Value::as_str);
        let id = request.id.as_ref().map(ToString::to_string);

        tracing::info!(
            target: "audit",
            method = %request.method,
            id = id.as_deref().unwrap_or("-"),
            tool = tool.unwrap_or("-"),
            "Request received"
        );
        Ok(())
    }
}

/// Builds the middleware chain for `settings`.
///
/// Empty unless audit logging is enabled.
#[must_use]
pub fn chain(settings: &ServerSettings) -> Vec<Arc<dyn Middleware>> {
    let mut chain: Vec<Arc<dyn Middleware>> = Vec::new();
    if settings.audit_log {
        chain.push(Arc::new(AuditMiddleware));
    }
    chain
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::protocol::parse_request;

    #[test]
    fn chain_is_empty_by_default() {
        assert!(chain(&ServerSettings::default()).is_empty());
    }

    #[test]
    fn audit_flag_installs_audit_middleware() {
        let settings = ServerSettings {
            audit_log: true,
            ..ServerSettings::default()
        };
        let chain = chain(&settings);
        assert_eq!(chain.len(), 1);
        assert_eq!(chain[0].name(), "audit");
    }

    #[tokio::test]
    async fn audit_accepts_every_request() {
        let request = parse_request(
            br#"{"jsonrpc":"2.0","id":"a","method":"tools/call","params":{"name":"get_orgs"}}"#,
        )
        .unwrap();
        assert!(AuditMiddleware.handle(&request).await.is_ok());
    }

    #[test]
    fn error_text_names_middleware() {
        let err = MiddlewareError {
            middleware: "rate_limit",
            reason: "too many requests".to_string(),
        };
        assert_eq!(err.to_string(), "rate_limit: too many requests");
    }
}
