//! Structured errors for tool and resource failures.
//!
//! Every failure that leaves a tool or resource is turned into a
//! [`ToolError`] before it reaches the wire. A `ToolError` names the
//! operation, carries a human message and, where one exists, a suggestion
//! for what to try next. Its [`ErrorKind`] decides the JSON-RPC error code.
//!
//! Raw collaborator failures are classified by [`ToolError::classify`],
//! which inspects the failure text. The substring table is the behavioural
//! contract: `404`/`not found`, `401`/`unauthorized`, `403`/`forbidden`,
//! `409`/`conflict`, `500`, then connection and timeout keywords, in that
//! order. Anything else is [`ErrorKind::Unknown`] with the text preserved.

use std::error::Error as StdError;

use serde_json::json;
use thiserror::Error;

use crate::api::ApiError;
use crate::mcp::protocol::{ErrorCode, JsonRpcErrorData};

/// Boxed underlying cause.
pub type Cause = Box<dyn StdError + Send + Sync>;

/// Connection and timeout keywords, matched case-insensitively.
const NETWORK_KEYWORDS: &[&str] = &[
    "connection refused",
    "connection reset",
    "connection failed",
    "timeout",
    "timed out",
    "no such host",
    "dial tcp",
];

/// Classification of a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad or missing parameters.
    Validation,
    /// The target does not exist.
    NotFound,
    /// Authentication or authorization failure.
    Permission,
    /// The target's state does not allow the operation.
    Conflict,
    /// The backend could not be reached.
    Network,
    /// The backend failed.
    Server,
    /// Anything else.
    Unknown,
}

impl ErrorKind {
    /// Stable lowercase name, used in error data and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Validation => "validation",
            Self::NotFound => "not_found",
            Self::Permission => "permission",
            Self::Conflict => "conflict",
            Self::Network => "network",
            Self::Server => "server",
            Self::Unknown => "unknown",
        }
    }
}

/// A classified tool or resource failure.
///
/// Built once where the failure is classified and consumed once when it is
/// written into a response.
#[derive(Debug, Error)]
#[error("{operation}: {message}")]
pub struct ToolError {
    kind: ErrorKind,
    operation: String,
    message: String,
    suggestion: Option<String>,
    status: Option<u16>,
    #[source]
    cause: Option<Cause>,
}

impl ToolError {
    fn new(kind: ErrorKind, operation: &str, message: impl Into<String>) -> Self {
        Self {
            kind,
            operation: operation.to_string(),
            message: message.into(),
            suggestion: None,
            status: None,
            cause: None,
        }
    }

    fn suggest(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    /// Invalid or missing parameter.
    #[must_use]
    pub fn validation(operation: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Validation, operation, message)
            .suggest("Check the tool's input schema with tools/list")
    }

    /// `resource_type` `id` does not exist.
    #[must_use]
    pub fn not_found(operation: &str, resource_type: &str, id: &str) -> Self {
        let message = if id.is_empty() {
            format!("{resource_type} not found")
        } else {
            format!("{resource_type} '{id}' not found")
        };
        let suggestion = match resource_type {
            "environment" => "Use get_environments to list available environments",
            "organization" => "Use get_orgs to list available organizations",
            "service" => "Use get_services to list the services of the environment",
            "volume" => "Use get_volumes to list the volumes of the environment",
            "snapshot" => "Use get_snapshots to list the snapshots of the environment",
            _ => "Check that the identifier is correct",
        };
        Self::new(ErrorKind::NotFound, operation, message)
            .suggest(suggestion)
            .with_status(404)
    }

    /// The credentials were rejected (401).
    #[must_use]
    pub fn unauthorized(operation: &str) -> Self {
        Self::new(ErrorKind::Permission, operation, "authentication failed")
            .suggest("Check that the API token is set and has not expired")
            .with_status(401)
    }

    /// The credentials lack access (403).
    #[must_use]
    pub fn forbidden(operation: &str) -> Self {
        Self::new(ErrorKind::Permission, operation, "permission denied")
            .suggest("Check that your token has access to the selected organization")
            .with_status(403)
    }

    /// The target's state forbids the operation (409).
    ///
    /// `current_state` refines the suggestion when known.
    #[must_use]
    pub fn conflict(operation: &str, current_state: Option<&str>) -> Self {
        let message = match current_state {
            Some(state) => format!("operation conflicts with current state '{state}'"),
            None => "operation conflicts with the current state".to_string(),
        };
        let suggestion = match (operation, current_state) {
            ("restart_environment", Some("running")) => {
                "Stop the environment first, or wait for the restart in progress to finish"
            }
            (_, Some("processing")) => {
                "Wait for the build to finish or cancel it with cancel_environment"
            }
            (_, Some("deleted")) => "Revive the environment with revive_environment first",
            _ => "Check the current state with get_environment and retry",
        };
        Self::new(ErrorKind::Conflict, operation, message)
            .suggest(suggestion)
            .with_status(409)
    }

    /// The backend could not be reached.
    #[must_use]
    pub fn network(operation: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Network, operation, message)
            .suggest("Check your network connection and the configured API URL, then retry")
    }

    /// The backend failed (5xx).
    #[must_use]
    pub fn server(operation: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Server, operation, message)
            .suggest("The backend reported an internal error; retry later")
            .with_status(500)
    }

    /// Unclassified failure.
    #[must_use]
    pub fn unknown(operation: &str, message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Unknown, operation, message)
            .suggest("Retry the operation; if it keeps failing, check the server logs")
    }

    /// Draining a resource stream failed.
    #[must_use]
    pub fn content_read(uri: &str, err: std::io::Error) -> Self {
        Self::new(
            ErrorKind::Server,
            "read_resource",
            format!("failed to read content of {uri}: {err}"),
        )
        .suggest("The resource may be temporarily unavailable; retry shortly")
        .with_cause(err)
    }

    /// Attaches the underlying cause.
    #[must_use]
    pub fn with_cause(mut self, cause: impl Into<Cause>) -> Self {
        self.cause = Some(cause.into());
        self
    }

    /// Classifies a raw failure by its text.
    ///
    /// `resource_id` names the target for not-found messages; the resource
    /// type is inferred from the operation name.
    #[must_use]
    pub fn classify(operation: &str, raw: &str, resource_id: &str) -> Self {
        let text = raw.to_lowercase();
        let has = |needle: &str| text.contains(needle);

        if has("404") || has("not found") {
            Self::not_found(operation, resource_type_for(operation), resource_id)
        } else if has("401") || has("unauthorized") {
            Self::unauthorized(operation)
        } else if has("403") || has("forbidden") {
            Self::forbidden(operation)
        } else if has("409") || has("conflict") {
            Self::conflict(operation, None)
        } else if has("500") {
            Self::server(operation, raw)
        } else if NETWORK_KEYWORDS.iter().any(|k| has(k)) {
            Self::network(operation, raw)
        } else {
            Self::unknown(operation, raw)
        }
    }

    /// Classifies a collaborator error, keeping it as the cause.
    #[must_use]
    pub fn classify_api(operation: &str, err: ApiError, resource_id: &str) -> Self {
        Self::classify(operation, &err.to_string(), resource_id).with_cause(err)
    }

    /// Classification.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Operation that failed.
    #[must_use]
    pub fn operation(&self) -> &str {
        &self.operation
    }

    /// Human message.
    #[must_use]
    pub fn message(&self) -> &str {
        &self.message
    }

    /// What to try instead.
    #[must_use]
    pub fn suggestion(&self) -> Option<&str> {
        self.suggestion.as_deref()
    }

    /// HTTP-style status, when the failure maps to one.
    #[must_use]
    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    /// JSON-RPC error code for this failure.
    #[must_use]
    pub const fn rpc_code(&self) -> ErrorCode {
        match self.kind {
            ErrorKind::Validation => ErrorCode::InvalidParams,
            ErrorKind::NotFound => ErrorCode::NotFound,
            ErrorKind::Permission => match self.status {
                Some(401) => ErrorCode::Authentication,
                _ => ErrorCode::Permission,
            },
            ErrorKind::Conflict => ErrorCode::Conflict,
            ErrorKind::Network | ErrorKind::Server => ErrorCode::InternalError,
            ErrorKind::Unknown => ErrorCode::ServerError,
        }
    }

    /// Message shown to the caller: the message followed by the suggestion.
    #[must_use]
    pub fn user_message(&self) -> String {
        match &self.suggestion {
            Some(suggestion) => format!("{}. {suggestion}", self.message),
            None => self.message.clone(),
        }
    }

    /// Converts into a JSON-RPC error object. The cause is not serialized.
    #[must_use]
    pub fn into_error_data(self) -> JsonRpcErrorData {
        JsonRpcErrorData::with_message(self.rpc_code(), self.user_message()).with_data(json!({
            "operation": self.operation,
            "kind": self.kind.as_str(),
        }))
    }
}

/// Infers the kind of thing an operation targets.
#[must_use]
pub fn resource_type_for(operation: &str) -> &'static str {
    match operation {
        "get_orgs" | "get_org" | "set_org" => "organization",
        "get_logs" | "read_resource" => "log stream",
        "exec_service" | "port_forward" => "service",
        "reset_volume" => "volume",
        "get_snapshots" | "create_snapshot" | "load_snapshot" => "snapshot",
        _ => "environment",
    }
}

/// Failure returned by [`Tool::execute`](crate::mcp::tools::Tool::execute)
/// and resource reads.
#[derive(Debug, Error)]
pub enum CallError {
    /// Already classified.
    #[error(transparent)]
    Tool(#[from] ToolError),

    /// Raw collaborator failure, classified by the dispatcher.
    #[error(transparent)]
    Api(#[from] ApiError),
}

impl CallError {
    /// Returns the structured error, classifying raw failures against
    /// `operation` and `resource_id`.
    #[must_use]
    pub fn into_tool_error(self, operation: &str, resource_id: &str) -> ToolError {
        match self {
            Self::Tool(err) => err,
            Self::Api(err) => ToolError::classify_api(operation, err, resource_id),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reqwest::StatusCode;

    #[test]
    fn classify_not_found_environment() {
        let err = ToolError::classify("get_environment", "404 not found", "env-123");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert_eq!(err.status(), Some(404));
        assert!(err.message().contains("env-123"));
        assert!(err.suggestion().unwrap().contains("get_environments"));
        assert_eq!(err.rpc_code(), ErrorCode::NotFound);
    }

    #[test]
    fn classify_table_order() {
        let cases = [
            ("HTTP 401 Unauthorized: bad token", ErrorKind::Permission, Some(401)),
            ("Forbidden", ErrorKind::Permission, Some(403)),
            ("HTTP 409 Conflict: busy", ErrorKind::Conflict, Some(409)),
            ("HTTP 500 Internal Server Error", ErrorKind::Server, Some(500)),
            ("dial tcp 10.0.0.1:443: connection refused", ErrorKind::Network, None),
            ("request timed out after 30s", ErrorKind::Network, None),
            ("something odd", ErrorKind::Unknown, None),
        ];
        for (raw, kind, status) in cases {
            let err = ToolError::classify("stop_environment", raw, "env-1");
            assert_eq!(err.kind(), kind, "{raw}");
            assert_eq!(err.status(), status, "{raw}");
        }
    }

    #[test]
    fn not_found_wins_over_later_entries() {
        let err = ToolError::classify("get_logs", "404: connection failed", "env-1");
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn unknown_preserves_original_text() {
        let err = ToolError::classify("get_org", "weird upstream reply", "");
        assert_eq!(err.message(), "weird upstream reply");
        assert!(err.suggestion().is_some());
    }

    #[test]
    fn permission_codes_split_on_status() {
        assert_eq!(
            ToolError::unauthorized("get_orgs").rpc_code(),
            ErrorCode::Authentication
        );
        assert_eq!(ToolError::forbidden("get_orgs").rpc_code(), ErrorCode::Permission);
        assert_eq!(
            ToolError::network("get_orgs", "x").rpc_code(),
            ErrorCode::InternalError
        );
        assert_eq!(ToolError::unknown("get_orgs", "x").rpc_code(), ErrorCode::ServerError);
        assert_eq!(
            ToolError::validation("get_orgs", "x").rpc_code(),
            ErrorCode::InvalidParams
        );
    }

    #[test]
    fn conflict_on_running_restart_suggests_stopping() {
        let err = ToolError::conflict("restart_environment", Some("running"));
        assert!(err.suggestion().unwrap().contains("Stop the environment"));
    }

    #[test]
    fn user_message_joins_suggestion() {
        let err = ToolError::not_found("get_environment", "environment", "env-9");
        assert_eq!(
            err.user_message(),
            "environment 'env-9' not found. Use get_environments to list available environments"
        );
    }

    #[test]
    fn error_data_omits_cause() {
        let api = ApiError::status(StatusCode::NOT_FOUND, "secret internals");
        let err = ToolError::classify_api("get_environment", api, "env-1");
        assert!(err.source().is_some());

        let data = err.into_error_data();
        assert_eq!(data.code, -32003);
        assert!(!data.message.contains("secret internals"));
        let extra = data.data.unwrap();
        assert_eq!(extra["operation"], "get_environment");
        assert_eq!(extra["kind"], "not_found");
    }

    #[test]
    fn content_read_keeps_io_cause() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "short read");
        let err = ToolError::content_read("logs://env-1/web", io);
        assert_eq!(err.operation(), "read_resource");
        assert!(err.suggestion().unwrap().contains("temporarily unavailable"));
        assert!(err.source().is_some());
    }

    #[test]
    fn call_error_passes_structured_errors_through() {
        let err = CallError::from(ToolError::validation("get_logs", "missing tail"));
        let err = err.into_tool_error("ignored", "");
        assert_eq!(err.operation(), "get_logs");

        let raw = CallError::from(ApiError::Connection("refused".to_string()));
        let err = raw.into_tool_error("get_orgs", "");
        assert_eq!(err.kind(), ErrorKind::Network);
    }
}
