//! Error types for envops-mcp.
//!
//! # Security Note
//!
//! Error messages are carefully crafted to NEVER include credentials.
//! The API token is never part of any variant; URLs are reported without
//! query strings or user info.

use std::path::PathBuf;

use thiserror::Error;

use crate::mcp::transport::TransportError;

/// Errors that can occur during configuration operations.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file could not be read.
    #[error("failed to read configuration file: {path}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying IO error.
        #[source]
        source: std::io::Error,
    },

    /// Configuration file could not be parsed.
    #[error("failed to parse configuration file: {path}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// The underlying JSON error.
        #[source]
        source: serde_json::Error,
    },

    /// Configuration file not found.
    #[error("configuration file not found: {path}")]
    NotFound {
        /// Path where the configuration file was expected.
        path: PathBuf,
    },

    /// Configuration validation failed.
    #[error("configuration validation failed: {message}")]
    ValidationError {
        /// Description of the validation failure.
        message: String,
    },
}

/// Errors raised by the server lifecycle (`start`/`stop`).
#[derive(Error, Debug)]
pub enum ServerError {
    /// `start` was called while the server was already running.
    #[error("server is already running")]
    AlreadyRunning,

    /// `start` was called while a previous `stop` is still in progress.
    #[error("server is stopping")]
    Stopping,

    /// The transport failed while running; `stop` must run before a restart.
    #[error("server is degraded after a transport failure")]
    Degraded,

    /// The transport failed to start or stop.
    #[error("transport error")]
    Transport(#[from] TransportError),

    /// Two tools were registered under the same name.
    #[error("duplicate tool name: {0}")]
    DuplicateTool(String),

    /// Shutdown signal handlers could not be installed.
    #[error("failed to install signal handler")]
    Signal(#[source] std::io::Error),

    /// The HTTP client for the backend could not be built.
    #[error("failed to build backend client")]
    Backend(#[source] reqwest::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let error = ConfigError::NotFound {
            path: PathBuf::from("/path/to/config.json"),
        };
        let msg = error.to_string();
        assert!(msg.contains("not found"));
        assert!(msg.contains("config.json"));
    }

    #[test]
    fn validation_error_display() {
        let error = ConfigError::ValidationError {
            message: "invalid setting".to_string(),
        };
        let msg = error.to_string();
        assert!(msg.contains("invalid setting"));
    }

    #[test]
    fn server_error_display() {
        assert_eq!(
            ServerError::AlreadyRunning.to_string(),
            "server is already running"
        );
        let wrapped = ServerError::from(TransportError::Closed);
        assert!(std::error::Error::source(&wrapped).is_some());
    }
}
