//! Configuration structures for deserialisation.
//!
//! These structures map directly to the JSON configuration file format.

use serde::Deserialize;

use crate::error::ConfigError;

/// Root configuration structure.
///
/// This is the top-level structure that matches the JSON config file.
#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Optional JSON schema reference (ignored during parsing).
    #[serde(rename = "$schema", default)]
    _schema: Option<String>,

    /// Optional comment field (ignored during parsing).
    #[serde(rename = "_comment", default)]
    _comment: Option<String>,

    /// Protocol server settings.
    #[serde(default)]
    pub server: ServerSettings,

    /// Backend API settings.
    pub api: ApiConfig,

    /// Logging settings.
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Validates the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if any validation checks fail.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.api.base_url).map_err(|e| {
            ConfigError::ValidationError {
                message: format!("Invalid api.base_url: {e}"),
            }
        })?;

        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "Invalid api.base_url scheme '{}'. Must be http or https",
                    url.scheme()
                ),
            });
        }

        if self.api.timeout_secs == 0 {
            return Err(ConfigError::ValidationError {
                message: "api.timeout_secs must be greater than zero".to_string(),
            });
        }

        Ok(())
    }
}

/// Transport used to talk to the MCP client.
///
/// Only stdio exists today; the enum is the extension point for others.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransportKind {
    /// Line-delimited JSON over stdin/stdout.
    #[default]
    Stdio,
}

/// Protocol server configuration.
///
/// Loaded once before the server starts and never changed afterwards.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ServerSettings {
    /// Transport selector.
    #[serde(default)]
    pub transport: TransportKind,

    /// Port for network transports (unused by stdio).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Emit an audit log line for every request.
    #[serde(default)]
    pub audit_log: bool,
}

impl Default for ServerSettings {
    fn default() -> Self {
        Self {
            transport: TransportKind::default(),
            port: default_port(),
            audit_log: false,
        }
    }
}

const fn default_port() -> u16 {
    8080
}

/// Backend API configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ApiConfig {
    /// Base URL of the backend, e.g. `https://api.example.com`.
    pub base_url: String,

    /// API token sent as a bearer token.
    #[serde(default)]
    pub token: Option<String>,

    /// Organization selected at startup.
    #[serde(default)]
    pub org: Option<String>,

    /// Per-request timeout in seconds.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

const fn default_timeout_secs() -> u64 {
    30
}

/// Logging configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "warn".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_minimal_config() {
        let json = r#"{"api": {"base_url": "https://api.example.com"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.transport, TransportKind::Stdio);
        assert_eq!(config.server.port, 8080);
        assert!(!config.server.audit_log);
        assert_eq!(config.api.timeout_secs, 30);
    }

    #[test]
    fn parse_full_config() {
        let json = r#"{
            "$schema": "https://json-schema.org/draft/2020-12/schema",
            "_comment": "Test config",
            "server": {
                "transport": "stdio",
                "port": 9000,
                "audit_log": true
            },
            "api": {
                "base_url": "http://localhost:3000",
                "token": "secret",
                "org": "acme",
                "timeout_secs": 10
            },
            "logging": {
                "level": "debug"
            }
        }"#;

        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_ok());
        assert_eq!(config.server.port, 9000);
        assert!(config.server.audit_log);
        assert_eq!(config.api.token.as_deref(), Some("secret"));
        assert_eq!(config.api.org.as_deref(), Some("acme"));
        assert_eq!(config.api.timeout_secs, 10);
        assert_eq!(config.logging.level, "debug");
    }

    #[test]
    fn server_settings_defaults() {
        let settings = ServerSettings::default();
        assert_eq!(settings.transport, TransportKind::Stdio);
        assert_eq!(settings.port, 8080);
        assert!(!settings.audit_log);
    }

    #[test]
    fn logging_config_defaults() {
        let config = LoggingConfig::default();
        assert_eq!(config.level, "warn");
    }

    #[test]
    fn reject_unknown_transport() {
        let json = r#"{
            "server": { "transport": "websocket" },
            "api": { "base_url": "https://api.example.com" }
        }"#;

        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }

    #[test]
    fn reject_non_http_base_url() {
        let json = r#"{"api": {"base_url": "ftp://api.example.com"}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_zero_timeout() {
        let json = r#"{"api": {"base_url": "https://api.example.com", "timeout_secs": 0}}"#;
        let config: Config = serde_json::from_str(json).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn reject_missing_api_section() {
        let result: Result<Config, _> = serde_json::from_str("{}");
        assert!(result.is_err());
    }

    #[test]
    fn reject_unknown_fields() {
        let json = r#"{
            "api": { "base_url": "https://api.example.com" },
            "unknown_field": "value"
        }"#;

        let result: Result<Config, _> = serde_json::from_str(json);
        assert!(result.is_err());
    }
}
