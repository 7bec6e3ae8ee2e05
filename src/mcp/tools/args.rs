//! Argument extraction and validation shared by the tools.
//!
//! All validation happens here, before a tool touches a collaborator.

use std::ops::RangeInclusive;
use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};

use crate::mcp::error::ToolError;

/// Characters allowed in an identifier, as the body of a regex class.
pub(crate) const IDENTIFIER_CHARS: &str = "A-Za-z0-9._-";

/// Minimum length of an identifier.
pub(crate) const MIN_IDENTIFIER_LEN: usize = 3;

static IDENTIFIER: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(&format!("^[{IDENTIFIER_CHARS}]+$")).unwrap());

/// The `arguments` object of a tool call, bound to the calling operation.
#[derive(Debug)]
pub struct Args {
    operation: &'static str,
    map: Map<String, Value>,
}

impl Args {
    /// Accepts an object or `null` (no arguments).
    ///
    /// # Errors
    ///
    /// Returns a validation error for any other JSON value.
    pub fn new(operation: &'static str, arguments: Value) -> Result<Self, ToolError> {
        let map = match arguments {
            Value::Object(map) => map,
            Value::Null => Map::new(),
            _ => {
                return Err(ToolError::validation(
                    operation,
                    "arguments must be a JSON object",
                ))
            }
        };
        Ok(Self { operation, map })
    }

    fn invalid(&self, message: String) -> ToolError {
        ToolError::validation(self.operation, message)
    }

    /// Returns an optional, trimmed, non-empty string.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the value is present but not a string,
    /// or is blank.
    pub fn optional_str(&self, key: &str) -> Result<Option<&str>, ToolError> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => {
                let s = s.trim();
                if s.is_empty() {
                    Err(self.invalid(format!("Parameter '{key}' must not be empty")))
                } else {
                    Ok(Some(s))
                }
            }
            Some(_) => Err(self.invalid(format!("Parameter '{key}' must be a string"))),
        }
    }

    /// Returns a required, trimmed, non-empty string.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the value is missing, not a string, or
    /// blank.
    pub fn required_str(&self, key: &str) -> Result<&str, ToolError> {
        self.optional_str(key)?
            .ok_or_else(|| self.invalid(format!("Missing required parameter: {key}")))
    }

    /// Returns a required identifier (environment id, service or volume
    /// name).
    ///
    /// # Errors
    ///
    /// Returns a validation error if the value is missing, too short, or
    /// contains characters outside `[A-Za-z0-9._-]`.
    pub fn identifier(&self, key: &str) -> Result<&str, ToolError> {
        let value = self.required_str(key)?;
        if value.chars().count() < MIN_IDENTIFIER_LEN {
            return Err(self.invalid(format!(
                "Parameter '{key}' is too short (minimum {MIN_IDENTIFIER_LEN} characters)"
            )));
        }
        if !IDENTIFIER.is_match(value) {
            return Err(self.invalid(format!(
                "Parameter '{key}' contains invalid characters \
                 (allowed: letters, digits, '.', '_', '-')"
            )));
        }
        Ok(value)
    }

    /// Returns an optional non-negative integer within `range`.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the value is not an integer or falls
    /// outside `range`.
    pub fn optional_u32(
        &self,
        key: &str,
        range: RangeInclusive<u32>,
    ) -> Result<Option<u32>, ToolError> {
        let Some(value) = self.optional_u64(key)? else {
            return Ok(None);
        };
        u32::try_from(value)
            .ok()
            .filter(|v| range.contains(v))
            .map(Some)
            .ok_or_else(|| {
                self.invalid(format!(
                    "Parameter '{key}' must be between {} and {}",
                    range.start(),
                    range.end()
                ))
            })
    }

    /// Returns an optional non-negative integer.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the value is not a non-negative integer.
    pub fn optional_u64(&self, key: &str) -> Result<Option<u64>, ToolError> {
        match self.map.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value.as_u64().map(Some).ok_or_else(|| {
                self.invalid(format!("Parameter '{key}' must be a non-negative integer"))
            }),
        }
    }

    /// Returns a required non-negative integer.
    ///
    /// # Errors
    ///
    /// Returns a validation error if the value is missing or not a
    /// non-negative integer.
    pub fn required_u64(&self, key: &str) -> Result<u64, ToolError> {
        self.optional_u64(key)?
            .ok_or_else(|| self.invalid(format!("Missing required parameter: {key}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mcp::error::ErrorKind;
    use serde_json::json;

    fn args(value: Value) -> Args {
        Args::new("test_op", value).unwrap()
    }

    #[test]
    fn non_object_arguments_rejected() {
        let err = Args::new("test_op", json!([1, 2])).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert!(Args::new("test_op", Value::Null).is_ok());
    }

    #[test]
    fn identifier_rules() {
        let a = args(json!({
            "ok": "  env-123 ",
            "short": "ab",
            "bad": "env/123",
            "num": 42
        }));
        assert_eq!(a.identifier("ok").unwrap(), "env-123");
        assert!(a.identifier("short").unwrap_err().message().contains("too short"));
        assert!(a
            .identifier("bad")
            .unwrap_err()
            .message()
            .contains("invalid characters"));
        assert!(a.identifier("num").unwrap_err().message().contains("must be a string"));
        assert_eq!(
            a.identifier("missing").unwrap_err().message(),
            "Missing required parameter: missing"
        );
    }

    #[test]
    fn blank_string_rejected() {
        let a = args(json!({"name": "   "}));
        assert!(a.optional_str("name").is_err());
    }

    #[test]
    fn integer_ranges() {
        let a = args(json!({"page": 0, "size": 50, "neg": -1, "big": 5_000_000_000_u64}));
        assert!(a.optional_u32("page", 1..=u32::MAX).is_err());
        assert_eq!(a.optional_u32("size", 1..=100).unwrap(), Some(50));
        assert!(a.optional_u64("neg").is_err());
        assert!(a.optional_u32("big", 0..=u32::MAX).is_err());
        assert_eq!(a.optional_u32("absent", 1..=100).unwrap(), None);
    }
}
