//! Typed access to tool call arguments.

use crate::error::{BatonError, Result};

/// Wrapper around tool call arguments providing typed extraction.
#[derive(Debug, Clone)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// Decode raw model arguments.
    ///
    /// Models may send arguments as an encoded JSON string; an empty string
    /// means no arguments. Anything that does not decode to a JSON value is an
    /// error.
    pub fn parse(raw: &serde_json::Value) -> std::result::Result<Self, String> {
        match raw {
            serde_json::Value::String(encoded) => {
                let trimmed = encoded.trim();
                if trimmed.is_empty() {
                    return Ok(Self::new(serde_json::json!({})));
                }
                serde_json::from_str::<serde_json::Value>(trimmed)
                    .map(Self::new)
                    .map_err(|e| format!("arguments are not valid JSON: {e}"))
            }
            serde_json::Value::Null => Ok(Self::new(serde_json::json!({}))),
            other => Ok(Self::new(other.clone())),
        }
    }

    /// Get the raw JSON value.
    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    pub fn into_value(self) -> serde_json::Value {
        self.value
    }

    /// Get a string argument by key.
    pub fn get_str(&self, key: &str) -> Result<&str> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| BatonError::InvalidArgument(format!("Missing string argument: {key}")))
    }

    /// Get an optional string argument.
    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    pub fn get_i64(&self, key: &str) -> Result<i64> {
        self.value
            .get(key)
            .and_then(|v| v.as_i64())
            .ok_or_else(|| BatonError::InvalidArgument(format!("Missing integer argument: {key}")))
    }

    pub fn get_f64(&self, key: &str) -> Result<f64> {
        self.value
            .get(key)
            .and_then(|v| v.as_f64())
            .ok_or_else(|| BatonError::InvalidArgument(format!("Missing float argument: {key}")))
    }

    pub fn get_bool(&self, key: &str) -> Result<bool> {
        self.value
            .get(key)
            .and_then(|v| v.as_bool())
            .ok_or_else(|| BatonError::InvalidArgument(format!("Missing boolean argument: {key}")))
    }

    pub fn get_array(&self, key: &str) -> Result<&Vec<serde_json::Value>> {
        self.value
            .get(key)
            .and_then(|v| v.as_array())
            .ok_or_else(|| BatonError::InvalidArgument(format!("Missing array argument: {key}")))
    }

    /// Deserialize the entire arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_value(self.value.clone()).map_err(|e| {
            BatonError::InvalidArgument(format!("Failed to deserialize arguments: {e}"))
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn encoded_string_arguments_are_decoded() {
        let args = ToolArguments::parse(&json!("{\"city\": \"Oslo\"}")).unwrap();
        assert_eq!(args.get_str("city").unwrap(), "Oslo");
    }

    #[test]
    fn empty_string_means_no_arguments() {
        let args = ToolArguments::parse(&json!("  ")).unwrap();
        assert_eq!(args.raw(), &json!({}));
    }

    #[test]
    fn malformed_string_is_rejected() {
        let err = ToolArguments::parse(&json!("{city: Oslo")).unwrap_err();
        assert!(err.contains("not valid JSON"));
    }

    #[test]
    fn typed_getters_report_missing_keys() {
        let args = ToolArguments::new(json!({"n": 3, "flag": true}));
        assert_eq!(args.get_i64("n").unwrap(), 3);
        assert!(args.get_bool("flag").unwrap());
        assert!(matches!(
            args.get_str("missing"),
            Err(BatonError::InvalidArgument(_))
        ));
    }
}
