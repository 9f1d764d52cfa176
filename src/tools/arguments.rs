//! Typed access to tool call arguments.

use crate::error::QuillError;

/// Wrapper around tool call arguments providing typed extraction.
#[derive(Debug, Clone)]
pub struct ToolArguments {
    value: serde_json::Value,
}

impl ToolArguments {
    pub fn new(value: serde_json::Value) -> Self {
        Self { value }
    }

    /// The raw JSON value.
    pub fn raw(&self) -> &serde_json::Value {
        &self.value
    }

    pub fn get_str(&self, key: &str) -> Result<&str, QuillError> {
        self.value
            .get(key)
            .and_then(|v| v.as_str())
            .ok_or_else(|| QuillError::InvalidArgument(format!("missing string argument '{key}'")))
    }

    pub fn get_str_opt(&self, key: &str) -> Option<&str> {
        self.value.get(key).and_then(|v| v.as_str())
    }

    pub fn get_bool(&self, key: &str) -> Result<bool, QuillError> {
        self.value
            .get(key)
            .and_then(|v| v.as_bool())
            .ok_or_else(|| QuillError::InvalidArgument(format!("missing boolean argument '{key}'")))
    }

    pub fn get_u64(&self, key: &str) -> Result<u64, QuillError> {
        self.value
            .get(key)
            .and_then(|v| v.as_u64())
            .ok_or_else(|| QuillError::InvalidArgument(format!("missing integer argument '{key}'")))
    }

    /// Deserialize the entire arguments into a typed struct.
    pub fn deserialize<T: serde::de::DeserializeOwned>(&self) -> Result<T, QuillError> {
        serde_json::from_value(self.value.clone())
            .map_err(|e| QuillError::InvalidArgument(format!("argument shape mismatch: {e}")))
    }
}
