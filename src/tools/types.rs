//! Tool types for Conductor
//!
//! This module defines the core types for tool execution: the `Tool` trait
//! every capability implements (local or MCP-backed), the input schema used
//! for validation, and the call/result pair exchanged with the reasoning loop.

use std::collections::BTreeMap;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::{ConductorError, Result};

/// Declared shape of a tool's input.
///
/// Only the parts needed for validation are interpreted: the required field
/// names, the property map and whether unknown fields are rejected.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSchema {
    #[serde(rename = "type", default = "default_schema_type")]
    pub schema_type: String,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub required: Vec<String>,
    #[serde(
        rename = "additionalProperties",
        default = "default_additional",
        skip_serializing_if = "is_true"
    )]
    pub additional_properties: bool,
}

fn default_schema_type() -> String {
    "object".to_string()
}

fn default_additional() -> bool {
    true
}

fn is_true(b: &bool) -> bool {
    *b
}

impl Default for InputSchema {
    fn default() -> Self {
        Self {
            schema_type: default_schema_type(),
            properties: BTreeMap::new(),
            required: Vec::new(),
            additional_properties: true,
        }
    }
}

impl InputSchema {
    /// An empty object schema that accepts anything.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an optional property.
    pub fn property(mut self, name: &str, schema: Value) -> Self {
        self.properties.insert(name.to_string(), schema);
        self
    }

    /// Add a required property.
    pub fn required_property(mut self, name: &str, schema: Value) -> Self {
        self.properties.insert(name.to_string(), schema);
        self.required.push(name.to_string());
        self
    }

    /// Reject input keys outside `required` and `properties`.
    pub fn deny_unknown(mut self) -> Self {
        self.additional_properties = false;
        self
    }

    /// Build a schema from an arbitrary JSON schema value (as sent by MCP
    /// servers). Keywords are read one by one; malformed or unknown ones are
    /// ignored. Unknown input fields are denied only for
    /// `"additionalProperties": false`.
    pub fn from_value(value: &Value) -> Self {
        let mut schema = Self::default();
        let Some(obj) = value.as_object() else {
            return schema;
        };

        if let Some(t) = obj.get("type").and_then(Value::as_str) {
            schema.schema_type = t.to_string();
        }
        if let Some(props) = obj.get("properties").and_then(Value::as_object) {
            schema.properties = props
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
        }
        if let Some(required) = obj.get("required").and_then(Value::as_array) {
            schema.required = required
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect();
        }
        schema.additional_properties =
            !matches!(obj.get("additionalProperties"), Some(Value::Bool(false)));
        schema
    }

    /// Check `input` against this schema.
    ///
    /// Required fields are checked first, then unknown fields when
    /// `additional_properties` is false. A non-object input is treated as
    /// having no fields.
    pub fn validate(&self, input: &Value) -> Result<()> {
        let empty = Map::new();
        let fields = input.as_object().unwrap_or(&empty);

        if let Some(missing) = self.required.iter().find(|f| !fields.contains_key(*f)) {
            return Err(ConductorError::MissingField(missing.clone()));
        }

        if !self.additional_properties {
            if let Some(extra) = fields
                .keys()
                .find(|k| !self.properties.contains_key(*k) && !self.required.contains(*k))
            {
                return Err(ConductorError::UnexpectedField(extra.clone()));
            }
        }

        Ok(())
    }
}

/// Tool definition advertised to the completion provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: InputSchema,
}

/// A tool invocation requested by the completion provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub input: Value,
}

impl ToolCall {
    pub fn new(id: &str, name: &str, input: Value) -> Self {
        Self {
            id: id.to_string(),
            name: name.to_string(),
            input,
        }
    }
}

/// Outcome of one tool call. Failures are reported here, never thrown.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolResult {
    pub tool_call_id: String,
    pub content: String,
    pub is_error: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
}

impl ToolResult {
    /// Successful result.
    pub fn success(tool_call_id: &str, content: impl Into<String>) -> Self {
        Self {
            tool_call_id: tool_call_id.to_string(),
            content: content.into(),
            is_error: false,
            error_message: None,
        }
    }

    /// Error result; the message doubles as the content.
    pub fn error(tool_call_id: &str, message: impl Into<String>) -> Self {
        let message = message.into();
        Self {
            tool_call_id: tool_call_id.to_string(),
            content: format!("Error: {}", message),
            is_error: true,
            error_message: Some(message),
        }
    }
}

/// The trait every tool implements.
///
/// Local tools and MCP-backed wrappers share this interface, so the executor
/// dispatches without knowing where a tool runs.
///
/// # Example
///
/// ```
/// use async_trait::async_trait;
/// use conductor::tools::{InputSchema, Tool};
/// use conductor::error::Result;
/// use serde_json::{json, Value};
///
/// struct Upper;
///
/// #[async_trait]
/// impl Tool for Upper {
///     fn name(&self) -> &str { "upper" }
///     fn description(&self) -> &str { "Uppercase a string" }
///     fn input_schema(&self) -> InputSchema {
///         InputSchema::new().required_property("text", json!({"type": "string"}))
///     }
///     async fn execute(&self, input: Value) -> Result<Value> {
///         let text = input["text"].as_str().unwrap_or_default();
///         Ok(Value::String(text.to_uppercase()))
///     }
/// }
/// ```
#[async_trait]
pub trait Tool: Send + Sync {
    /// Unique name within a registry.
    fn name(&self) -> &str;

    /// Human readable description sent to the provider.
    fn description(&self) -> &str;

    /// Declared input shape, checked before every execution.
    fn input_schema(&self) -> InputSchema;

    /// Run the tool. Non-string values are pretty printed by the executor.
    async fn execute(&self, input: Value) -> Result<Value>;

    /// Definition advertised to the provider.
    fn definition(&self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
        }
    }
}
