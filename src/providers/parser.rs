//! Parsing of raw provider payloads into text and tool calls.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use tracing::debug;

use crate::error::{ConductorError, Result};
use crate::tools::ToolCall;

/// Token counts reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u64,
    pub output_tokens: u64,
}

/// A provider payload after parsing.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParsedResponse {
    pub text: String,
    pub reasoning: Option<String>,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Option<Usage>,
}

impl ParsedResponse {
    pub fn has_tool_calls(&self) -> bool {
        !self.tool_calls.is_empty()
    }
}

/// Parse a provider payload.
///
/// Fails with `MalformedResponse` when the payload is not an object or a tool
/// call has no `name`. A missing call id is replaced by a generated one.
pub fn parse_response(value: &Value) -> Result<ParsedResponse> {
    let obj = value.as_object().ok_or_else(|| {
        ConductorError::MalformedResponse(format!(
            "expected an object, got {}",
            json_kind(value)
        ))
    })?;

    let text = obj
        .get("response")
        .or_else(|| obj.get("text"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();

    let reasoning = obj
        .get("reasoning")
        .and_then(Value::as_str)
        .filter(|r| !r.is_empty())
        .map(str::to_string);

    let tool_calls = match obj.get("tool_calls") {
        Some(Value::Array(calls)) => calls
            .iter()
            .enumerate()
            .map(|(i, call)| parse_tool_call(i, call))
            .collect::<Result<Vec<_>>>()?,
        _ => Vec::new(),
    };

    let usage = obj.get("usage").and_then(Value::as_object).map(|u| Usage {
        input_tokens: u.get("input_tokens").and_then(Value::as_u64).unwrap_or(0),
        output_tokens: u.get("output_tokens").and_then(Value::as_u64).unwrap_or(0),
    });

    Ok(ParsedResponse {
        text,
        reasoning,
        tool_calls,
        usage,
    })
}

fn parse_tool_call(index: usize, call: &Value) -> Result<ToolCall> {
    let obj = call.as_object().ok_or_else(|| {
        ConductorError::MalformedResponse(format!("tool call {} is not an object", index))
    })?;

    let name = obj
        .get("name")
        .and_then(Value::as_str)
        .filter(|n| !n.is_empty())
        .ok_or_else(|| {
            ConductorError::MalformedResponse(format!("tool call {} is missing a name", index))
        })?;

    let id = match obj.get("id").and_then(Value::as_str) {
        Some(id) if !id.is_empty() => id.to_string(),
        _ => {
            let id = format!("call_{}", uuid::Uuid::new_v4().simple());
            debug!(tool = %name, id = %id, "Generated id for tool call");
            id
        }
    };

    Ok(ToolCall {
        id,
        name: name.to_string(),
        input: tool_input(obj),
    })
}

/// `input`, else `arguments` (JSON strings are decoded), else `{}`.
fn tool_input(obj: &Map<String, Value>) -> Value {
    match obj.get("input").or_else(|| obj.get("arguments")) {
        Some(Value::String(raw)) => serde_json::from_str(raw).unwrap_or_else(|_| {
            debug!("Tool arguments are not valid JSON, passing them as a string");
            Value::String(raw.clone())
        }),
        Some(Value::Null) | None => Value::Object(Map::new()),
        Some(other) => other.clone(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_text_only() {
        let parsed = parse_response(&json!({"response": "hi", "tool_calls": []})).unwrap();
        assert_eq!(parsed.text, "hi");
        assert!(!parsed.has_tool_calls());
        assert!(parsed.reasoning.is_none());
        assert!(parsed.usage.is_none());
    }

    #[test]
    fn test_parse_tool_calls() {
        let parsed = parse_response(&json!({
            "response": "reading",
            "reasoning": "need the file",
            "tool_calls": [
                {"id": "c1", "name": "read_file", "input": {"path": "a.txt"}},
                {"name": "list", "arguments": "{\"dir\": \".\"}"},
                {"name": "noargs"}
            ],
            "usage": {"input_tokens": 12, "output_tokens": 3}
        }))
        .unwrap();

        assert_eq!(parsed.reasoning.as_deref(), Some("need the file"));
        assert_eq!(parsed.tool_calls.len(), 3);
        assert_eq!(parsed.tool_calls[0].id, "c1");
        assert_eq!(parsed.tool_calls[0].input, json!({"path": "a.txt"}));
        assert!(parsed.tool_calls[1].id.starts_with("call_"));
        assert_eq!(parsed.tool_calls[1].input, json!({"dir": "."}));
        assert_eq!(parsed.tool_calls[2].input, json!({}));
        assert_eq!(
            parsed.usage,
            Some(Usage {
                input_tokens: 12,
                output_tokens: 3
            })
        );
    }

    #[test]
    fn test_text_fallback_and_missing() {
        assert_eq!(parse_response(&json!({"text": "alt"})).unwrap().text, "alt");
        assert_eq!(parse_response(&json!({})).unwrap().text, "");
    }

    #[test]
    fn test_non_array_tool_calls_ignored() {
        let parsed = parse_response(&json!({"response": "x", "tool_calls": "nope"})).unwrap();
        assert!(parsed.tool_calls.is_empty());
    }

    #[test]
    fn test_non_object_payload_is_malformed() {
        let err = parse_response(&json!("just text")).unwrap_err();
        assert!(matches!(err, ConductorError::MalformedResponse(_)));
        assert!(err.to_string().contains("a string"));
    }

    #[test]
    fn test_missing_name_is_malformed() {
        let err = parse_response(&json!({"tool_calls": [{"id": "c1", "input": {}}]})).unwrap_err();
        assert!(matches!(err, ConductorError::MalformedResponse(_)));
    }

    #[test]
    fn test_generated_ids_unique() {
        let parsed = parse_response(&json!({"tool_calls": [{"name": "a"}, {"name": "a"}]})).unwrap();
        assert_ne!(parsed.tool_calls[0].id, parsed.tool_calls[1].id);
    }
}
