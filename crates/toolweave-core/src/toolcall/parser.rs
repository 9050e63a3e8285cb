//! Tool-call plan parsing
//!
//! Accepted shapes (surrounding whitespace ignored):
//! - a single object: `{"call_id": "a", ...}`
//! - an array of objects
//! - an object keyed by call id: `{"a": {"tool_name": ...}, "b": {...}}`
//! - several objects separated by whitespace or newlines

use serde::Deserialize;
use serde_json::{Map, Value};
use thiserror::Error;

use super::node::ToolCallNode;

const NODE_FIELDS: [&str; 6] = [
    "call_id",
    "tool_name",
    "call_intent",
    "depends_on",
    "allow_failed",
    "disallow_failed",
];

/// Tool-call parse errors
#[derive(Debug, Error)]
pub enum ParseError {
    #[error("malformed tool call input: {0}")]
    Malformed(String),

    #[error("malformed tool call input: {0}")]
    Json(#[from] serde_json::Error),

    #[error("missing call_id in tool call #{0}")]
    MissingCallId(usize),
}

#[derive(Debug, Deserialize)]
struct RawToolCall {
    #[serde(default)]
    call_id: Option<String>,
    #[serde(default)]
    tool_name: Option<String>,
    #[serde(default)]
    call_intent: Option<String>,
    #[serde(default)]
    depends_on: Option<Vec<String>>,
    #[serde(default)]
    allow_failed: Option<bool>,
    #[serde(default)]
    disallow_failed: Option<bool>,
}

impl RawToolCall {
    fn into_node(self, position: usize) -> Result<ToolCallNode, ParseError> {
        let call_id = self
            .call_id
            .filter(|id| !id.is_empty())
            .ok_or(ParseError::MissingCallId(position))?;
        // An explicit `allow_failed: true` wins; otherwise only an explicit
        // `disallow_failed: false` makes the call tolerant.
        let allow_failed = self.allow_failed == Some(true) || self.disallow_failed == Some(false);
        Ok(ToolCallNode {
            call_id,
            tool_name: self.tool_name.unwrap_or_default(),
            call_intent: self.call_intent.unwrap_or_default(),
            depends_on: self.depends_on.unwrap_or_default(),
            allow_failed,
        })
    }
}

/// Parse a tool-call plan from text
pub fn parse_tool_call_nodes(input: &str) -> Result<Vec<ToolCallNode>, ParseError> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return Err(ParseError::Malformed("empty input".to_string()));
    }
    if !trimmed.starts_with('{') && !trimmed.starts_with('[') {
        return Err(ParseError::Malformed(
            "expected a JSON object or array".to_string(),
        ));
    }

    let mut values = serde_json::Deserializer::from_str(trimmed)
        .into_iter::<Value>()
        .collect::<Result<Vec<_>, _>>()?;

    let nodes = if values.len() == 1 {
        match values.remove(0) {
            Value::Array(items) => parse_array(items)?,
            Value::Object(map) => parse_object(map)?,
            _ => {
                return Err(ParseError::Malformed(
                    "expected a JSON object or array".to_string(),
                ))
            }
        }
    } else {
        let mut nodes = Vec::with_capacity(values.len());
        for (position, value) in values.into_iter().enumerate() {
            nodes.push(parse_record(value, position)?);
        }
        nodes
    };

    tracing::debug!(nodes = nodes.len(), "parsed tool call plan");
    Ok(nodes)
}

/// Parse a tool-call plan from raw bytes
pub fn parse_tool_call_bytes(input: &[u8]) -> Result<Vec<ToolCallNode>, ParseError> {
    let text = std::str::from_utf8(input)
        .map_err(|e| ParseError::Malformed(format!("input is not valid UTF-8: {}", e)))?;
    parse_tool_call_nodes(text)
}

fn parse_array(items: Vec<Value>) -> Result<Vec<ToolCallNode>, ParseError> {
    if items.is_empty() {
        return Err(ParseError::Malformed("empty array".to_string()));
    }
    items
        .into_iter()
        .enumerate()
        .map(|(position, value)| parse_record(value, position))
        .collect()
}

fn parse_object(map: Map<String, Value>) -> Result<Vec<ToolCallNode>, ParseError> {
    if map.is_empty() {
        return Err(ParseError::Malformed("empty object".to_string()));
    }

    let looks_like_node = NODE_FIELDS.iter().any(|field| map.contains_key(*field));
    let keyed_by_id = !looks_like_node && map.values().all(Value::is_object);
    if !keyed_by_id {
        return Ok(vec![parse_record(Value::Object(map), 0)?]);
    }

    let mut nodes = Vec::with_capacity(map.len());
    for (position, (key, value)) in map.into_iter().enumerate() {
        let mut raw: RawToolCall = serde_json::from_value(value)?;
        if raw.call_id.as_deref().map_or(true, str::is_empty) {
            raw.call_id = Some(key);
        }
        nodes.push(raw.into_node(position)?);
    }
    Ok(nodes)
}

fn parse_record(value: Value, position: usize) -> Result<ToolCallNode, ParseError> {
    if !value.is_object() {
        return Err(ParseError::Malformed(format!(
            "tool call #{} is not an object",
            position
        )));
    }
    let raw: RawToolCall = serde_json::from_value(value)?;
    raw.into_node(position)
}
