// Copyright 2026 The Agent Relay Authors
// SPDX-License-Identifier: Apache-2.0

// Conversation and tool-call types
//
// The inbound request body is decoded into `RunRequest` once, at the
// transport boundary. `ToolCall` is the canonical tool-call shape that
// every outward event carries.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// The role of a message participant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    #[default]
    #[serde(alias = "human")]
    User,
    #[serde(alias = "ai")]
    Assistant,
    Tool,
}

/// Message content: either plain text or a list of content blocks.
///
/// Block lists follow the `[{"type": "text", "text": "..."}, ...]` convention;
/// non-text blocks (images, tool_use, ...) carry no text.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Blocks(Vec<Value>),
}

impl Default for MessageContent {
    fn default() -> Self {
        MessageContent::Text(String::new())
    }
}

impl MessageContent {
    /// Text carried by this content. Text blocks are concatenated in order.
    pub fn text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Blocks(blocks) => blocks
                .iter()
                .filter(|b| b.get("type").and_then(Value::as_str) == Some("text"))
                .filter_map(|b| b.get("text").and_then(Value::as_str))
                .collect(),
        }
    }

    /// Render as a single string for a tool response.
    ///
    /// Block lists without any text part are JSON-encoded so nothing is lost.
    pub fn to_response_string(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Blocks(blocks) => {
                let text = self.text();
                if text.is_empty() && !blocks.is_empty() {
                    Value::Array(blocks.clone()).to_string()
                } else {
                    text
                }
            }
        }
    }
}

/// One prior message of the conversation, as sent by the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConversationMessage {
    #[serde(default)]
    pub role: Role,
    #[serde(default)]
    pub content: Option<MessageContent>,
}

impl ConversationMessage {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: Some(MessageContent::Text(content.into())),
        }
    }

    /// Text content, empty when absent.
    pub fn text(&self) -> String {
        self.content.as_ref().map(MessageContent::text).unwrap_or_default()
    }
}

/// Errors decoding the inbound request body.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    #[error("request body is empty")]
    EmptyBody,

    #[error("failed to parse request body: {0}")]
    Malformed(#[from] serde_json::Error),
}

/// The inbound run request: the conversation so far.
///
/// Accepts a bare JSON array of messages or an object with a `messages` key.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RunRequest {
    pub messages: Vec<ConversationMessage>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawRunRequest {
    Bare(Vec<ConversationMessage>),
    Wrapped { messages: Vec<ConversationMessage> },
}

impl RunRequest {
    pub fn new(messages: Vec<ConversationMessage>) -> Self {
        Self { messages }
    }

    /// Decode a request body.
    pub fn from_slice(body: &[u8]) -> Result<Self, RequestError> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Err(RequestError::EmptyBody);
        }
        let messages = match serde_json::from_slice::<RawRunRequest>(body)? {
            RawRunRequest::Bare(messages) => messages,
            RawRunRequest::Wrapped { messages } => messages,
        };
        Ok(Self { messages })
    }

    /// Text of the last message, if it is non-empty.
    pub fn trailing_user_text(&self) -> Option<String> {
        let text = self.messages.last()?.text();
        if text.is_empty() {
            None
        } else {
            Some(text)
        }
    }
}

/// A tool call as carried by outward events.
///
/// `arguments` keeps whatever shape upstream produced: a pre-stringified
/// (possibly partial) JSON string, or a structured value. It is rendered to a
/// string only on the wire, see [`normalize_arguments`].
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCall {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: Value) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// A tool call is complete once both its id and name are known.
    pub fn is_complete(&self) -> bool {
        !self.id.is_empty() && !self.name.is_empty()
    }

    /// Wire shape: `{id, type: "function", function: {name, arguments}}`.
    pub fn to_wire(&self) -> Value {
        json!({
            "id": self.id,
            "type": "function",
            "function": {
                "name": self.name,
                "arguments": normalize_arguments(&self.arguments),
            },
        })
    }
}

/// Render tool-call arguments as the string the wire format requires.
///
/// Strings pass through unchanged, an empty object becomes `""`, anything
/// else is JSON-encoded.
pub fn normalize_arguments(arguments: &Value) -> String {
    match arguments {
        Value::String(s) => s.clone(),
        Value::Object(map) if map.is_empty() => String::new(),
        other => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // ---------------------------------------------------------------
    // Argument normalization
    // ---------------------------------------------------------------

    #[test]
    fn string_arguments_pass_through() {
        let args = json!("{\"location\"");
        assert_eq!(normalize_arguments(&args), "{\"location\"");
    }

    #[test]
    fn empty_object_becomes_empty_string() {
        assert_eq!(normalize_arguments(&json!({})), "");
    }

    #[test]
    fn structured_arguments_are_json_encoded() {
        let encoded = normalize_arguments(&json!({"a": 1}));
        assert_eq!(encoded, r#"{"a":1}"#);
        let decoded: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, json!({"a": 1}));
    }

    #[test]
    fn normalization_is_idempotent() {
        let once = normalize_arguments(&json!({"location": "Tokyo"}));
        let twice = normalize_arguments(&Value::String(once.clone()));
        assert_eq!(once, twice);
    }

    #[test]
    fn non_object_values_are_encoded() {
        assert_eq!(normalize_arguments(&json!([1, 2])), "[1,2]");
        assert_eq!(normalize_arguments(&Value::Null), "null");
    }

    // ---------------------------------------------------------------
    // ToolCall
    // ---------------------------------------------------------------

    #[test]
    fn tool_call_wire_shape() {
        let tc = ToolCall::new("t1", "get_weather", json!({"location": "Tokyo"}));
        let wire = tc.to_wire();
        assert_eq!(wire["id"], "t1");
        assert_eq!(wire["type"], "function");
        assert_eq!(wire["function"]["name"], "get_weather");
        assert_eq!(wire["function"]["arguments"], r#"{"location":"Tokyo"}"#);
    }

    #[test]
    fn tool_call_completeness_needs_id_and_name() {
        assert!(ToolCall::new("t1", "get_weather", json!({})).is_complete());
        assert!(!ToolCall::new("", "get_weather", json!({})).is_complete());
        assert!(!ToolCall::new("t1", "", json!({})).is_complete());
    }

    // ---------------------------------------------------------------
    // Content
    // ---------------------------------------------------------------

    #[test]
    fn block_content_concatenates_text_parts() {
        let content = MessageContent::Blocks(vec![
            json!({"type": "text", "text": "Arr, "}),
            json!({"type": "image_url", "image_url": {"url": "x"}}),
            json!({"type": "text", "text": "matey"}),
        ]);
        assert_eq!(content.text(), "Arr, matey");
    }

    #[test]
    fn response_string_encodes_blocks_without_text() {
        let content = MessageContent::Blocks(vec![json!({"type": "json", "value": 7})]);
        assert_eq!(content.to_response_string(), r#"[{"type":"json","value":7}]"#);
    }

    // ---------------------------------------------------------------
    // RunRequest decoding
    // ---------------------------------------------------------------

    #[test]
    fn bare_message_array_decodes() {
        let req =
            RunRequest::from_slice(br#"[{"role":"user","content":"weather in Tokyo?"}]"#).unwrap();
        assert_eq!(req.messages.len(), 1);
        assert_eq!(req.messages[0].role, Role::User);
        assert_eq!(req.trailing_user_text().as_deref(), Some("weather in Tokyo?"));
    }

    #[test]
    fn wrapped_messages_decode() {
        let req = RunRequest::from_slice(
            br#"{"messages":[{"role":"system","content":"be a pirate"},{"role":"human","content":"hi"}]}"#,
        )
        .unwrap();
        assert_eq!(req.messages.len(), 2);
        assert_eq!(req.messages[1].role, Role::User);
        assert_eq!(req.trailing_user_text().as_deref(), Some("hi"));
    }

    #[test]
    fn role_defaults_to_user() {
        let req = RunRequest::from_slice(br#"[{"content":"hello"}]"#).unwrap();
        assert_eq!(req.messages[0].role, Role::User);
    }

    #[test]
    fn empty_trailing_content_yields_no_user_text() {
        let req = RunRequest::from_slice(br#"[{"role":"user","content":""}]"#).unwrap();
        assert_eq!(req.trailing_user_text(), None);

        let empty = RunRequest::from_slice(b"[]").unwrap();
        assert!(empty.messages.is_empty());
        assert_eq!(empty.trailing_user_text(), None);
    }

    #[test]
    fn malformed_body_is_rejected() {
        let err = RunRequest::from_slice(b"this is not json {{{").unwrap_err();
        assert!(matches!(err, RequestError::Malformed(_)));
        assert!(err.to_string().contains("failed to parse request body"));
    }

    #[test]
    fn empty_body_is_rejected() {
        let err = RunRequest::from_slice(b"  ").unwrap_err();
        assert!(matches!(err, RequestError::EmptyBody));
    }

    #[test]
    fn role_serialization_roundtrip() {
        let json_str = serde_json::to_string(&Role::Assistant).unwrap();
        assert_eq!(json_str, "\"assistant\"");
        let role: Role = serde_json::from_str("\"ai\"").unwrap();
        assert_eq!(role, Role::Assistant);
    }
}
