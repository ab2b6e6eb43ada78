// Copyright 2026 The Agent Relay Authors
// SPDX-License-Identifier: Apache-2.0

// Stream types
//
// Upstream chunks, the decoded payload schema they are validated into,
// and classification errors.

use super::accumulator::ToolCallFragment;
use crate::message::{normalize_arguments, MessageContent};
use serde::Deserialize;
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Upstream chunk
// ---------------------------------------------------------------------------

/// One element yielded by the model-invocation source: a serialized message
/// plus free-form metadata about where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct UpstreamChunk {
    pub payload: Value,
    pub metadata: Value,
}

impl UpstreamChunk {
    pub fn new(payload: Value, metadata: Value) -> Self {
        Self { payload, metadata }
    }

    /// A chunk with no metadata.
    pub fn bare(payload: Value) -> Self {
        Self::new(payload, Value::Null)
    }

    /// Graph node that produced this chunk, if the source reported one.
    pub fn node(&self) -> Option<&str> {
        self.metadata.get("langgraph_node").and_then(Value::as_str)
    }
}

// ---------------------------------------------------------------------------
// Decoded payload schema
// ---------------------------------------------------------------------------

/// A payload decoded by its `type` discriminator.
#[derive(Debug)]
pub(crate) enum ChunkPayload {
    /// Streamed assistant delta (`AIMessageChunk`).
    AssistantDelta(AssistantMessage),
    /// Complete assistant message (`ai`).
    AssistantMessage(AssistantMessage),
    /// Tool execution result (`tool`).
    ToolResult(ToolMessage),
    /// Any other message type; produces no events.
    Ignored(String),
}

impl ChunkPayload {
    pub(crate) fn decode(payload: &Value) -> Result<Self, ClassificationError> {
        let object = payload.as_object().ok_or_else(|| {
            ClassificationError::MalformedPayload(format!(
                "expected a JSON object, got {}",
                json_kind(payload)
            ))
        })?;

        let kind = match object.get("type") {
            Some(Value::String(kind)) => kind.as_str(),
            Some(other) => {
                return Err(ClassificationError::MalformedPayload(format!(
                    "message type must be a string, got {}",
                    json_kind(other)
                )))
            }
            None => {
                return Err(ClassificationError::MalformedPayload(
                    "missing message type".to_string(),
                ))
            }
        };

        match kind {
            "AIMessageChunk" => AssistantMessage::deserialize(payload)
                .map(ChunkPayload::AssistantDelta)
                .map_err(|e| ClassificationError::NodeOutput(e.to_string())),
            "ai" | "AIMessage" => AssistantMessage::deserialize(payload)
                .map(ChunkPayload::AssistantMessage)
                .map_err(|e| ClassificationError::NodeOutput(e.to_string())),
            "tool" | "ToolMessage" => ToolMessage::deserialize(payload)
                .map(ChunkPayload::ToolResult)
                .map_err(|e| ClassificationError::ToolMessage(e.to_string())),
            other => Ok(ChunkPayload::Ignored(other.to_string())),
        }
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

/// Assistant output, streamed or complete. Every field is optional and
/// `null` is treated as absent.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct AssistantMessage {
    pub content: Option<MessageContent>,
    pub reasoning: Option<String>,
    pub additional_kwargs: Option<AdditionalKwargs>,
    /// Standard tool calls: `{id, name, args}`.
    pub tool_calls: Option<Vec<Value>>,
    /// Chunked tool calls: `{index, id, name, args}` with string args.
    pub tool_call_chunks: Option<Vec<Value>>,
    pub usage_metadata: Option<UsageMetadata>,
    pub response_metadata: Option<ResponseMetadata>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct AdditionalKwargs {
    /// Legacy OpenAI tool calls: `{index, id, function: {name, arguments}}`.
    pub tool_calls: Option<Vec<Value>>,
    pub reasoning_content: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct UsageMetadata {
    pub input_tokens: Option<u64>,
    pub output_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
    pub cost: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ResponseMetadata {
    pub token_usage: Option<LegacyTokenUsage>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct LegacyTokenUsage {
    pub prompt_tokens: Option<u64>,
    pub completion_tokens: Option<u64>,
    pub total_tokens: Option<u64>,
}

/// Tool execution result.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub(crate) struct ToolMessage {
    pub tool_call_id: Option<String>,
    pub name: Option<String>,
    pub content: Option<MessageContent>,
    /// May carry `tool_call` (original descriptor) and `arguments`.
    pub additional_kwargs: Option<Map<String, Value>>,
    /// May carry `tool_call`.
    pub metadata: Option<Map<String, Value>>,
}

// ---------------------------------------------------------------------------
// Tool-call sources
// ---------------------------------------------------------------------------

/// Where a delta's tool-call entries came from.
///
/// Sources are mutually exclusive: the first non-empty one in priority order
/// (legacy, standard, chunked) is used and the others are ignored.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum ToolCallSource<'a> {
    Legacy(&'a [Value]),
    Standard(&'a [Value]),
    Chunked(&'a [Value]),
}

impl<'a> ToolCallSource<'a> {
    pub(crate) fn entries(&self) -> &'a [Value] {
        match *self {
            ToolCallSource::Legacy(entries)
            | ToolCallSource::Standard(entries)
            | ToolCallSource::Chunked(entries) => entries,
        }
    }

    pub(crate) fn label(&self) -> &'static str {
        match self {
            ToolCallSource::Legacy(_) => "legacy",
            ToolCallSource::Standard(_) => "standard",
            ToolCallSource::Chunked(_) => "chunked",
        }
    }
}

fn non_empty(entries: Option<&Vec<Value>>) -> Option<&[Value]> {
    entries.map(Vec::as_slice).filter(|e| !e.is_empty())
}

impl AssistantMessage {
    /// Resolve the tool-call source for the delta path.
    pub(crate) fn tool_call_source(&self) -> Option<ToolCallSource<'_>> {
        let legacy = self
            .additional_kwargs
            .as_ref()
            .and_then(|k| non_empty(k.tool_calls.as_ref()));

        legacy
            .map(ToolCallSource::Legacy)
            .or_else(|| non_empty(self.tool_calls.as_ref()).map(ToolCallSource::Standard))
            .or_else(|| non_empty(self.tool_call_chunks.as_ref()).map(ToolCallSource::Chunked))
    }

    /// Complete tool calls attached to a finished message: the standard list,
    /// falling back to the legacy one.
    pub(crate) fn finalized_tool_calls(&self) -> &[Value] {
        non_empty(self.tool_calls.as_ref())
            .or_else(|| {
                self.additional_kwargs
                    .as_ref()
                    .and_then(|k| non_empty(k.tool_calls.as_ref()))
            })
            .unwrap_or(&[])
    }

    /// Whether the standard list already holds a fully materialized call:
    /// id, name and non-blank arguments. Streamed deltas carrying one are
    /// handled like a finished message.
    pub(crate) fn has_materialized_tool_calls(&self) -> bool {
        non_empty(self.tool_calls.as_ref())
            .unwrap_or(&[])
            .iter()
            .enumerate()
            .map(|(position, entry)| ToolCallFragment::from_entry(position, entry))
            .any(|fragment| {
                !fragment.id.is_empty()
                    && !fragment.name.is_empty()
                    && !normalize_arguments(&fragment.arguments).trim().is_empty()
            })
    }

    /// Text content, empty when absent.
    pub(crate) fn text(&self) -> String {
        self.content
            .as_ref()
            .map(MessageContent::text)
            .unwrap_or_default()
    }

    /// Reasoning text: the `reasoning` field, else `reasoning_content`.
    pub(crate) fn reasoning_text(&self) -> Option<&str> {
        self.reasoning
            .as_deref()
            .filter(|r| !r.is_empty())
            .or_else(|| {
                self.additional_kwargs
                    .as_ref()
                    .and_then(|k| k.reasoning_content.as_deref())
                    .filter(|r| !r.is_empty())
            })
    }
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// A chunk that could not be classified. Surfaced as one `error` event; the
/// stream carries on with the next chunk.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ClassificationError {
    #[error("error processing chunk: {0}")]
    MalformedPayload(String),

    #[error("error processing node output: {0}")]
    NodeOutput(String),

    #[error("error processing tool message: {0}")]
    ToolMessage(String),

    #[error("classifier panicked: {0}")]
    Panicked(String),
}
