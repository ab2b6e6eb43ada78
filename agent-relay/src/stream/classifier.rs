// Copyright 2026 The Agent Relay Authors
// SPDX-License-Identifier: Apache-2.0

// Chunk classifier
//
// Decides which events one upstream chunk produces. Assistant deltas fan
// out into content, reasoning, partial tool calls and usage. Finished
// assistant messages, and deltas whose standard list already holds a
// materialized call, carry complete tool calls instead of fragments. Tool
// messages become a tool call plus its response.

use super::accumulator::{ToolCallAccumulator, ToolCallFragment};
use super::types::{
    AssistantMessage, ChunkPayload, ClassificationError, ToolMessage, UpstreamChunk,
};
use crate::event::{Event, EventKind, TokenUsage};
use crate::message::ToolCall;
use serde_json::{Map, Value};

// ---------------------------------------------------------------------------
// Trait: ChunkClassifier
// ---------------------------------------------------------------------------

/// Turns one upstream chunk into outward events.
///
/// The accumulator belongs to the calling session and is threaded through
/// every call for that session. An `Err` affects only this chunk.
pub trait ChunkClassifier: Send + Sync {
    fn classify(
        &self,
        chunk: &UpstreamChunk,
        accumulator: &mut ToolCallAccumulator,
    ) -> Result<Vec<Event>, ClassificationError>;
}

// ---------------------------------------------------------------------------
// Message chunk classifier
// ---------------------------------------------------------------------------

/// Classifies serialized chat messages (`AIMessageChunk`, `ai`, `tool`).
///
/// Events within one chunk are ordered: content, reasoning, tool calls,
/// usage.
#[derive(Debug, Default, Clone, Copy)]
pub struct MessageChunkClassifier;

impl ChunkClassifier for MessageChunkClassifier {
    fn classify(
        &self,
        chunk: &UpstreamChunk,
        accumulator: &mut ToolCallAccumulator,
    ) -> Result<Vec<Event>, ClassificationError> {
        let events = match ChunkPayload::decode(&chunk.payload)? {
            ChunkPayload::AssistantDelta(message) => {
                let finalized = message.has_materialized_tool_calls();
                assistant_events(&message, finalized, accumulator)
            }
            ChunkPayload::AssistantMessage(message) => {
                let finalized = !message.finalized_tool_calls().is_empty();
                assistant_events(&message, finalized, accumulator)
            }
            ChunkPayload::ToolResult(message) => tool_result_events(&message, accumulator),
            ChunkPayload::Ignored(kind) => {
                tracing::debug!(kind = %kind, "ignoring chunk of unhandled message type");
                Vec::new()
            }
        };
        Ok(events)
    }
}

// ---------------------------------------------------------------------------
// Assistant output
// ---------------------------------------------------------------------------

fn assistant_events(
    message: &AssistantMessage,
    finalized: bool,
    accumulator: &mut ToolCallAccumulator,
) -> Vec<Event> {
    let mut events = Vec::new();

    let text = message.text();
    if !text.trim().is_empty() {
        events.push(EventKind::AgentChoice { content: text }.into());
    }

    if let Some(reasoning) = message.reasoning_text() {
        events.push(
            EventKind::AgentChoiceReasoning {
                content: reasoning.to_string(),
            }
            .into(),
        );
    }

    if finalized {
        push_finalized_tool_calls(message, accumulator, &mut events);
    } else {
        push_partial_tool_calls(message, accumulator, &mut events);
    }

    push_usage(message, &mut events);
    events
}

fn push_partial_tool_calls(
    message: &AssistantMessage,
    accumulator: &mut ToolCallAccumulator,
    events: &mut Vec<Event>,
) {
    let Some(source) = message.tool_call_source() else {
        return;
    };
    tracing::trace!(
        source = source.label(),
        entries = source.entries().len(),
        "tool call fragments"
    );

    for (position, entry) in source.entries().iter().enumerate() {
        let fragment = ToolCallFragment::from_entry(position, entry);
        if let Some(tool_call) = accumulator.reconcile(fragment) {
            events.push(EventKind::PartialToolCall { tool_call }.into());
        }
    }
}

fn push_finalized_tool_calls(
    message: &AssistantMessage,
    accumulator: &mut ToolCallAccumulator,
    events: &mut Vec<Event>,
) {
    for (position, entry) in message.finalized_tool_calls().iter().enumerate() {
        let ToolCallFragment {
            id,
            name,
            arguments,
            ..
        } = ToolCallFragment::from_entry(position, entry);
        let tool_call = ToolCall::new(id, name, arguments);

        if tool_call.is_complete() && accumulator.mark_complete(&tool_call.id) {
            events.push(EventKind::ToolCall { tool_call }.into());
        }
    }
}

fn push_usage(message: &AssistantMessage, events: &mut Vec<Event>) {
    if let Some(usage) = &message.usage_metadata {
        events.push(
            EventKind::TokenUsage {
                usage: TokenUsage {
                    input_tokens: usage.input_tokens.unwrap_or(0),
                    output_tokens: usage.output_tokens.unwrap_or(0),
                    total_tokens: usage.total_tokens.unwrap_or(0),
                    cost: usage.cost,
                },
            }
            .into(),
        );
    }

    let legacy = message
        .response_metadata
        .as_ref()
        .and_then(|m| m.token_usage.as_ref());
    if let Some(usage) = legacy {
        events.push(
            EventKind::TokenUsage {
                usage: TokenUsage {
                    input_tokens: usage.prompt_tokens.unwrap_or(0),
                    output_tokens: usage.completion_tokens.unwrap_or(0),
                    total_tokens: usage.total_tokens.unwrap_or(0),
                    cost: None,
                },
            }
            .into(),
        );
    }
}

// ---------------------------------------------------------------------------
// Tool results
// ---------------------------------------------------------------------------

fn tool_result_events(message: &ToolMessage, accumulator: &mut ToolCallAccumulator) -> Vec<Event> {
    let tool_call = tool_result_descriptor(message);
    let response = message
        .content
        .as_ref()
        .map(|c| c.to_response_string())
        .unwrap_or_default();

    let mut events = Vec::with_capacity(2);
    if tool_call.is_complete() {
        accumulator.mark_complete(&tool_call.id);
        events.push(
            EventKind::ToolCall {
                tool_call: tool_call.clone(),
            }
            .into(),
        );
    }
    events.push(
        EventKind::ToolCallResponse {
            tool_call,
            response,
        }
        .into(),
    );
    events
}

/// Rebuild the descriptor of the call a tool result answers.
///
/// Starts from `tool_call_id` / `name` with empty-object arguments, then
/// applies `additional_kwargs.tool_call`, `additional_kwargs.arguments` and
/// `metadata.tool_call` in that order. Only present, non-empty values
/// override.
fn tool_result_descriptor(message: &ToolMessage) -> ToolCall {
    let mut tool_call = ToolCall::new(
        message.tool_call_id.clone().unwrap_or_default(),
        message.name.clone().unwrap_or_default(),
        Value::Object(Map::new()),
    );

    let kwargs = message.additional_kwargs.as_ref();
    if let Some(side) = kwargs.and_then(|k| k.get("tool_call")) {
        overlay_descriptor(&mut tool_call, side);
    }
    if let Some(arguments) = kwargs.and_then(|k| k.get("arguments")).filter(|a| present(a)) {
        tool_call.arguments = arguments.clone();
    }
    if let Some(side) = message.metadata.as_ref().and_then(|m| m.get("tool_call")) {
        overlay_descriptor(&mut tool_call, side);
    }

    tool_call
}

fn overlay_descriptor(tool_call: &mut ToolCall, side: &Value) {
    let function = side.get("function");

    if let Some(id) = side.get("id").and_then(Value::as_str).filter(|s| !s.is_empty()) {
        tool_call.id = id.to_string();
    }

    let name = function
        .and_then(|f| f.get("name"))
        .and_then(Value::as_str)
        .or_else(|| side.get("name").and_then(Value::as_str))
        .filter(|s| !s.is_empty());
    if let Some(name) = name {
        tool_call.name = name.to_string();
    }

    let arguments = function
        .and_then(|f| f.get("arguments"))
        .filter(|a| present(a))
        .or_else(|| side.get("args").filter(|a| present(a)))
        .or_else(|| side.get("arguments").filter(|a| present(a)));
    if let Some(arguments) = arguments {
        tool_call.arguments = arguments.clone();
    }
}

/// Non-null and, for strings and containers, non-empty.
fn present(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}
