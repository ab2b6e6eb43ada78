// Copyright 2026 The Agent Relay Authors
// SPDX-License-Identifier: Apache-2.0

// Outward event model
//
// The closed set of events a client sees, and their SSE wire shape.
// Serialization builds `serde_json::Value`s directly, so it cannot fail.

use crate::message::ToolCall;
use serde_json::{json, Map, Value};

/// Token consumption reported for one model response.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct TokenUsage {
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub total_tokens: u64,
    pub cost: Option<f64>,
}

impl TokenUsage {
    fn to_wire(self) -> Value {
        let mut usage = json!({
            "input_tokens": self.input_tokens,
            "output_tokens": self.output_tokens,
            "total_tokens": self.total_tokens,
        });
        if let Some(cost) = self.cost {
            usage["cost"] = json!(cost);
        }
        usage
    }
}

/// The kind-specific payload of an event.
#[derive(Debug, Clone, PartialEq)]
pub enum EventKind {
    UserMessage { message: String },
    StreamStarted,
    StreamStopped,
    AgentChoice { content: String },
    AgentChoiceReasoning { content: String },
    ToolCall { tool_call: ToolCall },
    PartialToolCall { tool_call: ToolCall },
    ToolCallResponse { tool_call: ToolCall, response: String },
    TokenUsage { usage: TokenUsage },
    Error { error: String },
}

impl EventKind {
    /// The `type` discriminator on the wire.
    pub fn type_name(&self) -> &'static str {
        match self {
            EventKind::UserMessage { .. } => "user_message",
            EventKind::StreamStarted => "stream_started",
            EventKind::StreamStopped => "stream_stopped",
            EventKind::AgentChoice { .. } => "agent_choice",
            EventKind::AgentChoiceReasoning { .. } => "agent_choice_reasoning",
            EventKind::ToolCall { .. } => "tool_call",
            EventKind::PartialToolCall { .. } => "partial_tool_call",
            EventKind::ToolCallResponse { .. } => "tool_call_response",
            EventKind::TokenUsage { .. } => "token_usage",
            EventKind::Error { .. } => "error",
        }
    }
}

/// One outward event, optionally attributed to an agent.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    pub kind: EventKind,
    pub agent_name: Option<String>,
}

impl Event {
    pub fn new(kind: EventKind) -> Self {
        Self {
            kind,
            agent_name: None,
        }
    }

    pub fn with_agent_name(mut self, agent_name: impl Into<String>) -> Self {
        self.agent_name = Some(agent_name.into());
        self
    }

    pub fn user_message(message: impl Into<String>) -> Self {
        Self::new(EventKind::UserMessage {
            message: message.into(),
        })
    }

    pub fn error(error: impl Into<String>) -> Self {
        Self::new(EventKind::Error {
            error: error.into(),
        })
    }

    pub fn type_name(&self) -> &'static str {
        self.kind.type_name()
    }

    /// Fill in the session's agent name if none is set yet.
    ///
    /// User messages are never attributed. An agent name that is already set
    /// is left alone.
    pub fn attribute(&mut self, agent_name: &str) {
        if matches!(self.kind, EventKind::UserMessage { .. }) {
            return;
        }
        let unset = self.agent_name.as_deref().map_or(true, str::is_empty);
        if unset && !agent_name.is_empty() {
            self.agent_name = Some(agent_name.to_string());
        }
    }

    /// The JSON object sent to the client.
    pub fn to_json(&self) -> Value {
        let mut data = Map::new();
        data.insert("type".into(), Value::from(self.type_name()));

        match &self.kind {
            EventKind::UserMessage { message } => {
                data.insert("message".into(), Value::from(message.as_str()));
            }
            EventKind::StreamStarted | EventKind::StreamStopped => {}
            EventKind::AgentChoice { content } | EventKind::AgentChoiceReasoning { content } => {
                data.insert("content".into(), Value::from(content.as_str()));
            }
            EventKind::ToolCall { tool_call } | EventKind::PartialToolCall { tool_call } => {
                data.insert("tool_call".into(), tool_call.to_wire());
            }
            EventKind::ToolCallResponse {
                tool_call,
                response,
            } => {
                data.insert("tool_call".into(), tool_call.to_wire());
                data.insert("response".into(), Value::from(response.as_str()));
            }
            EventKind::TokenUsage { usage } => {
                data.insert("usage".into(), usage.to_wire());
            }
            EventKind::Error { error } => {
                data.insert("error".into(), Value::from(error.as_str()));
            }
        }

        if let Some(name) = self.agent_name.as_deref().filter(|n| !n.is_empty()) {
            data.insert("agent_name".into(), Value::from(name));
        }

        Value::Object(data)
    }

    /// One SSE frame: `data: <json>\n\n`.
    pub fn to_sse(&self) -> String {
        format!("data: {}\n\n", self.to_json())
    }
}

impl From<EventKind> for Event {
    fn from(kind: EventKind) -> Self {
        Event::new(kind)
    }
}
