// Copyright 2026 The Agent Relay Authors
// SPDX-License-Identifier: Apache-2.0

// Tool-call accumulator
//
// Streamed tool calls arrive as fragments: identity (id, name) usually on
// the first fragment of a slot, argument text spread across later ones that
// carry no identity at all. The accumulator remembers identity per slot and
// decides which fragments become outward events.

use crate::message::{normalize_arguments, ToolCall};
use serde_json::Value;
use std::collections::{HashMap, HashSet};

// ---------------------------------------------------------------------------
// Fragment
// ---------------------------------------------------------------------------

/// A possibly-partial tool call observed in one chunk.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolCallFragment {
    pub slot: usize,
    pub id: String,
    pub name: String,
    pub arguments: Value,
}

impl ToolCallFragment {
    pub fn new(
        slot: usize,
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: Value,
    ) -> Self {
        Self {
            slot,
            id: id.into(),
            name: name.into(),
            arguments,
        }
    }

    /// Extract a fragment from one raw tool-call entry.
    ///
    /// Works across the legacy (`function.name` / `function.arguments`),
    /// standard and chunked (`name` / `args`) shapes. The slot is the
    /// entry's `index` when present, else its position in the list.
    pub fn from_entry(position: usize, entry: &Value) -> Self {
        let slot = entry
            .get("index")
            .and_then(Value::as_u64)
            .and_then(|i| usize::try_from(i).ok())
            .unwrap_or(position);

        let function = entry.get("function");

        let id = entry.get("id").and_then(Value::as_str).unwrap_or_default();

        let name = function
            .and_then(|f| f.get("name"))
            .and_then(Value::as_str)
            .or_else(|| entry.get("name").and_then(Value::as_str))
            .unwrap_or_default();

        let arguments = function
            .and_then(|f| f.get("arguments"))
            .filter(|a| !a.is_null())
            .or_else(|| entry.get("args").filter(|a| !a.is_null()))
            .cloned()
            .unwrap_or_else(|| Value::String(String::new()));

        Self::new(slot, id, name, arguments)
    }
}

// ---------------------------------------------------------------------------
// Accumulator
// ---------------------------------------------------------------------------

/// The id and name most recently seen for a slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotIdentity {
    pub id: String,
    pub name: String,
}

/// Per-session tool-call state. Owned by exactly one streaming session.
#[derive(Debug, Default)]
pub struct ToolCallAccumulator {
    slots: HashMap<usize, SlotIdentity>,
    emitted_ids: HashSet<String>,
    completed_ids: HashSet<String>,
}

impl ToolCallAccumulator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one fragment into the accumulator.
    ///
    /// Returns the tool call to emit as a partial event, if any. A fragment
    /// is emitted on the first sighting of its id, or whenever it carries
    /// non-blank argument text. Fragments with neither are dropped. Never
    /// fails.
    pub fn reconcile(&mut self, fragment: ToolCallFragment) -> Option<ToolCall> {
        let ToolCallFragment {
            slot,
            mut id,
            mut name,
            arguments,
        } = fragment;

        if !id.is_empty() && !name.is_empty() {
            self.slots.insert(
                slot,
                SlotIdentity {
                    id: id.clone(),
                    name: name.clone(),
                },
            );
        } else if let Some(known) = self.slots.get(&slot) {
            if id.is_empty() {
                id.clone_from(&known.id);
            }
            if name.is_empty() {
                name.clone_from(&known.name);
            }
        }

        let first_sighting = !id.is_empty() && self.emitted_ids.insert(id.clone());
        let has_arguments = !normalize_arguments(&arguments).trim().is_empty();

        if first_sighting || has_arguments {
            Some(ToolCall::new(id, name, arguments))
        } else {
            None
        }
    }

    /// Record that a complete tool call has been emitted. Returns `false` if
    /// it already was.
    pub fn mark_complete(&mut self, id: &str) -> bool {
        self.completed_ids.insert(id.to_string())
    }

    #[cfg(test)]
    pub(crate) fn is_complete(&self, id: &str) -> bool {
        self.completed_ids.contains(id)
    }

    #[cfg(test)]
    pub(crate) fn has_emitted(&self, id: &str) -> bool {
        self.emitted_ids.contains(id)
    }

    #[cfg(test)]
    pub(crate) fn identity(&self, slot: usize) -> Option<&SlotIdentity> {
        self.slots.get(&slot)
    }
}
