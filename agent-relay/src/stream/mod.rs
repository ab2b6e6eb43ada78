// Copyright 2026 The Agent Relay Authors
// SPDX-License-Identifier: Apache-2.0

// Streaming normalization
//
// Responsibilities:
// - Decode each upstream chunk into a typed payload
// - Fan chunks out into content, reasoning, tool call and usage events
// - Reconcile fragmented tool calls into stable identities
// - Drive the session lifecycle: started, per-chunk events, stopped
// - Isolate per-chunk failures; surface fatal source errors once

mod accumulator;
mod classifier;
mod orchestrator;
mod types;

pub use accumulator::{ToolCallAccumulator, ToolCallFragment};
pub use classifier::{ChunkClassifier, MessageChunkClassifier};
pub use orchestrator::{SessionPhase, StreamOrchestrator, DEFAULT_CHANNEL_CAPACITY};
pub use types::{ClassificationError, UpstreamChunk};

#[cfg(test)]
mod tests;
