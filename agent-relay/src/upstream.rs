// Copyright 2026 The Agent Relay Authors
// SPDX-License-Identifier: Apache-2.0

// Upstream chunk sources
//
// The model-invocation engine is a black box behind `ChunkSource`. The
// shipped implementation replays a recorded JSONL transcript.

use crate::message::ConversationMessage;
use crate::stream::UpstreamChunk;
use futures_util::stream::BoxStream;
use futures_util::StreamExt;
use serde::Deserialize;
use serde_json::Value;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;

/// Async sequence of upstream chunks. An `Err` item is fatal to the session.
pub type ChunkStream = BoxStream<'static, Result<UpstreamChunk, SourceError>>;

/// Errors opening or reading an upstream source.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("failed to open upstream source: {0}")]
    Open(String),

    #[error("upstream source failed: {0}")]
    Upstream(String),

    #[error("failed to read transcript: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid transcript line {line}: {reason}")]
    InvalidTranscript { line: usize, reason: String },
}

// ---------------------------------------------------------------------------
// Trait: ChunkSource
// ---------------------------------------------------------------------------

/// Produces the chunk stream for one session.
///
/// Implementations run the model with the given conversation, scoped to
/// `thread_id`. Dropping the returned stream must release the upstream.
#[async_trait::async_trait]
pub trait ChunkSource: Send + Sync {
    async fn open(
        &self,
        messages: Vec<ConversationMessage>,
        thread_id: &str,
    ) -> Result<ChunkStream, SourceError>;
}

// ---------------------------------------------------------------------------
// Replay source
// ---------------------------------------------------------------------------

/// One transcript line: `{"payload": ..., "metadata": ...}` or
/// `[payload, metadata]`.
#[derive(Deserialize)]
#[serde(untagged)]
enum TranscriptLine {
    Object {
        payload: Value,
        #[serde(default)]
        metadata: Value,
    },
    Pair(Value, Value),
}

impl From<TranscriptLine> for UpstreamChunk {
    fn from(line: TranscriptLine) -> Self {
        match line {
            TranscriptLine::Object { payload, metadata } => UpstreamChunk::new(payload, metadata),
            TranscriptLine::Pair(payload, metadata) => UpstreamChunk::new(payload, metadata),
        }
    }
}

/// Replays a fixed list of chunks for every session, ignoring the
/// conversation it is given.
#[derive(Debug, Clone)]
pub struct ReplaySource {
    chunks: Arc<[UpstreamChunk]>,
    chunk_delay: Duration,
}

impl ReplaySource {
    pub fn new(chunks: Vec<UpstreamChunk>) -> Self {
        Self {
            chunks: chunks.into(),
            chunk_delay: Duration::ZERO,
        }
    }

    /// Pause before each chunk, to mimic model latency.
    pub fn with_chunk_delay(mut self, delay: Duration) -> Self {
        self.chunk_delay = delay;
        self
    }

    /// Parse a JSONL transcript. Blank lines are skipped.
    pub fn from_jsonl(text: &str) -> Result<Self, SourceError> {
        let mut chunks = Vec::new();
        for (idx, line) in text.lines().enumerate() {
            let line = line.trim();
            if line.is_empty() {
                continue;
            }
            let parsed: TranscriptLine =
                serde_json::from_str(line).map_err(|e| SourceError::InvalidTranscript {
                    line: idx + 1,
                    reason: e.to_string(),
                })?;
            chunks.push(parsed.into());
        }
        Ok(Self::new(chunks))
    }

    pub fn from_file(path: &Path) -> Result<Self, SourceError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_jsonl(&text)
    }

    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }
}

#[async_trait::async_trait]
impl ChunkSource for ReplaySource {
    async fn open(
        &self,
        messages: Vec<ConversationMessage>,
        thread_id: &str,
    ) -> Result<ChunkStream, SourceError> {
        tracing::debug!(
            thread_id,
            messages = messages.len(),
            chunks = self.chunks.len(),
            "replaying transcript"
        );

        let chunks = self.chunks.clone();
        let delay = self.chunk_delay;
        let (tx, rx) = mpsc::channel(1);

        tokio::spawn(async move {
            for chunk in chunks.iter() {
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
                if tx.send(Ok(chunk.clone())).await.is_err() {
                    break; // Session dropped the stream
                }
            }
        });

        Ok(ReceiverStream::new(rx).boxed())
    }
}
