// Copyright 2026 The Agent Relay Authors
// SPDX-License-Identifier: Apache-2.0

// Stream orchestrator
//
// Drives one streaming session: emits the lifecycle events, pulls chunks
// from the upstream source, classifies each one and forwards the resulting
// events through a bounded channel. `stream_stopped` is always the last
// event of a session that was not abandoned by its client.

use super::accumulator::ToolCallAccumulator;
use super::classifier::ChunkClassifier;
use super::types::{ClassificationError, UpstreamChunk};
use crate::event::{Event, EventKind};
use crate::message::RunRequest;
use crate::upstream::{ChunkSource, SourceError};
use bytes::Bytes;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tokio_stream::{Stream, StreamExt};
use uuid::Uuid;

/// Channel capacity used when none is configured.
pub const DEFAULT_CHANNEL_CAPACITY: usize = 64;

/// Lifecycle of one streaming session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Started,
    Streaming,
    Stopped,
}

/// Runs streaming sessions against an injected source and classifier.
pub struct StreamOrchestrator {
    source: Arc<dyn ChunkSource>,
    classifier: Arc<dyn ChunkClassifier>,
    channel_capacity: usize,
}

impl StreamOrchestrator {
    pub fn new(source: Arc<dyn ChunkSource>, classifier: Arc<dyn ChunkClassifier>) -> Self {
        Self {
            source,
            classifier,
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }

    /// Bound on events buffered ahead of the consumer. At least 1.
    pub fn with_channel_capacity(mut self, capacity: usize) -> Self {
        self.channel_capacity = capacity.max(1);
        self
    }

    /// Run one session, yielding SSE frames.
    pub fn stream_session(
        &self,
        request: RunRequest,
        thread_id: impl Into<String>,
        agent_name: impl Into<String>,
    ) -> impl Stream<Item = Bytes> + Send + 'static {
        self.events(request, thread_id, agent_name)
            .map(|event| Bytes::from(event.to_sse()))
    }

    /// Run one session, yielding typed events.
    ///
    /// The session runs on a spawned task. Dropping the returned stream
    /// stops it and releases the upstream source.
    pub fn events(
        &self,
        request: RunRequest,
        thread_id: impl Into<String>,
        agent_name: impl Into<String>,
    ) -> ReceiverStream<Event> {
        let (tx, rx) = mpsc::channel(self.channel_capacity);

        let run = SessionRun {
            source: self.source.clone(),
            classifier: self.classifier.clone(),
            request,
            thread_id: thread_id.into(),
            request_id: Uuid::new_v4().to_string(),
            emitter: Emitter {
                tx,
                agent_name: agent_name.into(),
                phase: SessionPhase::Idle,
                emitted: 0,
            },
            chunks: 0,
            chunk_errors: 0,
        };
        tokio::spawn(run.run());

        ReceiverStream::new(rx)
    }
}

/// Run the classifier on one chunk, turning a panic into a per-chunk error.
fn classify_isolated(
    classifier: &dyn ChunkClassifier,
    chunk: &UpstreamChunk,
    accumulator: &mut ToolCallAccumulator,
) -> Result<Vec<Event>, ClassificationError> {
    panic::catch_unwind(AssertUnwindSafe(|| classifier.classify(chunk, accumulator)))
        .unwrap_or_else(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            Err(ClassificationError::Panicked(message))
        })
}

// ---------------------------------------------------------------------------
// Emitter
// ---------------------------------------------------------------------------

/// The receiving side went away.
#[derive(Debug)]
struct Disconnected;

/// Sends attributed events and tracks the session phase.
struct Emitter {
    tx: mpsc::Sender<Event>,
    agent_name: String,
    phase: SessionPhase,
    emitted: usize,
}

impl Emitter {
    async fn emit(&mut self, mut event: Event) -> Result<(), Disconnected> {
        if self.phase == SessionPhase::Stopped {
            tracing::warn!(kind = event.type_name(), "event after stream_stopped dropped");
            return Ok(());
        }
        event.attribute(&self.agent_name);
        self.tx.send(event).await.map_err(|_| Disconnected)?;
        self.emitted += 1;
        Ok(())
    }

    async fn start(&mut self) -> Result<(), Disconnected> {
        self.emit(EventKind::StreamStarted.into()).await?;
        self.phase = SessionPhase::Started;
        Ok(())
    }

    async fn stop(&mut self) {
        if self.phase == SessionPhase::Stopped {
            return;
        }
        let _ = self.emit(EventKind::StreamStopped.into()).await;
        self.phase = SessionPhase::Stopped;
    }
}

// ---------------------------------------------------------------------------
// Session run
// ---------------------------------------------------------------------------

enum RunOutcome {
    Exhausted,
    Failed(SourceError),
    Disconnected,
}

struct SessionRun {
    source: Arc<dyn ChunkSource>,
    classifier: Arc<dyn ChunkClassifier>,
    request: RunRequest,
    thread_id: String,
    request_id: String,
    emitter: Emitter,
    chunks: usize,
    chunk_errors: usize,
}

impl SessionRun {
    async fn run(mut self) {
        tracing::info!(
            request_id = %self.request_id,
            thread_id = %self.thread_id,
            agent = %self.emitter.agent_name,
            messages = self.request.messages.len(),
            "stream session started"
        );

        if let Some(text) = self.request.trailing_user_text() {
            if self.emitter.emit(Event::user_message(text)).await.is_err() {
                self.log_disconnect();
                return;
            }
        }

        if self.emitter.start().await.is_err() {
            self.log_disconnect();
            return;
        }

        match self.pump().await {
            RunOutcome::Exhausted => {}
            RunOutcome::Failed(err) => {
                tracing::error!(
                    request_id = %self.request_id,
                    thread_id = %self.thread_id,
                    error = %err,
                    "upstream source failed"
                );
                let error = Event::error(format!("Fatal error during graph execution: {err}"));
                if self.emitter.emit(error).await.is_err() {
                    self.log_disconnect();
                    return;
                }
            }
            RunOutcome::Disconnected => {
                self.log_disconnect();
                return;
            }
        }

        self.emitter.stop().await;

        tracing::info!(
            request_id = %self.request_id,
            chunks = self.chunks,
            chunk_errors = self.chunk_errors,
            events = self.emitter.emitted,
            "stream session stopped"
        );
    }

    async fn pump(&mut self) -> RunOutcome {
        let messages = std::mem::take(&mut self.request.messages);
        let mut chunks = match self.source.open(messages, &self.thread_id).await {
            Ok(chunks) => chunks,
            Err(err) => return RunOutcome::Failed(err),
        };
        self.emitter.phase = SessionPhase::Streaming;

        let mut accumulator = ToolCallAccumulator::new();

        loop {
            let next = tokio::select! {
                biased;
                _ = self.emitter.tx.closed() => return RunOutcome::Disconnected,
                next = chunks.next() => next,
            };

            let chunk = match next {
                None => return RunOutcome::Exhausted,
                Some(Err(err)) => return RunOutcome::Failed(err),
                Some(Ok(chunk)) => chunk,
            };
            self.chunks += 1;

            let classified = {
                let span = tracing::debug_span!(
                    "chunk",
                    request_id = %self.request_id,
                    seq = self.chunks,
                    node = chunk.node().unwrap_or_default(),
                );
                let _guard = span.enter();
                classify_isolated(self.classifier.as_ref(), &chunk, &mut accumulator)
            };

            let events = match classified {
                Ok(events) => events,
                Err(err) => {
                    self.chunk_errors += 1;
                    tracing::warn!(
                        request_id = %self.request_id,
                        seq = self.chunks,
                        error = %err,
                        "chunk classification failed"
                    );
                    vec![Event::error(err.to_string())]
                }
            };

            for event in events {
                if self.emitter.emit(event).await.is_err() {
                    return RunOutcome::Disconnected;
                }
            }
        }
    }

    fn log_disconnect(&self) {
        tracing::info!(
            request_id = %self.request_id,
            chunks = self.chunks,
            events = self.emitter.emitted,
            "client disconnected, stream abandoned"
        );
    }
}
