// Copyright 2026 The Agent Relay Authors
// SPDX-License-Identifier: Apache-2.0

// Tests for streaming normalization
//
// Tests cover:
//  1. Lifecycle: user_message, stream_started ... stream_stopped
//  2. Empty conversation: no user_message, lifecycle unchanged
//  3. Streamed tool call fragments inherit slot identity
//  4. Deduplication of repeated tool call identity
//  5. Tool result: tool_call then tool_call_response; complete calls in
//     a delta bypass the accumulator
//  6. Per-chunk failure or classifier panic: one error event, stream
//     continues
//  7. Fatal source error on open: error then stream_stopped
//  8. Fatal source error mid-stream: error then stream_stopped
//  9. Agent attribution: session name fills unset names only
// 10. Client disconnect releases the upstream source
// 11. SSE frame output
// 12. Full weather transcript end to end

use super::*;
use crate::event::{Event, EventKind, TokenUsage};
use crate::message::{ConversationMessage, Role, RunRequest, ToolCall};
use crate::upstream::{ChunkSource, ChunkStream, ReplaySource, SourceError};
use serde_json::{json, Value};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::time::Duration;
use tokio_stream::StreamExt;

// ---------------------------------------------------------------------------
// Test doubles
// ---------------------------------------------------------------------------

/// A source that yields a fixed list of items, errors included.
struct ScriptedSource {
    items: Vec<Result<UpstreamChunk, String>>,
}

impl ScriptedSource {
    fn chunks(payloads: Vec<Value>) -> Self {
        Self {
            items: payloads
                .into_iter()
                .map(|p| Ok(UpstreamChunk::bare(p)))
                .collect(),
        }
    }
}

#[async_trait::async_trait]
impl ChunkSource for ScriptedSource {
    async fn open(
        &self,
        _messages: Vec<ConversationMessage>,
        _thread_id: &str,
    ) -> Result<ChunkStream, SourceError> {
        let items: Vec<Result<UpstreamChunk, SourceError>> = self
            .items
            .iter()
            .map(|item| item.clone().map_err(SourceError::Upstream))
            .collect();
        Ok(Box::pin(tokio_stream::iter(items)))
    }
}

/// A source that cannot be opened.
struct UnavailableSource;

#[async_trait::async_trait]
impl ChunkSource for UnavailableSource {
    async fn open(
        &self,
        _messages: Vec<ConversationMessage>,
        _thread_id: &str,
    ) -> Result<ChunkStream, SourceError> {
        Err(SourceError::Open("graph not compiled".into()))
    }
}

/// A source that yields one chunk and then never finishes. Records when
/// its stream is dropped.
struct EndlessSource {
    released: Arc<AtomicBool>,
}

struct ReleaseFlag(Arc<AtomicBool>);

impl Drop for ReleaseFlag {
    fn drop(&mut self) {
        self.0.store(true, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl ChunkSource for EndlessSource {
    async fn open(
        &self,
        _messages: Vec<ConversationMessage>,
        _thread_id: &str,
    ) -> Result<ChunkStream, SourceError> {
        let flag = ReleaseFlag(self.released.clone());
        let first = tokio_stream::once(Ok(UpstreamChunk::bare(
            json!({"type": "AIMessageChunk", "content": "Ahoy"}),
        )));
        // The flag lives in the never-finishing tail, so it drops with it.
        let rest = futures_util::stream::unfold(flag, |flag| async move {
            std::future::pending::<()>().await;
            Some((Ok::<_, SourceError>(UpstreamChunk::bare(Value::Null)), flag))
        });
        Ok(Box::pin(first.chain(rest)))
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn orchestrator(source: impl ChunkSource + 'static) -> StreamOrchestrator {
    StreamOrchestrator::new(Arc::new(source), Arc::new(MessageChunkClassifier))
}

fn weather_request() -> RunRequest {
    RunRequest::new(vec![ConversationMessage::new(
        Role::User,
        "weather in Tokyo?",
    )])
}

async fn collect_events(
    orchestrator: &StreamOrchestrator,
    request: RunRequest,
    agent: &str,
) -> Vec<Event> {
    orchestrator
        .events(request, "thread-1", agent)
        .collect()
        .await
}

fn kinds(events: &[Event]) -> Vec<&'static str> {
    events.iter().map(Event::type_name).collect()
}

fn tool_call_of(event: &Event) -> &ToolCall {
    match &event.kind {
        EventKind::ToolCall { tool_call }
        | EventKind::PartialToolCall { tool_call }
        | EventKind::ToolCallResponse { tool_call, .. } => tool_call,
        other => panic!("not a tool call event: {other:?}"),
    }
}

// ---------------------------------------------------------------------------
// Test 1: lifecycle ordering
// ---------------------------------------------------------------------------

#[tokio::test]
async fn lifecycle_wraps_content() {
    let orch = orchestrator(ScriptedSource::chunks(vec![
        json!({"type": "AIMessageChunk", "content": "Arr, "}),
        json!({"type": "AIMessageChunk", "content": "matey"}),
    ]));

    let events = collect_events(&orch, weather_request(), "root").await;

    assert_eq!(
        kinds(&events),
        vec![
            "user_message",
            "stream_started",
            "agent_choice",
            "agent_choice",
            "stream_stopped"
        ]
    );
    assert_eq!(
        events[0].kind,
        EventKind::UserMessage {
            message: "weather in Tokyo?".into()
        }
    );
}

#[tokio::test]
async fn started_and_stopped_appear_exactly_once() {
    let orch = orchestrator(ScriptedSource::chunks(vec![
        json!({"type": "AIMessageChunk", "content": "a"}),
        json!("garbage"),
        json!({"type": "tool", "tool_call_id": "t1", "name": "x", "content": "y"}),
    ]));

    let events = collect_events(&orch, weather_request(), "root").await;
    let names = kinds(&events);

    assert_eq!(names.iter().filter(|k| **k == "stream_started").count(), 1);
    assert_eq!(names.iter().filter(|k| **k == "stream_stopped").count(), 1);
    assert_eq!(names.last(), Some(&"stream_stopped"));

    let started = names.iter().position(|k| *k == "stream_started").unwrap();
    assert!(names[..started]
        .iter()
        .all(|k| *k == "user_message"));
}

// ---------------------------------------------------------------------------
// Test 2: empty conversation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn empty_conversation_skips_user_message() {
    let orch = orchestrator(ScriptedSource::chunks(vec![]));
    let events = collect_events(&orch, RunRequest::default(), "root").await;
    assert_eq!(kinds(&events), vec!["stream_started", "stream_stopped"]);
}

#[tokio::test]
async fn blank_trailing_message_skips_user_message() {
    let orch = orchestrator(ScriptedSource::chunks(vec![]));
    let request = RunRequest::new(vec![
        ConversationMessage::new(Role::User, "hi"),
        ConversationMessage::new(Role::Assistant, ""),
    ]);
    let events = collect_events(&orch, request, "root").await;
    assert_eq!(kinds(&events), vec!["stream_started", "stream_stopped"]);
}

// ---------------------------------------------------------------------------
// Test 3: streamed fragments inherit slot identity
// ---------------------------------------------------------------------------

#[tokio::test]
async fn fragments_inherit_identity_across_chunks() {
    let orch = orchestrator(ScriptedSource::chunks(vec![
        json!({"type": "AIMessageChunk", "tool_call_chunks": [
            {"index": 0, "id": "t1", "name": "get_weather", "args": ""}
        ]}),
        json!({"type": "AIMessageChunk", "tool_call_chunks": [
            {"index": 0, "id": null, "name": null, "args": "{\"location\""}
        ]}),
    ]));

    let events = collect_events(&orch, RunRequest::default(), "root").await;
    let partials: Vec<_> = events
        .iter()
        .filter(|e| e.type_name() == "partial_tool_call")
        .collect();

    assert_eq!(partials.len(), 2);
    let second = tool_call_of(partials[1]);
    assert_eq!(second.id, "t1");
    assert_eq!(second.name, "get_weather");
    assert_eq!(
        partials[1].to_json()["tool_call"]["function"]["arguments"],
        "{\"location\""
    );
}

// ---------------------------------------------------------------------------
// Test 4: deduplication
// ---------------------------------------------------------------------------

#[tokio::test]
async fn repeated_identity_without_arguments_is_suppressed() {
    let fragment = |args: &str| {
        json!({"type": "AIMessageChunk", "tool_call_chunks": [
            {"index": 0, "id": "t1", "name": "get_weather", "args": args}
        ]})
    };
    let orch = orchestrator(ScriptedSource::chunks(vec![
        fragment(""),
        fragment("{\"location\": \"Tokyo\"}"),
        fragment(""),
    ]));

    let events = collect_events(&orch, RunRequest::default(), "root").await;
    assert_eq!(
        kinds(&events),
        vec![
            "stream_started",
            "partial_tool_call",
            "partial_tool_call",
            "stream_stopped"
        ]
    );
}

// ---------------------------------------------------------------------------
// Test 5: tool result
// ---------------------------------------------------------------------------

#[tokio::test]
async fn tool_result_pairs_call_and_response() {
    let orch = orchestrator(ScriptedSource::chunks(vec![json!({
        "type": "tool",
        "tool_call_id": "t1",
        "name": "get_weather",
        "content": "70 degrees"
    })]));

    let events = collect_events(&orch, RunRequest::default(), "root").await;
    assert_eq!(
        kinds(&events),
        vec![
            "stream_started",
            "tool_call",
            "tool_call_response",
            "stream_stopped"
        ]
    );

    let call = events[1].to_json();
    assert_eq!(call["tool_call"]["id"], "t1");
    assert_eq!(call["tool_call"]["function"]["name"], "get_weather");
    assert_eq!(call["tool_call"]["function"]["arguments"], "");

    let response = events[2].to_json();
    assert_eq!(response["response"], "70 degrees");
    assert_eq!(response["tool_call"], call["tool_call"]);
}

#[tokio::test]
async fn materialized_call_in_delta_is_emitted_complete_once() {
    let chunk = json!({
        "type": "AIMessageChunk",
        "content": "",
        "tool_calls": [{"id": "t1", "name": "get_weather", "args": {"location": "Tokyo"}}]
    });
    let orch = orchestrator(ScriptedSource::chunks(vec![chunk.clone(), chunk]));

    let events = collect_events(&orch, weather_request(), "root").await;
    assert_eq!(
        kinds(&events),
        vec!["user_message", "stream_started", "tool_call", "stream_stopped"]
    );

    let call = events[2].to_json();
    assert_eq!(call["tool_call"]["id"], "t1");
    assert_eq!(call["tool_call"]["function"]["name"], "get_weather");
    assert_eq!(
        call["tool_call"]["function"]["arguments"],
        "{\"location\":\"Tokyo\"}"
    );
}

// ---------------------------------------------------------------------------
// Test 6: per-chunk failure isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn failing_chunk_yields_one_error_and_stream_continues() {
    let orch = orchestrator(ScriptedSource::chunks(vec![
        json!({"type": "AIMessageChunk", "content": "before"}),
        json!({"type": "AIMessageChunk", "content": 42}),
        json!({"type": "AIMessageChunk", "content": "after"}),
    ]));

    let events = collect_events(&orch, RunRequest::default(), "root").await;
    assert_eq!(
        kinds(&events),
        vec![
            "stream_started",
            "agent_choice",
            "error",
            "agent_choice",
            "stream_stopped"
        ]
    );
    match &events[2].kind {
        EventKind::Error { error } => assert!(error.starts_with("error processing node output")),
        other => panic!("unexpected {other:?}"),
    }
}

/// Delegates to the message classifier but panics on content "boom".
struct PanickingClassifier;

impl ChunkClassifier for PanickingClassifier {
    fn classify(
        &self,
        chunk: &UpstreamChunk,
        accumulator: &mut ToolCallAccumulator,
    ) -> Result<Vec<Event>, ClassificationError> {
        if chunk.payload["content"] == "boom" {
            panic!("classifier exploded");
        }
        MessageChunkClassifier.classify(chunk, accumulator)
    }
}

#[tokio::test]
async fn panicking_classifier_yields_one_error_and_stream_continues() {
    let source = ScriptedSource::chunks(vec![
        json!({"type": "AIMessageChunk", "content": "before"}),
        json!({"type": "AIMessageChunk", "content": "boom"}),
        json!({"type": "AIMessageChunk", "content": "after"}),
    ]);
    let orch = StreamOrchestrator::new(Arc::new(source), Arc::new(PanickingClassifier));

    let events = collect_events(&orch, weather_request(), "root").await;
    assert_eq!(
        kinds(&events),
        vec![
            "user_message",
            "stream_started",
            "agent_choice",
            "error",
            "agent_choice",
            "stream_stopped"
        ]
    );
    assert_eq!(
        events[3].kind,
        EventKind::Error {
            error: "classifier panicked: classifier exploded".into()
        }
    );
}

// ---------------------------------------------------------------------------
// Test 7 / 8: fatal source errors
// ---------------------------------------------------------------------------

#[tokio::test]
async fn source_open_failure_is_fatal_but_terminated() {
    let orch = orchestrator(UnavailableSource);
    let events = collect_events(&orch, weather_request(), "root").await;

    assert_eq!(
        kinds(&events),
        vec!["user_message", "stream_started", "error", "stream_stopped"]
    );
    match &events[2].kind {
        EventKind::Error { error } => {
            assert!(error.starts_with("Fatal error during graph execution"));
            assert!(error.contains("graph not compiled"));
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[tokio::test]
async fn mid_stream_failure_stops_after_one_error() {
    let orch = orchestrator(ScriptedSource {
        items: vec![
            Ok(UpstreamChunk::bare(
                json!({"type": "AIMessageChunk", "content": "partial"}),
            )),
            Err("connection reset".into()),
            Ok(UpstreamChunk::bare(
                json!({"type": "AIMessageChunk", "content": "never seen"}),
            )),
        ],
    });

    let events = collect_events(&orch, RunRequest::default(), "root").await;
    assert_eq!(
        kinds(&events),
        vec!["stream_started", "agent_choice", "error", "stream_stopped"]
    );
}

// ---------------------------------------------------------------------------
// Test 9: agent attribution
// ---------------------------------------------------------------------------

#[tokio::test]
async fn session_agent_name_attributes_everything_but_user_message() {
    let orch = orchestrator(ScriptedSource::chunks(vec![json!({
        "type": "AIMessageChunk",
        "content": "Ahoy",
        "usage_metadata": {"input_tokens": 1, "output_tokens": 1, "total_tokens": 2}
    })]));

    let events = collect_events(&orch, weather_request(), "pirate_agent").await;

    assert_eq!(events[0].agent_name, None);
    for event in &events[1..] {
        assert_eq!(event.agent_name.as_deref(), Some("pirate_agent"));
    }
    assert_eq!(
        events[3].kind,
        EventKind::TokenUsage {
            usage: TokenUsage {
                input_tokens: 1,
                output_tokens: 1,
                total_tokens: 2,
                cost: None,
            }
        }
    );
}

#[tokio::test]
async fn empty_agent_name_is_not_serialized() {
    let orch = orchestrator(ScriptedSource::chunks(vec![]));
    let events = collect_events(&orch, RunRequest::default(), "").await;
    assert!(events.iter().all(|e| e.to_json().get("agent_name").is_none()));
}

// ---------------------------------------------------------------------------
// Test 10: client disconnect
// ---------------------------------------------------------------------------

#[tokio::test]
async fn dropping_the_stream_releases_the_source() {
    let released = Arc::new(AtomicBool::new(false));
    let orch = orchestrator(EndlessSource {
        released: released.clone(),
    });

    let mut events = orch.events(RunRequest::default(), "thread-1", "root");
    assert_eq!(events.next().await.unwrap().type_name(), "stream_started");
    assert_eq!(events.next().await.unwrap().type_name(), "agent_choice");
    drop(events);

    tokio::time::timeout(Duration::from_secs(5), async {
        while !released.load(Ordering::SeqCst) {
            tokio::task::yield_now().await;
        }
    })
    .await
    .expect("upstream source was not released");
}

// ---------------------------------------------------------------------------
// Test 11: SSE frames
// ---------------------------------------------------------------------------

#[tokio::test]
async fn stream_session_yields_sse_frames() {
    let orch = orchestrator(ScriptedSource::chunks(vec![json!({
        "type": "AIMessageChunk",
        "content": "Ahoy"
    })]))
    .with_channel_capacity(1);

    let frames: Vec<_> = orch
        .stream_session(weather_request(), "thread-1", "root")
        .collect()
        .await;

    assert_eq!(frames.len(), 4);
    for frame in &frames {
        let text = std::str::from_utf8(frame).unwrap();
        assert!(text.starts_with("data: "));
        assert!(text.ends_with("\n\n"));
    }
    let choice: Value =
        serde_json::from_str(std::str::from_utf8(&frames[2]).unwrap()[6..].trim()).unwrap();
    assert_eq!(
        choice,
        json!({"type": "agent_choice", "content": "Ahoy", "agent_name": "root"})
    );
}

// ---------------------------------------------------------------------------
// Test 12: weather transcript
// ---------------------------------------------------------------------------

#[tokio::test]
async fn weather_transcript_end_to_end() {
    let transcript = include_str!("../../fixtures/weather.jsonl");
    let source = ReplaySource::from_jsonl(transcript).unwrap();
    let orch = orchestrator(source);

    let events = collect_events(&orch, weather_request(), "root").await;
    let names = kinds(&events);

    assert_eq!(names.first(), Some(&"user_message"));
    assert_eq!(names[1], "stream_started");
    assert_eq!(names.last(), Some(&"stream_stopped"));
    assert!(!names.contains(&"error"));

    // Streamed fragments: identity, then two argument pieces.
    let partials: Vec<_> = events
        .iter()
        .filter(|e| e.type_name() == "partial_tool_call")
        .map(tool_call_of)
        .collect();
    assert_eq!(partials.len(), 3);
    assert!(partials
        .iter()
        .all(|tc| tc.id == "call_t1" && tc.name == "get_weather"));
    let streamed_args: String = partials
        .iter()
        .map(|tc| crate::message::normalize_arguments(&tc.arguments))
        .collect();
    assert_eq!(streamed_args, "{\"location\": \"Tokyo\"}");

    // Tool result pairs with the streamed call.
    let response = events
        .iter()
        .find(|e| e.type_name() == "tool_call_response")
        .unwrap();
    match &response.kind {
        EventKind::ToolCallResponse {
            tool_call,
            response,
        } => {
            assert_eq!(tool_call.id, "call_t1");
            assert_eq!(response, "The weather for Tokyo is 70 degrees.");
        }
        other => panic!("unexpected {other:?}"),
    }

    let answer: String = events
        .iter()
        .filter_map(|e| match &e.kind {
            EventKind::AgentChoice { content } => Some(content.as_str()),
            _ => None,
        })
        .collect();
    assert!(answer.contains("Tokyo"));

    let usage_count = names.iter().filter(|k| **k == "token_usage").count();
    assert_eq!(usage_count, 2);
}
