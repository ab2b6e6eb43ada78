// Copyright 2026 The Agent Relay Authors
// SPDX-License-Identifier: Apache-2.0

// HTTP surface
//
// Responsibilities:
// - Heartbeat endpoint
// - Agent listing and session creation
// - Run endpoint: decode the conversation, stream normalized events as SSE
// - 404 for unknown paths and unknown agents

use crate::config::AgentConfig;
use crate::event::Event;
use crate::message::RunRequest;
use crate::session::SessionStore;
use crate::stream::StreamOrchestrator;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use std::convert::Infallible;
use std::sync::Arc;
use tokio_stream::{Stream, StreamExt};

/// Errors surfaced as plain HTTP responses, before any stream starts.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("unknown agent: {0}")]
    UnknownAgent(String),

    #[error("unknown path")]
    UnknownPath,
}

impl IntoResponse for ServerError {
    fn into_response(self) -> Response {
        let status = match &self {
            ServerError::UnknownAgent(_) | ServerError::UnknownPath => StatusCode::NOT_FOUND,
        };
        (status, self.to_string()).into_response()
    }
}

/// Shared state for all handlers.
#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Arc<StreamOrchestrator>,
    pub sessions: Arc<dyn SessionStore>,
    pub agents: Arc<[AgentConfig]>,
}

impl AppState {
    pub fn new(
        orchestrator: Arc<StreamOrchestrator>,
        sessions: Arc<dyn SessionStore>,
        agents: Vec<AgentConfig>,
    ) -> Self {
        Self {
            orchestrator,
            sessions,
            agents: agents.into(),
        }
    }

    fn agent(&self, name: &str) -> Option<&AgentConfig> {
        self.agents.iter().find(|a| a.name == name)
    }
}

// ---------------------------------------------------------------------------
// Handlers
// ---------------------------------------------------------------------------

/// Heartbeat endpoint: GET /v1/heartbeat -> 200 OK
pub async fn heartbeat() -> StatusCode {
    StatusCode::OK
}

/// GET /api/agents
pub async fn list_agents(State(state): State<AppState>) -> Json<Vec<AgentConfig>> {
    Json(state.agents.to_vec())
}

/// POST /api/sessions
pub async fn create_session(State(state): State<AppState>) -> Json<serde_json::Value> {
    let record = state.sessions.create();
    tracing::info!(session_id = %record.id, "session created");
    Json(record.to_json())
}

/// POST /api/sessions/{id}/agent/{name}
///
/// A body that does not decode yields a single `error` frame and no
/// lifecycle events.
pub async fn run_agent(
    State(state): State<AppState>,
    Path((session_id, agent_name)): Path<(String, String)>,
    body: Bytes,
) -> Response {
    if state.agent(&agent_name).is_none() {
        tracing::warn!(agent = %agent_name, "run requested for unknown agent");
        return ServerError::UnknownAgent(agent_name).into_response();
    }

    let request = match RunRequest::from_slice(&body) {
        Ok(request) => request,
        Err(err) => {
            tracing::warn!(
                session_id = %session_id,
                agent = %agent_name,
                error = %err,
                "rejecting run request"
            );
            let frame = Event::error(err.to_string())
                .with_agent_name(agent_name)
                .to_sse();
            return sse_response(tokio_stream::once(Bytes::from(frame)));
        }
    };

    let record = state.sessions.touch(&session_id, request.messages.clone());
    tracing::debug!(session_id = %session_id, runs = record.run_count, "session run recorded");

    let frames = state
        .orchestrator
        .stream_session(request, session_id, agent_name);
    sse_response(frames)
}

/// Fallback for unmatched paths.
pub async fn not_found() -> ServerError {
    ServerError::UnknownPath
}

/// Wrap a frame stream in a `text/event-stream` response.
pub fn sse_response(frames: impl Stream<Item = Bytes> + Send + 'static) -> Response {
    let body = Body::from_stream(frames.map(Ok::<_, Infallible>));
    (
        [
            (header::CONTENT_TYPE, "text/event-stream"),
            (header::CACHE_CONTROL, "no-cache"),
            (header::CONNECTION, "keep-alive"),
            (header::ACCESS_CONTROL_ALLOW_ORIGIN, "*"),
            (header::ACCESS_CONTROL_ALLOW_HEADERS, "*"),
        ],
        body,
    )
        .into_response()
}

// ---------------------------------------------------------------------------
// Router construction
// ---------------------------------------------------------------------------

/// Build the axum router. Every collaborator comes in through `state`.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/v1/heartbeat", get(heartbeat))
        .route("/api/agents", get(list_agents))
        .route("/api/sessions", post(create_session))
        .route("/api/sessions/{id}/agent/{name}", post(run_agent))
        .fallback(not_found)
        .with_state(state)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
