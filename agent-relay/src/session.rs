// Copyright 2026 The Agent Relay Authors
// SPDX-License-Identifier: Apache-2.0

// Session registry.
//
// Sessions are thread identifiers handed to clients. A run against a
// session records the conversation it was started with; the chunk source
// scopes its state by the same id.

use crate::message::ConversationMessage;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

// ---------------------------------------------------------------------------
// Session record
// ---------------------------------------------------------------------------

/// State tracked for a single session.
#[derive(Debug, Clone)]
pub struct SessionRecord {
    /// `session-<n>` for sessions created here; any client-supplied id
    /// otherwise.
    pub id: String,
    pub created_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    /// Number of streaming runs started against this session.
    pub run_count: u64,
    /// Conversation sent with the most recent run.
    pub messages: Vec<ConversationMessage>,
}

impl SessionRecord {
    pub fn new(id: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            created_at: now,
            last_seen: now,
            run_count: 0,
            messages: Vec::new(),
        }
    }

    /// Record one run.
    pub fn record_run(&mut self, messages: Vec<ConversationMessage>) {
        self.messages = messages;
        self.run_count += 1;
        self.last_seen = Utc::now();
    }

    /// Wire shape returned on creation: `{"id": ..., "messages": [...]}`.
    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "messages": self.messages,
        })
    }

    fn age(&self, now: DateTime<Utc>) -> Duration {
        now.signed_duration_since(self.last_seen)
            .to_std()
            .unwrap_or(Duration::ZERO)
    }
}

// ---------------------------------------------------------------------------
// SessionStore trait
// ---------------------------------------------------------------------------

/// Session persistence.
///
/// Implementations must be thread-safe; the router holds an
/// `Arc<dyn SessionStore>` shared by all handlers.
pub trait SessionStore: Send + Sync {
    /// Register a new session with a fresh id.
    fn create(&self) -> SessionRecord;

    /// Retrieve a session. Returns None if not found or expired.
    fn get(&self, session_id: &str) -> Option<SessionRecord>;

    /// Record a run against a session, registering the id if unknown.
    fn touch(&self, session_id: &str, messages: Vec<ConversationMessage>) -> SessionRecord;

    /// Remove sessions idle for longer than `max_age`.
    fn cleanup(&self, max_age: Duration);
}

// ---------------------------------------------------------------------------
// InMemorySessionStore
// ---------------------------------------------------------------------------

/// In-memory session store backed by `DashMap`.
pub struct InMemorySessionStore {
    sessions: DashMap<String, SessionRecord>,
    next_id: AtomicU64,
    ttl: Duration,
}

impl InMemorySessionStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            sessions: DashMap::new(),
            next_id: AtomicU64::new(1),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl SessionStore for InMemorySessionStore {
    fn create(&self) -> SessionRecord {
        let n = self.next_id.fetch_add(1, Ordering::Relaxed);
        let record = SessionRecord::new(format!("session-{n}"));
        self.sessions.insert(record.id.clone(), record.clone());
        tracing::debug!(session_id = %record.id, "session created");
        record
    }

    fn get(&self, session_id: &str) -> Option<SessionRecord> {
        let entry = self.sessions.get(session_id)?;

        if entry.value().age(Utc::now()) > self.ttl {
            drop(entry); // Release the read lock before removing
            self.sessions.remove(session_id);
            return None;
        }

        Some(entry.value().clone())
    }

    fn touch(&self, session_id: &str, messages: Vec<ConversationMessage>) -> SessionRecord {
        let mut entry = self
            .sessions
            .entry(session_id.to_string())
            .or_insert_with(|| {
                tracing::debug!(session_id, "registering unknown session");
                SessionRecord::new(session_id)
            });
        entry.record_run(messages);
        entry.clone()
    }

    fn cleanup(&self, max_age: Duration) {
        let now = Utc::now();
        let before = self.sessions.len();
        self.sessions.retain(|_, record| record.age(now) <= max_age);
        let removed = before.saturating_sub(self.sessions.len());
        if removed > 0 {
            tracing::debug!(removed, "expired sessions removed");
        }
    }
}
