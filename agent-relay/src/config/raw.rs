// Copyright 2026 The Agent Relay Authors
// SPDX-License-Identifier: Apache-2.0

// Raw YAML deserialization types (internal)
// Kept apart from the public Config structs: interpolation and defaults are
// applied between the two.

use serde::Deserialize;

#[derive(Debug, Deserialize)]
pub struct RawConfig {
    pub relay: String,
    pub server: Option<RawServerConfig>,
    #[serde(default)]
    pub agents: Vec<RawAgentConfig>,
    pub stream: Option<RawStreamConfig>,
    pub source: Option<RawSourceConfig>,
    pub session: Option<RawSessionConfig>,
}

#[derive(Debug, Deserialize)]
pub struct RawServerConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
}

#[derive(Debug, Deserialize)]
pub struct RawAgentConfig {
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub multi: bool,
}

#[derive(Debug, Deserialize)]
pub struct RawStreamConfig {
    pub channel_capacity: Option<usize>,
}

#[derive(Debug, Deserialize)]
pub struct RawSourceConfig {
    pub replay_file: Option<String>,
    #[serde(default)]
    pub chunk_delay_ms: u64,
}

#[derive(Debug, Deserialize)]
pub struct RawSessionConfig {
    #[serde(default = "default_session_ttl")]
    pub ttl_secs: u64,
}

pub(super) fn default_session_ttl() -> u64 {
    3600
}
