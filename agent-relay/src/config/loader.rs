// Copyright 2026 The Agent Relay Authors
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashSet;
use std::path::PathBuf;

use sha2::{Digest, Sha256};

use super::error::ConfigError;
use super::interpolation::resolve_variables;
use super::raw;
use super::source::ConfigSource;
use super::types::*;

/// Load and validate a relay config from the given source.
///
/// Steps:
/// 1. Read raw YAML from source
/// 2. Compute SHA256 contract hash
/// 3. Parse YAML into raw deserialization types
/// 4. Validate version, agents and limits
/// 5. Resolve variable interpolation in string fields
/// 6. Build typed Config struct, filling defaults
pub fn load_config(source: &dyn ConfigSource) -> Result<Config, ConfigError> {
    let raw_yaml = source.load()?;
    let contract_hash = compute_hash(&raw_yaml);

    let raw: raw::RawConfig = serde_yaml::from_str(&raw_yaml)?;

    if raw.relay != "v1" {
        return Err(ConfigError::Validation(format!(
            "unsupported config version \"{}\", expected \"v1\"",
            raw.relay
        )));
    }

    let server = build_server_config(raw.server)?;
    let agents = build_agents(raw.agents)?;
    let stream = build_stream_config(raw.stream)?;
    let source = build_source_config(raw.source)?;
    let session = build_session_config(raw.session)?;

    Ok(Config {
        version: raw.relay,
        server,
        agents,
        stream,
        source,
        session,
        contract_hash,
    })
}

pub(super) fn compute_hash(raw_yaml: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(raw_yaml.as_bytes());
    let hash = hasher.finalize();
    format!("sha256:{:x}", hash)
}

fn build_server_config(raw: Option<raw::RawServerConfig>) -> Result<ServerConfig, ConfigError> {
    let Some(raw) = raw else {
        return Ok(ServerConfig::default());
    };

    let host = match raw.host {
        Some(host) => resolve_variables(&host)?,
        None => DEFAULT_HOST.to_string(),
    };
    if host.trim().is_empty() {
        return Err(ConfigError::Validation(
            "\"server.host\" must not be empty".to_string(),
        ));
    }

    Ok(ServerConfig {
        host,
        port: raw.port.unwrap_or(DEFAULT_PORT),
    })
}

fn build_agents(raw: Vec<raw::RawAgentConfig>) -> Result<Vec<AgentConfig>, ConfigError> {
    if raw.is_empty() {
        return Err(ConfigError::Validation(
            "\"agents\" must contain at least one agent".to_string(),
        ));
    }

    let mut seen = HashSet::with_capacity(raw.len());
    let mut agents = Vec::with_capacity(raw.len());
    for agent in raw {
        let name = resolve_variables(&agent.name)?;
        if name.trim().is_empty() {
            return Err(ConfigError::Validation(
                "agent \"name\" must not be empty".to_string(),
            ));
        }
        if !seen.insert(name.clone()) {
            return Err(ConfigError::Validation(format!(
                "duplicate agent name \"{name}\""
            )));
        }
        agents.push(AgentConfig {
            name,
            description: resolve_variables(&agent.description)?,
            multi: agent.multi,
        });
    }
    Ok(agents)
}

fn build_stream_config(raw: Option<raw::RawStreamConfig>) -> Result<StreamConfig, ConfigError> {
    let defaults = StreamConfig::default();
    let channel_capacity = raw
        .and_then(|s| s.channel_capacity)
        .unwrap_or(defaults.channel_capacity);

    if channel_capacity == 0 {
        return Err(ConfigError::Validation(
            "\"stream.channel_capacity\" must be at least 1".to_string(),
        ));
    }
    Ok(StreamConfig { channel_capacity })
}

fn build_source_config(raw: Option<raw::RawSourceConfig>) -> Result<SourceConfig, ConfigError> {
    let Some(raw) = raw else {
        return Ok(SourceConfig::default());
    };

    let replay_file = raw
        .replay_file
        .map(|path| resolve_variables(&path))
        .transpose()?
        .filter(|path| !path.trim().is_empty())
        .map(PathBuf::from);

    Ok(SourceConfig {
        replay_file,
        chunk_delay_ms: raw.chunk_delay_ms,
    })
}

fn build_session_config(raw: Option<raw::RawSessionConfig>) -> Result<SessionConfig, ConfigError> {
    let session = raw
        .map(|s| SessionConfig { ttl_secs: s.ttl_secs })
        .unwrap_or_default();

    if session.ttl_secs == 0 {
        return Err(ConfigError::Validation(
            "\"session.ttl_secs\" must be at least 1".to_string(),
        ));
    }
    Ok(session)
}
