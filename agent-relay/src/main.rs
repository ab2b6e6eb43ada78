// Copyright 2026 The Agent Relay Authors
// SPDX-License-Identifier: Apache-2.0

use agent_relay::config;
use agent_relay::server;
use agent_relay::session::{InMemorySessionStore, SessionStore};
use agent_relay::stream::{MessageChunkClassifier, StreamOrchestrator};
use agent_relay::upstream::ReplaySource;
use clap::Parser;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// How often idle sessions are swept.
const SESSION_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Parser)]
#[command(name = "agent-relay", about = "Streams agent output as typed SSE events")]
struct Cli {
    /// Path to the relay.yaml config file
    #[arg(long, default_value = "relay.yaml", env = "RELAY_CONFIG")]
    config: PathBuf,

    /// Port to listen on (overrides server.port)
    #[arg(long, env = "PORT")]
    port: Option<u16>,

    /// Transcript to replay (overrides source.replay_file)
    #[arg(long, env = "RELAY_REPLAY_FILE")]
    replay_file: Option<PathBuf>,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .json()
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let source = config::FileSource {
        path: cli.config.clone(),
    };
    let config = match config::load_config(&source) {
        Ok(c) => c,
        Err(e) => {
            tracing::error!(path = %cli.config.display(), "failed to load config: {e}");
            std::process::exit(1);
        }
    };

    tracing::info!(
        version = %config.version,
        agents = config.agents.len(),
        contract_hash = %config.contract_hash,
        "config loaded"
    );

    let Some(replay_file) = cli.replay_file.or_else(|| config.source.replay_file.clone()) else {
        tracing::error!("no chunk source configured: set source.replay_file or --replay-file");
        std::process::exit(1);
    };
    let chunks = match ReplaySource::from_file(&replay_file) {
        Ok(source) => source.with_chunk_delay(config.source.chunk_delay()),
        Err(e) => {
            tracing::error!(path = %replay_file.display(), "failed to load transcript: {e}");
            std::process::exit(1);
        }
    };
    tracing::info!(
        path = %replay_file.display(),
        chunks = chunks.len(),
        "replay source ready"
    );

    let orchestrator = StreamOrchestrator::new(Arc::new(chunks), Arc::new(MessageChunkClassifier))
        .with_channel_capacity(config.stream.channel_capacity);

    let ttl = config.session.ttl();
    let sessions = Arc::new(InMemorySessionStore::new(ttl));
    let sweeper = sessions.clone();
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(SESSION_SWEEP_INTERVAL);
        loop {
            interval.tick().await;
            sweeper.cleanup(ttl);
        }
    });

    let state = server::AppState::new(Arc::new(orchestrator), sessions, config.agents.clone());
    let app = server::build_router(state);

    let mut server_config = config.server.clone();
    if let Some(port) = cli.port {
        server_config.port = port;
    }
    let addr = server_config.bind_addr();

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind to address");

    tracing::info!(%addr, "agent-relay listening");

    axum::serve(listener, app)
        .await
        .expect("server error");
}
