// Copyright 2026 The Agent Relay Authors
// SPDX-License-Identifier: Apache-2.0

// relay-replay: run a recorded transcript through the relay and print the
// SSE frames a client would receive.
//
// Usage:
//   relay-replay fixtures/weather.jsonl
//   relay-replay fixtures/weather.jsonl --message "weather in Tokyo?" --agent root
//   relay-replay fixtures/weather.jsonl --delay-ms 50

use clap::Parser;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_stream::StreamExt;

use agent_relay::message::{ConversationMessage, Role, RunRequest};
use agent_relay::stream::{MessageChunkClassifier, StreamOrchestrator};
use agent_relay::upstream::ReplaySource;

#[derive(Parser)]
#[command(
    name = "relay-replay",
    about = "Replay a JSONL chunk transcript and print the resulting SSE frames."
)]
struct Cli {
    /// JSONL transcript: one `{"payload", "metadata"}` object or
    /// `[payload, metadata]` pair per line.
    transcript: PathBuf,

    /// User message sent as the conversation. Omit to send none.
    #[arg(long)]
    message: Option<String>,

    /// Agent name attributed to emitted events.
    #[arg(long, default_value = "root")]
    agent: String,

    /// Thread identifier passed to the source.
    #[arg(long, default_value = "replay")]
    thread: String,

    /// Delay before each chunk, in milliseconds.
    #[arg(long, default_value_t = 0)]
    delay_ms: u64,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_target(false)
        .with_level(true)
        .with_writer(std::io::stderr)
        .init();

    let source = match ReplaySource::from_file(&cli.transcript) {
        Ok(source) => source.with_chunk_delay(Duration::from_millis(cli.delay_ms)),
        Err(e) => {
            tracing::error!(path = %cli.transcript.display(), "{e}");
            std::process::exit(1);
        }
    };

    let messages = cli
        .message
        .map(|text| vec![ConversationMessage::new(Role::User, text)])
        .unwrap_or_default();

    let orchestrator = StreamOrchestrator::new(Arc::new(source), Arc::new(MessageChunkClassifier));
    let frames = orchestrator.stream_session(RunRequest::new(messages), cli.thread, cli.agent);
    tokio::pin!(frames);

    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    while let Some(frame) = frames.next().await {
        if out.write_all(&frame).and_then(|_| out.flush()).is_err() {
            break; // Broken pipe
        }
    }
}
