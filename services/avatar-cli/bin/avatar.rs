//! Main Entrypoint for the AVATAR command-line client
//!
//! This binary is responsible for:
//! 1. Loading configuration from the environment and arguments.
//! 2. Initializing logging.
//! 3. Encoding the audio file into chunks.
//! 4. Running one exchange against the backend and printing the reply.
//! 5. Tearing the session down, including on Ctrl+C.

use anyhow::{Context, anyhow};
use avatar_cli::{
    audio_utils::{self, DEFAULT_CHUNK_SIZE},
    config::Config,
    exchange::run_exchange,
};
use avatar_realtime::SessionClient;
use clap::Parser;
use std::{path::PathBuf, time::Duration};
use tracing::info;

#[derive(Parser, Debug)]
#[command(version, about = "Streams an audio file to the AVATAR voice backend and prints its reply")]
struct Args {
    /// Audio file to send. Its bytes are forwarded as-is.
    audio: PathBuf,
    /// Resume addressing an existing conversation.
    #[arg(long)]
    session_id: Option<String>,
    /// Voice profile the backend should speak the reply with.
    #[arg(long)]
    voice_profile_id: Option<i64>,
    /// Bytes of audio per `audio_chunk` frame.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    chunk_size: usize,
    /// How long to wait for the reply after the audio is sent.
    #[arg(long, default_value_t = 60)]
    timeout_secs: u64,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // --- 1. Load Configuration ---
    let args = Args::parse();
    let config = Config::from_env().context("Failed to load configuration")?;

    // --- 2. Initialize Logging ---
    tracing_subscriber::fmt()
        .with_max_level(config.log_level)
        .with_timer(tracing_subscriber::fmt::time::ChronoLocal::rfc_3339())
        .init();

    // --- 3. Prepare Audio ---
    let chunks = audio_utils::load_chunks(&args.audio, args.chunk_size)?;
    info!(
        url = %config.session.url,
        chunks = chunks.len(),
        "Configuration loaded. Starting exchange..."
    );

    // --- 4. Run the Exchange ---
    let client = SessionClient::new(config.session.clone());
    client.on_state_change(|state| info!(%state, "Connection state changed."));
    client.on_connected(|session_id| info!(%session_id, "Session established."));

    let outcome = tokio::select! {
        outcome = run_exchange(
            &client,
            args.session_id,
            &chunks,
            args.voice_profile_id,
            Duration::from_secs(args.timeout_secs),
        ) => outcome,
        _ = tokio::signal::ctrl_c() => Err(anyhow!("Interrupted")),
    };

    // --- 5. Tear Down ---
    client.disconnect();
    let report = outcome?;

    if let Some(session_id) = &report.session_id {
        println!("session:    {session_id}");
    }
    if let Some(transcript) = &report.transcript {
        println!("you said:   {transcript}");
    }
    println!("assistant:  {}", report.reply);
    if let Some(audio_url) = &report.audio_url {
        println!("speech:     {audio_url}");
    }
    Ok(())
}
