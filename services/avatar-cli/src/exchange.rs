//! Drives one audio-in, staged-response-out exchange over a session.

use anyhow::{Context, Result, anyhow, bail};
use avatar_realtime::{
    SessionClient,
    protocol::{AiResponseMessage, ErrorMessage, Stage, StatusMessage, TranscriptMessage, TtsReadyMessage},
};
use std::time::Duration;
use tokio::{sync::mpsc, time::Instant};
use tracing::{info, instrument, warn};

/// What the backend produced for one exchange.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExchangeReport {
    pub session_id: Option<String>,
    pub stages: Vec<Stage>,
    pub transcript: Option<String>,
    pub reply: String,
    pub audio_url: Option<String>,
}

#[derive(Debug)]
enum ExchangeEvent {
    Status(StatusMessage),
    Transcript(TranscriptMessage),
    Reply(AiResponseMessage),
    Tts(TtsReadyMessage),
    Failed(ErrorMessage),
    Dropped(String),
}

fn forward_events(client: &SessionClient) -> mpsc::UnboundedReceiver<ExchangeEvent> {
    let (tx, rx) = mpsc::unbounded_channel();
    let sink = tx.clone();
    client.on_status(move |s| {
        let _ = sink.send(ExchangeEvent::Status(s));
    });
    let sink = tx.clone();
    client.on_transcript(move |t| {
        let _ = sink.send(ExchangeEvent::Transcript(t));
    });
    let sink = tx.clone();
    client.on_ai_response(move |r| {
        let _ = sink.send(ExchangeEvent::Reply(r));
    });
    let sink = tx.clone();
    client.on_tts_ready(move |t| {
        let _ = sink.send(ExchangeEvent::Tts(t));
    });
    let sink = tx.clone();
    client.on_error(move |e| {
        let _ = sink.send(ExchangeEvent::Failed(e));
    });
    client.on_disconnected(move |reason| {
        let _ = tx.send(ExchangeEvent::Dropped(reason));
    });
    rx
}

/// Connects, streams `chunks` followed by `audio_end`, and collects the staged
/// reply until speech is ready, the backend reports an error, the connection
/// drops, or `wait` elapses.
///
/// The caller owns teardown and should `disconnect` afterwards.
#[instrument(name = "exchange", skip_all, fields(chunks = chunks.len()))]
pub async fn run_exchange(
    client: &SessionClient,
    session_id: Option<String>,
    chunks: &[String],
    voice_profile_id: Option<i64>,
    wait: Duration,
) -> Result<ExchangeReport> {
    let total = u32::try_from(chunks.len()).context("too many audio chunks")?;
    let mut events = forward_events(client);

    if !client.connect(session_id).await {
        bail!("could not connect to {}", client.config().url);
    }

    for (index, chunk) in chunks.iter().enumerate() {
        if !client.send_audio_chunk(chunk.as_str(), index as u32) {
            bail!("connection lost while streaming chunk {index}");
        }
    }
    if !client.send_audio_end(total, voice_profile_id) {
        bail!("connection lost before audio_end");
    }
    info!(total, "Audio streamed. Waiting for the reply.");

    let deadline = Instant::now() + wait;
    let mut report = ExchangeReport::default();
    let mut reply_final = false;
    loop {
        let event = tokio::time::timeout_at(deadline, events.recv())
            .await
            .map_err(|_| anyhow!("timed out after {:?} waiting for the reply", wait))?
            .context("session observers were dropped")?;
        match event {
            ExchangeEvent::Status(status) => {
                info!(stage = %status.stage, message = ?status.message, "Backend stage.");
                report.stages.push(status.stage);
                if status.stage == Stage::Ready && reply_final {
                    break;
                }
            }
            ExchangeEvent::Transcript(transcript) => {
                info!(text = %transcript.text, confidence = ?transcript.confidence, "Transcript.");
                report.transcript = Some(transcript.text);
            }
            ExchangeEvent::Reply(reply) => {
                if reply.is_final {
                    report.reply = reply.text;
                    reply_final = true;
                } else {
                    report.reply.push_str(&reply.text);
                }
            }
            ExchangeEvent::Tts(tts) => {
                info!(audio_url = %tts.audio_url, duration = ?tts.duration, "Speech ready.");
                report.audio_url = Some(tts.audio_url);
                break;
            }
            ExchangeEvent::Failed(error) => {
                warn!(code = ?error.code, "Backend reported an error.");
                bail!("backend error: {}", error.error);
            }
            ExchangeEvent::Dropped(reason) => {
                bail!("connection lost during the exchange: {reason}");
            }
        }
    }
    report.session_id = client.session_id();
    Ok(report)
}
