//! Defines the WebSocket message protocol between the voice client and the AVATAR backend.
//!
//! Every frame is a single JSON object discriminated by its `type` field. Outbound
//! frames are produced with [`encode`]; inbound frames are parsed with [`decode`],
//! which classifies failures so the caller can log and drop a bad frame without
//! touching the connection.

use serde::{Deserialize, Serialize};

/// Close code used for a normal, caller-initiated disconnect.
pub const NORMAL_CLOSURE: u16 = 1000;

/// Close code reported when the connection dropped without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Reason attached to a caller-initiated close. Any other close is unsolicited.
pub const CLIENT_DISCONNECT_REASON: &str = "Client disconnected";

/// Returns true when a close with this code and reason was requested locally.
pub fn is_local_close(code: u16, reason: &str) -> bool {
    code == NORMAL_CLOSURE && reason == CLIENT_DISCONNECT_REASON
}

/// Messages sent from the client to the server.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// One encoded piece of the user's utterance.
    AudioChunk {
        /// Text-encoded audio payload (base64). Never inspected by the client.
        data: String,
        /// Caller-assigned, 0-based, increasing within one exchange.
        chunk_index: u32,
    },
    /// Marks the end of the utterance and asks the backend to respond.
    AudioEnd {
        total_chunks: u32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        voice_profile_id: Option<i64>,
    },
    /// Heartbeat.
    Ping,
}

/// Processing phase reported by the backend for the current exchange.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    Stt,
    Llm,
    Tts,
    Ready,
    Processing,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Stt => "stt",
            Stage::Llm => "llm",
            Stage::Tts => "tts",
            Stage::Ready => "ready",
            Stage::Processing => "processing",
        };
        f.write_str(name)
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct StatusMessage {
    pub stage: Stage,
    pub session_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

/// Speech-to-text result for the user's utterance.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TranscriptMessage {
    pub text: String,
    /// Recognizer confidence in `0.0..=1.0`, when the backend reports one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct AiResponseMessage {
    pub text: String,
    pub is_final: bool,
}

/// Synthesized speech is available for download.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct TtsReadyMessage {
    pub audio_url: String,
    /// Length of the clip in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub duration: Option<f64>,
}

/// Application error reported by the backend. Does not close the connection.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ErrorMessage {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
}

/// Messages sent from the server to the client.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Issued once the backend has accepted the connection, carrying the session identity.
    Connected { session_id: String },
    Status(StatusMessage),
    Transcript(TranscriptMessage),
    AiResponse(AiResponseMessage),
    TtsReady(TtsReadyMessage),
    Error(ErrorMessage),
    /// Heartbeat reply. Not routed to any observer.
    Pong,
}

impl ServerMessage {
    /// The wire discriminant of this message.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Connected { .. } => "connected",
            ServerMessage::Status(_) => "status",
            ServerMessage::Transcript(_) => "transcript",
            ServerMessage::AiResponse(_) => "ai_response",
            ServerMessage::TtsReady(_) => "tts_ready",
            ServerMessage::Error(_) => "error",
            ServerMessage::Pong => "pong",
        }
    }
}

const KNOWN_SERVER_KINDS: &[&str] = &[
    "connected",
    "status",
    "transcript",
    "ai_response",
    "tts_ready",
    "error",
    "pong",
];

/// Why an inbound frame could not be turned into a [`ServerMessage`].
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("frame is not valid JSON: {0}")]
    Malformed(#[source] serde_json::Error),
    #[error("frame has no `type` field")]
    MissingKind,
    #[error("unknown message type `{0}`")]
    UnknownKind(String),
    #[error("invalid `{kind}` message: {source}")]
    InvalidFields {
        kind: String,
        #[source]
        source: serde_json::Error,
    },
}

/// Serializes an outbound message into a text frame.
pub fn encode(msg: &ClientMessage) -> Result<String, serde_json::Error> {
    serde_json::to_string(msg)
}

/// Parses one inbound text frame.
pub fn decode(frame: &str) -> Result<ServerMessage, DecodeError> {
    let value: serde_json::Value = serde_json::from_str(frame).map_err(DecodeError::Malformed)?;
    let kind = match value.get("type").and_then(serde_json::Value::as_str) {
        Some(kind) => kind.to_owned(),
        None => return Err(DecodeError::MissingKind),
    };
    if !KNOWN_SERVER_KINDS.contains(&kind.as_str()) {
        return Err(DecodeError::UnknownKind(kind));
    }
    serde_json::from_value(value).map_err(|source| DecodeError::InvalidFields { kind, source })
}
