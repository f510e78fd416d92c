//! Routes inbound messages to a single observer per message kind.

use crate::state::ConnectionState;
use avatar_realtime_types::{
    AiResponseMessage, ErrorMessage, ServerMessage, StatusMessage, TranscriptMessage,
    TtsReadyMessage,
};
use parking_lot::RwLock;
use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};
use tracing::{debug, error};

type Observer<T> = Arc<dyn Fn(T) + Send + Sync>;

#[derive(Default)]
struct Observers {
    connected: Option<Observer<String>>,
    disconnected: Option<Observer<String>>,
    state_change: Option<Observer<ConnectionState>>,
    status: Option<Observer<StatusMessage>>,
    transcript: Option<Observer<TranscriptMessage>>,
    ai_response: Option<Observer<AiResponseMessage>>,
    tts_ready: Option<Observer<TtsReadyMessage>>,
    error: Option<Observer<ErrorMessage>>,
}

/// Fixed table of optional observers, one slot per event kind.
///
/// Registering an observer replaces whatever was in its slot. Observers are
/// invoked on the task that received the event, without any internal lock held,
/// so an observer may call back into the session or re-register itself.
#[derive(Default)]
pub struct Dispatcher {
    observers: RwLock<Observers>,
}

/// A panicking observer is logged and contained so the receiving task keeps running.
fn deliver<T>(observer: Option<Observer<T>>, value: T) -> bool {
    let Some(observer) = observer else {
        return false;
    };
    if catch_unwind(AssertUnwindSafe(|| observer(value))).is_err() {
        error!("Session observer panicked.");
    }
    true
}

impl Dispatcher {
    /// Called with the session id carried by a `connected` frame.
    pub fn on_connected(&self, observer: impl Fn(String) + Send + Sync + 'static) {
        self.observers.write().connected = Some(Arc::new(observer));
    }

    /// Called with a human-readable reason whenever the transport goes away.
    pub fn on_disconnected(&self, observer: impl Fn(String) + Send + Sync + 'static) {
        self.observers.write().disconnected = Some(Arc::new(observer));
    }

    pub fn on_state_change(&self, observer: impl Fn(ConnectionState) + Send + Sync + 'static) {
        self.observers.write().state_change = Some(Arc::new(observer));
    }

    pub fn on_status(&self, observer: impl Fn(StatusMessage) + Send + Sync + 'static) {
        self.observers.write().status = Some(Arc::new(observer));
    }

    pub fn on_transcript(&self, observer: impl Fn(TranscriptMessage) + Send + Sync + 'static) {
        self.observers.write().transcript = Some(Arc::new(observer));
    }

    pub fn on_ai_response(&self, observer: impl Fn(AiResponseMessage) + Send + Sync + 'static) {
        self.observers.write().ai_response = Some(Arc::new(observer));
    }

    pub fn on_tts_ready(&self, observer: impl Fn(TtsReadyMessage) + Send + Sync + 'static) {
        self.observers.write().tts_ready = Some(Arc::new(observer));
    }

    /// Called with server-reported application errors.
    pub fn on_error(&self, observer: impl Fn(ErrorMessage) + Send + Sync + 'static) {
        self.observers.write().error = Some(Arc::new(observer));
    }

    /// Hands `msg` to the observer registered for its kind.
    ///
    /// Returns `true` if an observer was invoked.
    pub fn dispatch(&self, msg: ServerMessage) -> bool {
        match msg {
            ServerMessage::Connected { session_id } => {
                let observer = self.observers.read().connected.clone();
                deliver(observer, session_id)
            }
            ServerMessage::Status(status) => {
                let observer = self.observers.read().status.clone();
                deliver(observer, status)
            }
            ServerMessage::Transcript(transcript) => {
                let observer = self.observers.read().transcript.clone();
                deliver(observer, transcript)
            }
            ServerMessage::AiResponse(response) => {
                let observer = self.observers.read().ai_response.clone();
                deliver(observer, response)
            }
            ServerMessage::TtsReady(tts) => {
                let observer = self.observers.read().tts_ready.clone();
                deliver(observer, tts)
            }
            ServerMessage::Error(error) => {
                let observer = self.observers.read().error.clone();
                deliver(observer, error)
            }
            ServerMessage::Pong => {
                debug!("Heartbeat acknowledged by server.");
                false
            }
        }
    }

    pub(crate) fn state_changed(&self, state: ConnectionState) {
        let observer = self.observers.read().state_change.clone();
        deliver(observer, state);
    }

    pub(crate) fn disconnected(&self, reason: String) {
        let observer = self.observers.read().disconnected.clone();
        deliver(observer, reason);
    }
}
