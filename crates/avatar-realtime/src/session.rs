//! Manages the lifecycle of one conversation connection.
//!
//! A [`SessionClient`] owns the transport link, the heartbeat task and the
//! reconnect timer, and moves through [`ConnectionState`]s as the caller and
//! the transport act on it. Every background task holds only a weak reference
//! to the session, so dropping the last client handle tears everything down.

use crate::{
    config::SessionConfig,
    dispatch::Dispatcher,
    error::{SessionError, TransportError},
    exchange::ExchangeCursor,
    slot::TaskSlot,
    state::ConnectionState,
    transport::{Link, Outbound, Transport, TransportEvent, WebSocketTransport},
};
use avatar_realtime_types::{
    self as protocol, ABNORMAL_CLOSURE, AiResponseMessage, CLIENT_DISCONNECT_REASON, ClientMessage,
    ErrorMessage, NORMAL_CLOSURE, ServerMessage, StatusMessage, TranscriptMessage,
    TtsReadyMessage,
};
use futures::{FutureExt, future::BoxFuture};
use parking_lot::Mutex;
use std::sync::Arc;
use tokio::{
    sync::mpsc,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tracing::{debug, error, info, warn};

/// Who asked for a connection attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Origin {
    Caller,
    Reconnect,
}

/// The live transport and the task draining its events.
struct ActiveLink {
    epoch: u64,
    sender: mpsc::UnboundedSender<Outbound>,
    pump: TaskSlot,
}

impl ActiveLink {
    /// Asks the transport for a normal closure and stops processing its events.
    fn close_locally(mut self) {
        let _ = self.sender.send(Outbound::Close {
            code: NORMAL_CLOSURE,
            reason: CLIENT_DISCONNECT_REASON.to_string(),
        });
        self.pump.cancel();
    }
}

#[derive(Default)]
struct Inner {
    state: ConnectionState,
    session_id: Option<String>,
    reconnect_attempts: u32,
    /// Bumped by every connection attempt and every disconnect. Results and
    /// timers tagged with an older epoch are stale.
    epoch: u64,
    link: Option<ActiveLink>,
    heartbeat: TaskSlot,
    reconnect: TaskSlot,
    exchange: ExchangeCursor,
}

impl Inner {
    /// Returns the new state when it actually changed.
    fn set_state(&mut self, next: ConnectionState) -> Option<ConnectionState> {
        if self.state == next {
            None
        } else {
            self.state = next;
            Some(next)
        }
    }

    fn owns_link(&self, epoch: u64) -> bool {
        self.link.as_ref().is_some_and(|link| link.epoch == epoch)
    }
}

struct Shared {
    config: SessionConfig,
    transport: Arc<dyn Transport>,
    dispatcher: Dispatcher,
    inner: Mutex<Inner>,
}

/// Client for one streaming conversation with the voice backend.
///
/// Cloning yields another handle to the same session. The session is meant to be
/// driven by one caller at a time; observers run on the session's event task.
#[derive(Clone)]
pub struct SessionClient {
    shared: Arc<Shared>,
}

impl SessionClient {
    /// Creates a client that connects over WebSocket.
    pub fn new(config: SessionConfig) -> Self {
        Self::with_transport(config, WebSocketTransport)
    }

    pub fn with_transport(config: SessionConfig, transport: impl Transport) -> Self {
        Self {
            shared: Arc::new(Shared {
                config,
                transport: Arc::new(transport),
                dispatcher: Dispatcher::default(),
                inner: Mutex::new(Inner::default()),
            }),
        }
    }

    pub fn config(&self) -> &SessionConfig {
        &self.shared.config
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.shared.inner.lock().state
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    /// The session identity used to correlate reconnects, if one is known.
    pub fn session_id(&self) -> Option<String> {
        self.shared.inner.lock().session_id.clone()
    }

    pub fn reconnect_attempts(&self) -> u32 {
        self.shared.inner.lock().reconnect_attempts
    }

    /// Number of `audio_chunk` frames sent since the last `audio_end` or since the transport opened.
    pub fn chunks_sent(&self) -> u32 {
        self.shared.inner.lock().exchange.chunks_sent()
    }

    pub fn heartbeat_active(&self) -> bool {
        self.shared.inner.lock().heartbeat.is_armed()
    }

    pub fn reconnect_pending(&self) -> bool {
        self.shared.inner.lock().reconnect.is_armed()
    }

    /// The observer table. Registration methods are also available directly on the client.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.shared.dispatcher
    }

    pub fn on_connected(&self, observer: impl Fn(String) + Send + Sync + 'static) {
        self.shared.dispatcher.on_connected(observer);
    }

    pub fn on_disconnected(&self, observer: impl Fn(String) + Send + Sync + 'static) {
        self.shared.dispatcher.on_disconnected(observer);
    }

    pub fn on_state_change(&self, observer: impl Fn(ConnectionState) + Send + Sync + 'static) {
        self.shared.dispatcher.on_state_change(observer);
    }

    pub fn on_status(&self, observer: impl Fn(StatusMessage) + Send + Sync + 'static) {
        self.shared.dispatcher.on_status(observer);
    }

    pub fn on_transcript(&self, observer: impl Fn(TranscriptMessage) + Send + Sync + 'static) {
        self.shared.dispatcher.on_transcript(observer);
    }

    pub fn on_ai_response(&self, observer: impl Fn(AiResponseMessage) + Send + Sync + 'static) {
        self.shared.dispatcher.on_ai_response(observer);
    }

    pub fn on_tts_ready(&self, observer: impl Fn(TtsReadyMessage) + Send + Sync + 'static) {
        self.shared.dispatcher.on_tts_ready(observer);
    }

    pub fn on_error(&self, observer: impl Fn(ErrorMessage) + Send + Sync + 'static) {
        self.shared.dispatcher.on_error(observer);
    }

    /// Opens the transport, resolving to `true` once it is open and `false` if
    /// opening failed or the attempt was superseded by another `connect` or a
    /// `disconnect`.
    ///
    /// A known `session_id` is stored and sent as a correlation parameter. A
    /// failed open settles in [`ConnectionState::Error`] without scheduling an
    /// automatic reconnect.
    pub async fn connect(&self, session_id: Option<String>) -> bool {
        self.shared.clone().attempt(session_id, Origin::Caller).await
    }

    /// Tears the session down: cancels the reconnect timer and heartbeat,
    /// closes the transport with a normal closure and forgets the session id.
    ///
    /// Calling it again is a no-op.
    pub fn disconnect(&self) {
        let (closed_link, changed) = {
            let mut inner = self.shared.inner.lock();
            inner.reconnect.cancel();
            inner.heartbeat.cancel();
            inner.epoch += 1;
            let closed_link = match inner.link.take() {
                Some(link) => {
                    link.close_locally();
                    true
                }
                None => false,
            };
            inner.session_id = None;
            inner.exchange.reset();
            (closed_link, inner.set_state(ConnectionState::Disconnected))
        };
        if closed_link {
            info!("Session disconnected by client.");
            self.shared
                .dispatcher
                .disconnected(CLIENT_DISCONNECT_REASON.to_string());
        }
        self.shared.notify_state(changed);
    }

    /// Sends one `audio_chunk` frame. Returns `false` when not connected or the
    /// transport rejected the frame; nothing is queued.
    pub fn send_audio_chunk(&self, data: impl Into<String>, chunk_index: u32) -> bool {
        let msg = ClientMessage::AudioChunk {
            data: data.into(),
            chunk_index,
        };
        match self.shared.send(msg) {
            Ok(()) => true,
            Err(e) => {
                error!(chunk_index, error = %e, "Cannot send audio chunk.");
                false
            }
        }
    }

    /// Sends the `audio_end` frame that closes the current exchange.
    pub fn send_audio_end(&self, total_chunks: u32, voice_profile_id: Option<i64>) -> bool {
        let msg = ClientMessage::AudioEnd {
            total_chunks,
            voice_profile_id,
        };
        match self.shared.send(msg) {
            Ok(()) => true,
            Err(e) => {
                error!(total_chunks, error = %e, "Cannot send audio end.");
                false
            }
        }
    }
}

impl Shared {
    fn notify_state(&self, changed: Option<ConnectionState>) {
        if let Some(state) = changed {
            debug!(%state, "Connection state changed.");
            self.dispatcher.state_changed(state);
        }
    }

    fn send(&self, msg: ClientMessage) -> Result<(), SessionError> {
        let mut inner = self.inner.lock();
        if inner.state != ConnectionState::Connected {
            return Err(SessionError::NotConnected(inner.state));
        }
        let Some(link) = inner.link.as_ref() else {
            return Err(SessionError::NotConnected(inner.state));
        };
        let frame = protocol::encode(&msg)?;
        link.sender
            .send(Outbound::Text(frame))
            .map_err(|_| TransportError::Closed)?;
        inner.exchange.observe(&msg);
        Ok(())
    }

    /// One connection attempt. Boxed because reconnect timers spawn it from
    /// inside the session's own tasks.
    fn attempt(self: Arc<Self>, session_id: Option<String>, origin: Origin) -> BoxFuture<'static, bool> {
        async move {
            let (target, epoch, changed) = {
                let mut inner = self.inner.lock();
                if let Some(id) = session_id {
                    inner.session_id = Some(id);
                }
                inner.reconnect.cancel();
                inner.heartbeat.cancel();
                if let Some(link) = inner.link.take() {
                    debug!("Replacing the live transport with a new connection.");
                    link.close_locally();
                }
                inner.epoch += 1;
                let target = self.config.target(inner.session_id.as_deref());
                let changed = inner.set_state(ConnectionState::Connecting);
                (target, inner.epoch, changed)
            };
            self.notify_state(changed);
            info!(%target, ?origin, "Opening session transport.");

            let opened = self.transport.open(&target).await;

            let mut lost = None;
            let (connected, changed) = {
                let mut inner = self.inner.lock();
                if inner.epoch != epoch {
                    debug!(?origin, "Connection attempt superseded.");
                    if let Ok(link) = opened {
                        let _ = link.sender.send(Outbound::Close {
                            code: NORMAL_CLOSURE,
                            reason: CLIENT_DISCONNECT_REASON.to_string(),
                        });
                    }
                    return false;
                }
                match opened {
                    Ok(Link { sender, events }) => {
                        inner.reconnect_attempts = 0;
                        inner.exchange.reset();
                        let mut pump = TaskSlot::default();
                        pump.arm(self.spawn_pump(epoch, events));
                        inner.link = Some(ActiveLink {
                            epoch,
                            sender,
                            pump,
                        });
                        let changed = inner.set_state(ConnectionState::Connected);
                        self.arm_heartbeat(&mut inner);
                        (true, changed)
                    }
                    Err(e) => match origin {
                        Origin::Caller => {
                            error!(error = %e, "Failed to open session transport.");
                            (false, inner.set_state(ConnectionState::Error))
                        }
                        Origin::Reconnect => {
                            warn!(error = %e, attempt = inner.reconnect_attempts, "Reconnect attempt failed.");
                            lost = Some(e.to_string());
                            (false, self.after_unsolicited_loss(&mut inner))
                        }
                    },
                }
            };
            if connected {
                info!("Session transport open.");
            }
            if let Some(reason) = lost {
                self.dispatcher.disconnected(reason);
            }
            self.notify_state(changed);
            connected
        }
        .boxed()
    }

    fn spawn_pump(
        self: &Arc<Self>,
        epoch: u64,
        mut events: mpsc::UnboundedReceiver<TransportEvent>,
    ) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            let (code, reason) = loop {
                let Some(event) = events.recv().await else {
                    break (ABNORMAL_CLOSURE, String::new());
                };
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                match event {
                    TransportEvent::Text(frame) => shared.handle_frame(epoch, &frame),
                    TransportEvent::Closed { code, reason } => break (code, reason),
                    TransportEvent::Error(reason) => {
                        error!(%reason, "Session transport failed.");
                        break (ABNORMAL_CLOSURE, reason);
                    }
                }
            };
            if let Some(shared) = weak.upgrade() {
                shared.handle_close(epoch, code, reason);
            }
        })
    }

    fn handle_frame(&self, epoch: u64, frame: &str) {
        let msg = match protocol::decode(frame) {
            Ok(msg) => msg,
            Err(e) => {
                warn!(error = %e, "Dropping inbound frame.");
                return;
            }
        };
        {
            let mut inner = self.inner.lock();
            if !inner.owns_link(epoch) {
                return;
            }
            if let ServerMessage::Connected { session_id } = &msg {
                info!(%session_id, "Server assigned session.");
                inner.session_id = Some(session_id.clone());
            }
        }
        debug!(kind = msg.kind(), "Inbound message.");
        self.dispatcher.dispatch(msg);
    }

    fn handle_close(self: &Arc<Self>, epoch: u64, code: u16, reason: String) {
        let changed = {
            let mut inner = self.inner.lock();
            if !inner.owns_link(epoch) {
                return;
            }
            if let Some(mut link) = inner.link.take() {
                // This runs on the pump itself.
                link.pump.release();
            }
            inner.heartbeat.cancel();
            if protocol::is_local_close(code, &reason) {
                inner.session_id = None;
                inner.set_state(ConnectionState::Disconnected)
            } else {
                self.after_unsolicited_loss(&mut inner)
            }
        };
        info!(code, %reason, "Session transport closed.");
        let reason = if reason.is_empty() {
            format!("Code: {code}")
        } else {
            reason
        };
        self.dispatcher.disconnected(reason);
        self.notify_state(changed);
    }

    /// Applies the reconnect policy after the transport went away on its own.
    fn after_unsolicited_loss(self: &Arc<Self>, inner: &mut Inner) -> Option<ConnectionState> {
        if !self.config.auto_reconnect {
            return inner.set_state(ConnectionState::Disconnected);
        }
        let max = self.config.max_reconnect_attempts;
        if inner.reconnect_attempts >= max {
            warn!(attempts = inner.reconnect_attempts, "Giving up on reconnecting.");
            return inner.set_state(ConnectionState::Error);
        }
        inner.reconnect_attempts += 1;
        info!(
            attempt = inner.reconnect_attempts,
            max,
            delay = ?self.config.reconnect_interval,
            "Scheduling reconnect."
        );
        let timer = self.spawn_reconnect_timer(inner.epoch);
        inner.reconnect.arm(timer);
        inner.set_state(ConnectionState::Reconnecting)
    }

    fn spawn_reconnect_timer(self: &Arc<Self>, ticket: u64) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        let delay = self.config.reconnect_interval;
        tokio::spawn(async move {
            time::sleep(delay).await;
            let Some(shared) = weak.upgrade() else {
                return;
            };
            let session_id = {
                let mut inner = shared.inner.lock();
                if inner.epoch != ticket {
                    return;
                }
                inner.reconnect.release();
                inner.session_id.clone()
            };
            shared.attempt(session_id, Origin::Reconnect).await;
        })
    }

    fn arm_heartbeat(self: &Arc<Self>, inner: &mut Inner) {
        let period = self.config.heartbeat_interval;
        if period.is_zero() {
            inner.heartbeat.cancel();
            return;
        }
        let weak = Arc::downgrade(self);
        inner.heartbeat.arm(tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let Some(shared) = weak.upgrade() else {
                    return;
                };
                if let Err(e) = shared.send(ClientMessage::Ping) {
                    warn!(error = %e, "Heartbeat failed.");
                }
            }
        }));
    }
}
