//! The byte-stream seam underneath a session.
//!
//! A [`Transport`] opens one bidirectional connection and hands back a [`Link`]:
//! an unbounded sender for outbound frames and a receiver of [`TransportEvent`]s.
//! Sending never waits on the network, which keeps the session's send calls
//! synchronous while the transport does its I/O on its own tasks.

use crate::error::TransportError;
use async_trait::async_trait;
use avatar_realtime_types::ABNORMAL_CLOSURE;
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::{
    connect_async,
    tungstenite::protocol::{CloseFrame, Message as WsMessage, frame::coding::CloseCode},
};
use tracing::{debug, info, warn};
use url::Url;

/// Close code for a close frame that carried no status.
const NO_STATUS_RECEIVED: u16 = 1005;

/// Outbound request for the writer half of a link.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outbound {
    Text(String),
    Close { code: u16, reason: String },
}

/// Something the reader half of a link observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Text(String),
    /// The peer closed the connection, or it was closed locally and the close completed.
    Closed { code: u16, reason: String },
    /// The connection failed. No further events follow.
    Error(String),
}

/// An open connection.
#[derive(Debug)]
pub struct Link {
    pub sender: mpsc::UnboundedSender<Outbound>,
    pub events: mpsc::UnboundedReceiver<TransportEvent>,
}

/// Opens connections to a target URL.
#[async_trait]
pub trait Transport: Send + Sync + 'static {
    /// Resolves once the connection is open or has definitively failed.
    async fn open(&self, target: &Url) -> Result<Link, TransportError>;
}

/// WebSocket transport over `tokio-tungstenite`.
#[derive(Debug, Default, Clone)]
pub struct WebSocketTransport;

#[async_trait]
impl Transport for WebSocketTransport {
    async fn open(&self, target: &Url) -> Result<Link, TransportError> {
        let (ws_stream, _) =
            connect_async(target.as_str())
                .await
                .map_err(|e| TransportError::Open {
                    target: target.to_string(),
                    reason: e.to_string(),
                })?;
        info!(%target, "WebSocket connection established.");
        let (mut ws_tx, mut ws_rx) = ws_stream.split();

        let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outbound>();
        let (event_tx, event_rx) = mpsc::unbounded_channel();

        // Writer: forwards frames in the order they were queued.
        let writer_events = event_tx.clone();
        tokio::spawn(async move {
            while let Some(outbound) = out_rx.recv().await {
                let (msg, closing) = match outbound {
                    Outbound::Text(text) => (WsMessage::Text(text.into()), false),
                    Outbound::Close { code, reason } => (
                        WsMessage::Close(Some(CloseFrame {
                            code: CloseCode::from(code),
                            reason: reason.into(),
                        })),
                        true,
                    ),
                };
                if let Err(e) = ws_tx.send(msg).await {
                    warn!(error = %e, "Failed to write to WebSocket.");
                    let _ = writer_events.send(TransportEvent::Error(e.to_string()));
                    return;
                }
                if closing {
                    break;
                }
            }
            let _ = ws_tx.close().await;
        });

        // Reader: translates WebSocket messages into transport events.
        tokio::spawn(async move {
            while let Some(msg_result) = ws_rx.next().await {
                let event = match msg_result {
                    Ok(WsMessage::Text(text)) => TransportEvent::Text(text.to_string()),
                    Ok(WsMessage::Close(frame)) => {
                        let (code, reason) = frame
                            .map(|f| (u16::from(f.code), f.reason.to_string()))
                            .unwrap_or((NO_STATUS_RECEIVED, String::new()));
                        let _ = event_tx.send(TransportEvent::Closed { code, reason });
                        return;
                    }
                    Ok(WsMessage::Binary(_)) => {
                        debug!("Ignoring binary WebSocket frame.");
                        continue;
                    }
                    Ok(_) => continue,
                    Err(e) => {
                        let _ = event_tx.send(TransportEvent::Error(e.to_string()));
                        return;
                    }
                };
                if event_tx.send(event).is_err() {
                    return;
                }
            }
            let _ = event_tx.send(TransportEvent::Closed {
                code: ABNORMAL_CLOSURE,
                reason: String::new(),
            });
        });

        Ok(Link {
            sender: out_tx,
            events: event_rx,
        })
    }
}
