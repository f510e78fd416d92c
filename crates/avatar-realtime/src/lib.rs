//! Streaming session client for the AVATAR voice backend.
//!
//! The crate is split into small modules:
//!
//! - `session`: the connection state machine, heartbeat and reconnect policy.
//! - `dispatch`: one optional observer per inbound message kind.
//! - `transport`: the byte-stream seam and its WebSocket implementation.
//! - `config`: connection and recovery settings.
//!
//! The wire format itself lives in `avatar-realtime-types` and is re-exported
//! as [`protocol`].

pub mod config;
pub mod dispatch;
pub mod error;
mod exchange;
pub mod session;
mod slot;
pub mod state;
pub mod transport;

pub use avatar_realtime_types as protocol;
pub use config::SessionConfig;
pub use dispatch::Dispatcher;
pub use error::{SessionError, TransportError};
pub use session::SessionClient;
pub use state::ConnectionState;
pub use transport::{Link, Outbound, Transport, TransportEvent, WebSocketTransport};
