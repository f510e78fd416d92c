use crate::state::ConnectionState;

/// Failures raised by a [`Transport`](crate::transport::Transport).
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("failed to open {target}: {reason}")]
    Open { target: String, reason: String },
    #[error("transport is closed")]
    Closed,
}

/// Why an outbound frame was not handed to the transport.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("not connected (state: {0})")]
    NotConnected(ConnectionState),
    #[error("failed to encode frame: {0}")]
    Encode(#[from] serde_json::Error),
    #[error(transparent)]
    Transport(#[from] TransportError),
}
