use avatar_realtime_types::ClientMessage;
use tracing::warn;

/// Tracks the audio frames sent in the current exchange.
///
/// Purely diagnostic: frames are never held back or reordered, a warning is
/// logged when the caller's indices or totals do not line up.
#[derive(Debug, Default)]
pub(crate) struct ExchangeCursor {
    sent: u32,
    last_index: Option<u32>,
}

impl ExchangeCursor {
    pub(crate) fn reset(&mut self) {
        *self = Self::default();
    }

    /// Number of `audio_chunk` frames sent since the exchange began.
    pub(crate) fn chunks_sent(&self) -> u32 {
        self.sent
    }

    /// Records a frame that was handed to the transport.
    pub(crate) fn observe(&mut self, msg: &ClientMessage) {
        match msg {
            ClientMessage::AudioChunk { chunk_index, .. } => {
                if let Some(last) = self.last_index {
                    if *chunk_index <= last {
                        warn!(
                            chunk_index,
                            previous = last,
                            "Audio chunk index is not increasing."
                        );
                    }
                }
                self.last_index = Some(*chunk_index);
                self.sent += 1;
            }
            ClientMessage::AudioEnd { total_chunks, .. } => {
                if *total_chunks != self.sent {
                    warn!(
                        total_chunks,
                        sent = self.sent,
                        "audio_end total does not match chunks sent in this exchange."
                    );
                }
                self.reset();
            }
            ClientMessage::Ping => {}
        }
    }
}
