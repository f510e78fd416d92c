//! AVATAR command-line client.
//!
//! Streams a recorded utterance to the voice backend over a session and
//! reports the staged reply. The `bin/avatar.rs` binary is a thin wrapper
//! around this library.

pub mod audio_utils;
pub mod config;
pub mod exchange;
