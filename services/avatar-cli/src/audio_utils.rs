use anyhow::{Context, bail};
use base64::Engine;
use std::path::Path;

/// Chunk size used by the browser client when streaming recordings.
pub const DEFAULT_CHUNK_SIZE: usize = 32 * 1024;

/// Splits raw audio bytes into `chunk_size` pieces and base64-encodes each one.
/// The bytes are never interpreted.
pub fn encode_chunks(audio: &[u8], chunk_size: usize) -> Vec<String> {
    audio
        .chunks(chunk_size.max(1))
        .map(|chunk| base64::engine::general_purpose::STANDARD.encode(chunk))
        .collect()
}

/// Reads an audio file and returns its encoded chunks.
pub fn load_chunks(path: &Path, chunk_size: usize) -> anyhow::Result<Vec<String>> {
    if chunk_size == 0 {
        bail!("chunk size must be greater than zero");
    }
    let audio = std::fs::read(path)
        .with_context(|| format!("Failed to read audio file {}", path.display()))?;
    if audio.is_empty() {
        bail!("audio file {} is empty", path.display());
    }
    Ok(encode_chunks(&audio, chunk_size))
}
