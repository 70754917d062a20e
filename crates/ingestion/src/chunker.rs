//! Text chunking module
//!
//! Splits text into fixed-size, overlapping character windows. Chunk `i`
//! starts at `i * (window - overlap)` and ends at `min(start + window, len)`;
//! the first chunk reaching the end of the text is the last one, so the
//! final chunk may be short. Offsets count characters, not bytes.

use docvault_common::config::ChunkingConfig;
use docvault_common::errors::{AppError, Result};
use tracing::debug;

/// A text chunk with its position in the source text
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextChunk {
    /// The chunk content
    pub content: String,
    /// Index of this chunk in the document
    pub index: u32,
    /// Start character position in original text
    pub start_pos: usize,
    /// End character position (exclusive)
    pub end_pos: usize,
}

/// Split text into overlapping windows
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Result<Vec<TextChunk>> {
    let window = config.window_chars;
    let overlap = config.overlap_chars;
    if window == 0 || overlap >= window {
        return Err(AppError::Validation {
            message: format!(
                "chunk overlap ({}) must be smaller than a non-zero window ({})",
                overlap, window
            ),
            field: Some("chunking".to_string()),
        });
    }

    let chars: Vec<char> = text.chars().collect();
    if chars.is_empty() {
        return Err(AppError::validation("cannot chunk empty text"));
    }

    let step = window - overlap;
    let mut chunks = Vec::with_capacity(chars.len() / step + 1);
    let mut start = 0;

    loop {
        let end = (start + window).min(chars.len());
        chunks.push(TextChunk {
            content: chars[start..end].iter().collect(),
            index: chunks.len() as u32,
            start_pos: start,
            end_pos: end,
        });
        if end == chars.len() {
            break;
        }
        start += step;
    }

    debug!(
        input_chars = chars.len(),
        chunk_count = chunks.len(),
        window,
        overlap,
        "Text chunked"
    );

    Ok(chunks)
}
