//! Chunking utilities for splitting documents into overlapping word windows.
//!
//! A document is split on whitespace into a word stream, then cut into
//! windows of `chunk_size` words. Each window after the first starts
//! `chunk_overlap` words before the previous window's end, so neighbouring
//! chunks share context. The defaults (600 words, 150 overlap) keep a chunk
//! comfortably inside the context window of small embedding models.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default number of words per chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 600;

/// Default number of words shared between consecutive chunks.
pub const DEFAULT_CHUNK_OVERLAP: usize = 150;

/// Word-window chunking settings.
///
/// # Examples
///
/// ```
/// use autoresearcher::chunking::{ChunkingConfig, DEFAULT_CHUNK_SIZE};
///
/// let config = ChunkingConfig::default();
/// assert_eq!(config.chunk_size, DEFAULT_CHUNK_SIZE);
/// assert!(config.validate().is_ok());
///
/// let stalled = ChunkingConfig { chunk_size: 10, chunk_overlap: 10 };
/// assert!(stalled.validate().is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkingConfig {
    /// Words per window.
    pub chunk_size: usize,
    /// Words re-used from the end of the previous window.
    pub chunk_overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            chunk_overlap: DEFAULT_CHUNK_OVERLAP,
        }
    }
}

impl ChunkingConfig {
    /// Check that the window always advances.
    ///
    /// An overlap as large as the window would restart every window at the
    /// same offset, so it is rejected instead of silently clamped.
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be positive".into()));
        }
        if self.chunk_overlap >= self.chunk_size {
            return Err(Error::Config(format!(
                "chunk_overlap ({}) must be smaller than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

/// A window of a document's word stream.
///
/// Produced by [`chunk_text`]. `start` and `end` are word offsets into the
/// cleaned document, `end` exclusive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// Zero-based chunk index within the document.
    pub chunk_id: usize,
    /// Offset of the first word.
    pub start: usize,
    /// Offset one past the last word.
    pub end: usize,
    /// The window's words joined by single spaces.
    pub text: String,
}

/// Replace carriage returns with spaces. Idempotent.
pub fn clean_text(text: &str) -> String {
    text.replace('\r', " ")
}

/// Split text into overlapping word windows.
///
/// Returns an empty vector when the text has no words. Fails only when the
/// configuration would not make progress.
///
/// # Examples
///
/// ```
/// use autoresearcher::chunking::{chunk_text, ChunkingConfig};
///
/// let text = "word ".repeat(1300);
/// let config = ChunkingConfig { chunk_size: 600, chunk_overlap: 150 };
/// let chunks = chunk_text(&text, &config).unwrap();
///
/// let bounds: Vec<_> = chunks.iter().map(|c| (c.start, c.end)).collect();
/// assert_eq!(bounds, vec![(0, 600), (450, 1050), (900, 1300)]);
/// ```
pub fn chunk_text(text: &str, config: &ChunkingConfig) -> Result<Vec<Chunk>> {
    config.validate()?;

    let cleaned = clean_text(text);
    let words: Vec<&str> = cleaned.split_whitespace().collect();
    let n = words.len();

    let mut chunks = Vec::new();
    let mut start = 0;
    let mut chunk_id = 0;

    while start < n {
        let end = (start + config.chunk_size).min(n);
        let text = words[start..end].join(" ");

        if !text.trim().is_empty() {
            chunks.push(Chunk {
                chunk_id,
                start,
                end,
                text,
            });
            chunk_id += 1;
        }

        if end == n {
            break;
        }

        start = end.saturating_sub(config.chunk_overlap);
    }

    Ok(chunks)
}
