//! Fixed-size window chunking for ingestion.
//!
//! Documents are split into overlapping windows counted either in characters
//! or in whitespace-separated words.

use serde::{Deserialize, Serialize};

/// Unit the window size and overlap are measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ChunkUnit {
    /// Unicode scalar values.
    #[default]
    Chars,
    /// Whitespace-separated words, rejoined with single spaces.
    Words,
}

impl std::str::FromStr for ChunkUnit {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chars" | "characters" => Ok(ChunkUnit::Chars),
            "words" => Ok(ChunkUnit::Words),
            _ => Err(format!("Unknown chunk unit: {}", s)),
        }
    }
}

/// Splits text into overlapping fixed-size windows.
#[derive(Debug, Clone)]
pub struct TextChunker {
    chunk_size: usize,
    chunk_overlap: usize,
    unit: ChunkUnit,
}

impl TextChunker {
    /// Create a new chunker.
    ///
    /// An overlap that is not smaller than the window is clamped to
    /// `chunk_size - 1` so the window always advances.
    pub fn new(chunk_size: usize, chunk_overlap: usize, unit: ChunkUnit) -> Self {
        let chunk_size = chunk_size.max(1);
        Self {
            chunk_size,
            chunk_overlap: chunk_overlap.min(chunk_size - 1),
            unit,
        }
    }

    /// Build a chunker from the configured chunking settings.
    pub fn from_settings(settings: &crate::config::ChunkingSettings) -> Self {
        Self::new(settings.chunk_size, settings.chunk_overlap, settings.unit)
    }

    /// Split text into windows. Blank windows are dropped.
    pub fn chunk(&self, text: &str) -> Vec<String> {
        match self.unit {
            ChunkUnit::Chars => {
                let chars: Vec<char> = text.chars().collect();
                self.windows(chars.len())
                    .map(|(start, end)| chars[start..end].iter().collect::<String>())
                    .filter_map(non_blank)
                    .collect()
            }
            ChunkUnit::Words => {
                let words: Vec<&str> = text.split_whitespace().collect();
                self.windows(words.len())
                    .map(|(start, end)| words[start..end].join(" "))
                    .filter_map(non_blank)
                    .collect()
            }
        }
    }

    /// Window bounds over `len` units. The last window always ends at `len`.
    fn windows(&self, len: usize) -> impl Iterator<Item = (usize, usize)> {
        let step = self.chunk_size - self.chunk_overlap;
        let size = self.chunk_size;
        let mut start = 0;
        let mut done = len == 0;

        std::iter::from_fn(move || {
            if done {
                return None;
            }
            let end = (start + size).min(len);
            let window = (start, end);
            if end == len {
                done = true;
            } else {
                start += step;
            }
            Some(window)
        })
    }
}

fn non_blank(s: String) -> Option<String> {
    let trimmed = s.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
