//! Fixed-size sliding-window chunker for retrieval.
//!
//! Chunking is independent of semantic segmentation: a chunk may straddle
//! sentences, and it is never persisted. The window is measured either in
//! characters or in whitespace-separated words.
//!
//! # Algorithm
//!
//! 1. Reject `size == 0` and `overlap >= size` with
//!    [`PipelineError::InvalidChunkConfig`].
//! 2. Cut `[start, start + size)` (clamped to the end of the text).
//! 3. Stop once a window reaches the end; otherwise advance `start` by
//!    `size - overlap`.
//!
//! Consecutive windows share exactly `overlap` units and the last window
//! always reaches the tail, so every unit lands in at least one chunk.
//!
//! # Example
//!
//! ```rust
//! use filing_intel_core::chunk::{chunk, ChunkUnit};
//!
//! let chunks = chunk("abcdefghij", 4, 1, ChunkUnit::Chars).unwrap();
//! assert_eq!(chunks, vec!["abcd", "defg", "ghij"]);
//! ```

use serde::{Deserialize, Serialize};

use crate::error::PipelineError;
use crate::models::{Chunk, Segment};

/// Unit the window size and overlap are measured in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkUnit {
    #[default]
    Chars,
    Words,
}

pub fn chunk(
    text: &str,
    size: usize,
    overlap: usize,
    unit: ChunkUnit,
) -> Result<Vec<String>, PipelineError> {
    if size == 0 || overlap >= size {
        return Err(PipelineError::InvalidChunkConfig { size, overlap });
    }

    let chunks = match unit {
        ChunkUnit::Chars => {
            let offsets: Vec<usize> = text
                .char_indices()
                .map(|(i, _)| i)
                .chain(std::iter::once(text.len()))
                .collect();
            windows(offsets.len() - 1, size, overlap)
                .map(|(s, e)| text[offsets[s]..offsets[e]].to_string())
                .collect()
        }
        ChunkUnit::Words => {
            let words: Vec<&str> = text.split_whitespace().collect();
            windows(words.len(), size, overlap)
                .map(|(s, e)| words[s..e].join(" "))
                .collect()
        }
    };
    Ok(chunks)
}

/// Yields `(start, end)` unit ranges for a sequence of `len` units.
fn windows(len: usize, size: usize, overlap: usize) -> impl Iterator<Item = (usize, usize)> {
    let step = size - overlap;
    let mut start = 0;
    let mut done = len == 0;
    std::iter::from_fn(move || {
        if done {
            return None;
        }
        let end = (start + size).min(len);
        let range = (start, end);
        if end == len {
            done = true;
        } else {
            start += step;
        }
        Some(range)
    })
}

/// Chunk every segment and tag each chunk with its segment index.
///
/// Chunk indices are contiguous across the whole document.
pub fn chunk_segments(
    segments: &[Segment],
    size: usize,
    overlap: usize,
    unit: ChunkUnit,
) -> Result<Vec<Chunk>, PipelineError> {
    let mut out = Vec::new();
    for (seg_idx, seg) in segments.iter().enumerate() {
        for text in chunk(&seg.text, size, overlap, unit)? {
            out.push(Chunk {
                text,
                source_segment: Some(seg_idx),
                index: out.len(),
            });
        }
    }
    Ok(out)
}

/// Chunk a free-standing corpus with no segment provenance.
pub fn chunk_corpus(
    text: &str,
    size: usize,
    overlap: usize,
    unit: ChunkUnit,
) -> Result<Vec<Chunk>, PipelineError> {
    Ok(chunk(text, size, overlap, unit)?
        .into_iter()
        .enumerate()
        .map(|(index, text)| Chunk {
            text,
            source_segment: None,
            index,
        })
        .collect())
}
