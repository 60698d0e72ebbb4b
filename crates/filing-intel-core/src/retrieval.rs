//! Per-document similarity index over chunks.
//!
//! The index embeds chunks with an external [`Embedder`] and answers top-k
//! queries by brute-force cosine similarity. One instance serves one
//! document or ad-hoc corpus. `build` takes `&mut self` and `query` takes
//! `&self`, so a build can never overlap a query on the same instance;
//! concurrent runs each own their own index.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::embedding::{cosine_similarity, Embedder};
use crate::error::PipelineError;
use crate::models::Chunk;

/// A retrieved chunk with its similarity to the query.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

pub struct RetrievalIndex {
    embedder: Arc<dyn Embedder>,
    entries: Vec<(Chunk, Vec<f32>)>,
}

impl RetrievalIndex {
    pub fn new(embedder: Arc<dyn Embedder>) -> Self {
        Self {
            embedder,
            entries: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Replace the index contents with `chunks`.
    ///
    /// An empty list is a no-op. If embedding fails the previous contents
    /// are kept.
    pub async fn build(&mut self, chunks: Vec<Chunk>) -> Result<(), PipelineError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let entries = self.embed_chunks(chunks).await?;
        self.entries = entries;
        Ok(())
    }

    /// Append `chunks` to the current contents. Empty input is a no-op.
    pub async fn add(&mut self, chunks: Vec<Chunk>) -> Result<(), PipelineError> {
        if chunks.is_empty() {
            return Ok(());
        }
        let entries = self.embed_chunks(chunks).await?;
        self.entries.extend(entries);
        Ok(())
    }

    async fn embed_chunks(&self, chunks: Vec<Chunk>) -> Result<Vec<(Chunk, Vec<f32>)>, PipelineError> {
        let texts: Vec<String> = chunks.iter().map(|c| c.text.clone()).collect();
        let vectors = self
            .embedder
            .embed_many(&texts)
            .await
            .map_err(|e| PipelineError::EmbeddingFailure(e.to_string()))?;
        if vectors.len() != chunks.len() {
            return Err(PipelineError::EmbeddingFailure(format!(
                "expected {} vectors, got {}",
                chunks.len(),
                vectors.len()
            )));
        }
        Ok(chunks.into_iter().zip(vectors).collect())
    }

    /// Up to `k` chunk texts, most similar first.
    pub async fn query(&self, text: &str, k: usize) -> Result<Vec<String>, PipelineError> {
        Ok(self
            .query_scored(text, k)
            .await?
            .into_iter()
            .map(|s| s.chunk.text)
            .collect())
    }

    /// Like [`query`](Self::query) but keeps the chunk and its score.
    /// Ties keep insertion order.
    pub async fn query_scored(&self, text: &str, k: usize) -> Result<Vec<ScoredChunk>, PipelineError> {
        if self.entries.is_empty() || k == 0 {
            return Ok(Vec::new());
        }
        let query_vec = self
            .embedder
            .embed(text)
            .await
            .map_err(|e| PipelineError::EmbeddingFailure(e.to_string()))?;

        let mut scored: Vec<ScoredChunk> = self
            .entries
            .iter()
            .map(|(chunk, vec)| ScoredChunk {
                chunk: chunk.clone(),
                score: cosine_similarity(&query_vec, vec),
            })
            .collect();
        scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        scored.truncate(k);
        Ok(scored)
    }
}
