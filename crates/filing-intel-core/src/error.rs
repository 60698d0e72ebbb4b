//! Error taxonomy for the document intelligence pipeline.
//!
//! Stage-level failures are fatal to a run and surface as [`PipelineError`].
//! A failed language-model call is not one of them: extractors degrade to a
//! descriptive string (see [`crate::insight::is_degraded`]).

use thiserror::Error;

/// Errors that abort a pipeline run or reject caller input.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// The source could not be fetched or read (network error, HTTP error
    /// status, missing file, size limit exceeded).
    #[error("acquisition failed for {source_ref}: {reason}")]
    AcquisitionFailure { source_ref: String, reason: String },

    /// Every parsing strategy for the declared format was exhausted.
    #[error("parse failed: {0}")]
    ParseFailure(String),

    /// The declared format has no parser.
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Chunker called with `overlap >= size`.
    #[error("invalid chunk config: overlap {overlap} must be smaller than size {size}")]
    InvalidChunkConfig { size: usize, overlap: usize },

    /// The embedding service failed while building the retrieval index.
    #[error("embedding failed: {0}")]
    EmbeddingFailure(String),

    /// A stored document referenced by id does not exist.
    #[error("document not found: {0}")]
    DocumentNotFound(String),

    /// The persistence backend rejected a write or read.
    #[error("persistence failed: {0}")]
    PersistenceFailure(String),
}

impl PipelineError {
    pub fn acquisition(source_ref: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        PipelineError::AcquisitionFailure {
            source_ref: source_ref.into(),
            reason: reason.to_string(),
        }
    }

    pub fn persistence(err: impl std::fmt::Display) -> Self {
        PipelineError::PersistenceFailure(err.to_string())
    }
}
