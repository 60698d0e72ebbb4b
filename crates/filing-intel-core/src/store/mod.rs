//! Storage abstraction for Filing Intel.
//!
//! The [`DocumentStore`] trait is the narrow persistence contract the
//! pipeline depends on, enabling pluggable backends (SQLite in the app
//! crate, [`memory::InMemoryStore`] for tests and ephemeral runs).
//!
//! Implementations must be `Send + Sync` to work with async runtimes.

pub mod memory;

use anyhow::Result;
use async_trait::async_trait;

use crate::models::{Document, Insight, InsightFilter, NewDocument, Segment, StoredInsight, StoredSegment};

/// Abstract storage backend for documents, segments and insights.
///
/// All ids are opaque strings assigned by the store.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`save_document`](DocumentStore::save_document) | Persist a new document, returning its id |
/// | [`get_document_by_id`](DocumentStore::get_document_by_id) | Fetch one document |
/// | [`list_documents`](DocumentStore::list_documents) | All documents, oldest first |
/// | [`mark_processed`](DocumentStore::mark_processed) | Flip `processed` after insights are stored |
/// | [`save_segments`](DocumentStore::save_segments) | Append a document's segments in order |
/// | [`get_document_segments`](DocumentStore::get_document_segments) | Segments in insertion order |
/// | [`save_insight`](DocumentStore::save_insight) | Persist one insight, returning its id |
/// | [`query_insights`](DocumentStore::query_insights) | Filtered insight lookup |
/// | [`get_insights_by_document`](DocumentStore::get_insights_by_document) | All insights of a document |
#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn save_document(&self, doc: &NewDocument) -> Result<String>;

    async fn get_document_by_id(&self, id: &str) -> Result<Option<Document>>;

    async fn list_documents(&self) -> Result<Vec<Document>>;

    /// Fails if the document does not exist.
    async fn mark_processed(&self, id: &str) -> Result<()>;

    /// Fails if the document does not exist.
    async fn save_segments(&self, segments: &[Segment], document_id: &str) -> Result<Vec<String>>;

    async fn get_document_segments(&self, document_id: &str) -> Result<Vec<StoredSegment>>;

    /// Fails if `insight.document_id` does not name an existing document.
    async fn save_insight(&self, insight: &Insight) -> Result<String>;

    async fn query_insights(&self, filter: &InsightFilter) -> Result<Vec<StoredInsight>>;

    async fn get_insights_by_document(&self, document_id: &str) -> Result<Vec<StoredInsight>> {
        self.query_insights(&InsightFilter {
            document_id: Some(document_id.to_string()),
            ..Default::default()
        })
        .await
    }
}
