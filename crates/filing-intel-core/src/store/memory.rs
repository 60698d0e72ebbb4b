//! In-memory [`DocumentStore`] implementation for tests and ephemeral runs.
//!
//! Uses `HashMap` and `Vec` behind `std::sync::RwLock` for thread safety.
//! Semantics match the SQLite store: segments keep insertion order and
//! writes referencing a missing document fail.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{bail, Result};
use async_trait::async_trait;
use uuid::Uuid;

use crate::models::{Document, Insight, InsightFilter, NewDocument, Segment, StoredInsight, StoredSegment};

use super::DocumentStore;

/// In-memory store. Documents are listed in insertion order.
pub struct InMemoryStore {
    docs: RwLock<HashMap<String, Document>>,
    doc_order: RwLock<Vec<String>>,
    segments: RwLock<Vec<StoredSegment>>,
    insights: RwLock<Vec<StoredInsight>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            docs: RwLock::new(HashMap::new()),
            doc_order: RwLock::new(Vec::new()),
            segments: RwLock::new(Vec::new()),
            insights: RwLock::new(Vec::new()),
        }
    }

    fn ensure_document(&self, id: &str) -> Result<()> {
        if !self.docs.read().unwrap().contains_key(id) {
            bail!("document not found: {}", id);
        }
        Ok(())
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryStore {
    async fn save_document(&self, doc: &NewDocument) -> Result<String> {
        let id = Uuid::new_v4().to_string();
        self.docs
            .write()
            .unwrap()
            .insert(id.clone(), Document::from_new(id.clone(), doc.clone()));
        self.doc_order.write().unwrap().push(id.clone());
        Ok(id)
    }

    async fn get_document_by_id(&self, id: &str) -> Result<Option<Document>> {
        Ok(self.docs.read().unwrap().get(id).cloned())
    }

    async fn list_documents(&self) -> Result<Vec<Document>> {
        let docs = self.docs.read().unwrap();
        Ok(self
            .doc_order
            .read()
            .unwrap()
            .iter()
            .filter_map(|id| docs.get(id).cloned())
            .collect())
    }

    async fn mark_processed(&self, id: &str) -> Result<()> {
        match self.docs.write().unwrap().get_mut(id) {
            Some(doc) => {
                doc.processed = true;
                Ok(())
            }
            None => bail!("document not found: {}", id),
        }
    }

    async fn save_segments(&self, segments: &[Segment], document_id: &str) -> Result<Vec<String>> {
        self.ensure_document(document_id)?;
        let mut stored = self.segments.write().unwrap();
        let mut ids = Vec::with_capacity(segments.len());
        for seg in segments {
            let id = Uuid::new_v4().to_string();
            stored.push(StoredSegment {
                id: id.clone(),
                document_id: document_id.to_string(),
                section_type: seg.section_type.clone(),
                text: seg.text.clone(),
                start_page: seg.start_page,
                end_page: seg.end_page,
            });
            ids.push(id);
        }
        Ok(ids)
    }

    async fn get_document_segments(&self, document_id: &str) -> Result<Vec<StoredSegment>> {
        Ok(self
            .segments
            .read()
            .unwrap()
            .iter()
            .filter(|s| s.document_id == document_id)
            .cloned()
            .collect())
    }

    async fn save_insight(&self, insight: &Insight) -> Result<String> {
        self.ensure_document(&insight.document_id)?;
        let id = Uuid::new_v4().to_string();
        self.insights.write().unwrap().push(StoredInsight {
            id: id.clone(),
            insight: insight.clone(),
        });
        Ok(id)
    }

    async fn query_insights(&self, filter: &InsightFilter) -> Result<Vec<StoredInsight>> {
        Ok(self
            .insights
            .read()
            .unwrap()
            .iter()
            .filter(|s| filter.matches(&s.insight))
            .cloned()
            .collect())
    }
}
