//! Core data models for filings, segments, insights and monitoring records.
//!
//! Documents, segments and insights are persisted through a
//! [`DocumentStore`](crate::store::DocumentStore). Chunks never leave the
//! retrieval index. Prediction, correction and feedback records are written
//! to the append-only monitoring log.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A document as handed to the store before it has an id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewDocument {
    pub company: String,
    /// Filing type as declared by the caller (e.g. `"10-K"`).
    pub doc_type: String,
    /// Filing date as found in the text (`MM/DD/YYYY` style) or the
    /// ingestion date when none was found.
    pub filing_date: String,
    /// URL or local path the bytes came from.
    pub source: String,
    /// SHA-256 of the acquired bytes, hex encoded.
    pub content_hash: String,
    /// Unix timestamp (seconds) at ingestion.
    pub ingestion_timestamp: i64,
    pub processed: bool,
}

/// A persisted filing.
///
/// `processed` flips to `true` once insights for the document have been
/// stored; no other field changes after ingestion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub company: String,
    pub doc_type: String,
    pub filing_date: String,
    pub source: String,
    pub content_hash: String,
    pub ingestion_timestamp: i64,
    pub processed: bool,
}

impl Document {
    pub fn from_new(id: String, doc: NewDocument) -> Self {
        Self {
            id,
            company: doc.company,
            doc_type: doc.doc_type,
            filing_date: doc.filing_date,
            source: doc.source,
            content_hash: doc.content_hash,
            ingestion_timestamp: doc.ingestion_timestamp,
            processed: doc.processed,
        }
    }
}

/// A labeled section of a document's text, as produced by the segmenter.
///
/// Page numbers are `0` when unknown, which is the case for every
/// segment produced from concatenated parser output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Segment {
    pub section_type: String,
    pub text: String,
    pub start_page: u32,
    pub end_page: u32,
}

/// A segment after persistence, owned by exactly one document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredSegment {
    pub id: String,
    pub document_id: String,
    pub section_type: String,
    pub text: String,
    pub start_page: u32,
    pub end_page: u32,
}

impl StoredSegment {
    pub fn as_segment(&self) -> Segment {
        Segment {
            section_type: self.section_type.clone(),
            text: self.text.clone(),
            start_page: self.start_page,
            end_page: self.end_page,
        }
    }
}

/// A retrieval unit. `source_segment` is the index of the segment the text
/// was cut from, or `None` for ad-hoc corpora.
#[derive(Debug, Clone, PartialEq)]
pub struct Chunk {
    pub text: String,
    pub source_segment: Option<usize>,
    pub index: usize,
}

/// A single extracted fact or judgment about a document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Insight {
    pub metric_name: String,
    pub value: String,
    /// RFC 3339 timestamp of the run that produced the insight.
    pub timestamp: String,
    pub company: String,
    /// Non-owning back-reference; the document must exist when the insight
    /// is saved.
    pub document_id: String,
    pub model_version: String,
    /// Context passage the value was extracted from.
    pub original_text: String,
    pub page_numbers: Vec<u32>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredInsight {
    pub id: String,
    #[serde(flatten)]
    pub insight: Insight,
}

/// Conjunctive filter for [`DocumentStore::query_insights`](crate::store::DocumentStore::query_insights).
///
/// `date` matches insights whose timestamp starts with the given prefix,
/// so `"2024-03"` selects a whole month.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct InsightFilter {
    pub metric_name: Option<String>,
    pub date: Option<String>,
    pub company: Option<String>,
    pub document_id: Option<String>,
}

impl InsightFilter {
    pub fn matches(&self, insight: &Insight) -> bool {
        self.metric_name
            .as_deref()
            .map_or(true, |m| insight.metric_name == m)
            && self
                .date
                .as_deref()
                .map_or(true, |d| insight.timestamp.starts_with(d))
            && self
                .company
                .as_deref()
                .map_or(true, |c| insight.company == c)
            && self
                .document_id
                .as_deref()
                .map_or(true, |id| insight.document_id == id)
    }
}

/// Aggregated output of one pipeline run over a document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PredictionRecord {
    pub run_id: String,
    pub document_id: Option<String>,
    /// RFC 3339 timestamp taken when extraction started.
    pub timestamp: String,
    pub company: String,
    pub model_version: String,
    /// Metric query → extracted value (or a degraded string).
    pub extracted_metrics: BTreeMap<String, String>,
    /// Risk and summary queries → generated answer.
    pub query_answers: BTreeMap<String, String>,
    pub sentiment: String,
    pub risks: String,
    pub summary: String,
    /// Seconds spent between acquisition and aggregation.
    pub processing_time: f64,
    pub source_reference: String,
}

/// Human-supplied corrections for a logged prediction. Keys are metric
/// names or one of `sentiment`, `risks`, `summary`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Correction {
    pub document_id: String,
    pub timestamp: String,
    pub corrections: BTreeMap<String, serde_json::Value>,
    pub original_prediction: Option<PredictionRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Feedback {
    pub document_id: String,
    pub timestamp: String,
    pub rating: Option<u8>,
    pub comment: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insight(metric: &str, ts: &str, company: &str) -> Insight {
        Insight {
            metric_name: metric.into(),
            value: "1".into(),
            timestamp: ts.into(),
            company: company.into(),
            document_id: "d1".into(),
            model_version: "m".into(),
            original_text: String::new(),
            page_numbers: vec![],
        }
    }

    #[test]
    fn empty_filter_matches_everything() {
        let f = InsightFilter::default();
        assert!(f.matches(&insight("Revenue", "2024-01-01T00:00:00Z", "Acme")));
    }

    #[test]
    fn filter_fields_are_conjunctive() {
        let f = InsightFilter {
            metric_name: Some("Revenue".into()),
            date: Some("2024-03".into()),
            ..Default::default()
        };
        assert!(f.matches(&insight("Revenue", "2024-03-10T00:00:00Z", "Acme")));
        assert!(!f.matches(&insight("Revenue", "2024-04-10T00:00:00Z", "Acme")));
        assert!(!f.matches(&insight("Net Income", "2024-03-10T00:00:00Z", "Acme")));
    }

    #[test]
    fn stored_insight_serializes_flat() {
        let s = StoredInsight {
            id: "i1".into(),
            insight: insight("Revenue", "2024-01-01T00:00:00Z", "Acme"),
        };
        let v = serde_json::to_value(&s).unwrap();
        assert_eq!(v["id"], "i1");
        assert_eq!(v["metric_name"], "Revenue");
    }
}
