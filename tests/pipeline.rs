//! End-to-end pipeline runs against the in-memory store, the hashing
//! embedder and a scripted language model.

use std::fs;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Result};
use async_trait::async_trait;
use filing_intel::config::Config;
use filing_intel::feedback::PredictionLogger;
use filing_intel::pipeline::{Pipeline, ProcessRequest, Stage};
use filing_intel_core::embedding::HashingEmbedder;
use filing_intel_core::error::PipelineError;
use filing_intel_core::insight::is_degraded;
use filing_intel_core::llm::MockModel;
use filing_intel_core::metadata::DocumentMetadata;
use filing_intel_core::models::{
    Document, Insight, InsightFilter, NewDocument, Segment, StoredInsight, StoredSegment,
};
use filing_intel_core::store::memory::InMemoryStore;
use filing_intel_core::store::DocumentStore;
use tempfile::TempDir;

const FILING: &str = "\
COMPANY NAME: Acme Holdings Inc
FILING DATE: 02/28/2024

ITEM 1. BUSINESS
Acme designs industrial sensors and sells them to manufacturers worldwide.

ITEM 1A. RISK FACTORS
Supply chain disruption and currency fluctuations could reduce margins.

ITEM 7. MANAGEMENT'S DISCUSSION
Total revenue increased 12% to $4.2 billion while net income reached $610 million.
";

fn config(tmp: &TempDir) -> Config {
    let mut config = Config::with_db_path(tmp.path().join("unused.sqlite"));
    config.monitoring.log_dir = tmp.path().join("logs");
    config.chunking.size = 120;
    config.chunking.overlap = 20;
    config.retrieval.top_k = 2;
    config
}

fn write_filing(tmp: &TempDir, name: &str, content: &str) -> String {
    let path = tmp.path().join(name);
    fs::write(&path, content).unwrap();
    path.to_string_lossy().to_string()
}

fn pipeline(config: &Config, store: Arc<dyn DocumentStore>, model: MockModel) -> Pipeline {
    Pipeline::new(
        store,
        Arc::new(HashingEmbedder::default()),
        Arc::new(model),
        config.clone(),
    )
}

fn scripted_model() -> MockModel {
    MockModel::new("Acme grew revenue and income.")
        .with_rule("financial metric: Total Revenue", "$4.2 billion")
        .with_rule("financial metric: Net Income", "$610 million")
        .with_rule("Classify the sentiment", "Positive. Revenue grew 12%.")
        .with_rule("List the risks", "1. Supply chain disruption\n2. Currency fluctuations")
}

#[tokio::test]
async fn process_stores_document_segments_and_insights() {
    let tmp = TempDir::new().unwrap();
    let config = config(&tmp);
    let store = Arc::new(InMemoryStore::new());
    let source = write_filing(&tmp, "acme-10k.txt", FILING);

    let queries = vec!["Total Revenue".to_string(), "Net Income".to_string()];
    let request = ProcessRequest {
        queries: Some(queries),
        ..ProcessRequest::new(source.clone(), "10-K")
    };
    let report = pipeline(&config, store.clone(), scripted_model())
        .process(&request)
        .await
        .unwrap();

    let doc_id = report.document_id.clone().unwrap();
    assert_eq!(report.metadata.company, "Acme Holdings Inc");
    assert_eq!(report.metadata.filing_date, "02/28/2024");
    assert_eq!(report.record.extracted_metrics["Total Revenue"], "$4.2 billion");
    assert_eq!(report.record.extracted_metrics["Net Income"], "$610 million");
    assert!(report.record.sentiment.starts_with("Positive"));
    assert!(report.record.risks.contains("Supply chain"));
    assert_eq!(report.record.source_reference, source);

    let doc = store.get_document_by_id(&doc_id).await.unwrap().unwrap();
    assert!(doc.processed);
    assert_eq!(doc.company, "Acme Holdings Inc");
    assert_eq!(doc.content_hash.len(), 64);

    let segments = store.get_document_segments(&doc_id).await.unwrap();
    let labels: Vec<_> = segments.iter().map(|s| s.section_type.as_str()).collect();
    assert_eq!(
        labels,
        vec![
            "unknown",
            "ITEM 1. BUSINESS",
            "ITEM 1A. RISK FACTORS",
            "ITEM 7. MANAGEMENT'S DISCUSSION"
        ]
    );

    // Two metric queries plus sentiment, risks and summary.
    let insights = store.get_insights_by_document(&doc_id).await.unwrap();
    assert_eq!(insights.len(), 5);
    assert_eq!(report.insight_ids.len(), 5);
    assert!(insights.iter().all(|i| i.insight.company == "Acme Holdings Inc"));
    assert!(insights.iter().all(|i| i.insight.model_version == "mock-model"));

    let logger = PredictionLogger::new(&config.monitoring.log_dir);
    let logged = logger.latest_prediction(&doc_id).unwrap().unwrap();
    assert_eq!(logged.run_id, report.run_id);
    assert_eq!(logged.document_id.as_deref(), Some(doc_id.as_str()));
}

#[tokio::test]
async fn metric_context_comes_from_retrieval() {
    let tmp = TempDir::new().unwrap();
    let config = config(&tmp);
    let store = Arc::new(InMemoryStore::new());
    let source = write_filing(&tmp, "acme.txt", FILING);

    let request = ProcessRequest {
        queries: Some(vec!["Total Revenue".to_string()]),
        ..ProcessRequest::new(source, "10-K")
    };
    pipeline(&config, store.clone(), scripted_model())
        .process(&request)
        .await
        .unwrap();

    let filter = InsightFilter {
        metric_name: Some("Total Revenue".to_string()),
        ..Default::default()
    };
    let found = store.query_insights(&filter).await.unwrap();
    assert_eq!(found.len(), 1);
    let context = &found[0].insight.original_text;
    assert!(context.contains("Total revenue increased"));
    // top_k = 2 chunks of at most 120 chars, joined with a space.
    assert!(context.chars().count() <= 2 * 120 + 1);
}

#[tokio::test]
async fn failing_model_degrades_but_run_completes() {
    let tmp = TempDir::new().unwrap();
    let config = config(&tmp);
    let store = Arc::new(InMemoryStore::new());
    let source = write_filing(&tmp, "acme.txt", FILING);

    let request = ProcessRequest {
        queries: Some(vec!["Total Revenue".to_string()]),
        ..ProcessRequest::new(source, "10-K")
    };
    let report = pipeline(&config, store.clone(), MockModel::failing())
        .process(&request)
        .await
        .unwrap();

    let revenue = &report.record.extracted_metrics["Total Revenue"];
    assert!(is_degraded(revenue), "expected degraded value, got {revenue}");
    assert!(revenue.starts_with("Error during extraction"));
    assert!(report.record.sentiment.starts_with("Error during analysis"));
    assert!(report.record.risks.starts_with("Error during identification"));
    assert!(report.record.summary.starts_with("Error during generation"));

    let doc = store
        .get_document_by_id(report.document_id.as_deref().unwrap())
        .await
        .unwrap()
        .unwrap();
    assert!(doc.processed);
}

#[tokio::test]
async fn queries_are_routed_by_kind() {
    let tmp = TempDir::new().unwrap();
    let mut config = config(&tmp);
    config.analysis.whole_document_insights = false;
    let source = write_filing(&tmp, "acme.txt", FILING);
    let model = scripted_model();

    let request = ProcessRequest {
        queries: Some(vec![
            "Total Revenue".to_string(),
            "What are the main risks?".to_string(),
            "Summarize the outlook".to_string(),
        ]),
        ..ProcessRequest::new(source, "10-K")
    };
    let report = pipeline(&config, Arc::new(InMemoryStore::new()), model.clone())
        .process(&request)
        .await
        .unwrap();

    assert_eq!(report.record.extracted_metrics.len(), 1);
    assert_eq!(report.record.query_answers.len(), 2);
    assert!(report.record.query_answers["What are the main risks?"].contains("Currency"));
    assert_eq!(
        report.record.query_answers["Summarize the outlook"],
        "Acme grew revenue and income."
    );
    // No whole-document calls.
    assert_eq!(model.call_count(), 3);
    assert!(report.record.sentiment.is_empty());
    assert_eq!(report.insight_ids.len(), 3);
}

#[tokio::test]
async fn default_queries_apply_when_none_given() {
    let tmp = TempDir::new().unwrap();
    let config = config(&tmp);
    let source = write_filing(&tmp, "acme.txt", FILING);

    let report = pipeline(&config, Arc::new(InMemoryStore::new()), scripted_model())
        .without_logging()
        .process(&ProcessRequest::new(source, "10-K"))
        .await
        .unwrap();

    let keys: Vec<_> = report.record.extracted_metrics.keys().cloned().collect();
    let mut expected = config.analysis.default_queries.clone();
    expected.sort();
    assert_eq!(keys, expected);
    assert!(report.log_path.is_none());
}

#[tokio::test]
async fn acquisition_failure_persists_nothing() {
    let tmp = TempDir::new().unwrap();
    let config = config(&tmp);
    let store = Arc::new(InMemoryStore::new());

    let missing = tmp.path().join("missing.pdf");
    let failure = pipeline(&config, store.clone(), scripted_model())
        .process(&ProcessRequest::new(missing.to_string_lossy(), "10-K"))
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Acquire);
    assert!(matches!(failure.error, PipelineError::AcquisitionFailure { .. }));
    assert!(store.list_documents().await.unwrap().is_empty());
}

#[tokio::test]
async fn unknown_format_fails_at_parse() {
    let tmp = TempDir::new().unwrap();
    let config = config(&tmp);
    let source = write_filing(&tmp, "filing.docx", "binary-ish");

    let failure = pipeline(&config, Arc::new(InMemoryStore::new()), scripted_model())
        .process(&ProcessRequest::new(source, "10-K"))
        .await
        .unwrap_err();
    assert_eq!(failure.stage, Stage::Parse);
    assert!(matches!(failure.error, PipelineError::UnsupportedFormat(_)));
}

#[tokio::test]
async fn invalid_chunk_config_fails_at_index() {
    let tmp = TempDir::new().unwrap();
    let mut config = config(&tmp);
    config.chunking.overlap = config.chunking.size;
    let source = write_filing(&tmp, "acme.txt", FILING);

    let failure = pipeline(&config, Arc::new(InMemoryStore::new()), scripted_model())
        .process(&ProcessRequest::new(source, "10-K"))
        .await
        .unwrap_err();
    assert_eq!(failure.stage, Stage::Index);
    assert!(matches!(failure.error, PipelineError::InvalidChunkConfig { .. }));
}

#[tokio::test]
async fn ingest_then_analyze_document() {
    let tmp = TempDir::new().unwrap();
    let config = config(&tmp);
    let store = Arc::new(InMemoryStore::new());
    let source = write_filing(&tmp, "acme.txt", FILING);
    let model = scripted_model();
    let pipeline = pipeline(&config, store.clone(), model.clone());

    let ingested = pipeline
        .ingest(&ProcessRequest::new(source, "10-Q"))
        .await
        .unwrap();
    assert!(!ingested.document.processed);
    assert_eq!(ingested.document.doc_type, "10-Q");
    assert_eq!(ingested.segment_ids.len(), 4);
    assert_eq!(model.call_count(), 0);

    let doc_id = ingested.document.id.clone();
    let queries = vec!["Net Income".to_string()];
    let report = pipeline
        .analyze_document(&doc_id, Some(&queries))
        .await
        .unwrap();
    assert_eq!(report.document_id.as_deref(), Some(doc_id.as_str()));
    assert_eq!(report.record.extracted_metrics["Net Income"], "$610 million");
    assert_eq!(report.segments, 4);

    let doc = store.get_document_by_id(&doc_id).await.unwrap().unwrap();
    assert!(doc.processed);
    assert_eq!(store.get_insights_by_document(&doc_id).await.unwrap().len(), 4);
}

#[tokio::test]
async fn analyze_unknown_document_fails() {
    let tmp = TempDir::new().unwrap();
    let config = config(&tmp);
    let failure = pipeline(&config, Arc::new(InMemoryStore::new()), scripted_model())
        .analyze_document("no-such-id", None)
        .await
        .unwrap_err();
    assert_eq!(failure.stage, Stage::Load);
    assert!(matches!(failure.error, PipelineError::DocumentNotFound(_)));
}

#[tokio::test]
async fn analyze_text_uses_proportional_fallback_and_stores_nothing() {
    let tmp = TempDir::new().unwrap();
    let config = config(&tmp);
    let store = Arc::new(InMemoryStore::new());
    let text = "x".repeat(300);

    let metadata = DocumentMetadata {
        company: "Inline Co".to_string(),
        filing_date: "01/01/2024".to_string(),
        doc_type: "memo".to_string(),
    };
    let report = pipeline(&config, store.clone(), scripted_model())
        .analyze_text(&text, metadata, None)
        .await
        .unwrap();

    assert_eq!(report.segments, 3);
    assert!(report.document_id.is_none());
    assert!(report.insight_ids.is_empty());
    assert_eq!(report.record.company, "Inline Co");
    assert!(store.list_documents().await.unwrap().is_empty());
    assert!(!config.monitoring.log_dir.join("predictions").exists());
}

#[tokio::test]
async fn analyze_text_rejects_blank_input_before_any_model_call() {
    let tmp = TempDir::new().unwrap();
    let config = config(&tmp);
    let model = Arc::new(scripted_model());
    let pipeline = Pipeline::new(
        Arc::new(InMemoryStore::new()),
        Arc::new(HashingEmbedder::default()),
        model.clone(),
        config,
    );

    let metadata = DocumentMetadata {
        company: "Inline Co".to_string(),
        filing_date: "01/01/2024".to_string(),
        doc_type: "memo".to_string(),
    };
    let failure = pipeline
        .analyze_text("   \n \t\n", metadata, None)
        .await
        .unwrap_err();
    assert_eq!(failure.stage, Stage::Normalize);
    assert!(matches!(failure.error, PipelineError::ParseFailure(_)));
    assert_eq!(model.call_count(), 0);
}

#[tokio::test]
async fn batch_continues_after_failure() {
    let tmp = TempDir::new().unwrap();
    let config = config(&tmp);
    let store = Arc::new(InMemoryStore::new());
    let good = write_filing(&tmp, "good.txt", FILING);
    let missing = tmp.path().join("gone.txt").to_string_lossy().to_string();

    let requests = vec![
        ProcessRequest::new(missing, "10-K"),
        ProcessRequest::new(good, "10-K"),
    ];
    let results = pipeline(&config, store.clone(), scripted_model())
        .process_batch(&requests)
        .await;

    assert_eq!(results.len(), 2);
    assert_eq!(results[0].as_ref().unwrap_err().stage, Stage::Acquire);
    assert!(results[1].is_ok());
    assert_eq!(store.list_documents().await.unwrap().len(), 1);
}

/// Delegates to an [`InMemoryStore`] but rejects every insight.
struct InsightRejectingStore {
    inner: InMemoryStore,
}

#[async_trait]
impl DocumentStore for InsightRejectingStore {
    async fn save_document(&self, doc: &NewDocument) -> Result<String> {
        self.inner.save_document(doc).await
    }
    async fn get_document_by_id(&self, id: &str) -> Result<Option<Document>> {
        self.inner.get_document_by_id(id).await
    }
    async fn list_documents(&self) -> Result<Vec<Document>> {
        self.inner.list_documents().await
    }
    async fn mark_processed(&self, id: &str) -> Result<()> {
        self.inner.mark_processed(id).await
    }
    async fn save_segments(&self, segments: &[Segment], document_id: &str) -> Result<Vec<String>> {
        self.inner.save_segments(segments, document_id).await
    }
    async fn get_document_segments(&self, document_id: &str) -> Result<Vec<StoredSegment>> {
        self.inner.get_document_segments(document_id).await
    }
    async fn save_insight(&self, _insight: &Insight) -> Result<String> {
        bail!("disk full")
    }
    async fn query_insights(&self, filter: &InsightFilter) -> Result<Vec<StoredInsight>> {
        self.inner.query_insights(filter).await
    }
}

#[tokio::test]
async fn persistence_failure_returns_record_and_still_logs() {
    let tmp = TempDir::new().unwrap();
    let config = config(&tmp);
    let store = Arc::new(InsightRejectingStore {
        inner: InMemoryStore::new(),
    });
    let source = write_filing(&tmp, "acme.txt", FILING);

    let failure = pipeline(&config, store.clone(), scripted_model())
        .process(&ProcessRequest::new(source, "10-K"))
        .await
        .unwrap_err();

    assert_eq!(failure.stage, Stage::Persist);
    assert!(matches!(failure.error, PipelineError::PersistenceFailure(_)));
    let record = failure.record.expect("in-memory record");
    assert_eq!(record.extracted_metrics["Total Revenue"], "$4.2 billion");

    let doc_id = record.document_id.clone().unwrap();
    let doc = store.get_document_by_id(&doc_id).await.unwrap().unwrap();
    assert!(!doc.processed);

    let logger = PredictionLogger::new(&config.monitoring.log_dir);
    assert!(logger.latest_prediction(&doc_id).unwrap().is_some());
}

#[test]
fn request_defaults() {
    let request = ProcessRequest::new("a.pdf", "10-K");
    assert!(request.format.is_none());
    assert!(request.queries.is_none());
    assert!(!Path::new(&request.source).is_absolute());
}
