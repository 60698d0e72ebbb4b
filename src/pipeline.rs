//! Document processing orchestrator.
//!
//! A run moves through
//! `ACQUIRE → PARSE → NORMALIZE → SEGMENT → INDEX → EXTRACT → AGGREGATE → PERSIST`
//! and ends either with a [`RunReport`] or with a [`StageFailure`] naming
//! the stage that failed. Nothing is retried here.
//!
//! Each run builds its own [`RetrievalIndex`], so concurrent runs on one
//! [`Pipeline`] never share index state. Prediction logging happens after
//! PERSIST and is best-effort: a log write failure is a warning, and a
//! persistence failure is still logged.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use filing_intel_core::chunk::chunk_segments;
use filing_intel_core::embedding::Embedder;
use filing_intel_core::error::PipelineError;
use filing_intel_core::insight::InsightExtractors;
use filing_intel_core::llm::LanguageModel;
use filing_intel_core::metadata::{extract_metadata, DocumentMetadata};
use filing_intel_core::models::{Document, Insight, NewDocument, PredictionRecord, Segment};
use filing_intel_core::normalize::{normalize, NormalizeProfile};
use filing_intel_core::query::{classify_query, QueryKind};
use filing_intel_core::retrieval::RetrievalIndex;
use filing_intel_core::segment::segment;
use filing_intel_core::store::DocumentStore;
use serde::Serialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::acquire::acquire;
use crate::config::Config;
use crate::feedback::PredictionLogger;
use crate::parse::{parse_file, DocFormat};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Stage {
    /// Loading a stored document for re-analysis.
    Load,
    Acquire,
    Parse,
    Normalize,
    Segment,
    Index,
    Extract,
    Aggregate,
    Persist,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Load => "LOAD",
            Stage::Acquire => "ACQUIRE",
            Stage::Parse => "PARSE",
            Stage::Normalize => "NORMALIZE",
            Stage::Segment => "SEGMENT",
            Stage::Index => "INDEX",
            Stage::Extract => "EXTRACT",
            Stage::Aggregate => "AGGREGATE",
            Stage::Persist => "PERSIST",
        };
        f.write_str(name)
    }
}

/// A run that ended in `FAILED(stage)`.
///
/// `record` is set when the failure happened at PERSIST: the results
/// exist in memory (and in the prediction log) but not in the store.
#[derive(Debug, Error)]
#[error("{stage} failed: {error}")]
pub struct StageFailure {
    pub stage: Stage,
    #[source]
    pub error: PipelineError,
    pub record: Option<Box<PredictionRecord>>,
}

impl StageFailure {
    fn new(stage: Stage, error: PipelineError) -> Self {
        warn!(stage = %stage, error = %error, "run failed");
        Self {
            stage,
            error,
            record: None,
        }
    }
}

fn at(stage: Stage) -> impl FnOnce(PipelineError) -> StageFailure {
    move |error| StageFailure::new(stage, error)
}

/// One source to run through the pipeline.
#[derive(Debug, Clone)]
pub struct ProcessRequest {
    /// URL or local path.
    pub source: String,
    pub doc_type: String,
    /// Overrides the format detected at acquisition.
    pub format: Option<DocFormat>,
    /// Analysis queries; `analysis.default_queries` when `None`.
    pub queries: Option<Vec<String>>,
}

impl ProcessRequest {
    pub fn new(source: impl Into<String>, doc_type: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            doc_type: doc_type.into(),
            format: None,
            queries: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub document_id: Option<String>,
    pub metadata: DocumentMetadata,
    pub segments: usize,
    pub chunks: usize,
    pub insight_ids: Vec<String>,
    pub record: PredictionRecord,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub log_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize)]
pub struct IngestReport {
    pub document: Document,
    pub segment_ids: Vec<String>,
    pub text_chars: usize,
}

/// Output of INDEX → EXTRACT → AGGREGATE, before persistence.
struct Analysis {
    record: PredictionRecord,
    insights: Vec<Insight>,
    chunks: usize,
}

/// Text and labels produced by ACQUIRE → PARSE → NORMALIZE → SEGMENT.
struct Prepared {
    text: String,
    segments: Vec<Segment>,
    metadata: DocumentMetadata,
    content_hash: String,
}

pub struct Pipeline {
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn Embedder>,
    extractors: InsightExtractors,
    config: Config,
    logger: Option<PredictionLogger>,
}

impl Pipeline {
    /// A pipeline logging predictions under `monitoring.log_dir`.
    pub fn new(
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn Embedder>,
        model: Arc<dyn LanguageModel>,
        config: Config,
    ) -> Self {
        let extractors = InsightExtractors::new(model, config.llm.generation_settings());
        let logger = Some(PredictionLogger::new(config.monitoring.log_dir.clone()));
        Self {
            store,
            embedder,
            extractors,
            config,
            logger,
        }
    }

    pub fn without_logging(mut self) -> Self {
        self.logger = None;
        self
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn logger(&self) -> Option<&PredictionLogger> {
        self.logger.as_ref()
    }

    /// Full run for one source.
    pub async fn process(&self, request: &ProcessRequest) -> Result<RunReport, StageFailure> {
        let started = Instant::now();
        let run_id = Uuid::new_v4().to_string();
        let prepared = self.prepare(request).await?;
        let queries = self.queries(request.queries.as_deref());

        let mut analysis = self
            .analyze(&prepared.text, &prepared.segments, &prepared.metadata, &queries)
            .await?;
        analysis.record.run_id = run_id.clone();
        analysis.record.source_reference = request.source.clone();
        analysis.record.processing_time = started.elapsed().as_secs_f64();

        info!(stage = %Stage::Persist, source = %request.source, "persisting results");
        let persisted = self.persist_new(&prepared, &request.doc_type, &request.source, &mut analysis).await;
        let log_path = self.log(&run_id, &analysis.record);

        match persisted {
            Ok((document_id, insight_ids)) => {
                info!(
                    document_id = %document_id,
                    seconds = analysis.record.processing_time,
                    "run complete"
                );
                Ok(RunReport {
                    run_id,
                    document_id: Some(document_id),
                    metadata: prepared.metadata,
                    segments: prepared.segments.len(),
                    chunks: analysis.chunks,
                    insight_ids,
                    record: analysis.record,
                    log_path,
                })
            }
            Err(error) => {
                let mut failure = StageFailure::new(Stage::Persist, error);
                failure.record = Some(Box::new(analysis.record));
                Err(failure)
            }
        }
    }

    /// ACQUIRE → PARSE → NORMALIZE → SEGMENT, then store the document
    /// (`processed = false`) and its segments. No model calls.
    pub async fn ingest(&self, request: &ProcessRequest) -> Result<IngestReport, StageFailure> {
        let prepared = self.prepare(request).await?;
        info!(stage = %Stage::Persist, source = %request.source, "persisting document");

        let new_doc = new_document(&prepared, &request.doc_type, &request.source);
        let document_id = self
            .store
            .save_document(&new_doc)
            .await
            .map_err(PipelineError::persistence)
            .map_err(at(Stage::Persist))?;
        let segment_ids = self
            .store
            .save_segments(&prepared.segments, &document_id)
            .await
            .map_err(PipelineError::persistence)
            .map_err(at(Stage::Persist))?;

        info!(document_id = %document_id, segments = segment_ids.len(), "ingest complete");
        Ok(IngestReport {
            document: Document::from_new(document_id, new_doc),
            segment_ids,
            text_chars: prepared.text.chars().count(),
        })
    }

    /// Analyze a stored document from its segments, store the insights and
    /// mark it processed.
    pub async fn analyze_document(
        &self,
        document_id: &str,
        queries: Option<&[String]>,
    ) -> Result<RunReport, StageFailure> {
        let started = Instant::now();
        let run_id = Uuid::new_v4().to_string();

        info!(stage = %Stage::Load, document_id, "loading document");
        let document = self
            .store
            .get_document_by_id(document_id)
            .await
            .map_err(PipelineError::persistence)
            .map_err(at(Stage::Load))?
            .ok_or_else(|| StageFailure::new(Stage::Load, PipelineError::DocumentNotFound(document_id.to_string())))?;
        let segments: Vec<Segment> = self
            .store
            .get_document_segments(document_id)
            .await
            .map_err(PipelineError::persistence)
            .map_err(at(Stage::Load))?
            .iter()
            .map(|s| s.as_segment())
            .collect();
        let text = full_text(&segments);
        let metadata = DocumentMetadata {
            company: document.company.clone(),
            filing_date: document.filing_date.clone(),
            doc_type: document.doc_type.clone(),
        };

        let queries = self.queries(queries);
        let mut analysis = self.analyze(&text, &segments, &metadata, &queries).await?;
        analysis.record.run_id = run_id.clone();
        analysis.record.document_id = Some(document.id.clone());
        analysis.record.source_reference = document.source.clone();
        for insight in &mut analysis.insights {
            insight.document_id = document.id.clone();
        }
        analysis.record.processing_time = started.elapsed().as_secs_f64();

        info!(stage = %Stage::Persist, document_id, "persisting insights");
        let persisted = self.persist_insights(&document.id, &analysis.insights).await;
        let log_path = self.log(&run_id, &analysis.record);

        match persisted {
            Ok(insight_ids) => Ok(RunReport {
                run_id,
                document_id: Some(document.id),
                metadata,
                segments: segments.len(),
                chunks: analysis.chunks,
                insight_ids,
                record: analysis.record,
                log_path,
            }),
            Err(error) => {
                let mut failure = StageFailure::new(Stage::Persist, error);
                failure.record = Some(Box::new(analysis.record));
                Err(failure)
            }
        }
    }

    /// Ad-hoc analysis of a text corpus. Nothing is stored or logged.
    pub async fn analyze_text(
        &self,
        text: &str,
        metadata: DocumentMetadata,
        queries: Option<&[String]>,
    ) -> Result<RunReport, StageFailure> {
        let started = Instant::now();
        info!(stage = %Stage::Normalize, chars = text.len(), "normalizing text");
        let text = normalize(text, NormalizeProfile::Lines);
        if text.is_empty() {
            return Err(StageFailure::new(
                Stage::Normalize,
                PipelineError::ParseFailure("document contains no text".to_string()),
            ));
        }
        info!(stage = %Stage::Segment, "segmenting text");
        let segments = segment(&text);

        let queries = self.queries(queries);
        let mut analysis = self.analyze(&text, &segments, &metadata, &queries).await?;
        let run_id = Uuid::new_v4().to_string();
        analysis.record.run_id = run_id.clone();
        analysis.record.source_reference = "inline text".to_string();
        analysis.record.processing_time = started.elapsed().as_secs_f64();

        Ok(RunReport {
            run_id,
            document_id: None,
            metadata,
            segments: segments.len(),
            chunks: analysis.chunks,
            insight_ids: Vec::new(),
            record: analysis.record,
            log_path: None,
        })
    }

    /// Sequential runs; one result per request, failures included.
    pub async fn process_batch(
        &self,
        requests: &[ProcessRequest],
    ) -> Vec<Result<RunReport, StageFailure>> {
        let mut results = Vec::with_capacity(requests.len());
        for (i, request) in requests.iter().enumerate() {
            info!(item = i + 1, total = requests.len(), source = %request.source, "batch item");
            results.push(self.process(request).await);
        }
        results
    }

    fn queries(&self, requested: Option<&[String]>) -> Vec<String> {
        match requested {
            Some(q) if !q.is_empty() => q.to_vec(),
            _ => self.config.analysis.default_queries.clone(),
        }
    }

    async fn prepare(&self, request: &ProcessRequest) -> Result<Prepared, StageFailure> {
        info!(stage = %Stage::Acquire, source = %request.source, "acquiring");
        let acquired = acquire(&request.source, &self.config.acquisition)
            .await
            .map_err(at(Stage::Acquire))?;

        let format = request.format.unwrap_or(acquired.format);
        info!(stage = %Stage::Parse, format = %format, bytes = acquired.size, "parsing");
        let path = acquired.path().to_path_buf();
        let parsed = tokio::task::spawn_blocking(move || parse_file(&path, format))
            .await
            .map_err(|e| PipelineError::ParseFailure(format!("parser task failed: {}", e)))
            .and_then(|r| r)
            .map_err(at(Stage::Parse));
        let content_hash = acquired.content_hash.clone();
        // Removes the downloaded temp file, if any, on success and failure alike.
        drop(acquired);
        let raw = parsed?;

        info!(stage = %Stage::Normalize, chars = raw.len(), "normalizing");
        let text = normalize(&raw, NormalizeProfile::Lines);
        if text.is_empty() {
            return Err(StageFailure::new(
                Stage::Normalize,
                PipelineError::ParseFailure("document contains no text".to_string()),
            ));
        }

        info!(stage = %Stage::Segment, "segmenting");
        let segments = segment(&text);
        let metadata = extract_metadata(&text, &request.doc_type);
        info!(
            segments = segments.len(),
            company = %metadata.company,
            filing_date = %metadata.filing_date,
            "segmented"
        );

        Ok(Prepared {
            text,
            segments,
            metadata,
            content_hash,
        })
    }

    /// INDEX → EXTRACT → AGGREGATE. Insights carry an empty document id
    /// until persistence assigns one.
    async fn analyze(
        &self,
        text: &str,
        segments: &[Segment],
        metadata: &DocumentMetadata,
        queries: &[String],
    ) -> Result<Analysis, StageFailure> {
        let chunking = &self.config.chunking;
        info!(stage = %Stage::Index, segments = segments.len(), "building retrieval index");
        let chunks = chunk_segments(segments, chunking.size, chunking.overlap, chunking.unit)
            .map_err(at(Stage::Index))?;
        let chunk_count = chunks.len();
        let mut index = RetrievalIndex::new(Arc::clone(&self.embedder));
        index.build(chunks).await.map_err(at(Stage::Index))?;

        let timestamp = Utc::now().to_rfc3339();
        let model_version = self.extractors.model_version().to_string();
        let mut record = PredictionRecord {
            timestamp: timestamp.clone(),
            company: metadata.company.clone(),
            model_version: model_version.clone(),
            ..Default::default()
        };
        let insight = |metric_name: &str, value: &str, context: &str| Insight {
            metric_name: metric_name.to_string(),
            value: value.to_string(),
            timestamp: timestamp.clone(),
            company: metadata.company.clone(),
            document_id: String::new(),
            model_version: model_version.clone(),
            original_text: context.to_string(),
            page_numbers: Vec::new(),
        };
        let mut insights = Vec::new();

        info!(stage = %Stage::Extract, queries = queries.len(), "extracting");
        for query in queries {
            let context = self.context_for(&index, query, text).await;
            let kind = classify_query(query);
            let value = match kind {
                QueryKind::Metric => self.extractors.extract_metric(&context, query).await,
                QueryKind::Risk => self.extractors.identify_risks(&context).await,
                QueryKind::Summary => self.extractors.summarize(&context).await,
            };
            match kind {
                QueryKind::Metric => record.extracted_metrics.insert(query.clone(), value.clone()),
                _ => record.query_answers.insert(query.clone(), value.clone()),
            };
            insights.push(insight(query, &value, &context));
        }

        if self.config.analysis.whole_document_insights {
            record.sentiment = self.extractors.analyze_sentiment(text).await;
            record.risks = self.extractors.identify_risks(text).await;
            record.summary = self.extractors.summarize(text).await;
            insights.push(insight("sentiment", &record.sentiment, text));
            insights.push(insight("risks", &record.risks, text));
            insights.push(insight("summary", &record.summary, text));
        }

        info!(
            stage = %Stage::Aggregate,
            metrics = record.extracted_metrics.len(),
            answers = record.query_answers.len(),
            "aggregated"
        );
        Ok(Analysis {
            record,
            insights,
            chunks: chunk_count,
        })
    }

    /// Top-k chunks joined with spaces, or the full text when retrieval
    /// fails or finds nothing.
    async fn context_for(&self, index: &RetrievalIndex, query: &str, text: &str) -> String {
        match index.query(query, self.config.retrieval.top_k).await {
            Ok(hits) if !hits.is_empty() => hits.join(" "),
            Ok(_) => text.to_string(),
            Err(e) => {
                warn!(query, error = %e, "retrieval failed; using full text");
                text.to_string()
            }
        }
    }

    async fn persist_new(
        &self,
        prepared: &Prepared,
        doc_type: &str,
        source: &str,
        analysis: &mut Analysis,
    ) -> Result<(String, Vec<String>), PipelineError> {
        let document_id = self
            .store
            .save_document(&new_document(prepared, doc_type, source))
            .await
            .map_err(PipelineError::persistence)?;
        analysis.record.document_id = Some(document_id.clone());
        for insight in &mut analysis.insights {
            insight.document_id = document_id.clone();
        }
        self.store
            .save_segments(&prepared.segments, &document_id)
            .await
            .map_err(PipelineError::persistence)?;
        let insight_ids = self.persist_insights(&document_id, &analysis.insights).await?;
        Ok((document_id, insight_ids))
    }

    async fn persist_insights(
        &self,
        document_id: &str,
        insights: &[Insight],
    ) -> Result<Vec<String>, PipelineError> {
        let mut ids = Vec::with_capacity(insights.len());
        for insight in insights {
            ids.push(
                self.store
                    .save_insight(insight)
                    .await
                    .map_err(PipelineError::persistence)?,
            );
        }
        self.store
            .mark_processed(document_id)
            .await
            .map_err(PipelineError::persistence)?;
        Ok(ids)
    }

    /// Keyed by document id, or `run-<run_id>` when nothing was stored.
    fn log(&self, run_id: &str, record: &PredictionRecord) -> Option<PathBuf> {
        let logger = self.logger.as_ref()?;
        let key = match &record.document_id {
            Some(id) => id.clone(),
            None => format!("run-{}", run_id),
        };
        match logger.log_prediction(&key, record) {
            Ok(path) => Some(path),
            Err(e) => {
                warn!(key = %key, error = %e, "failed to log prediction");
                None
            }
        }
    }
}

fn new_document(prepared: &Prepared, doc_type: &str, source: &str) -> NewDocument {
    NewDocument {
        company: prepared.metadata.company.clone(),
        doc_type: doc_type.to_string(),
        filing_date: prepared.metadata.filing_date.clone(),
        source: source.to_string(),
        content_hash: prepared.content_hash.clone(),
        ingestion_timestamp: Utc::now().timestamp(),
        processed: false,
    }
}

/// Segment texts joined by blank lines.
fn full_text(segments: &[Segment]) -> String {
    segments
        .iter()
        .map(|s| s.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stage_names_are_uppercase() {
        assert_eq!(Stage::Persist.to_string(), "PERSIST");
        assert_eq!(
            serde_json::to_value(Stage::Acquire).unwrap(),
            serde_json::json!("ACQUIRE")
        );
    }

    #[test]
    fn full_text_joins_with_blank_lines() {
        let seg = |t: &str| Segment {
            section_type: "s".into(),
            text: t.into(),
            start_page: 0,
            end_page: 0,
        };
        assert_eq!(full_text(&[seg("a"), seg("b")]), "a\n\nb");
        assert_eq!(full_text(&[]), "");
    }

    #[test]
    fn failure_message_names_the_stage() {
        let failure = StageFailure::new(
            Stage::Parse,
            PipelineError::ParseFailure("no text".into()),
        );
        assert_eq!(failure.to_string(), "PARSE failed: parse failed: no text");
    }
}
