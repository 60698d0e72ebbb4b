//! Command handlers behind the `fin` CLI.
//!
//! Each `run_*` function loads what it needs from [`Config`], does its
//! work and prints the result to stdout (pretty JSON for structured
//! output). Errors propagate to `main` as `anyhow::Error`.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use chrono::Utc;
use filing_intel_core::drift::detect_drift;
use filing_intel_core::metadata::extract_metadata;
use filing_intel_core::models::{Correction, Feedback, InsightFilter};
use filing_intel_core::store::memory::InMemoryStore;
use filing_intel_core::store::DocumentStore;
use serde::Serialize;
use tracing::info;

use crate::acquire::scan_directory;
use crate::config::Config;
use crate::embedding::create_embedder;
use crate::feedback::PredictionLogger;
use crate::llm::{create_language_model, DisabledModel};
use crate::monitor;
use crate::pipeline::{Pipeline, ProcessRequest, StageFailure};
use crate::sqlite_store::SqliteStore;

/// The configured store plus the SQLite handle to close on exit.
pub struct OpenStore {
    pub store: Arc<dyn DocumentStore>,
    sqlite: Option<Arc<SqliteStore>>,
}

impl OpenStore {
    pub async fn open(config: &Config) -> Result<Self> {
        match config.storage.backend.as_str() {
            "memory" => Ok(Self {
                store: Arc::new(InMemoryStore::new()),
                sqlite: None,
            }),
            _ => {
                let sqlite = Arc::new(SqliteStore::connect(&config.db).await?);
                sqlite.migrate().await?;
                Ok(Self {
                    store: sqlite.clone(),
                    sqlite: Some(sqlite),
                })
            }
        }
    }

    pub async fn close(self) {
        if let Some(sqlite) = self.sqlite {
            sqlite.close().await;
        }
    }
}

pub fn build_pipeline(config: &Config, store: Arc<dyn DocumentStore>) -> Result<Pipeline> {
    let embedder = create_embedder(&config.embedding)?;
    let model = create_language_model(&config.llm)?;
    info!(
        embedder = embedder.model_name(),
        model = model.model_name(),
        "pipeline ready"
    );
    Ok(Pipeline::new(store, embedder, model, config.clone()))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Print what survived a failed run, then turn the failure into an error.
fn report_failure(failure: StageFailure) -> anyhow::Error {
    if let Some(record) = &failure.record {
        eprintln!("Results were not stored; in-memory record follows.");
        if let Ok(json) = serde_json::to_string_pretty(record) {
            println!("{}", json);
        }
    }
    anyhow::Error::new(failure)
}

pub async fn run_init(config: &Config) -> Result<()> {
    let store = SqliteStore::connect(&config.db).await?;
    store.migrate().await?;
    store.close().await;
    std::fs::create_dir_all(&config.monitoring.log_dir).with_context(|| {
        format!(
            "Failed to create log directory: {}",
            config.monitoring.log_dir.display()
        )
    })?;
    println!("Database initialized successfully.");
    Ok(())
}

pub async fn run_ingest(config: &Config, request: ProcessRequest) -> Result<()> {
    // Ingest makes no model calls, so it works without model credentials.
    let embedder = create_embedder(&config.embedding)?;
    let open = OpenStore::open(config).await?;
    let result = Pipeline::new(
        open.store.clone(),
        embedder,
        Arc::new(DisabledModel),
        config.clone(),
    )
    .ingest(&request)
    .await;
    open.close().await;
    print_json(&result.map_err(report_failure)?)
}

pub async fn run_process(config: &Config, request: ProcessRequest) -> Result<()> {
    let open = OpenStore::open(config).await?;
    let result = build_pipeline(config, open.store.clone())?
        .process(&request)
        .await;
    open.close().await;
    print_json(&result.map_err(report_failure)?)
}

pub async fn run_batch(
    config: &Config,
    dir: &Path,
    doc_type: &str,
    queries: Option<Vec<String>>,
) -> Result<()> {
    let files = scan_directory(
        dir,
        &config.acquisition.include_globs,
        &config.acquisition.exclude_globs,
    )?;
    if files.is_empty() {
        println!("No matching files under {}", dir.display());
        return Ok(());
    }

    let requests: Vec<ProcessRequest> = files
        .iter()
        .map(|path| ProcessRequest {
            queries: queries.clone(),
            ..ProcessRequest::new(path.to_string_lossy(), doc_type)
        })
        .collect();

    let open = OpenStore::open(config).await?;
    let results = build_pipeline(config, open.store.clone())?
        .process_batch(&requests)
        .await;
    open.close().await;

    let mut failed = 0usize;
    for (request, result) in requests.iter().zip(&results) {
        match result {
            Ok(report) => println!(
                "ok      {}  document={}  segments={}  insights={}",
                request.source,
                report.document_id.as_deref().unwrap_or("-"),
                report.segments,
                report.insight_ids.len()
            ),
            Err(failure) => {
                failed += 1;
                println!("FAILED  {}  {}", request.source, failure);
            }
        }
    }
    println!("{} processed, {} failed", results.len() - failed, failed);
    if failed > 0 {
        bail!("{} of {} runs failed", failed, results.len());
    }
    Ok(())
}

pub async fn run_analyze(
    config: &Config,
    document_id: &str,
    queries: Option<Vec<String>>,
) -> Result<()> {
    let open = OpenStore::open(config).await?;
    let result = build_pipeline(config, open.store.clone())?
        .analyze_document(document_id, queries.as_deref())
        .await;
    open.close().await;
    print_json(&result.map_err(report_failure)?)
}

pub async fn run_analyze_text(
    config: &Config,
    file: &Path,
    doc_type: &str,
    company: Option<String>,
    queries: Option<Vec<String>>,
) -> Result<()> {
    let text = std::fs::read_to_string(file)
        .with_context(|| format!("Failed to read text file: {}", file.display()))?;
    let mut metadata = extract_metadata(&text, doc_type);
    if let Some(company) = company {
        metadata.company = company;
    }

    // Nothing is stored, so an in-memory store is enough.
    let pipeline = build_pipeline(config, Arc::new(InMemoryStore::new()))?.without_logging();
    let report = pipeline
        .analyze_text(&text, metadata, queries.as_deref())
        .await
        .map_err(report_failure)?;
    print_json(&report)
}

pub async fn run_documents(config: &Config) -> Result<()> {
    let open = OpenStore::open(config).await?;
    let docs = open.store.list_documents().await;
    open.close().await;
    let docs = docs?;

    if docs.is_empty() {
        println!("No documents.");
        return Ok(());
    }
    for doc in docs {
        println!(
            "{}  {:<9}  {:<6}  {:<10}  {}  {}",
            doc.id,
            if doc.processed { "processed" } else { "ingested" },
            doc.doc_type,
            doc.filing_date,
            doc.company,
            doc.source
        );
    }
    Ok(())
}

#[derive(Serialize)]
struct DocumentView {
    #[serde(flatten)]
    document: filing_intel_core::models::Document,
    segments: Vec<filing_intel_core::models::StoredSegment>,
}

pub async fn run_get(config: &Config, id: &str) -> Result<()> {
    let open = OpenStore::open(config).await?;
    let fetched = async {
        let document = open.store.get_document_by_id(id).await?;
        let segments = open.store.get_document_segments(id).await?;
        anyhow::Ok(document.map(|document| DocumentView { document, segments }))
    }
    .await;
    open.close().await;

    match fetched? {
        Some(view) => print_json(&view),
        None => bail!("document not found: {}", id),
    }
}

pub async fn run_insights(config: &Config, filter: InsightFilter) -> Result<()> {
    let open = OpenStore::open(config).await?;
    let insights = open.store.query_insights(&filter).await;
    open.close().await;
    print_json(&insights?)
}

pub fn run_feedback_correct(
    config: &Config,
    document_id: &str,
    values: Vec<(String, String)>,
) -> Result<()> {
    if values.is_empty() {
        bail!("at least one --set KEY=VALUE is required");
    }
    let logger = PredictionLogger::new(config.monitoring.log_dir.clone());
    let corrections: BTreeMap<String, serde_json::Value> = values
        .into_iter()
        .map(|(k, v)| {
            // Numbers, booleans and null keep their JSON type.
            let value = serde_json::from_str(&v).unwrap_or(serde_json::Value::String(v));
            (k, value)
        })
        .collect();
    let correction = Correction {
        document_id: document_id.to_string(),
        timestamp: Utc::now().to_rfc3339(),
        corrections,
        original_prediction: logger.latest_prediction(document_id)?,
    };
    if correction.original_prediction.is_none() {
        eprintln!("Warning: no logged prediction for document {}", document_id);
    }
    let path = logger.log_correction(document_id, &correction)?;
    println!("Correction logged to {}", path.display());
    Ok(())
}

pub fn run_feedback_comment(
    config: &Config,
    document_id: &str,
    rating: Option<u8>,
    comment: String,
) -> Result<()> {
    let logger = PredictionLogger::new(config.monitoring.log_dir.clone());
    let feedback = Feedback {
        document_id: document_id.to_string(),
        timestamp: Utc::now().to_rfc3339(),
        rating,
        comment,
    };
    let path = logger.log_feedback(document_id, &feedback)?;
    println!("Feedback logged to {}", path.display());
    Ok(())
}

pub fn run_monitor_evaluate(config: &Config) -> Result<()> {
    let logger = PredictionLogger::new(config.monitoring.log_dir.clone());
    print_json(&monitor::evaluate(&logger)?)
}

pub fn run_monitor_drift(current: &Path, baseline: &Path) -> Result<()> {
    let current = monitor::load_distribution(current)?;
    let baseline = monitor::load_distribution(baseline)?;
    print_json(&detect_drift(&current, &baseline))
}

pub fn run_monitor_drift_logs(config: &Config, split: &str) -> Result<()> {
    let logger = PredictionLogger::new(config.monitoring.log_dir.clone());
    print_json(&monitor::drift_from_logs(&logger, split)?)
}
