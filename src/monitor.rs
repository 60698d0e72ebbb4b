//! Evaluation and drift checks over the prediction log.
//!
//! [`evaluate`] pairs each document's latest prediction with the human
//! corrections logged for it and scores the pairs. [`prediction_features`]
//! turns logged predictions into numeric samples for
//! [`detect_drift`](filing_intel_core::drift::detect_drift).

use std::collections::BTreeMap;
use std::path::Path;

use anyhow::{Context, Result};
use filing_intel_core::drift::{detect_drift, DriftReport, Distribution};
use filing_intel_core::insight::{is_degraded, SentimentLabel, NOT_FOUND, NO_RISKS};
use filing_intel_core::metrics::{
    calculate_accuracy_metrics, calculate_rouge_score, MetricsSnapshot,
};
use filing_intel_core::models::{Correction, PredictionRecord};
use serde_json::Value;
use tracing::info;

use crate::feedback::PredictionLogger;

/// Score the latest prediction of every corrected document.
///
/// Metric and sentiment corrections become gold/prediction pairs for the
/// accuracy metrics; a degraded prediction counts as no prediction. A
/// corrected `summary` is scored with ROUGE against the logged summary.
/// When several corrections set the same key, the newest wins.
pub fn evaluate(logger: &PredictionLogger) -> Result<MetricsSnapshot> {
    let mut by_document: BTreeMap<String, Vec<Correction>> = BTreeMap::new();
    for entry in logger.all_corrections()? {
        by_document
            .entry(entry.document_id)
            .or_default()
            .push(entry.record);
    }

    let mut gold = Vec::new();
    let mut predicted = Vec::new();
    let mut references = Vec::new();
    let mut generated = Vec::new();
    let mut documents = 0usize;
    let mut fields = 0usize;
    let mut degraded = 0usize;

    for (document_id, corrections) in &by_document {
        let Some(prediction) = logger.latest_prediction(document_id)? else {
            continue;
        };
        documents += 1;
        let (f, d) = degraded_counts(&prediction);
        fields += f;
        degraded += d;

        // Oldest first, so later inserts win.
        let mut merged: BTreeMap<&str, &Value> = BTreeMap::new();
        for correction in corrections {
            for (key, value) in &correction.corrections {
                merged.insert(key.as_str(), value);
            }
        }

        for (key, value) in merged {
            match key {
                "summary" => {
                    references.push(value_text(value));
                    generated.push(prediction.summary.clone());
                }
                "sentiment" => {
                    let label = |s: &str| {
                        SentimentLabel::parse(s)
                            .map(|l| Value::String(format!("{:?}", l)))
                            .unwrap_or(Value::Null)
                    };
                    gold.push(label(&value_text(value)));
                    predicted.push(if is_degraded(&prediction.sentiment) {
                        Value::Null
                    } else {
                        label(&prediction.sentiment)
                    });
                }
                "risks" => {}
                metric => {
                    gold.push(normalize_gold(value));
                    predicted.push(
                        prediction
                            .extracted_metrics
                            .get(metric)
                            .filter(|v| !is_degraded(v))
                            .map(|v| Value::String(v.trim().to_string()))
                            .unwrap_or(Value::Null),
                    );
                }
            }
        }
    }

    let mut snapshot = MetricsSnapshot {
        accuracy: calculate_accuracy_metrics(&gold, &predicted),
        rouge: calculate_rouge_score(&references, &generated),
        scalars: BTreeMap::new(),
    };
    snapshot
        .scalars
        .insert("documents".to_string(), documents as f64);
    snapshot
        .scalars
        .insert("pairs".to_string(), gold.len() as f64);
    snapshot.scalars.insert(
        "degraded_rate".to_string(),
        if fields == 0 {
            0.0
        } else {
            degraded as f64 / fields as f64
        },
    );
    info!(documents, pairs = gold.len(), "evaluation complete");
    Ok(snapshot)
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

fn normalize_gold(value: &Value) -> Value {
    match value {
        Value::Null => Value::Null,
        Value::String(s) => Value::String(s.trim().to_string()),
        other => Value::String(other.to_string()),
    }
}

/// `(populated fields, degraded fields)` of one record.
fn degraded_counts(record: &PredictionRecord) -> (usize, usize) {
    let values = record
        .extracted_metrics
        .values()
        .chain(record.query_answers.values())
        .chain([&record.sentiment, &record.risks, &record.summary])
        .filter(|v| !v.is_empty());
    values.fold((0, 0), |(total, bad), v| {
        (total + 1, bad + is_degraded(v) as usize)
    })
}

/// Numeric drift features per prediction:
///
/// | Feature | Value |
/// |---|---|
/// | `processing_time` | seconds |
/// | `summary_chars` | summary length, degraded summaries excluded |
/// | `risk_items` | non-empty lines of the risk answer, 0 for "no risks" |
/// | `sentiment_score` | +1 / 0 / -1, unparsable answers excluded |
/// | `metrics_found` | metric answers that are neither degraded nor "Not found" |
/// | `degraded_fields` | degraded answers across all fields |
pub fn prediction_features(records: &[PredictionRecord]) -> Distribution {
    let mut dist: Distribution = [
        "processing_time",
        "summary_chars",
        "risk_items",
        "sentiment_score",
        "metrics_found",
        "degraded_fields",
    ]
    .into_iter()
    .map(|name| (name.to_string(), Vec::new()))
    .collect();

    let mut push = |name: &str, value: f64| {
        if let (Some(samples), Some(n)) = (dist.get_mut(name), serde_json::Number::from_f64(value)) {
            samples.push(Value::Number(n));
        }
    };

    for record in records {
        push("processing_time", record.processing_time);

        if !record.summary.is_empty() && !is_degraded(&record.summary) {
            push("summary_chars", record.summary.chars().count() as f64);
        }

        if !record.risks.is_empty() && !is_degraded(&record.risks) {
            let items = if record.risks.trim().eq_ignore_ascii_case(NO_RISKS) {
                0
            } else {
                record.risks.lines().filter(|l| !l.trim().is_empty()).count()
            };
            push("risk_items", items as f64);
        }

        if !is_degraded(&record.sentiment) {
            if let Some(label) = SentimentLabel::parse(&record.sentiment) {
                push("sentiment_score", label.score());
            }
        }

        let found = record
            .extracted_metrics
            .values()
            .filter(|v| !is_degraded(v) && !v.trim().to_lowercase().starts_with(&NOT_FOUND.to_lowercase()))
            .count();
        push("metrics_found", found as f64);
        push("degraded_fields", degraded_counts(record).1 as f64);
    }
    dist
}

/// Split logged predictions at `date` (an RFC 3339 prefix such as
/// `2024-06-01`) into baseline (before) and current (at or after), then
/// run the drift check on their features.
pub fn drift_from_logs(logger: &PredictionLogger, date: &str) -> Result<DriftReport> {
    let (baseline, current): (Vec<_>, Vec<_>) = logger
        .all_predictions()?
        .into_iter()
        .map(|e| e.record)
        .partition(|r| r.timestamp.as_str() < date);
    info!(
        baseline = baseline.len(),
        current = current.len(),
        split = date,
        "checking drift in prediction log"
    );
    Ok(detect_drift(
        &prediction_features(&current),
        &prediction_features(&baseline),
    ))
}

/// Read a `{"feature": [values...]}` JSON file.
pub fn load_distribution(path: &Path) -> Result<Distribution> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read distribution file: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse distribution file: {}", path.display()))
}
