//! Append-only prediction, correction and feedback log.
//!
//! Every event is one pretty-printed JSON file:
//!
//! ```text
//! {log_dir}/predictions/{document_id}_{YYYYMMDD_HHMMSS_micros}.json
//! {log_dir}/corrections/{document_id}_{YYYYMMDD_HHMMSS_micros}.json
//! {log_dir}/feedback/{document_id}_{YYYYMMDD_HHMMSS_micros}.json
//! ```
//!
//! The timestamp part is fixed width, so lexical file-name order is time
//! order and the document id is recovered by stripping it from the stem.
//! Files are never rewritten.

use std::fs::OpenOptions;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use anyhow::{bail, Context, Result};
use chrono::{Duration, Utc};
use filing_intel_core::models::{Correction, Feedback, PredictionRecord};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

const KEY_FORMAT: &str = "%Y%m%d_%H%M%S_%6f";
/// `_` plus `YYYYMMDD_HHMMSS_micros`.
const KEY_SUFFIX_LEN: usize = 1 + 8 + 1 + 6 + 1 + 6;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogKind {
    Predictions,
    Corrections,
    Feedback,
}

impl LogKind {
    fn dir_name(self) -> &'static str {
        match self {
            LogKind::Predictions => "predictions",
            LogKind::Corrections => "corrections",
            LogKind::Feedback => "feedback",
        }
    }
}

/// A log entry together with the document id recovered from its key.
#[derive(Debug, Clone)]
pub struct LogEntry<T> {
    pub document_id: String,
    pub path: PathBuf,
    pub record: T,
}

pub struct PredictionLogger {
    root: PathBuf,
}

impl PredictionLogger {
    pub fn new(log_dir: impl Into<PathBuf>) -> Self {
        Self {
            root: log_dir.into(),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn log_prediction(&self, document_id: &str, record: &PredictionRecord) -> Result<PathBuf> {
        self.append(LogKind::Predictions, document_id, record)
    }

    pub fn log_correction(&self, document_id: &str, correction: &Correction) -> Result<PathBuf> {
        self.append(LogKind::Corrections, document_id, correction)
    }

    pub fn log_feedback(&self, document_id: &str, feedback: &Feedback) -> Result<PathBuf> {
        self.append(LogKind::Feedback, document_id, feedback)
    }

    /// Most recent prediction for `document_id`, by key timestamp.
    pub fn latest_prediction(&self, document_id: &str) -> Result<Option<PredictionRecord>> {
        let mut entries = self.entries_for::<PredictionRecord>(LogKind::Predictions, document_id)?;
        Ok(entries.pop().map(|e| e.record))
    }

    /// Corrections for `document_id`, newest first.
    pub fn corrections(&self, document_id: &str) -> Result<Vec<Correction>> {
        let entries = self.entries_for::<Correction>(LogKind::Corrections, document_id)?;
        Ok(entries.into_iter().rev().map(|e| e.record).collect())
    }

    /// Feedback for `document_id`, newest first.
    pub fn feedback(&self, document_id: &str) -> Result<Vec<Feedback>> {
        let entries = self.entries_for::<Feedback>(LogKind::Feedback, document_id)?;
        Ok(entries.into_iter().rev().map(|e| e.record).collect())
    }

    /// Every prediction in key order (oldest first).
    pub fn all_predictions(&self) -> Result<Vec<LogEntry<PredictionRecord>>> {
        self.read_all(LogKind::Predictions)
    }

    pub fn all_corrections(&self) -> Result<Vec<LogEntry<Correction>>> {
        self.read_all(LogKind::Corrections)
    }

    fn kind_dir(&self, kind: LogKind) -> PathBuf {
        self.root.join(kind.dir_name())
    }

    fn append<T: Serialize>(&self, kind: LogKind, document_id: &str, record: &T) -> Result<PathBuf> {
        validate_document_id(document_id)?;
        let dir = self.kind_dir(kind);
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
        let json = serde_json::to_string_pretty(record)?;

        // Two writes within the same microsecond get successive keys.
        let mut at = Utc::now();
        loop {
            let path = dir.join(format!("{}_{}.json", document_id, at.format(KEY_FORMAT)));
            match OpenOptions::new().write(true).create_new(true).open(&path) {
                Ok(file) => {
                    write_entry(file, &path, json.as_bytes())?;
                    info!(kind = kind.dir_name(), document_id, path = %path.display(), "logged");
                    return Ok(path);
                }
                Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                    at += Duration::microseconds(1);
                }
                Err(e) => {
                    return Err(e)
                        .with_context(|| format!("Failed to write log file: {}", path.display()))
                }
            }
        }
    }

    fn entries_for<T: DeserializeOwned>(
        &self,
        kind: LogKind,
        document_id: &str,
    ) -> Result<Vec<LogEntry<T>>> {
        Ok(self
            .read_all(kind)?
            .into_iter()
            .filter(|e| e.document_id == document_id)
            .collect())
    }

    fn read_all<T: DeserializeOwned>(&self, kind: LogKind) -> Result<Vec<LogEntry<T>>> {
        let dir = self.kind_dir(kind);
        if !dir.is_dir() {
            return Ok(Vec::new());
        }

        let mut keyed = Vec::new();
        for entry in std::fs::read_dir(&dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(stem) = path.file_stem().and_then(|s| s.to_str()) else {
                continue;
            };
            match split_key(stem) {
                Some((doc_id, ts)) => keyed.push((ts.to_string(), doc_id.to_string(), path)),
                None => warn!(path = %path.display(), "skipping log file with malformed name"),
            }
        }
        keyed.sort();

        let mut out = Vec::with_capacity(keyed.len());
        for (_, document_id, path) in keyed {
            let content = std::fs::read_to_string(&path)?;
            match serde_json::from_str(&content) {
                Ok(record) => out.push(LogEntry {
                    document_id,
                    path,
                    record,
                }),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable log file"),
            }
        }
        Ok(out)
    }
}

/// Split `{document_id}_{timestamp}` into its parts.
/// Writes one event; on failure the partial file is removed.
fn write_entry<W: Write>(mut file: W, path: &Path, bytes: &[u8]) -> Result<()> {
    if let Err(e) = file.write_all(bytes).and_then(|()| file.flush()) {
        drop(file);
        if let Err(rm) = std::fs::remove_file(path) {
            warn!(path = %path.display(), error = %rm, "failed to remove partial log file");
        }
        return Err(e).with_context(|| format!("Failed to write log file: {}", path.display()));
    }
    Ok(())
}

fn split_key(stem: &str) -> Option<(&str, &str)> {
    if stem.len() <= KEY_SUFFIX_LEN || !stem.is_char_boundary(stem.len() - KEY_SUFFIX_LEN) {
        return None;
    }
    let (doc_id, suffix) = stem.split_at(stem.len() - KEY_SUFFIX_LEN);
    let ts = suffix.strip_prefix('_')?;
    let well_formed = ts
        .char_indices()
        .all(|(i, c)| if i == 8 || i == 15 { c == '_' } else { c.is_ascii_digit() });
    well_formed.then_some((doc_id, ts))
}

fn validate_document_id(id: &str) -> Result<()> {
    if id.is_empty() || id.contains(['/', '\\']) || id == "." || id == ".." {
        bail!("invalid document id for log key: '{}'", id);
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use tempfile::TempDir;

    fn prediction(summary: &str) -> PredictionRecord {
        PredictionRecord {
            run_id: "r".into(),
            document_id: Some("doc_1".into()),
            summary: summary.into(),
            ..Default::default()
        }
    }

    #[test]
    fn key_round_trips_document_ids_with_underscores() {
        assert_eq!(
            split_key("doc_1_20240102_030405_000006"),
            Some(("doc_1", "20240102_030405_000006"))
        );
        assert_eq!(split_key("doc_20240102"), None);
        assert_eq!(split_key("doc_2024010x_030405_000006"), None);
    }

    #[test]
    fn latest_prediction_is_the_newest_write() {
        let dir = TempDir::new().unwrap();
        let logger = PredictionLogger::new(dir.path());
        logger.log_prediction("doc_1", &prediction("first")).unwrap();
        logger.log_prediction("doc_1", &prediction("second")).unwrap();
        logger.log_prediction("doc_10", &prediction("other")).unwrap();

        let latest = logger.latest_prediction("doc_1").unwrap().unwrap();
        assert_eq!(latest.summary, "second");
        assert_eq!(logger.all_predictions().unwrap().len(), 3);
        assert!(logger.latest_prediction("missing").unwrap().is_none());
    }

    #[test]
    fn corrections_are_newest_first() {
        let dir = TempDir::new().unwrap();
        let logger = PredictionLogger::new(dir.path());
        for value in ["a", "b"] {
            let mut corrections = BTreeMap::new();
            corrections.insert("summary".to_string(), serde_json::json!(value));
            logger
                .log_correction(
                    "d",
                    &Correction {
                        document_id: "d".into(),
                        timestamp: Utc::now().to_rfc3339(),
                        corrections,
                        original_prediction: None,
                    },
                )
                .unwrap();
        }
        let got = logger.corrections("d").unwrap();
        assert_eq!(got.len(), 2);
        assert_eq!(got[0].corrections["summary"], "b");
    }

    #[test]
    fn files_are_partitioned_by_kind() {
        let dir = TempDir::new().unwrap();
        let logger = PredictionLogger::new(dir.path());
        let path = logger
            .log_feedback(
                "d",
                &Feedback {
                    document_id: "d".into(),
                    timestamp: Utc::now().to_rfc3339(),
                    rating: Some(4),
                    comment: "useful".into(),
                },
            )
            .unwrap();
        assert!(path.starts_with(dir.path().join("feedback")));
        assert_eq!(logger.feedback("d").unwrap()[0].rating, Some(4));
        assert!(logger.all_corrections().unwrap().is_empty());
    }

    struct BrokenDisk;

    impl Write for BrokenDisk {
        fn write(&mut self, _buf: &[u8]) -> std::io::Result<usize> {
            Err(std::io::Error::new(ErrorKind::Other, "disk full"))
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn failed_write_leaves_no_partial_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("doc_1_20240101_000000_000000.json");
        std::fs::write(&path, b"{\"partial\"").unwrap();

        let err = write_entry(BrokenDisk, &path, b"{}").unwrap_err();
        assert!(err.to_string().contains("Failed to write log file"));
        assert!(!path.exists());
    }

    #[test]
    fn path_like_ids_are_rejected() {
        let dir = TempDir::new().unwrap();
        let logger = PredictionLogger::new(dir.path());
        assert!(logger.log_prediction("../escape", &prediction("x")).is_err());
    }
}
