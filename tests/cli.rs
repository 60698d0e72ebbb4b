//! End-to-end tests of the `fin` binary with a SQLite store, the hashing
//! embedder and the language model disabled (every extraction degrades).

use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

use serde_json::Value;
use tempfile::TempDir;

fn fin_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("fin");
    path
}

const ACME: &str = "\
COMPANY NAME: Acme Holdings Inc
FILING DATE: 02/28/2024

ITEM 1. BUSINESS
Acme designs industrial sensors.

ITEM 1A. RISK FACTORS
Supply chain disruption could reduce margins.

ITEM 7. MANAGEMENT'S DISCUSSION
Total revenue increased 12% to $4.2 billion.
";

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();
    let filings = root.join("filings");
    fs::create_dir_all(&filings).unwrap();
    fs::write(filings.join("acme-10k.txt"), ACME).unwrap();

    let config_content = format!(
        r#"[db]
path = "{root}/data/fin.sqlite"

[chunking]
size = 200
overlap = 40

[retrieval]
top_k = 3

[embedding]
provider = "hashing"

[llm]
provider = "disabled"

[analysis]
default_queries = ["Total Revenue", "Net Income"]

[monitoring]
log_dir = "{root}/logs"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("fin.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_fin(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = fin_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        .env("RUST_LOG", "warn")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run fin binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let success = output.status.success();
    (stdout, stderr, success)
}

fn filing_path(config_path: &Path) -> String {
    let root = config_path.parent().unwrap().parent().unwrap();
    root.join("filings")
        .join("acme-10k.txt")
        .to_string_lossy()
        .to_string()
}

/// Run `process` on the sample filing and return the report as JSON.
fn process_sample(config_path: &Path) -> Value {
    run_fin(config_path, &["init"]);
    let source = filing_path(config_path);
    let (stdout, stderr, success) = run_fin(config_path, &["process", &source]);
    assert!(success, "process failed: stdout={}, stderr={}", stdout, stderr);
    serde_json::from_str(&stdout).unwrap_or_else(|e| panic!("bad JSON ({}): {}", e, stdout))
}

#[test]
fn test_init_creates_database_and_log_dir() {
    let (tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_fin(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));
    assert!(tmp.path().join("data").join("fin.sqlite").exists());
    assert!(tmp.path().join("logs").is_dir());
}

#[test]
fn test_init_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (_, _, success1) = run_fin(&config_path, &["init"]);
    assert!(success1, "First init failed");
    let (_, _, success2) = run_fin(&config_path, &["init"]);
    assert!(success2, "Second init failed (not idempotent)");
}

#[test]
fn test_missing_config_fails() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_fin(&tmp.path().join("nope.toml"), &["documents"]);
    assert!(!success);
    assert!(stderr.contains("Failed to read config file"), "{}", stderr);
}

#[test]
fn test_process_with_disabled_model_degrades() {
    let (_tmp, config_path) = setup_test_env();
    let report = process_sample(&config_path);

    assert_eq!(report["metadata"]["company"], "Acme Holdings Inc");
    assert_eq!(report["metadata"]["filing_date"], "02/28/2024");
    assert_eq!(report["segments"], 4);
    let revenue = report["record"]["extracted_metrics"]["Total Revenue"]
        .as_str()
        .unwrap();
    assert!(revenue.starts_with("Error during extraction"), "{}", revenue);
    assert!(report["record"]["summary"]
        .as_str()
        .unwrap()
        .starts_with("Error during generation"));
    // Two metrics plus sentiment, risks and summary.
    assert_eq!(report["insight_ids"].as_array().unwrap().len(), 5);
    assert!(report["log_path"].as_str().unwrap().contains("predictions"));
}

#[test]
fn test_process_missing_file_fails_at_acquire() {
    let (_tmp, config_path) = setup_test_env();
    run_fin(&config_path, &["init"]);

    let (_, stderr, success) = run_fin(&config_path, &["process", "/no/such/filing.pdf"]);
    assert!(!success);
    assert!(stderr.contains("ACQUIRE failed"), "{}", stderr);

    let (stdout, _, _) = run_fin(&config_path, &["documents"]);
    assert!(stdout.contains("No documents."));
}

#[test]
fn test_documents_and_get() {
    let (_tmp, config_path) = setup_test_env();
    let report = process_sample(&config_path);
    let id = report["document_id"].as_str().unwrap();

    let (stdout, _, success) = run_fin(&config_path, &["documents"]);
    assert!(success);
    assert!(stdout.contains(id));
    assert!(stdout.contains("processed"));
    assert!(stdout.contains("Acme Holdings Inc"));

    let (stdout, stderr, success) = run_fin(&config_path, &["get", id]);
    assert!(success, "get failed: {}", stderr);
    let view: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(view["id"], id);
    assert_eq!(view["processed"], true);
    let labels: Vec<_> = view["segments"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s["section_type"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(labels[1], "ITEM 1. BUSINESS");
}

#[test]
fn test_get_missing_document() {
    let (_tmp, config_path) = setup_test_env();
    run_fin(&config_path, &["init"]);

    let (_, stderr, success) = run_fin(&config_path, &["get", "nonexistent-id"]);
    assert!(!success);
    assert!(stderr.contains("document not found"), "{}", stderr);
}

#[test]
fn test_insights_filter_by_metric() {
    let (_tmp, config_path) = setup_test_env();
    let report = process_sample(&config_path);
    let id = report["document_id"].as_str().unwrap();

    let (stdout, _, success) = run_fin(&config_path, &["insights", "--metric", "Total Revenue"]);
    assert!(success);
    let insights: Vec<Value> = serde_json::from_str(&stdout).unwrap();
    assert_eq!(insights.len(), 1);
    assert_eq!(insights[0]["document_id"], id);
    assert_eq!(insights[0]["model_version"], "disabled");

    let (stdout, _, _) = run_fin(&config_path, &["insights", "--company", "Nobody Corp"]);
    let none: Vec<Value> = serde_json::from_str(&stdout).unwrap();
    assert!(none.is_empty());
}

#[test]
fn test_ingest_then_analyze() {
    let (_tmp, config_path) = setup_test_env();
    run_fin(&config_path, &["init"]);
    let source = filing_path(&config_path);

    let (stdout, stderr, success) = run_fin(&config_path, &["ingest", &source, "--doc-type", "10-Q"]);
    assert!(success, "ingest failed: {}", stderr);
    let ingested: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(ingested["document"]["processed"], false);
    assert_eq!(ingested["document"]["doc_type"], "10-Q");
    let id = ingested["document"]["id"].as_str().unwrap().to_string();

    let (stdout, stderr, success) =
        run_fin(&config_path, &["analyze", &id, "--query", "Net Income"]);
    assert!(success, "analyze failed: {}", stderr);
    let report: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["document_id"], id.as_str());
    assert!(report["record"]["extracted_metrics"]
        .as_object()
        .unwrap()
        .contains_key("Net Income"));
}

#[test]
fn test_analyze_text_stores_nothing() {
    let (tmp, config_path) = setup_test_env();
    run_fin(&config_path, &["init"]);
    let file = tmp.path().join("note.txt");
    fs::write(&file, "Revenue grew strongly this quarter. ".repeat(10)).unwrap();

    let (stdout, stderr, success) = run_fin(
        &config_path,
        &["analyze-text", file.to_str().unwrap(), "--company", "Inline Co"],
    );
    assert!(success, "analyze-text failed: {}", stderr);
    let report: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["record"]["company"], "Inline Co");
    assert_eq!(report["segments"], 3);
    assert!(report["document_id"].is_null());

    let (stdout, _, _) = run_fin(&config_path, &["documents"]);
    assert!(stdout.contains("No documents."));
}

#[test]
fn test_batch_processes_directory() {
    let (tmp, config_path) = setup_test_env();
    run_fin(&config_path, &["init"]);
    let filings = tmp.path().join("filings");
    fs::write(filings.join("beta.txt"), "ITEM 1. BUSINESS\nBeta sells tea.\n").unwrap();
    fs::write(filings.join("ignored.csv"), "a,b\n").unwrap();

    let (stdout, stderr, success) = run_fin(&config_path, &["batch", filings.to_str().unwrap()]);
    assert!(success, "batch failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("2 processed, 0 failed"), "{}", stdout);
    assert!(!stdout.contains("ignored.csv"));
}

#[test]
fn test_batch_reports_failures() {
    let (tmp, config_path) = setup_test_env();
    run_fin(&config_path, &["init"]);
    let filings = tmp.path().join("filings");
    fs::write(filings.join("empty.txt"), "   \n").unwrap();

    let (stdout, _, success) = run_fin(&config_path, &["batch", filings.to_str().unwrap()]);
    assert!(!success);
    assert!(stdout.contains("1 processed, 1 failed"), "{}", stdout);
    assert!(stdout.contains("FAILED"));
}

#[test]
fn test_feedback_and_evaluate() {
    let (_tmp, config_path) = setup_test_env();
    let report = process_sample(&config_path);
    let id = report["document_id"].as_str().unwrap();

    let (stdout, stderr, success) = run_fin(
        &config_path,
        &["feedback", "correct", id, "--set", "Total Revenue=$4.2 billion"],
    );
    assert!(success, "correct failed: {}", stderr);
    assert!(stdout.contains("Correction logged to"));

    let (stdout, _, success) = run_fin(
        &config_path,
        &["feedback", "comment", id, "--rating", "2", "--comment", "values missing"],
    );
    assert!(success);
    assert!(stdout.contains("Feedback logged to"));

    let (stdout, stderr, success) = run_fin(&config_path, &["monitor", "evaluate"]);
    assert!(success, "evaluate failed: {}", stderr);
    let snapshot: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(snapshot["scalars"]["documents"], 1.0);
    assert_eq!(snapshot["scalars"]["pairs"], 1.0);
    // Every logged field is degraded.
    assert_eq!(snapshot["scalars"]["degraded_rate"], 1.0);
}

#[test]
fn test_feedback_rating_out_of_range() {
    let (_tmp, config_path) = setup_test_env();
    let (_, _, success) = run_fin(&config_path, &["feedback", "comment", "doc", "--rating", "9"]);
    assert!(!success);
}

#[test]
fn test_monitor_drift_between_files() {
    let tmp = TempDir::new().unwrap();
    let baseline = tmp.path().join("baseline.json");
    let current = tmp.path().join("current.json");
    let base: Vec<f64> = (1..=10).map(f64::from).collect();
    let cur: Vec<f64> = (101..=110).map(f64::from).collect();
    fs::write(&baseline, serde_json::json!({ "processing_time": base }).to_string()).unwrap();
    fs::write(&current, serde_json::json!({ "processing_time": cur }).to_string()).unwrap();

    // No config file is needed for file-based drift checks.
    let (stdout, stderr, success) = run_fin(
        &tmp.path().join("absent.toml"),
        &[
            "monitor",
            "drift",
            "--current",
            current.to_str().unwrap(),
            "--baseline",
            baseline.to_str().unwrap(),
        ],
    );
    assert!(success, "drift failed: {}", stderr);
    let report: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["drift_detected"], true);
    assert_eq!(report["features"]["processing_time"]["statistic"], 1.0);
}

#[test]
fn test_monitor_drift_logs_with_no_history() {
    let (_tmp, config_path) = setup_test_env();
    let (stdout, stderr, success) =
        run_fin(&config_path, &["monitor", "drift-logs", "--split", "2024-06-01"]);
    assert!(success, "drift-logs failed: {}", stderr);
    let report: Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(report["drift_detected"], false);
    // Every feature lacks samples on both sides of the split.
    assert_eq!(report["skipped"].as_array().unwrap().len(), 6);
    assert!(report["features"].as_object().unwrap().is_empty());
}

#[test]
fn test_completions_bash() {
    let tmp = TempDir::new().unwrap();
    let (stdout, _, success) = run_fin(&tmp.path().join("absent.toml"), &["completions", "bash"]);
    assert!(success);
    assert!(stdout.contains("fin"));
    assert!(stdout.contains("process"));
}
