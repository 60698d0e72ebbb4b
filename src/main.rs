//! # Filing Intel CLI (`fin`)
//!
//! Runs financial filings through the document intelligence pipeline and
//! manages the prediction log used for evaluation and drift checks.
//!
//! ## Usage
//!
//! ```bash
//! fin --config ./config/fin.toml <command>
//! ```
//!
//! ## Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `fin init` | Create the SQLite database and the log directory |
//! | `fin ingest <source>` | Acquire, parse and segment a filing; store it without analysis |
//! | `fin process <source>` | Full pipeline run for one filing |
//! | `fin batch <dir>` | Process every matching file under a directory |
//! | `fin analyze <id>` | Analyze a stored document |
//! | `fin analyze-text <file>` | Analyze a text file without storing anything |
//! | `fin documents` | List stored documents |
//! | `fin get <id>` | Show a document and its segments |
//! | `fin insights` | Query stored insights |
//! | `fin feedback correct\|comment` | Log corrections or free-form feedback |
//! | `fin monitor evaluate\|drift\|drift-logs` | Accuracy metrics and drift checks |
//! | `fin completions <shell>` | Print a shell completion script |
//!
//! ## Examples
//!
//! ```bash
//! fin init
//! fin process https://www.sec.gov/Archives/edgar/data/320193/aapl-10k.htm --doc-type 10-K
//! fin process ./filings/q3.pdf --query "Total Revenue" --query "Risk factors"
//! fin feedback correct <doc-id> --set "Total Revenue=\$383.3 billion"
//! fin monitor drift-logs --split 2024-06-01
//! ```

use std::path::PathBuf;

use clap::{CommandFactory, Parser, Subcommand};
use clap_complete::Shell;
use filing_intel::commands;
use filing_intel::config;
use filing_intel::parse::DocFormat;
use filing_intel::pipeline::ProcessRequest;
use filing_intel_core::models::InsightFilter;
use tracing_subscriber::EnvFilter;

/// Filing Intel: retrieval-augmented insight extraction for financial filings.
///
/// All commands except `completions` and `monitor drift` read a TOML
/// configuration file given by `--config`.
#[derive(Parser)]
#[command(
    name = "fin",
    about = "Filing Intel: retrieval-augmented insight extraction for financial filings",
    version,
    long_about = "Filing Intel acquires financial filings (PDF, HTML, text) from URLs or local \
    paths, segments and indexes them, extracts metrics, sentiment, risks and summaries with a \
    language model, stores the results and logs every prediction for evaluation and drift checks."
)]
struct Cli {
    /// Path to configuration file (TOML).
    ///
    /// Defaults to `./config/fin.toml`. Only `[db]` is required.
    #[arg(long, global = true, default_value = "./config/fin.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Commands,
}

/// Options shared by the commands that run a source through the pipeline.
#[derive(clap::Args)]
struct SourceArgs {
    /// URL (`http://`, `https://`) or local file path.
    source: String,

    /// Filing type recorded on the document (e.g. `10-K`, `10-Q`).
    #[arg(long, default_value = "10-K")]
    doc_type: String,

    /// Override the detected format: `pdf`, `html` or `text`.
    #[arg(long)]
    format: Option<DocFormat>,
}

impl SourceArgs {
    fn into_request(self, queries: Vec<String>) -> ProcessRequest {
        ProcessRequest {
            format: self.format,
            queries: non_empty(queries),
            ..ProcessRequest::new(self.source, self.doc_type)
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database schema and log directory. Idempotent.
    Init,

    /// Acquire, parse, normalize and segment a filing, then store the
    /// document and its segments. No language-model calls.
    Ingest {
        #[command(flatten)]
        source: SourceArgs,
    },

    /// Run the full pipeline for one filing and store its insights.
    Process {
        #[command(flatten)]
        source: SourceArgs,

        /// Analysis query (repeatable). Defaults to `analysis.default_queries`.
        #[arg(long = "query")]
        queries: Vec<String>,
    },

    /// Process every file under a directory matching the acquisition globs.
    ///
    /// Runs are sequential; a failed run does not stop the batch.
    Batch {
        /// Directory to scan.
        dir: PathBuf,

        #[arg(long, default_value = "10-K")]
        doc_type: String,

        #[arg(long = "query")]
        queries: Vec<String>,
    },

    /// Analyze a stored document (from `fin ingest`) and store its insights.
    Analyze {
        /// Document id.
        id: String,

        #[arg(long = "query")]
        queries: Vec<String>,
    },

    /// Analyze a UTF-8 text file. Nothing is stored or logged.
    AnalyzeText {
        /// Path to the text file.
        file: PathBuf,

        #[arg(long, default_value = "10-K")]
        doc_type: String,

        /// Company name; detected from the text when omitted.
        #[arg(long)]
        company: Option<String>,

        #[arg(long = "query")]
        queries: Vec<String>,
    },

    /// List stored documents, oldest first.
    Documents,

    /// Show a stored document and its segments as JSON.
    Get {
        /// Document id.
        id: String,
    },

    /// Query stored insights. Filters combine with AND.
    Insights {
        /// Exact metric name (e.g. `Total Revenue`, `sentiment`).
        #[arg(long)]
        metric: Option<String>,

        /// Timestamp prefix, e.g. `2024-03` or `2024-03-31`.
        #[arg(long)]
        date: Option<String>,

        #[arg(long)]
        company: Option<String>,

        #[arg(long)]
        document: Option<String>,
    },

    /// Log human corrections or feedback for a document.
    Feedback {
        #[command(subcommand)]
        action: FeedbackAction,
    },

    /// Evaluate logged predictions and check for drift.
    Monitor {
        #[command(subcommand)]
        action: MonitorAction,
    },

    /// Print a shell completion script to stdout.
    Completions {
        shell: Shell,
    },
}

#[derive(Subcommand)]
enum FeedbackAction {
    /// Log corrected values. Keys are metric names or `sentiment`,
    /// `risks`, `summary`.
    Correct {
        /// Document id.
        id: String,

        /// Corrected value as `KEY=VALUE` (repeatable). Values that parse as
        /// JSON keep their type.
        #[arg(long = "set", value_parser = parse_key_val)]
        values: Vec<(String, String)>,
    },

    /// Log a rating and/or comment.
    Comment {
        /// Document id.
        id: String,

        /// Rating from 1 to 5.
        #[arg(long, value_parser = clap::value_parser!(u8).range(1..=5))]
        rating: Option<u8>,

        #[arg(long, default_value = "")]
        comment: String,
    },
}

#[derive(Subcommand)]
enum MonitorAction {
    /// Score the latest prediction of every corrected document.
    Evaluate,

    /// Compare two feature distributions (`{"feature": [values]}` JSON files).
    Drift {
        #[arg(long)]
        current: PathBuf,

        #[arg(long)]
        baseline: PathBuf,
    },

    /// Compare logged predictions before and after a date.
    DriftLogs {
        /// Split point as an RFC 3339 prefix, e.g. `2024-06-01`.
        #[arg(long)]
        split: String,
    },
}

/// Parse a `key=value` pair for `--set` arguments.
fn parse_key_val(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("invalid KEY=VALUE: no '=' found in '{}'", s))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn non_empty(queries: Vec<String>) -> Option<Vec<String>> {
    if queries.is_empty() {
        None
    } else {
        Some(queries)
    }
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing();

    // Commands that don't require config
    match &cli.command {
        Commands::Completions { shell } => {
            clap_complete::generate(*shell, &mut Cli::command(), "fin", &mut std::io::stdout());
            return Ok(());
        }
        Commands::Monitor {
            action: MonitorAction::Drift { current, baseline },
        } => {
            return commands::run_monitor_drift(current, baseline);
        }
        _ => {}
    }

    let cfg = config::load_config(&cli.config)?;

    match cli.command {
        Commands::Init => commands::run_init(&cfg).await?,
        Commands::Ingest { source } => {
            commands::run_ingest(&cfg, source.into_request(Vec::new())).await?
        }
        Commands::Process { source, queries } => {
            commands::run_process(&cfg, source.into_request(queries)).await?
        }
        Commands::Batch {
            dir,
            doc_type,
            queries,
        } => commands::run_batch(&cfg, &dir, &doc_type, non_empty(queries)).await?,
        Commands::Analyze { id, queries } => {
            commands::run_analyze(&cfg, &id, non_empty(queries)).await?
        }
        Commands::AnalyzeText {
            file,
            doc_type,
            company,
            queries,
        } => {
            commands::run_analyze_text(&cfg, &file, &doc_type, company, non_empty(queries))
                .await?
        }
        Commands::Documents => commands::run_documents(&cfg).await?,
        Commands::Get { id } => commands::run_get(&cfg, &id).await?,
        Commands::Insights {
            metric,
            date,
            company,
            document,
        } => {
            let filter = InsightFilter {
                metric_name: metric,
                date,
                company,
                document_id: document,
            };
            commands::run_insights(&cfg, filter).await?
        }
        Commands::Feedback { action } => match action {
            FeedbackAction::Correct { id, values } => {
                commands::run_feedback_correct(&cfg, &id, values)?
            }
            FeedbackAction::Comment {
                id,
                rating,
                comment,
            } => commands::run_feedback_comment(&cfg, &id, rating, comment)?,
        },
        Commands::Monitor { action } => match action {
            MonitorAction::Evaluate => commands::run_monitor_evaluate(&cfg)?,
            MonitorAction::DriftLogs { split } => commands::run_monitor_drift_logs(&cfg, &split)?,
            MonitorAction::Drift { .. } => {
                // Handled above (before config loading)
                unreachable!()
            }
        },
        Commands::Completions { .. } => {
            // Handled above (before config loading)
            unreachable!()
        }
    }

    Ok(())
}
