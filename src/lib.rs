//! # Filing Intel
//!
//! Retrieval-augmented insight extraction for financial filings.
//!
//! A filing (PDF, HTML or plain text, from a URL or a local path) is
//! acquired, parsed, normalized and split into labeled segments. Its
//! chunks are embedded into a per-run retrieval index; each analysis query
//! retrieves context and is routed to a metric, risk or summary extractor
//! backed by a language model. Results are stored through a
//! [`DocumentStore`](filing_intel_core::store::DocumentStore) and every
//! run is appended to a prediction log that feeds evaluation and drift
//! monitoring.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────┐   ┌──────────────────────┐   ┌──────────────┐
//! │ acquire   │──▶│ parse → normalize →  │──▶│ index +      │
//! │ HTTP/file │   │ segment              │   │ extractors   │
//! └───────────┘   └──────────────────────┘   └──────┬───────┘
//!                                                   │
//!                          ┌────────────────────────┤
//!                          ▼                        ▼
//!                   ┌─────────────┐         ┌──────────────┐
//!                   │ SQLite      │         │ prediction   │
//!                   │ store       │         │ log, monitor │
//!                   └─────────────┘         └──────────────┘
//! ```
//!
//! Runtime-independent logic (segmentation, chunking, retrieval,
//! extractors, statistics) lives in the `filing-intel-core` crate.
//!
//! ## Modules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`config`] | TOML configuration parsing and validation |
//! | [`acquire`] | HTTP download, local files, directory scans |
//! | [`parse`] | PDF, HTML and text extraction |
//! | [`embedding`] | OpenAI, Ollama, hashing and local embedders |
//! | [`llm`] | OpenAI, Ollama and disabled language models |
//! | [`pipeline`] | Stage-by-stage run orchestration |
//! | [`sqlite_store`] | SQLite `DocumentStore` |
//! | [`feedback`] | Prediction, correction and feedback log |
//! | [`monitor`] | Evaluation and drift checks over the log |
//! | [`commands`] | CLI command handlers |
//! | [`db`] | Database connection |
//! | [`migrate`] | Schema migrations |

pub mod acquire;
pub mod commands;
pub mod config;
pub mod db;
pub mod embedding;
pub mod feedback;
pub mod llm;
pub mod migrate;
pub mod monitor;
pub mod parse;
pub mod pipeline;
pub mod sqlite_store;
