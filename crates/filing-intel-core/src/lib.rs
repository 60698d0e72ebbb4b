//! # Filing Intel Core
//!
//! Runtime-independent logic for Filing Intel: the document data model,
//! text normalization, segmentation and chunking, metadata extraction,
//! the retrieval index, insight extractors, the [`store::DocumentStore`]
//! abstraction, and the accuracy and drift statistics used for monitoring.
//!
//! This crate contains no tokio, sqlx, filesystem, or network code. Every
//! external collaborator (embedding service, language model, persistence
//! backend) is reached through a trait that the application crate
//! implements.

pub mod chunk;
pub mod drift;
pub mod embedding;
pub mod error;
pub mod insight;
pub mod llm;
pub mod metadata;
pub mod metrics;
pub mod models;
pub mod normalize;
pub mod query;
pub mod retrieval;
pub mod segment;
pub mod store;
