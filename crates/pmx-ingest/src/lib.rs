//! PMX Ingest Library
//!
//! Continuous ingestion of radio-network PM exports: a watched directory of
//! XML files becomes enriched KPI documents in a search index.
//!
//! # Modules
//!
//! - **admission**: directory watcher, write-completion check, worker pool
//! - **transform**: streaming XML reader and the KPI family registry
//! - **enrich**: radio-unit mapping snapshot backed by SQLite
//! - **sink**: publish queue and the `_bulk` client
//! - **pipeline**: per-file processing and service wiring
//!
//! # Example
//!
//! ```no_run
//! use pmx_ingest::transform::TransformEngine;
//!
//! fn main() -> anyhow::Result<()> {
//!     let parsed = TransformEngine::default()
//!         .extract_file(std::path::Path::new("./A20240102.1200+0900-1215+0900.xml"))?;
//!     let offset = chrono::FixedOffset::east_opt(9 * 3600).expect("valid offset");
//!     let batch = parsed.assemble(15, chrono::Utc::now().with_timezone(&offset))?;
//!     println!("{} samples", batch.samples.len());
//!     Ok(())
//! }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod admission;
pub mod config;
pub mod enrich;
pub mod error;
pub mod model;
pub mod pipeline;
pub mod sink;
pub mod transform;

pub use config::IngestConfig;
pub use error::{IngestError, Result};
