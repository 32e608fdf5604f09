//! PMX Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared types, logging and error handling for the PMX workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`PmxError`] and the [`Result`] alias
//! - **Logging**: tracing subscriber setup with daily file rotation
//! - **Types**: the published document shape and reference mapping rows
//!
//! # Example
//!
//! ```no_run
//! use pmx_common::logging::{init_logging, LogConfig};
//! use tracing::info;
//!
//! fn main() -> anyhow::Result<()> {
//!     let _guard = init_logging(&LogConfig::from_env()?)?;
//!     info!("pipeline starting");
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod logging;
pub mod types;

// Re-export commonly used types
pub use error::{PmxError, Result};
pub use types::{DocumentData, MappingRow, MetricValue, OutputDocument, UNKNOWN};
