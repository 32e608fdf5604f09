//! PMX Ingest - PM export ingestion service

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use pmx_common::logging::{init_logging, LogOutput};
use pmx_ingest::transform::TransformEngine;
use pmx_ingest::{pipeline, IngestConfig};
use std::io::Write;
use std::path::PathBuf;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(name = "pmx-ingest")]
#[command(author, version, about = "Radio PM export ingestion service")]
struct Cli {
    /// Path to the YAML configuration file
    #[arg(short, long, env = "PMX_CONFIG", default_value = "config.yml")]
    config: PathBuf,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Watch the scan directory and publish to the index (default)
    Run,

    /// Print the KPI samples of one export as JSON lines
    Inspect {
        /// Export file to read
        file: PathBuf,

        /// Collection period to gate families with, instead of the configured one
        #[arg(short, long)]
        period: Option<u32>,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = IngestConfig::load(&cli.config)
        .with_context(|| format!("Failed to load configuration from {}", cli.config.display()))?;
    let mut log_config = config.log_config()?.merge_env()?;

    match cli.command.unwrap_or(Command::Run) {
        Command::Run => {
            let _guard = init_logging(&log_config)?;
            info!(config = %cli.config.display(), "Starting pmx-ingest");

            let shutdown = CancellationToken::new();
            let signal = shutdown.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("Shutdown requested");
                }
                signal.cancel();
            });

            if let Err(e) = pipeline::run(config, shutdown).await {
                error!(error = %e, "Fatal startup error");
                return Err(e.into());
            }
        },
        Command::Inspect { file, period } => {
            // keep stdout for the samples
            log_config.output = LogOutput::File;
            let _guard = init_logging(&log_config)?;

            let period = period.unwrap_or(config.logging.collection_period);
            let batch = pipeline::extract_batch(
                &TransformEngine::default(),
                &file,
                period,
                config.local_offset()?,
            )
            .await?;

            let mut stdout = std::io::stdout().lock();
            for sample in &batch.samples {
                serde_json::to_writer(&mut stdout, sample)?;
                writeln!(stdout)?;
            }
            info!(file = %file.display(), samples = batch.samples.len(), "Inspection complete");
        },
    }

    Ok(())
}
