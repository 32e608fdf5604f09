//! Configuration management
//!
//! Settings come from a YAML file (`-c/--config`) with environment
//! overrides prefixed `PMX_` using `__` between sections, e.g.
//! `PMX_ELASTICSEARCH__HOST` or `PMX_WORKER__OPEN_FILE_WORKER_COUNT`.
//! Everything is read once at startup and treated as immutable.

use chrono::FixedOffset;
use config::{Environment, File, FileFormat};
use pmx_common::logging::{LogConfig, LogFormat, LogLevel, LogOutput};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::Result;

// ============================================================================
// Defaults
// ============================================================================

/// Collection period, in minutes, that only carries power consumption.
pub const HOURLY_COLLECTION_PERIOD: u32 = 60;

pub const DEFAULT_EXTENSION: &str = ".xml";
pub const DEFAULT_QUEUE_CAPACITY: usize = 50_000;
pub const DEFAULT_FLUSH_BYTES: usize = 5 << 20;
pub const DEFAULT_FLUSH_INTERVAL_SECS: u64 = 5;
pub const DEFAULT_MAX_RETRIES: u32 = 5;
pub const DEFAULT_REFRESH_INTERVAL_SECS: u64 = 6 * 60 * 60;
pub const DEFAULT_BUSY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_TIMEZONE_OFFSET_HOURS: i32 = 9;

/// Root process configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestConfig {
    pub elasticsearch: ElasticsearchConfig,
    pub file_dir: FileDirConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default)]
    pub worker: WorkerConfig,
    #[serde(default)]
    pub stability: StabilityConfig,
    #[serde(default)]
    pub enrichment: EnrichmentConfig,
    /// Offset of the wall clock used for `collectDate`
    #[serde(default = "default_timezone_offset_hours")]
    pub timezone_offset_hours: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ElasticsearchConfig {
    pub host: String,
    #[serde(default)]
    pub username: Option<String>,
    #[serde(default)]
    pub password: Option<String>,
    /// Base index name; a `-YYYY.MM.DD` suffix is appended per document
    pub index_name: String,
    #[serde(default = "default_flush_bytes")]
    pub flush_bytes: usize,
    #[serde(default = "default_flush_interval_secs")]
    pub flush_interval_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileDirConfig {
    /// Directory watched for new exports
    pub scan_dir: PathBuf,
    /// SQLite file holding the `ru_mapping` table
    #[serde(alias = "sqlite_dir")]
    pub sqlite_path: PathBuf,
    /// Case-insensitive suffix a created file must carry
    #[serde(default = "default_extension")]
    pub extension: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_prefix")]
    pub log_prefix: String,
    #[serde(default)]
    pub retention_days: Option<usize>,
    /// Level name, matched case-insensitively (`DEBUG`, `info`, ...)
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_dir")]
    pub log_dir: PathBuf,
    #[serde(default)]
    pub output: LogOutput,
    #[serde(default)]
    pub format: LogFormat,
    /// Export period in minutes (5, 15 or 60)
    #[serde(default = "default_collection_period")]
    pub collection_period: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerConfig {
    #[serde(default = "default_worker_count")]
    pub open_file_worker_count: usize,
    #[serde(default = "default_queue_capacity")]
    pub task_queue_capacity: usize,
    #[serde(default = "default_queue_capacity")]
    pub document_queue_capacity: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilityConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_quiet_period_ms")]
    pub quiet_period_ms: u64,
    #[serde(default = "default_stability_timeout_secs")]
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EnrichmentConfig {
    #[serde(default = "default_refresh_interval_secs")]
    pub refresh_interval_secs: u64,
    #[serde(default = "default_busy_timeout_ms")]
    pub busy_timeout_ms: u64,
}

fn default_timezone_offset_hours() -> i32 {
    DEFAULT_TIMEZONE_OFFSET_HOURS
}

fn default_flush_bytes() -> usize {
    DEFAULT_FLUSH_BYTES
}

fn default_flush_interval_secs() -> u64 {
    DEFAULT_FLUSH_INTERVAL_SECS
}

fn default_max_retries() -> u32 {
    DEFAULT_MAX_RETRIES
}

fn default_extension() -> String {
    DEFAULT_EXTENSION.to_string()
}

fn default_log_prefix() -> String {
    "pmx-ingest".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_dir() -> PathBuf {
    PathBuf::from("./logs")
}

fn default_collection_period() -> u32 {
    15
}

fn default_worker_count() -> usize {
    4
}

fn default_queue_capacity() -> usize {
    DEFAULT_QUEUE_CAPACITY
}

fn default_poll_interval_ms() -> u64 {
    1_000
}

fn default_quiet_period_ms() -> u64 {
    2_000
}

fn default_stability_timeout_secs() -> u64 {
    20
}

fn default_refresh_interval_secs() -> u64 {
    DEFAULT_REFRESH_INTERVAL_SECS
}

fn default_busy_timeout_ms() -> u64 {
    DEFAULT_BUSY_TIMEOUT_MS
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_prefix: default_log_prefix(),
            retention_days: None,
            log_level: default_log_level(),
            log_dir: default_log_dir(),
            output: LogOutput::default(),
            format: LogFormat::default(),
            collection_period: default_collection_period(),
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            open_file_worker_count: default_worker_count(),
            task_queue_capacity: default_queue_capacity(),
            document_queue_capacity: default_queue_capacity(),
        }
    }
}

impl Default for StabilityConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            quiet_period_ms: default_quiet_period_ms(),
            timeout_secs: default_stability_timeout_secs(),
        }
    }
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: default_refresh_interval_secs(),
            busy_timeout_ms: default_busy_timeout_ms(),
        }
    }
}

impl IngestConfig {
    /// Load from a YAML file plus `PMX_*` environment overrides
    pub fn load(path: &Path) -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_source(File::from(path).format(FileFormat::Yaml))
    }

    /// Load from YAML text plus environment overrides
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        Self::from_source(File::from_str(yaml, FileFormat::Yaml))
    }

    fn from_source<S>(source: S) -> Result<Self>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let settings = config::Config::builder()
            .add_source(source)
            .add_source(
                Environment::with_prefix("PMX")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: IngestConfig = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.elasticsearch.host.trim().is_empty() {
            return Err(invalid("elasticsearch.host cannot be empty"));
        }
        if self.elasticsearch.index_name.trim().is_empty() {
            return Err(invalid("elasticsearch.index_name cannot be empty"));
        }
        if self.file_dir.scan_dir.as_os_str().is_empty() {
            return Err(invalid("file_dir.scan_dir cannot be empty"));
        }
        if self.logging.collection_period == 0 {
            return Err(invalid("logging.collection_period must be greater than 0"));
        }
        if !(-23..=23).contains(&self.timezone_offset_hours) {
            return Err(invalid("timezone_offset_hours must be within -23..=23"));
        }
        if self.stability.poll_interval_ms == 0 {
            return Err(invalid("stability.poll_interval_ms must be greater than 0"));
        }
        if self.stability.timeout_secs == 0 {
            return Err(invalid("stability.timeout_secs must be greater than 0"));
        }
        if self.elasticsearch.flush_interval_secs == 0 {
            return Err(invalid("elasticsearch.flush_interval_secs must be greater than 0"));
        }
        if self.enrichment.refresh_interval_secs == 0 {
            return Err(invalid("enrichment.refresh_interval_secs must be greater than 0"));
        }
        if self.logging.log_level.parse::<LogLevel>().is_err() {
            return Err(invalid("logging.log_level is not a known level"));
        }
        if self.worker.open_file_worker_count == 0 {
            tracing::warn!("worker.open_file_worker_count is 0, running with a single worker");
        }
        Ok(())
    }

    /// Number of files processed concurrently, never less than one
    pub fn worker_count(&self) -> usize {
        self.worker.open_file_worker_count.max(1)
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.enrichment.refresh_interval_secs)
    }

    /// Offset of the wall clock stamped into `collectDate`
    pub fn local_offset(&self) -> Result<FixedOffset> {
        FixedOffset::east_opt(self.timezone_offset_hours * 3600)
            .ok_or_else(|| invalid("timezone_offset_hours is out of range"))
    }

    /// Tracing setup derived from the `logging` section.
    ///
    /// Files are named `<prefix>_<period>.<date>.log` so deployments running
    /// several collection periods side by side keep separate logs.
    pub fn log_config(&self) -> Result<LogConfig> {
        let logging = &self.logging;
        let level: LogLevel = logging
            .log_level
            .parse()
            .map_err(|e: anyhow::Error| invalid(&e.to_string()))?;
        let mut builder = LogConfig::builder()
            .level(level)
            .output(logging.output)
            .format(logging.format)
            .log_dir(logging.log_dir.clone())
            .log_file_prefix(format!("{}_{}", logging.log_prefix, logging.collection_period));
        if let Some(days) = logging.retention_days {
            builder = builder.max_log_files(days);
        }
        Ok(builder.build())
    }
}

impl StabilityConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn quiet_period(&self) -> Duration {
        Duration::from_millis(self.quiet_period_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl ElasticsearchConfig {
    pub fn flush_interval(&self) -> Duration {
        Duration::from_secs(self.flush_interval_secs)
    }
}

fn invalid(message: &str) -> crate::error::IngestError {
    pmx_common::PmxError::Config(message.to_string()).into()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"
elasticsearch:
  host: http://localhost:9200
  index_name: ru-kpi
file_dir:
  scan_dir: /data/pm
  sqlite_dir: /data/ru_mapping.db
"#;

    #[test]
    fn test_defaults_applied() {
        let config = IngestConfig::from_yaml_str(MINIMAL).unwrap();

        assert_eq!(config.file_dir.sqlite_path, PathBuf::from("/data/ru_mapping.db"));
        assert_eq!(config.file_dir.extension, ".xml");
        assert_eq!(config.worker.document_queue_capacity, 50_000);
        assert_eq!(config.stability.quiet_period(), Duration::from_secs(2));
        assert_eq!(config.stability.timeout(), Duration::from_secs(20));
        assert_eq!(config.refresh_interval(), Duration::from_secs(21_600));
        assert_eq!(config.elasticsearch.flush_bytes, 5 * 1024 * 1024);
        assert_eq!(config.timezone_offset_hours, 9);
        assert_eq!(config.local_offset().unwrap().local_minus_utc(), 9 * 3600);
    }

    #[test]
    fn test_worker_count_floor() {
        let yaml = format!("{MINIMAL}worker:\n  open_file_worker_count: 0\n");
        let config = IngestConfig::from_yaml_str(&yaml).unwrap();
        assert_eq!(config.worker_count(), 1);
    }

    #[test]
    fn test_log_file_prefix_includes_period() {
        let yaml = format!(
            "{MINIMAL}logging:\n  log_prefix: lsm\n  log_level: DEBUG\n  collection_period: 60\n  retention_days: 14\n"
        );
        let config = IngestConfig::from_yaml_str(&yaml).unwrap();
        let log = config.log_config().unwrap();

        assert_eq!(log.log_file_prefix, "lsm_60");
        assert_eq!(log.level, LogLevel::Debug);
        assert_eq!(log.max_log_files, Some(14));
    }

    #[test]
    fn test_environment_overrides_yaml() {
        std::env::set_var("PMX_ENRICHMENT__BUSY_TIMEOUT_MS", "1234");
        let config = IngestConfig::from_yaml_str(MINIMAL).unwrap();
        std::env::remove_var("PMX_ENRICHMENT__BUSY_TIMEOUT_MS");

        assert_eq!(config.enrichment.busy_timeout_ms, 1234);
    }

    #[test]
    fn test_example_config_parses() {
        let config =
            IngestConfig::from_yaml_str(include_str!("../../../config.example.yml")).unwrap();

        assert_eq!(config.elasticsearch.username.as_deref(), Some("elastic"));
        assert_eq!(config.logging.collection_period, 15);
        assert_eq!(config.worker_count(), 4);
    }

    #[test]
    fn test_rejects_empty_host() {
        let yaml = MINIMAL.replace("http://localhost:9200", "\"\"");
        assert!(IngestConfig::from_yaml_str(&yaml).is_err());
    }

    #[test]
    fn test_rejects_zero_period() {
        let yaml = format!("{MINIMAL}logging:\n  collection_period: 0\n");
        assert!(IngestConfig::from_yaml_str(&yaml).is_err());
    }

    #[test]
    fn test_rejects_zero_intervals() {
        let refresh = format!("{MINIMAL}enrichment:\n  refresh_interval_secs: 0\n");
        let err = IngestConfig::from_yaml_str(&refresh).unwrap_err();
        assert!(err.to_string().contains("refresh_interval_secs"), "{err}");

        let flush = MINIMAL.replace(
            "  index_name: ru-kpi\n",
            "  index_name: ru-kpi\n  flush_interval_secs: 0\n",
        );
        let err = IngestConfig::from_yaml_str(&flush).unwrap_err();
        assert!(err.to_string().contains("flush_interval_secs"), "{err}");

        let timeout = format!("{MINIMAL}stability:\n  timeout_secs: 0\n");
        let err = IngestConfig::from_yaml_str(&timeout).unwrap_err();
        assert!(err.to_string().contains("timeout_secs"), "{err}");
    }
}
