//! Elasticsearch `_bulk` client
//!
//! Items are appended to an NDJSON buffer that is flushed once it reaches
//! `flush_bytes` or on every `flush_interval` tick. Request bodies are
//! gzip-compressed. Transient statuses are retried with linear backoff; item
//! level rejections are only logged.

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;
use reqwest::header::{CONTENT_ENCODING, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::config::ElasticsearchConfig;
use crate::error::{IngestError, Result};

// ============================================================================
// Bulk Client Constants
// ============================================================================

/// Statuses answered by retrying the whole request
pub const RETRY_STATUSES: [u16; 4] = [429, 502, 503, 504];

/// Backoff unit; attempt `n` waits `n * RETRY_BACKOFF`
pub const RETRY_BACKOFF: Duration = Duration::from_millis(500);

const REQUEST_TIMEOUT: Duration = Duration::from_secs(60);

/// One index action
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkItem {
    pub index: String,
    pub id: String,
    pub body: Vec<u8>,
}

/// Item outcome counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkStats {
    pub added: u64,
    pub indexed: u64,
    pub failed: u64,
    pub requests: u64,
}

#[async_trait]
pub trait BulkIndexer: Send + Sync {
    /// Queue an item; errors mean the item was not accepted
    async fn add(&self, item: BulkItem) -> Result<()>;

    /// Flush what is buffered and stop accepting items
    async fn close(&self) -> Result<BulkStats>;

    fn stats(&self) -> BulkStats;
}

#[derive(Debug, Clone)]
pub struct BulkSettings {
    pub host: String,
    pub username: Option<String>,
    pub password: Option<String>,
    pub flush_bytes: usize,
    pub flush_interval: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
}

impl From<&ElasticsearchConfig> for BulkSettings {
    fn from(config: &ElasticsearchConfig) -> Self {
        Self {
            host: config.host.clone(),
            username: config.username.clone().filter(|u| !u.is_empty()),
            password: config.password.clone(),
            flush_bytes: config.flush_bytes,
            flush_interval: config.flush_interval(),
            max_retries: config.max_retries,
            retry_backoff: RETRY_BACKOFF,
        }
    }
}

#[derive(Debug, Default)]
struct Pending {
    body: Vec<u8>,
    items: usize,
}

#[derive(Debug, Deserialize)]
struct BulkResponse {
    #[serde(default)]
    items: Vec<HashMap<String, BulkItemResult>>,
}

#[derive(Debug, Deserialize)]
struct BulkItemResult {
    #[serde(rename = "_index", default)]
    index: String,
    #[serde(rename = "_id", default)]
    id: String,
    status: u16,
    #[serde(default)]
    error: Option<BulkItemError>,
}

#[derive(Debug, Deserialize)]
struct BulkItemError {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    reason: String,
}

struct Shared {
    client: Client,
    url: String,
    settings: BulkSettings,
    pending: Mutex<Pending>,
    closed: AtomicBool,
    added: AtomicU64,
    indexed: AtomicU64,
    failed: AtomicU64,
    requests: AtomicU64,
}

pub struct ElasticsearchBulkIndexer {
    shared: Arc<Shared>,
    ticker: std::sync::Mutex<Option<JoinHandle<()>>>,
    stop: CancellationToken,
}

impl ElasticsearchBulkIndexer {
    /// Build the client and start the interval flusher.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(settings: BulkSettings) -> Result<Self> {
        let client = Client::builder().timeout(REQUEST_TIMEOUT).build()?;
        let url = format!("{}/_bulk", settings.host.trim_end_matches('/'));

        let shared = Arc::new(Shared {
            client,
            url,
            settings,
            pending: Mutex::new(Pending::default()),
            closed: AtomicBool::new(false),
            added: AtomicU64::new(0),
            indexed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            requests: AtomicU64::new(0),
        });

        let stop = CancellationToken::new();
        let ticker = tokio::spawn(flush_periodically(shared.clone(), stop.clone()));

        Ok(Self {
            shared,
            ticker: std::sync::Mutex::new(Some(ticker)),
            stop,
        })
    }

    /// Check that the cluster answers at `host`
    pub async fn ping(&self) -> Result<()> {
        let mut request = self.shared.client.get(&self.shared.settings.host);
        if let Some(username) = &self.shared.settings.username {
            request = request.basic_auth(username, self.shared.settings.password.as_ref());
        }
        request.send().await?.error_for_status()?;
        Ok(())
    }
}

#[async_trait]
impl BulkIndexer for ElasticsearchBulkIndexer {
    async fn add(&self, item: BulkItem) -> Result<()> {
        if self.shared.closed.load(Ordering::Acquire) {
            return Err(IngestError::Index("bulk indexer is closed".to_string()));
        }

        let action = serde_json::json!({
            "index": { "_index": item.index, "_id": item.id }
        });
        let action = serde_json::to_vec(&action).map_err(pmx_common::PmxError::from)?;

        let full = {
            let mut pending = self.shared.pending.lock().await;
            pending.body.extend_from_slice(&action);
            pending.body.push(b'\n');
            pending.body.extend_from_slice(&item.body);
            pending.body.push(b'\n');
            pending.items += 1;

            if pending.body.len() >= self.shared.settings.flush_bytes {
                Some(std::mem::take(&mut *pending))
            } else {
                None
            }
        };
        self.shared.added.fetch_add(1, Ordering::Relaxed);

        if let Some(batch) = full {
            self.shared.flush(batch).await;
        }
        Ok(())
    }

    async fn close(&self) -> Result<BulkStats> {
        self.shared.closed.store(true, Ordering::Release);
        self.stop.cancel();

        let ticker = self.ticker.lock().ok().and_then(|mut guard| guard.take());
        if let Some(ticker) = ticker {
            if let Err(e) = ticker.await {
                warn!(error = %e, "Bulk flush ticker ended abnormally");
            }
        }

        let batch = std::mem::take(&mut *self.shared.pending.lock().await);
        self.shared.flush(batch).await;

        let stats = self.stats();
        info!(
            indexed = stats.indexed,
            failed = stats.failed,
            requests = stats.requests,
            "Bulk indexer closed"
        );
        Ok(stats)
    }

    fn stats(&self) -> BulkStats {
        BulkStats {
            added: self.shared.added.load(Ordering::Relaxed),
            indexed: self.shared.indexed.load(Ordering::Relaxed),
            failed: self.shared.failed.load(Ordering::Relaxed),
            requests: self.shared.requests.load(Ordering::Relaxed),
        }
    }
}

async fn flush_periodically(shared: Arc<Shared>, stop: CancellationToken) {
    let mut ticker = tokio::time::interval(shared.settings.flush_interval);
    ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
    ticker.tick().await;

    loop {
        tokio::select! {
            _ = stop.cancelled() => break,
            _ = ticker.tick() => {
                let batch = std::mem::take(&mut *shared.pending.lock().await);
                shared.flush(batch).await;
            }
        }
    }
}

impl Shared {
    /// Send one batch; failures are accounted to its items, never returned.
    async fn flush(&self, batch: Pending) {
        if batch.items == 0 {
            return;
        }
        let items = batch.items as u64;

        match self.send(batch.body).await {
            Ok(response) => self.record(response, items),
            Err(e) => {
                error!(items, error = %e, "Bulk request failed");
                self.failed.fetch_add(items, Ordering::Relaxed);
            }
        }
    }

    async fn send(&self, ndjson: Vec<u8>) -> Result<BulkResponse> {
        let body = gzip(&ndjson)?;
        let mut attempt: u32 = 0;

        loop {
            let mut request = self
                .client
                .post(&self.url)
                .header(CONTENT_TYPE, "application/x-ndjson")
                .header(CONTENT_ENCODING, "gzip")
                .body(body.clone());
            if let Some(username) = &self.settings.username {
                request = request.basic_auth(username, self.settings.password.as_ref());
            }

            self.requests.fetch_add(1, Ordering::Relaxed);
            let retry_reason = match request.send().await {
                Ok(response) if is_retryable(response.status()) => {
                    format!("status {}", response.status())
                }
                Ok(response) => {
                    let response = response.error_for_status()?;
                    return Ok(response.json::<BulkResponse>().await?);
                }
                Err(e) if attempt < self.settings.max_retries => e.to_string(),
                Err(e) => return Err(e.into()),
            };

            if attempt >= self.settings.max_retries {
                return Err(IngestError::Index(format!(
                    "bulk request gave up after {} retries: {retry_reason}",
                    attempt
                )));
            }
            attempt += 1;
            let backoff = self.settings.retry_backoff * attempt;
            warn!(attempt, reason = %retry_reason, backoff_ms = backoff.as_millis() as u64, "Retrying bulk request");
            tokio::time::sleep(backoff).await;
        }
    }

    fn record(&self, response: BulkResponse, items: u64) {
        let mut indexed = 0u64;
        let mut failed = 0u64;

        for result in response.items.iter().flat_map(|item| item.values()) {
            if let Some(err) = &result.error {
                error!(
                    id = %result.id,
                    index = %result.index,
                    status = result.status,
                    error_type = %err.kind,
                    reason = %err.reason,
                    "Bulk item rejected"
                );
                failed += 1;
                continue;
            }
            if result.status > 201 {
                info!(id = %result.id, index = %result.index, status = result.status, "Bulk item partial success");
            }
            indexed += 1;
        }

        let unreported = items.saturating_sub(indexed + failed);
        if unreported > 0 {
            warn!(unreported, "Bulk response did not report every item");
            failed += unreported;
        }
        debug!(indexed, failed, "Bulk batch flushed");
        self.indexed.fetch_add(indexed, Ordering::Relaxed);
        self.failed.fetch_add(failed, Ordering::Relaxed);
    }
}

fn is_retryable(status: StatusCode) -> bool {
    RETRY_STATUSES.contains(&status.as_u16())
}

fn gzip(data: &[u8]) -> Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::with_capacity(data.len() / 4), Compression::default());
    encoder
        .write_all(data)
        .map_err(|e| IngestError::Index(format!("gzip failed: {e}")))?;
    encoder
        .finish()
        .map_err(|e| IngestError::Index(format!("gzip failed: {e}")))
}
