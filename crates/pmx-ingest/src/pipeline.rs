//! File pipeline and service wiring
//!
//! ```text
//! watcher -> task queue -> worker pool -> stability -> transform
//!         -> enrichment lookup -> publish queue -> forwarder -> _bulk
//! ```

use async_trait::async_trait;
use chrono::{FixedOffset, Utc};
use std::path::Path;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::admission::{DirectoryWatcher, FileProcessor, StabilityPolicy, WorkerPool};
use crate::config::IngestConfig;
use crate::enrich::{build_documents, EnrichmentCache, MappingSource, SqliteMappingSource};
use crate::error::{IngestError, Result};
use crate::model::FileTask;
use crate::sink::{BulkIndexer, BulkSettings, ElasticsearchBulkIndexer, Forwarder, Publisher};
use crate::transform::{FileBatch, TransformEngine};

/// Transform, enrich and publish one file at a time
pub struct FilePipeline {
    engine: TransformEngine,
    stability: StabilityPolicy,
    cache: Arc<EnrichmentCache>,
    publisher: Publisher,
    collection_period: u32,
    offset: FixedOffset,
}

impl FilePipeline {
    pub fn new(
        engine: TransformEngine,
        stability: StabilityPolicy,
        cache: Arc<EnrichmentCache>,
        publisher: Publisher,
        collection_period: u32,
        offset: FixedOffset,
    ) -> Self {
        Self {
            engine,
            stability,
            cache,
            publisher,
            collection_period,
            offset,
        }
    }

    /// Extract and assemble a file without publishing anything
    pub async fn extract(&self, path: &Path) -> Result<FileBatch> {
        extract_batch(&self.engine, path, self.collection_period, self.offset).await
    }

    /// Publish every document of a file that is already complete on disk.
    ///
    /// Nothing is published unless the whole file parsed, including its end time.
    pub async fn publish_file(&self, path: &Path) -> Result<usize> {
        let batch = self.extract(path).await?;

        let mut published = 0;
        for sample in &batch.samples {
            let rows = self.cache.lookup(&sample.ru_key);
            if rows.is_none() {
                debug!(ru_key = %sample.ru_key, "No mapping for radio unit");
            }
            for doc in build_documents(sample, &batch.context, rows.as_deref()) {
                self.publisher.submit(doc).await?;
                published += 1;
            }
        }
        Ok(published)
    }
}

#[async_trait]
impl FileProcessor for FilePipeline {
    async fn process(&self, task: FileTask) -> Result<usize> {
        let size = self.stability.wait_stable(&task.path).await?;
        debug!(
            path = %task.path.display(),
            size,
            waited_ms = (Utc::now() - task.detected_at).num_milliseconds(),
            "File admitted"
        );
        self.publish_file(&task.path).await
    }
}

/// Parse on the blocking pool, then assemble with the current wall clock.
pub async fn extract_batch(
    engine: &TransformEngine,
    path: &Path,
    collection_period: u32,
    offset: FixedOffset,
) -> Result<FileBatch> {
    let started = std::time::Instant::now();
    let engine = engine.clone();
    let owned = path.to_path_buf();
    let parsed = tokio::task::spawn_blocking(move || engine.extract_file(&owned))
        .await
        .map_err(|e| IngestError::TaskAborted {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })??;
    debug!(path = %path.display(), elapsed_ms = started.elapsed().as_millis() as u64, "File parsed");

    parsed.assemble(collection_period, Utc::now().with_timezone(&offset))
}

/// Run the ingestion service until `shutdown` is cancelled.
///
/// Fails only on startup: reference store, watch directory or index client.
pub async fn run(config: IngestConfig, shutdown: CancellationToken) -> Result<()> {
    let offset = config.local_offset()?;

    let source: Arc<dyn MappingSource> = Arc::new(
        SqliteMappingSource::connect(
            &config.file_dir.sqlite_path,
            std::time::Duration::from_millis(config.enrichment.busy_timeout_ms),
        )
        .await?,
    );
    let cache = Arc::new(EnrichmentCache::new());
    cache.load(source.as_ref()).await?;

    let indexer = Arc::new(ElasticsearchBulkIndexer::new(BulkSettings::from(
        &config.elasticsearch,
    ))?);
    indexer.ping().await?;
    info!(host = %config.elasticsearch.host, "Index cluster reachable");

    let (publisher, documents) = Publisher::channel(config.worker.document_queue_capacity);
    let forwarder = Forwarder::new(
        config.elasticsearch.index_name.clone(),
        offset,
        indexer.clone(),
    )
    .spawn(documents);

    let (tasks_tx, tasks_rx) = mpsc::channel(config.worker.task_queue_capacity.max(1));
    let watcher = DirectoryWatcher::start(
        &config.file_dir.scan_dir,
        &config.file_dir.extension,
        tasks_tx,
    )?;

    let refresh = EnrichmentCache::spawn_refresh(
        cache.clone(),
        source,
        config.refresh_interval(),
        shutdown.clone(),
    );

    let pipeline = Arc::new(FilePipeline::new(
        TransformEngine::default(),
        StabilityPolicy::from(&config.stability),
        cache,
        publisher,
        config.logging.collection_period,
        offset,
    ));

    info!(
        dir = %watcher.dir().display(),
        workers = config.worker_count(),
        collection_period = config.logging.collection_period,
        "Ingestion service started"
    );
    WorkerPool::new(config.worker_count())
        .run(tasks_rx, pipeline, shutdown)
        .await;

    drop(watcher);
    match forwarder.await {
        Ok(stats) => info!(forwarded = stats.forwarded, dropped = stats.dropped, "Forwarder stopped"),
        Err(e) => error!(error = %e, "Forwarder ended abnormally"),
    }
    if let Err(e) = indexer.close().await {
        error!(error = %e, "Final bulk flush failed");
    }
    if let Err(e) = refresh.await {
        error!(error = %e, "Mapping refresh ended abnormally");
    }

    info!("Ingestion service stopped");
    Ok(())
}
