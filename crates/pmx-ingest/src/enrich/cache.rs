//! In-memory snapshot of the radio-unit mapping
//!
//! Readers load the current snapshot pointer and never block. A reload builds
//! a complete replacement off to the side and swaps it in with one store, so
//! a lookup sees either the old mapping or the new one, never a mix.

use arc_swap::ArcSwap;
use pmx_common::MappingRow;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use super::source::MappingSource;
use crate::error::Result;

/// Immutable mapping from `ru_param` to its rows
#[derive(Debug, Default)]
pub struct MappingSnapshot {
    rows: HashMap<String, Arc<[MappingRow]>>,
    row_count: usize,
}

impl MappingSnapshot {
    pub fn from_rows(rows: impl IntoIterator<Item = (String, MappingRow)>) -> Self {
        let mut grouped: HashMap<String, Vec<MappingRow>> = HashMap::new();
        let mut row_count = 0;
        for (key, row) in rows {
            grouped.entry(key).or_default().push(row);
            row_count += 1;
        }
        Self {
            rows: grouped
                .into_iter()
                .map(|(key, rows)| (key, Arc::from(rows)))
                .collect(),
            row_count,
        }
    }

    pub fn key_count(&self) -> usize {
        self.rows.len()
    }

    pub fn row_count(&self) -> usize {
        self.row_count
    }
}

#[derive(Debug, Default)]
pub struct EnrichmentCache {
    snapshot: ArcSwap<MappingSnapshot>,
}

impl EnrichmentCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the snapshot with a full reload from `source`.
    ///
    /// On error the current snapshot is left untouched.
    pub async fn load(&self, source: &dyn MappingSource) -> Result<()> {
        let rows = source.fetch_all().await?;
        let snapshot = MappingSnapshot::from_rows(rows);
        info!(
            keys = snapshot.key_count(),
            rows = snapshot.row_count(),
            "Loaded radio-unit mapping"
        );
        self.snapshot.store(Arc::new(snapshot));
        Ok(())
    }

    /// Rows for `key` in the current snapshot, in store order
    pub fn lookup(&self, key: &str) -> Option<Arc<[MappingRow]>> {
        self.snapshot.load().rows.get(key).cloned()
    }

    pub fn snapshot(&self) -> Arc<MappingSnapshot> {
        self.snapshot.load_full()
    }

    /// Reload from `source` every `every` until `shutdown` fires.
    ///
    /// The first reload happens one full period after the call; failures keep
    /// the previous snapshot.
    pub fn spawn_refresh(
        cache: Arc<Self>,
        source: Arc<dyn MappingSource>,
        every: Duration,
        shutdown: CancellationToken,
    ) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown.cancelled() => {
                        info!("Mapping refresh stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        if let Err(e) = cache.load(source.as_ref()).await {
                            error!(error = %e, "Mapping reload failed, keeping previous snapshot");
                        }
                    }
                }
            }
        })
    }
}
