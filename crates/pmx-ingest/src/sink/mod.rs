//! Publishing sink
//!
//! Producers hand finished documents to a [`Publisher`]; a single
//! [`Forwarder`] drains the queue, assigns id and index and passes each item
//! to the [`BulkIndexer`].

pub mod bulk;
pub mod identity;

pub use bulk::{BulkIndexer, BulkItem, BulkSettings, BulkStats, ElasticsearchBulkIndexer};
pub use identity::{document_id, index_name};

use chrono::{FixedOffset, Utc};
use pmx_common::OutputDocument;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{error, info};

use crate::error::{IngestError, Result};

/// Cloneable intake of the publish queue
#[derive(Debug, Clone)]
pub struct Publisher {
    sender: mpsc::Sender<OutputDocument>,
}

impl Publisher {
    /// A publisher and the receiving end for its forwarder
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<OutputDocument>) {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        (Self { sender }, receiver)
    }

    /// Enqueue a document, waiting while the queue is full.
    pub async fn submit(&self, doc: OutputDocument) -> Result<()> {
        self.sender
            .send(doc)
            .await
            .map_err(|_| IngestError::QueueClosed("document"))
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ForwardStats {
    pub forwarded: u64,
    pub dropped: u64,
}

pub struct Forwarder {
    index_base: String,
    offset: FixedOffset,
    indexer: Arc<dyn BulkIndexer>,
}

impl Forwarder {
    /// `offset` picks the calendar day used when a document lacks a usable date
    pub fn new(index_base: impl Into<String>, offset: FixedOffset, indexer: Arc<dyn BulkIndexer>) -> Self {
        Self {
            index_base: index_base.into(),
            offset,
            indexer,
        }
    }

    pub fn spawn(self, documents: mpsc::Receiver<OutputDocument>) -> JoinHandle<ForwardStats> {
        tokio::spawn(self.run(documents))
    }

    /// Drain until every [`Publisher`] is dropped.
    pub async fn run(self, mut documents: mpsc::Receiver<OutputDocument>) -> ForwardStats {
        let mut stats = ForwardStats::default();
        while let Some(doc) = documents.recv().await {
            if self.forward(&doc).await {
                stats.forwarded += 1;
            } else {
                stats.dropped += 1;
            }
        }
        info!(
            forwarded = %stats.forwarded,
            dropped = %stats.dropped,
            "Publish queue drained"
        );
        stats
    }

    async fn forward(&self, doc: &OutputDocument) -> bool {
        let body = match doc.to_json() {
            Ok(body) => body,
            Err(e) => {
                error!(ru_param = %doc.ru_param, field = %doc.data.field, error = %e, "Skipping unserializable document");
                return false;
            }
        };

        let today = Utc::now().with_timezone(&self.offset).date_naive();
        let item = BulkItem {
            index: index_name(&self.index_base, &doc.meas_date, today),
            id: document_id(doc),
            body,
        };
        let (id, index) = (item.id.clone(), item.index.clone());

        match self.indexer.add(item).await {
            Ok(()) => true,
            Err(e) => {
                error!(id = %id, index = %index, error = %e, "Dropping document, bulk submission failed");
                false
            }
        }
    }
}
