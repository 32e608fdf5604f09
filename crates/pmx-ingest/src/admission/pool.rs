//! Fixed-size pool of file workers
//!
//! K workers share one bounded task queue; each worker owns a file from
//! admission to its last published document, so at most K files are in
//! flight. Every file runs in its own spawned task: an error or panic there
//! is logged at the task boundary and the worker moves on.

use async_trait::async_trait;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::error::{IngestError, Result};
use crate::model::FileTask;

/// End-to-end handling of a single file
#[async_trait]
pub trait FileProcessor: Send + Sync + 'static {
    /// Returns the number of documents published for the file
    async fn process(&self, task: FileTask) -> Result<usize>;
}

pub struct WorkerPool {
    workers: usize,
}

impl WorkerPool {
    pub fn new(workers: usize) -> Self {
        Self {
            workers: workers.max(1),
        }
    }

    pub fn workers(&self) -> usize {
        self.workers
    }

    /// Process tasks until the queue closes or `shutdown` fires.
    pub async fn run<P: FileProcessor>(
        &self,
        tasks: mpsc::Receiver<FileTask>,
        processor: Arc<P>,
        shutdown: CancellationToken,
    ) {
        let tasks = Arc::new(Mutex::new(tasks));
        let mut handles = Vec::with_capacity(self.workers);

        for worker_id in 0..self.workers {
            handles.push(tokio::spawn(worker_loop(
                worker_id,
                tasks.clone(),
                processor.clone(),
                shutdown.clone(),
            )));
        }
        info!(workers = self.workers, "Worker pool started");

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker exited abnormally");
            }
        }
        info!("Worker pool stopped");
    }
}

async fn worker_loop<P: FileProcessor>(
    worker_id: usize,
    tasks: Arc<Mutex<mpsc::Receiver<FileTask>>>,
    processor: Arc<P>,
    shutdown: CancellationToken,
) {
    loop {
        let next = tokio::select! {
            _ = shutdown.cancelled() => break,
            next = async { tasks.lock().await.recv().await } => next,
        };
        let Some(task) = next else {
            break;
        };

        let path = task.path.clone();
        let processor = processor.clone();
        let outcome = tokio::spawn(async move { processor.process(task).await })
            .await
            .unwrap_or_else(|e| Err(task_aborted(path.clone(), e)));

        match outcome {
            Ok(documents) => {
                info!(worker_id, path = %path.display(), documents, "File processed");
            }
            Err(e) => {
                error!(worker_id, path = %path.display(), error = %e, "File processing failed");
            }
        }
    }
}

fn task_aborted(path: PathBuf, err: tokio::task::JoinError) -> IngestError {
    let reason = if err.is_panic() {
        let panic = err.into_panic();
        panic
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| panic.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "panic".to_string())
    } else {
        err.to_string()
    };
    IngestError::TaskAborted { path, reason }
}
