//! Size-based write-completion check
//!
//! Exports are written in place, so a create event only means the file
//! exists. The file is considered complete once its size holds steady for a
//! quiet period.

use std::future::Future;
use std::io;
use std::path::Path;
use std::time::Duration;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::debug;

use crate::config::StabilityConfig;
use crate::error::{IngestError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StabilityPolicy {
    pub poll_interval: Duration,
    pub quiet_period: Duration,
    pub timeout: Duration,
}

impl Default for StabilityPolicy {
    fn default() -> Self {
        Self::from(&StabilityConfig::default())
    }
}

impl From<&StabilityConfig> for StabilityPolicy {
    fn from(config: &StabilityConfig) -> Self {
        Self {
            poll_interval: config.poll_interval(),
            quiet_period: config.quiet_period(),
            timeout: config.timeout(),
        }
    }
}

impl StabilityPolicy {
    /// Wait until the file size at `path` stops changing; returns that size.
    pub async fn wait_stable(&self, path: &Path) -> Result<u64> {
        self.wait_with(path, || async move {
            tokio::fs::metadata(path).await.map(|m| m.len())
        })
        .await
    }

    /// Same as [`wait_stable`](Self::wait_stable) with a caller-supplied size probe.
    ///
    /// The first probe runs immediately, then once per `poll_interval`. Any
    /// size change restarts the quiet clock.
    pub async fn wait_with<F, Fut>(&self, path: &Path, mut probe: F) -> Result<u64>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = io::Result<u64>>,
    {
        let poll = async {
            let mut ticker = interval(self.poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            let mut last_size: Option<u64> = None;
            let mut changed_at = Instant::now();

            loop {
                ticker.tick().await;
                let size = probe().await.map_err(|e| IngestError::io(path, e))?;
                let now = Instant::now();

                if last_size != Some(size) {
                    last_size = Some(size);
                    changed_at = now;
                    continue;
                }
                if now.duration_since(changed_at) >= self.quiet_period {
                    return Ok::<u64, IngestError>(size);
                }
            }
        };

        let size = tokio::time::timeout(self.timeout, poll)
            .await
            .map_err(|_| IngestError::StabilizationTimeout {
                path: path.to_path_buf(),
                timeout: self.timeout,
            })??;

        debug!(path = %path.display(), size, "File size stable");
        Ok(size)
    }
}
