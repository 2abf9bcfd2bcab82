//! Asynchronous dual-write of produced artifacts.
//!
//! Population never delays or alters the response. Each call spawns a
//! supervising task on the shared [`TaskTracker`] which runs the local write
//! and the remote upload as two tasks, waits for both, and only then drops
//! its handle on the content. Failures are logged and swallowed.

use super::{CacheKey, LocalTier, RemoteTier};
use crate::observability::AppObservability;
use bytes::Bytes;
use std::time::{Duration, SystemTime};
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::{debug, warn};

/// Outcome of one tier write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOutcome {
    Written,
    Unchanged,
    Failed,
}

impl WriteOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Written => "written",
            Self::Unchanged => "unchanged",
            Self::Failed => "failed",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PopulationReport {
    pub local: WriteOutcome,
    /// `None` when the remote tier is disabled
    pub remote: Option<WriteOutcome>,
}

#[derive(Debug, Clone)]
pub struct CachePopulator {
    local: LocalTier,
    remote: Option<RemoteTier>,
    max_age: Duration,
    tracker: TaskTracker,
    observability: Option<AppObservability>,
}

impl CachePopulator {
    pub fn new(
        local: LocalTier,
        remote: Option<RemoteTier>,
        max_age: Duration,
        tracker: TaskTracker,
    ) -> Self {
        Self {
            local,
            remote,
            max_age,
            tracker,
            observability: None,
        }
    }

    pub fn with_observability(mut self, observability: AppObservability) -> Self {
        self.observability = Some(observability);
        self
    }

    pub fn tracker(&self) -> &TaskTracker {
        &self.tracker
    }

    /// Start writing `content` to both tiers in the background.
    ///
    /// The remote upload is skipped when the existing object was written
    /// within the last `max_age`.
    pub fn populate(&self, key: CacheKey, content: Bytes) -> JoinHandle<PopulationReport> {
        let populator = self.clone();
        self.tracker
            .spawn(async move { populator.run(key, content).await })
    }

    async fn run(self, key: CacheKey, content: Bytes) -> PopulationReport {
        let local_task = {
            let local = self.local.clone();
            let key = key.clone();
            let content = content.clone();
            self.tracker.spawn(async move {
                match local.write(&key, &content).await {
                    Ok(true) => WriteOutcome::Written,
                    Ok(false) => WriteOutcome::Unchanged,
                    Err(e) => {
                        warn!("[async] Local cache write failed for {}: {}", key, e);
                        WriteOutcome::Failed
                    }
                }
            })
        };

        let remote_task = self.remote.clone().map(|remote| {
            let key = key.clone();
            let content = content.clone();
            let threshold = SystemTime::now()
                .checked_sub(self.max_age)
                .unwrap_or(SystemTime::UNIX_EPOCH);
            self.tracker.spawn(async move {
                match remote.store_if_newer(&key, threshold, content).await {
                    Ok(true) => WriteOutcome::Written,
                    Ok(false) => WriteOutcome::Unchanged,
                    Err(e) => {
                        warn!("[async] Remote cache write failed for {}: {}", key, e);
                        WriteOutcome::Failed
                    }
                }
            })
        });

        let local = local_task.await.unwrap_or_else(|e| {
            warn!("[async] Local cache write task for {} failed: {}", key, e);
            WriteOutcome::Failed
        });
        let remote = match remote_task {
            Some(task) => Some(task.await.unwrap_or_else(|e| {
                warn!("[async] Remote cache write task for {} failed: {}", key, e);
                WriteOutcome::Failed
            })),
            None => None,
        };

        // Both writers are done with the shared content
        drop(content);

        debug!(
            "[async] {} local image {}, remote: {}",
            local.as_str(),
            key,
            remote.map_or("disabled", |r| r.as_str())
        );
        if let Some(observability) = &self.observability {
            observability.record_population("local", local.as_str());
            if let Some(remote) = remote {
                observability.record_population("remote", remote.as_str());
            }
        }

        PopulationReport { local, remote }
    }
}
