use std::time::Duration;
use time::UtcDateTime;
use tokio_util::sync::CancellationToken;
use tome_catalog::Repository;

use crate::error::{CatalogResultExt, Result};

pub const DEFAULT_LOG_RETENTION: Duration = Duration::from_secs(30 * 24 * 60 * 60);
pub const DEFAULT_HOUSEKEEPING_INTERVAL: Duration = Duration::from_secs(60 * 60);

/// Periodically prunes job log lines past their retention.
pub struct Housekeeper {
    repo: Repository,
    retention: Duration,
    interval: Duration,
}
impl Housekeeper {
    pub fn new(repo: Repository, retention: Duration, interval: Duration) -> Self {
        Self {
            repo,
            retention,
            interval,
        }
    }

    pub async fn prune_logs(&self) -> Result<u64> {
        let retention = time::Duration::try_from(self.retention).unwrap_or(time::Duration::MAX);
        let cutoff = UtcDateTime::now().checked_sub(retention).unwrap_or(UtcDateTime::MIN);
        let pruned = self.repo.prune_job_logs(cutoff).await.or_catalog()?;
        if pruned > 0 {
            tracing::info!(pruned, "pruned old job log lines");
        }
        Ok(pruned)
    }

    /// Prune right away and then on every interval until shutdown.
    pub async fn run(self, shutdown: CancellationToken) {
        let mut ticker = tokio::time::interval(self.interval);
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(err) = self.prune_logs().await {
                        tracing::warn!(error = ?err, "could not prune job logs");
                    }
                },
            }
        }
    }
}
