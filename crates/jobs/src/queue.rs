use std::sync::Arc;
use time::UtcDateTime;
use tokio::sync::Notify;
use tome_catalog::ids::JobId;
use tome_catalog::models::{Job, JobFilter};
use tome_catalog::{Recovered, Repository};
use tracing::instrument;

use crate::error::{CatalogResultExt, Result};
use crate::types::JobRequest;

/// Identifies this process among everything that ever claimed a job.
///
/// Jobs left `running` under any other identifier belonged to a process that
/// is gone.
pub fn process_id() -> String {
    format!("{}-{}", std::process::id(), UtcDateTime::now().unix_timestamp_nanos())
}

/// The persisted job queue.
///
/// All state lives in the catalog; the queue only adds a wake-up signal so
/// idle workers in this process react to new jobs without waiting for their
/// next poll.
#[derive(Clone)]
pub struct JobQueue {
    repo: Repository,
    process_id: Arc<str>,
    wake: Arc<Notify>,
}
impl JobQueue {
    pub fn new(repo: Repository) -> Self {
        Self::with_process_id(repo, process_id())
    }

    pub fn with_process_id(repo: Repository, process_id: impl Into<Arc<str>>) -> Self {
        Self {
            repo,
            process_id: process_id.into(),
            wake: Arc::new(Notify::new()),
        }
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    pub fn process_id(&self) -> &str {
        &self.process_id
    }

    pub(crate) fn wake(&self) -> &Notify {
        &self.wake
    }

    #[instrument(skip(self, request), fields(job_type = %request.job_type))]
    pub async fn enqueue(&self, request: &JobRequest) -> Result<Job> {
        let job = self
            .repo
            .enqueue_job(request.job_type.as_str(), request.library_id, &request.data)
            .await
            .or_catalog()?;
        tracing::info!(job = %job.id, library = ?request.library_id.map(|l| l.0), "enqueued job");
        self.wake.notify_waiters();
        Ok(job)
    }

    pub async fn claim(&self, worker_id: &str) -> Result<Option<Job>> {
        self.repo.claim_job(&self.process_id, worker_id).await.or_catalog()
    }

    pub async fn complete(&self, id: JobId, result: Option<&str>) -> Result<Job> {
        self.repo.complete_job(id, result).await.or_catalog()
    }

    pub async fn fail(&self, id: JobId, error: &str, retryable: bool, max_attempts: u32) -> Result<Job> {
        let job = self.repo.fail_job(id, error, retryable, max_attempts).await.or_catalog()?;
        // A re-queued job can be picked up again straight away.
        self.wake.notify_waiters();
        Ok(job)
    }

    pub async fn cancel(&self, id: JobId) -> Result<Job> {
        self.repo.cancel_job(id).await.or_catalog()
    }

    pub(crate) async fn mark_cancelled(&self, id: JobId) -> Result<()> {
        self.repo.mark_job_cancelled(id).await.or_catalog()
    }

    pub async fn job(&self, id: JobId) -> Result<Job> {
        self.repo.job(id).await.or_catalog()
    }

    pub async fn list(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        self.repo.list_jobs(filter).await.or_catalog()
    }

    /// Put back whatever other processes left running.
    pub async fn recover_stale(&self, max_attempts: u32) -> Result<Recovered> {
        let recovered = self.repo.recover_stale_jobs(&self.process_id, max_attempts).await.or_catalog()?;
        if recovered != Recovered::default() {
            tracing::warn!(
                requeued = recovered.requeued.len(),
                failed = recovered.failed.len(),
                cancelled = recovered.cancelled.len(),
                "recovered jobs from a previous process"
            );
        }
        Ok(recovered)
    }
}
