use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tome_catalog::Repository;
use tome_catalog::models::Job;

use crate::error::{CatalogResultExt, Error, ErrorKind, Result};
use crate::logger::JobLogger;
use crate::types::JobType;

/// What a running handler can see and do besides its own work.
pub struct JobContext {
    pub job: Job,
    pub logger: JobLogger,
    repo: Repository,
    shutdown: CancellationToken,
}
impl JobContext {
    pub fn new(repo: Repository, job: Job, shutdown: CancellationToken) -> Self {
        Self {
            logger: JobLogger::new(repo.clone(), job.id),
            job,
            repo,
            shutdown,
        }
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    /// Record progress as a percentage of `total`.
    pub async fn progress(&self, done: u64, total: u64) -> Result<()> {
        let percent = match total {
            0 => 100,
            total => (done.min(total) * 100 / total) as u8,
        };
        self.repo.set_job_progress(self.job.id, percent).await.or_catalog()
    }

    /// Stop here if the job was cancelled or the worker is shutting down.
    ///
    /// Handlers call this between units of work; whatever they committed
    /// before stays committed.
    pub async fn checkpoint(&self) -> Result<()> {
        if self.shutdown.is_cancelled() {
            exn::bail!(ErrorKind::Interrupted);
        }
        if self.repo.is_cancel_requested(self.job.id).await.or_catalog()? {
            exn::bail!(ErrorKind::Cancelled);
        }
        Ok(())
    }
}

/// Runs one type of job.
#[async_trait]
pub trait JobHandler: Send + Sync {
    fn job_type(&self) -> JobType;

    /// Run the job to completion. The returned value, if any, is stored as
    /// the job's result.
    async fn run(&self, ctx: &JobContext) -> Result<Option<String>>;
}

pub type HandlerHandle = Arc<dyn JobHandler>;

#[derive(Clone, Default)]
pub struct HandlerRegistry {
    handlers: HashMap<JobType, HandlerHandle>,
}
impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(mut self, handler: HandlerHandle) -> Self {
        self.handlers.insert(handler.job_type(), handler);
        self
    }

    /// The handler for a job's type as stored in the catalog.
    pub fn for_job(&self, job: &Job) -> Result<&HandlerHandle> {
        let job_type: JobType = job.job_type.parse()?;
        self.handlers
            .get(&job_type)
            .ok_or_else(|| Error::from(ErrorKind::UnknownJobType(job.job_type.clone())))
    }
}
