//! A fixed-size pool of workers pulling from the persisted queue.

use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tome_catalog::models::Job;
use tracing::Instrument;

use crate::error::{ErrorKind, Result};
use crate::handler::{HandlerRegistry, JobContext};
use crate::queue::JobQueue;

pub const DEFAULT_WORKERS: usize = 2;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);
pub const DEFAULT_MAX_JOB_ATTEMPTS: u32 = 3;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PoolConfig {
    pub workers: usize,
    /// How long an idle worker waits before looking at the queue again when
    /// nothing wakes it sooner.
    pub poll_interval: Duration,
    pub max_job_attempts: u32,
}
impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            workers: DEFAULT_WORKERS,
            poll_interval: DEFAULT_POLL_INTERVAL,
            max_job_attempts: DEFAULT_MAX_JOB_ATTEMPTS,
        }
    }
}

/// What became of a job a worker picked up.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Finished {
    Succeeded,
    Failed,
    Requeued,
    Cancelled,
}

pub struct WorkerPool {
    queue: JobQueue,
    handlers: Arc<HandlerRegistry>,
    config: PoolConfig,
    shutdown: CancellationToken,
}
impl WorkerPool {
    pub fn new(queue: JobQueue, handlers: HandlerRegistry, config: PoolConfig) -> Self {
        Self {
            queue,
            handlers: Arc::new(handlers),
            config,
            shutdown: CancellationToken::new(),
        }
    }

    /// Cancelling the token stops the pool once every worker is between jobs
    /// or has reached a checkpoint in its current one.
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    /// Recover stale jobs, then run the workers until shutdown.
    pub async fn run(self) -> Result<()> {
        self.queue.recover_stale(self.config.max_job_attempts).await?;
        let mut workers = JoinSet::new();
        for i in 0..self.config.workers.max(1) {
            let worker = Worker {
                id: format!("{}-w{i}", self.queue.process_id()),
                queue: self.queue.clone(),
                handlers: self.handlers.clone(),
                config: self.config.clone(),
                shutdown: self.shutdown.clone(),
            };
            let span = tracing::info_span!("worker", worker = %worker.id);
            workers.spawn(worker.run().instrument(span));
        }
        tracing::info!(workers = workers.len(), process = self.queue.process_id(), "worker pool started");
        while let Some(joined) = workers.join_next().await {
            if let Err(err) = joined {
                tracing::error!(error = ?err, "worker task panicked");
            }
        }
        tracing::info!("worker pool stopped");
        Ok(())
    }

    /// Claim and run jobs until the queue has nothing eligible left.
    ///
    /// Used by one-shot commands that want a job done without starting the
    /// pool.
    pub async fn drain(&self, worker_id: &str) -> Result<Vec<(Job, Finished)>> {
        let worker = Worker {
            id: worker_id.to_string(),
            queue: self.queue.clone(),
            handlers: self.handlers.clone(),
            config: self.config.clone(),
            shutdown: self.shutdown.clone(),
        };
        let mut done = Vec::new();
        while let Some(job) = worker.queue.claim(&worker.id).await? {
            let finished = worker.process(job.clone()).await?;
            done.push((job, finished));
        }
        Ok(done)
    }
}

struct Worker {
    id: String,
    queue: JobQueue,
    handlers: Arc<HandlerRegistry>,
    config: PoolConfig,
    shutdown: CancellationToken,
}
impl Worker {
    async fn run(self) {
        loop {
            if self.shutdown.is_cancelled() {
                break;
            }
            // Register interest before claiming so an enqueue racing the
            // claim still wakes this worker.
            let woken = self.queue.wake().notified();
            match self.queue.claim(&self.id).await {
                Ok(Some(job)) => {
                    if let Err(err) = self.process(job).await {
                        tracing::error!(error = ?err, "could not record job outcome");
                    }
                    continue;
                },
                Ok(None) => {},
                Err(err) => tracing::warn!(error = ?err, "could not claim job"),
            }
            tokio::select! {
                _ = self.shutdown.cancelled() => break,
                _ = woken => {},
                _ = tokio::time::sleep(self.config.poll_interval) => {},
            }
        }
        tracing::debug!("worker stopped");
    }

    #[tracing::instrument(skip_all, fields(job = %job.id, job_type = %job.job_type))]
    async fn process(&self, job: Job) -> Result<Finished> {
        let id = job.id;
        let ctx = JobContext::new(self.queue.repo().clone(), job, self.shutdown.clone());
        ctx.logger.info("job started", Some(serde_json::json!({ "attempt": ctx.job.attempts }))).await;
        let outcome = match self.handlers.for_job(&ctx.job) {
            Ok(handler) => handler.run(&ctx).await,
            Err(err) => Err(err),
        };
        match outcome {
            Ok(result) => {
                self.queue.complete(id, result.as_deref()).await?;
                ctx.logger.info("job succeeded", None).await;
                Ok(Finished::Succeeded)
            },
            Err(err) if matches!(&*err, ErrorKind::Cancelled) => {
                self.queue.mark_cancelled(id).await?;
                ctx.logger.info("job cancelled", None).await;
                Ok(Finished::Cancelled)
            },
            Err(err) => {
                let retryable = err.is_retryable();
                ctx.logger.error("job failed", &err).await;
                let job = self.queue.fail(id, &format!("{err:?}"), retryable, self.config.max_job_attempts).await?;
                match job.status.is_terminal() {
                    true => Ok(Finished::Failed),
                    false => Ok(Finished::Requeued),
                }
            },
        }
    }
}
