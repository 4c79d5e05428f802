use crate::error::{ErrorKind, Result, SqlxResultExt};
use crate::ids::{JobId, LibraryId};
use crate::models::{Job, JobFilter, JobRow, JobStatus};
use crate::repo::Repository;
use tracing::instrument;

/// Jobs moved out of `running` by [`Repository::recover_stale_jobs`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Recovered {
    pub requeued: Vec<JobId>,
    pub failed: Vec<JobId>,
    pub cancelled: Vec<JobId>,
}

impl Repository {
    #[instrument(skip(self, data))]
    pub async fn enqueue_job(&self, job_type: &str, library_id: Option<LibraryId>, data: &str) -> Result<Job> {
        self.retrying(|| async move {
            let row: JobRow = sqlx::query_as(include_str!("../../queries/insert_job.sql"))
                .bind(job_type)
                .bind(library_id)
                .bind(data)
                .bind(Self::now())
                .fetch_one(&self.pool)
                .await
                .or_db()?;
            row.try_into()
        })
        .await
    }

    /// Atomically move the next eligible queued job to `running`.
    ///
    /// A job is eligible when no running job shares its library; jobs that
    /// span every library need the queue to themselves.
    pub async fn claim_job(&self, process_id: &str, worker_id: &str) -> Result<Option<Job>> {
        self.retrying(|| async move {
            let row: Option<JobRow> = sqlx::query_as(include_str!("../../queries/claim_job.sql"))
                .bind(process_id)
                .bind(worker_id)
                .bind(Self::now())
                .fetch_optional(&self.pool)
                .await
                .or_db()?;
            row.map(Job::try_from).transpose()
        })
        .await
    }

    pub async fn complete_job(&self, id: JobId, result: Option<&str>) -> Result<Job> {
        self.retrying(|| async move {
            let row: Option<JobRow> = sqlx::query_as(include_str!("../../queries/complete_job.sql"))
                .bind(id)
                .bind(result)
                .bind(Self::now())
                .fetch_optional(&self.pool)
                .await
                .or_db()?;
            row.ok_or_else(|| exn::Exn::from(ErrorKind::NotFound("running job", id.0)))?.try_into()
        })
        .await
    }

    /// Record a failure. A retryable failure re-queues the job while it has
    /// attempts left; the returned job says which way it went.
    pub async fn fail_job(&self, id: JobId, error: &str, retryable: bool, max_attempts: u32) -> Result<Job> {
        self.retrying(|| async move {
            let row: Option<JobRow> = sqlx::query_as(include_str!("../../queries/fail_job.sql"))
                .bind(id)
                .bind(error)
                .bind(retryable)
                .bind(i64::from(max_attempts))
                .bind(Self::now())
                .fetch_optional(&self.pool)
                .await
                .or_db()?;
            row.ok_or_else(|| exn::Exn::from(ErrorKind::NotFound("running job", id.0)))?.try_into()
        })
        .await
    }

    /// Cancel a job. Queued jobs stop immediately; running jobs get a flag
    /// their worker checks between units of work. Finished jobs are left
    /// alone.
    #[instrument(skip(self))]
    pub async fn cancel_job(&self, id: JobId) -> Result<Job> {
        self.retrying(|| async move {
            let row: Option<JobRow> = sqlx::query_as(include_str!("../../queries/cancel_job.sql"))
                .bind(id)
                .bind(Self::now())
                .fetch_optional(&self.pool)
                .await
                .or_db()?;
            row.ok_or_else(|| exn::Exn::from(ErrorKind::NotFound("job", id.0)))?.try_into()
        })
        .await
    }

    /// Acknowledge a cancellation request for a running job.
    pub async fn mark_job_cancelled(&self, id: JobId) -> Result<()> {
        self.retrying(|| async move {
            sqlx::query("UPDATE jobs SET status = 'cancelled', finished_at = ?1, updated_at = ?1 WHERE id = ?2 AND status = 'running'")
                .bind(Self::now())
                .bind(id)
                .execute(&self.pool)
                .await
                .or_db()?;
            Ok(())
        })
        .await
    }

    pub async fn is_cancel_requested(&self, id: JobId) -> Result<bool> {
        let flag: Option<bool> = sqlx::query_scalar("SELECT cancel_requested FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_db()?;
        flag.ok_or_else(|| exn::Exn::from(ErrorKind::NotFound("job", id.0)))
    }

    pub async fn set_job_progress(&self, id: JobId, progress: u8) -> Result<()> {
        self.retrying(|| async move {
            sqlx::query("UPDATE jobs SET progress = ?, updated_at = ? WHERE id = ? AND status = 'running'")
                .bind(i64::from(progress.min(100)))
                .bind(Self::now())
                .bind(id)
                .execute(&self.pool)
                .await
                .or_db()?;
            Ok(())
        })
        .await
    }

    /// Put back jobs that a previous process claimed but never finished.
    ///
    /// Jobs that already used `max_attempts` fail instead, and jobs that were
    /// asked to stop are cancelled.
    #[instrument(skip(self))]
    pub async fn recover_stale_jobs(&self, process_id: &str, max_attempts: u32) -> Result<Recovered> {
        self.retrying(|| async move {
            let rows: Vec<JobRow> = sqlx::query_as(include_str!("../../queries/recover_stale_jobs.sql"))
                .bind(process_id)
                .bind(i64::from(max_attempts))
                .bind(Self::now())
                .fetch_all(&self.pool)
                .await
                .or_db()?;
            let mut recovered = Recovered::default();
            for row in rows {
                let job = Job::try_from(row)?;
                match job.status {
                    JobStatus::Queued => recovered.requeued.push(job.id),
                    JobStatus::Cancelled => recovered.cancelled.push(job.id),
                    _ => recovered.failed.push(job.id),
                }
            }
            Ok(recovered)
        })
        .await
    }

    pub async fn job(&self, id: JobId) -> Result<Job> {
        let row: Option<JobRow> = sqlx::query_as("SELECT * FROM jobs WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .or_db()?;
        row.ok_or_else(|| exn::Exn::from(ErrorKind::NotFound("job", id.0)))?.try_into()
    }

    /// Jobs matching `filter`, newest first.
    pub async fn list_jobs(&self, filter: &JobFilter) -> Result<Vec<Job>> {
        let rows: Vec<JobRow> = sqlx::query_as(include_str!("../../queries/list_jobs.sql"))
            .bind(filter.status.map(|s| s.as_str()))
            .bind(filter.job_type.as_deref())
            .bind(filter.library_id)
            .bind(filter.limit.map_or(-1, i64::from))
            .fetch_all(&self.pool)
            .await
            .or_db()?;
        rows.into_iter().map(Job::try_from).collect()
    }
}
