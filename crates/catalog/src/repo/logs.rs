use crate::error::{Result, SqlxResultExt};
use crate::ids::{JobId, JobLogId};
use crate::models::{JobLog, JobLogRow, NewJobLog};
use crate::repo::Repository;
use time::UtcDateTime;

impl Repository {
    pub async fn append_job_log(&self, job_id: JobId, log: &NewJobLog) -> Result<JobLogId> {
        self.retrying(|| async move {
            sqlx::query_scalar(include_str!("../../queries/insert_job_log.sql"))
                .bind(job_id)
                .bind(log.level.as_str())
                .bind(&log.message)
                .bind(log.data.as_deref())
                .bind(log.stack_trace.as_deref())
                .bind(Self::now())
                .fetch_one(&self.pool)
                .await
                .or_db()
        })
        .await
    }

    /// Log lines of a job with ids above `after`, oldest first.
    pub async fn job_logs_after(&self, job_id: JobId, after: Option<JobLogId>, limit: u32) -> Result<Vec<JobLog>> {
        let rows: Vec<JobLogRow> = sqlx::query_as(include_str!("../../queries/list_job_logs_after.sql"))
            .bind(job_id)
            .bind(after.map_or(0, |id| id.0))
            .bind(i64::from(limit))
            .fetch_all(&self.pool)
            .await
            .or_db()?;
        rows.into_iter().map(JobLog::try_from).collect()
    }

    /// Delete log lines written before `cutoff`.
    pub async fn prune_job_logs(&self, cutoff: UtcDateTime) -> Result<u64> {
        self.retrying(|| async move {
            let result = sqlx::query("DELETE FROM job_logs WHERE created_at < ?")
                .bind(cutoff.unix_timestamp())
                .execute(&self.pool)
                .await
                .or_db()?;
            Ok(result.rows_affected())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use crate::models::{LogLevel, NewJobLog};
    use crate::repo::fixtures::setup;
    use time::{Duration, UtcDateTime};

    #[tokio::test]
    async fn test_logs_page_forward() {
        let (_db, repo, library) = setup().await;
        let job = repo.enqueue_job("scan", Some(library.id), "{}").await.unwrap();
        let first = repo.append_job_log(job.id, &NewJobLog::new(LogLevel::Info, "scan started")).await.unwrap();
        repo.append_job_log(job.id, &NewJobLog::new(LogLevel::Warn, "skipped").with_data(r#"{"path":"x"}"#))
            .await
            .unwrap();

        let all = repo.job_logs_after(job.id, None, 100).await.unwrap();
        assert_eq!(all.len(), 2);
        assert_eq!(all[0].message, "scan started");
        let rest = repo.job_logs_after(job.id, Some(first), 100).await.unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].level, LogLevel::Warn);
        assert_eq!(rest[0].data.as_deref(), Some(r#"{"path":"x"}"#));
    }

    #[tokio::test]
    async fn test_prune() {
        let (_db, repo, library) = setup().await;
        let job = repo.enqueue_job("scan", Some(library.id), "{}").await.unwrap();
        repo.append_job_log(job.id, &NewJobLog::new(LogLevel::Info, "old")).await.unwrap();
        assert_eq!(repo.prune_job_logs(UtcDateTime::now() - Duration::days(1)).await.unwrap(), 0);
        assert_eq!(repo.prune_job_logs(UtcDateTime::now() + Duration::seconds(5)).await.unwrap(), 1);
        assert!(repo.job_logs_after(job.id, None, 10).await.unwrap().is_empty());
    }
}
