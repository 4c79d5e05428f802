//! Job-scoped logging.
//!
//! Lines go to `tracing` like everything else, and are also persisted as
//! job log rows so they can be read back (or followed) after the fact.

use async_stream::stream;
use futures::Stream;
use serde_json::Value;
use std::fmt::Debug;
use std::time::Duration;
use tome_catalog::Repository;
use tome_catalog::ids::{JobId, JobLogId};
use tome_catalog::models::{JobLog, LogLevel, NewJobLog};

use crate::error::{CatalogResultExt, Result};

const LOG_PAGE_SIZE: u32 = 500;

#[derive(Clone)]
pub struct JobLogger {
    repo: Repository,
    job_id: JobId,
}
impl JobLogger {
    pub fn new(repo: Repository, job_id: JobId) -> Self {
        Self { repo, job_id }
    }

    pub fn job_id(&self) -> JobId {
        self.job_id
    }

    pub async fn debug(&self, message: &str, data: Option<Value>) {
        self.log(LogLevel::Debug, message, data, None).await
    }

    pub async fn info(&self, message: &str, data: Option<Value>) {
        self.log(LogLevel::Info, message, data, None).await
    }

    pub async fn warn(&self, message: &str, data: Option<Value>) {
        self.log(LogLevel::Warn, message, data, None).await
    }

    /// Log a failure along with the full error tree.
    ///
    /// The tree is rendered up front so the returned future does not hold on
    /// to `error`, which need not be `Sync`.
    pub fn error<'a>(&'a self, message: &'a str, error: &dyn Debug) -> impl Future<Output = ()> + Send + 'a {
        let trace = format!("{error:?}");
        self.log(LogLevel::Error, message, None, Some(trace))
    }

    /// Losing a log line never fails the job it describes.
    async fn log(&self, level: LogLevel, message: &str, data: Option<Value>, stack_trace: Option<String>) {
        let job = self.job_id.0;
        match level {
            LogLevel::Debug => tracing::debug!(job, data = ?data, "{message}"),
            LogLevel::Info => tracing::info!(job, data = ?data, "{message}"),
            LogLevel::Warn => tracing::warn!(job, data = ?data, "{message}"),
            LogLevel::Error => tracing::error!(job, error = stack_trace.as_deref(), "{message}"),
        }
        let mut line = NewJobLog::new(level, message);
        if let Some(data) = data {
            line = line.with_data(data.to_string());
        }
        if let Some(trace) = stack_trace {
            line = line.with_stack_trace(trace);
        }
        if let Err(err) = self.repo.append_job_log(self.job_id, &line).await {
            tracing::warn!(job, error = ?err, "could not persist job log line");
        }
    }
}

/// Streams a job's log lines, oldest first.
///
/// With `follow`, keeps polling for new lines every `poll` until the job
/// reaches a terminal state, then drains what is left and ends.
pub fn stream_logs(repo: Repository, job_id: JobId, follow: bool, poll: Duration) -> impl Stream<Item = Result<JobLog>> {
    // `rustfmt` does not format macros that use braces. Wrap in parentheses!
    stream!({
        let mut after: Option<JobLogId> = None;
        loop {
            // Read the status first so no line written before it finished is missed.
            let finished = match follow {
                true => match repo.job(job_id).await.or_catalog() {
                    Ok(job) => job.status.is_terminal(),
                    Err(err) => {
                        yield Err(err);
                        return;
                    },
                },
                false => true,
            };
            loop {
                let page = match repo.job_logs_after(job_id, after, LOG_PAGE_SIZE).await.or_catalog() {
                    Ok(page) => page,
                    Err(err) => {
                        yield Err(err);
                        return;
                    },
                };
                let full = page.len() as u32 == LOG_PAGE_SIZE;
                for line in page {
                    after = Some(line.id);
                    yield Ok(line);
                }
                if !full {
                    break;
                }
            }
            if finished {
                return;
            }
            tokio::time::sleep(poll).await;
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;
    use tome_catalog::Database;

    #[tokio::test]
    async fn test_lines_are_persisted_in_order() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::from(&db);
        let job = repo.enqueue_job("scan", None, "{}").await.unwrap();
        let logger = JobLogger::new(repo.clone(), job.id);

        logger.info("scan started", None).await;
        logger.warn("could not parse", Some(serde_json::json!({ "path": "/a/b.epub" }))).await;
        logger.error("scan failed", &"boom").await;

        let lines: Vec<JobLog> = stream_logs(repo, job.id, false, Duration::ZERO).try_collect().await.unwrap();
        let levels: Vec<LogLevel> = lines.iter().map(|l| l.level).collect();
        assert_eq!(levels, vec![LogLevel::Info, LogLevel::Warn, LogLevel::Error]);
        assert_eq!(lines[1].data.as_deref(), Some(r#"{"path":"/a/b.epub"}"#));
        assert_eq!(lines[2].stack_trace.as_deref(), Some("\"boom\""));
    }

    #[tokio::test]
    async fn test_error_lines_can_cross_threads() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::from(&db);
        let job = repo.enqueue_job("scan", None, "{}").await.unwrap();
        let logger = JobLogger::new(repo.clone(), job.id);
        // `Cell` is `Send` but not `Sync`.
        let cause = std::cell::Cell::new(7);
        let handle = tokio::spawn(async move {
            let failed = logger.error("scan failed", &cause);
            failed.await;
        });
        handle.await.unwrap();
        let lines: Vec<JobLog> = stream_logs(repo, job.id, false, Duration::ZERO).try_collect().await.unwrap();
        assert_eq!(lines[0].stack_trace.as_deref(), Some("Cell { value: 7 }"));
    }

    #[tokio::test]
    async fn test_follow_ends_once_the_job_is_done() {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::from(&db);
        let job = repo.enqueue_job("scan", None, "{}").await.unwrap();
        repo.claim_job("p", "w").await.unwrap().unwrap();
        let logger = JobLogger::new(repo.clone(), job.id);
        logger.info("working", None).await;

        let follower = tokio::spawn(
            stream_logs(repo.clone(), job.id, true, Duration::from_millis(10)).try_collect::<Vec<JobLog>>(),
        );
        tokio::time::sleep(Duration::from_millis(30)).await;
        logger.info("done", None).await;
        repo.complete_job(job.id, None).await.unwrap();

        let lines = follower.await.unwrap().unwrap();
        let messages: Vec<&str> = lines.iter().map(|l| l.message.as_str()).collect();
        assert_eq!(messages, vec!["working", "done"]);
    }
}
