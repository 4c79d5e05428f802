use std::fmt::{Display, Formatter, Result as FmtResult};
use std::str::FromStr;
use time::UtcDateTime;

use crate::error::{Error, ErrorKind, Result};
use crate::ids::{JobId, JobLogId, LibraryId};
use crate::models::timestamp;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum JobStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}
impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Running => "running",
            Self::Succeeded => "succeeded",
            Self::Failed => "failed",
            Self::Cancelled => "cancelled",
        }
    }

    /// Whether the job will never run again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Succeeded | Self::Failed | Self::Cancelled)
    }
}
impl FromStr for JobStatus {
    type Err = Error;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "queued" => Self::Queued,
            "running" => Self::Running,
            "succeeded" => Self::Succeeded,
            "failed" => Self::Failed,
            "cancelled" => Self::Cancelled,
            _ => exn::bail!(ErrorKind::InvalidData("job status")),
        })
    }
}
impl Display for JobStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Job {
    pub id: JobId,
    pub job_type: String,
    pub status: JobStatus,
    /// `None` for jobs that span every library.
    pub library_id: Option<LibraryId>,
    /// Type-specific payload, as JSON.
    pub data: String,
    pub result: Option<String>,
    /// Percentage, 0 to 100.
    pub progress: u8,
    pub process_id: Option<String>,
    pub worker_id: Option<String>,
    pub attempts: u32,
    pub error: Option<String>,
    pub cancel_requested: bool,
    pub created_at: UtcDateTime,
    pub updated_at: UtcDateTime,
    pub started_at: Option<UtcDateTime>,
    pub finished_at: Option<UtcDateTime>,
}

#[derive(Debug, Clone, Default)]
pub struct JobFilter {
    pub status: Option<JobStatus>,
    pub job_type: Option<String>,
    pub library_id: Option<LibraryId>,
    pub limit: Option<u32>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}
impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}
impl FromStr for LogLevel {
    type Err = Error;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "debug" => Self::Debug,
            "info" => Self::Info,
            "warn" => Self::Warn,
            "error" => Self::Error,
            _ => exn::bail!(ErrorKind::InvalidData("log level")),
        })
    }
}
impl Display for LogLevel {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct JobLog {
    pub id: JobLogId,
    pub job_id: JobId,
    pub level: LogLevel,
    pub message: String,
    /// Structured context, as JSON.
    pub data: Option<String>,
    pub stack_trace: Option<String>,
    pub created_at: UtcDateTime,
}

#[derive(Debug, Clone)]
pub struct NewJobLog {
    pub level: LogLevel,
    pub message: String,
    pub data: Option<String>,
    pub stack_trace: Option<String>,
}
impl NewJobLog {
    pub fn new(level: LogLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
            data: None,
            stack_trace: None,
        }
    }

    pub fn with_data(mut self, data: impl Into<String>) -> Self {
        self.data = Some(data.into());
        self
    }

    pub fn with_stack_trace(mut self, trace: impl Into<String>) -> Self {
        self.stack_trace = Some(trace.into());
        self
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct JobRow {
    pub(crate) id: JobId,
    pub(crate) job_type: String,
    pub(crate) status: String,
    pub(crate) library_id: Option<LibraryId>,
    pub(crate) data: String,
    pub(crate) result: Option<String>,
    pub(crate) progress: i64,
    pub(crate) process_id: Option<String>,
    pub(crate) worker_id: Option<String>,
    pub(crate) attempts: i64,
    pub(crate) error: Option<String>,
    pub(crate) cancel_requested: bool,
    pub(crate) created_at: i64,
    pub(crate) updated_at: i64,
    pub(crate) started_at: Option<i64>,
    pub(crate) finished_at: Option<i64>,
}
impl TryFrom<JobRow> for Job {
    type Error = Error;
    fn try_from(row: JobRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            job_type: row.job_type,
            status: row.status.parse()?,
            library_id: row.library_id,
            data: row.data,
            result: row.result,
            progress: row.progress.clamp(0, 100) as u8,
            process_id: row.process_id,
            worker_id: row.worker_id,
            attempts: u32::try_from(row.attempts).unwrap_or_default(),
            error: row.error,
            cancel_requested: row.cancel_requested,
            created_at: timestamp(row.created_at, "job created at")?,
            updated_at: timestamp(row.updated_at, "job updated at")?,
            started_at: row.started_at.map(|t| timestamp(t, "job started at")).transpose()?,
            finished_at: row.finished_at.map(|t| timestamp(t, "job finished at")).transpose()?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct JobLogRow {
    pub(crate) id: JobLogId,
    pub(crate) job_id: JobId,
    pub(crate) level: String,
    pub(crate) message: String,
    pub(crate) data: Option<String>,
    pub(crate) stack_trace: Option<String>,
    pub(crate) created_at: i64,
}
impl TryFrom<JobLogRow> for JobLog {
    type Error = Error;
    fn try_from(row: JobLogRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            job_id: row.job_id,
            level: row.level.parse()?,
            message: row.message,
            data: row.data,
            stack_trace: row.stack_trace,
            created_at: timestamp(row.created_at, "job log created at")?,
        })
    }
}
