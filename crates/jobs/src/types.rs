use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use tome_catalog::ids::{BookId, LibraryId};

use crate::error::{Error, ErrorKind, Result};

/// The kinds of work the queue knows how to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub enum JobType {
    #[display("scan")]
    Scan,
    #[display("organize")]
    Organize,
}
impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Scan => "scan",
            Self::Organize => "organize",
        }
    }
}
impl FromStr for JobType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self> {
        Ok(match s {
            "scan" => Self::Scan,
            "organize" => Self::Organize,
            other => exn::bail!(ErrorKind::UnknownJobType(other.to_string())),
        })
    }
}

/// Scan one library, or every library when the job has none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanJob {}

/// Re-organize a whole library, or just one of its books.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrganizeJob {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub book_id: Option<i64>,
}
impl OrganizeJob {
    pub fn book(&self) -> Option<BookId> {
        self.book_id.map(BookId)
    }
}

/// Everything needed to put a job on the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobRequest {
    pub job_type: JobType,
    pub library_id: Option<LibraryId>,
    /// Type-specific payload, as JSON.
    pub data: String,
}
impl JobRequest {
    pub fn scan(library_id: Option<LibraryId>) -> Self {
        Self {
            job_type: JobType::Scan,
            library_id,
            data: payload(&ScanJob::default()),
        }
    }

    pub fn organize(library_id: LibraryId, book_id: Option<BookId>) -> Self {
        Self {
            job_type: JobType::Organize,
            library_id: Some(library_id),
            data: payload(&OrganizeJob {
                book_id: book_id.map(|b| b.0),
            }),
        }
    }
}

fn payload<T: Serialize>(value: &T) -> String {
    // Payload structs hold nothing serde_json can refuse.
    serde_json::to_string(value).unwrap_or_else(|_| "{}".to_string())
}

/// Read a job's JSON payload.
pub(crate) fn parse_payload<T: for<'de> Deserialize<'de>>(job_type: JobType, data: &str) -> Result<T> {
    use exn::ResultExt;
    serde_json::from_str(data).or_raise(|| ErrorKind::InvalidPayload(job_type.to_string()))
}
