//! Repository over the catalog database.
//!
//! Every public mutating method is one transaction, wrapped in the
//! repository's [`RetryPolicy`] so that lock contention between workers is
//! ridden out instead of surfacing as a failure.

mod books;
mod files;
mod ingest;
mod jobs;
mod libraries;
mod logs;
mod people;
mod series;

pub use self::ingest::{IngestTarget, Ingested, NewFile, RelocatedFile, Relocation, Removal};
pub use self::jobs::Recovered;
pub use self::people::Renamed;

use crate::Database;
use crate::error::{Error, ErrorKind, Result};
use crate::retry::{RetryPolicy, retry};
use exn::OptionExt;
use sqlx::SqlitePool;
use std::future::Future;
use std::path::Path;
use time::UtcDateTime;

/// Repository for every catalog entity.
///
/// Cheap to clone; clones share the connection pool.
#[derive(Debug, Clone)]
pub struct Repository {
    pool: SqlitePool,
    retry: RetryPolicy,
}
impl From<&Database> for Repository {
    fn from(db: &Database) -> Self {
        Self::new(db.pool().clone())
    }
}
impl Repository {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            retry: RetryPolicy::default(),
        }
    }

    pub fn with_retry(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn retry_policy(&self) -> &RetryPolicy {
        &self.retry
    }

    async fn retrying<T, F, Fut>(&self, op: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        retry(&self.retry, |err: &Error| err.is_retryable(), op).await
    }

    fn sqlx_hates_paths(path: &Path) -> Result<&str> {
        path.to_str().ok_or_raise(|| ErrorKind::InvalidData("path"))
    }

    fn now() -> i64 {
        UtcDateTime::now().unix_timestamp()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use crate::models::{BookFields, CoverAspectRatio, FileFields, Intrinsic, Library, NewLibrary};
    use std::path::PathBuf;
    use tome_media::{DataSource, FileType, Sourced};

    pub(crate) fn new_library(paths: &[&str]) -> NewLibrary {
        NewLibrary {
            name: "Books".to_string(),
            paths: paths.iter().map(PathBuf::from).collect(),
            organize_file_structure: true,
            cover_aspect_ratio: CoverAspectRatio::Book,
        }
    }

    pub(crate) async fn setup() -> (Database, Repository, Library) {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::from(&db);
        let library = repo.create_library(&new_library(&["/lib"])).await.unwrap();
        (db, repo, library)
    }

    pub(crate) fn book_fields(title: &str, authors: &[&str]) -> BookFields {
        BookFields {
            title: Sourced::new(title.to_string(), DataSource::Format),
            subtitle: None,
            sort_title: Sourced::new(title.to_string(), DataSource::Format),
            description: None,
            authors: Some(Sourced::new(authors.iter().map(|a| a.to_string()).collect(), DataSource::Format)),
            series: None,
        }
    }

    pub(crate) fn file_fields(narrators: &[&str]) -> FileFields {
        FileFields {
            narrators: (!narrators.is_empty())
                .then(|| Sourced::new(narrators.iter().map(|n| n.to_string()).collect(), DataSource::Format)),
            intrinsic: Intrinsic {
                size: 1,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    /// Ingest `{dir}/{title}.epub` as the main file of a new book at `dir`.
    pub(crate) async fn ingest_new_book(
        repo: &Repository,
        library: &Library,
        dir: &str,
        fields: BookFields,
        file: FileFields,
    ) -> Ingested {
        let filepath = PathBuf::from(dir).join(format!("{}.epub", fields.title.value));
        let target = IngestTarget::NewBook {
            filepath: PathBuf::from(dir),
            fields,
        };
        let file = NewFile {
            filepath,
            file_type: FileType::Epub,
            can_be_main: true,
            fields: file,
        };
        repo.ingest(library.id, &target, &file).await.unwrap()
    }
}
