//! Deduplicated people and series.
//!
//! Identity is the trimmed, Unicode-lowercased name within one library. There
//! is deliberately no fuzzy matching: "J. Doe" and "Jane Doe" are two people
//! until somebody merges them.

use tome_catalog::Repository;
use tome_catalog::ids::{LibraryId, PersonId, SeriesId};
use tome_catalog::models::{Person, Series};
use tome_media::{DataSource, Sourced};
use tracing::instrument;

use crate::error::{CatalogResultExt, Result};

/// Rows removed by an orphan cleanup pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Cleanup {
    pub people: u64,
    pub series: u64,
}

pub struct Resolver<'a> {
    repo: &'a Repository,
}
impl<'a> Resolver<'a> {
    pub fn new(repo: &'a Repository) -> Self {
        Self { repo }
    }

    /// A new person gets a generated "Last, First" sort name unless one is
    /// supplied.
    pub async fn find_or_create_person(
        &self,
        library_id: LibraryId,
        name: &str,
        sort_name: Option<&Sourced<String>>,
    ) -> Result<Person> {
        self.repo.find_or_create_person(library_id, name, sort_name).await.or_catalog()
    }

    /// Finding a soft-deleted series by name brings it back.
    pub async fn find_or_create_series(&self, library_id: LibraryId, name: &str, source: DataSource) -> Result<Series> {
        self.repo.find_or_create_series(library_id, name, source).await.or_catalog()
    }

    #[instrument(skip(self))]
    pub async fn merge_people(&self, target: PersonId, source: PersonId) -> Result<Person> {
        let merged = self.repo.merge_people(target, source).await.or_catalog()?;
        tracing::info!(target = %merged.id, name = %merged.name, "merged people");
        Ok(merged)
    }

    #[instrument(skip(self))]
    pub async fn merge_series(&self, target: SeriesId, source: SeriesId) -> Result<Series> {
        let merged = self.repo.merge_series(target, source).await.or_catalog()?;
        tracing::info!(target = %merged.id, name = %merged.name.value, "merged series");
        Ok(merged)
    }

    /// Delete unreferenced people and soft-delete empty series.
    #[instrument(skip(self))]
    pub async fn cleanup_orphans(&self, library_id: LibraryId) -> Result<Cleanup> {
        let cleanup = Cleanup {
            people: self.repo.delete_orphan_people(library_id).await.or_catalog()?,
            series: self.repo.soft_delete_orphan_series(library_id).await.or_catalog()?,
        };
        if cleanup != Cleanup::default() {
            tracing::debug!(people = cleanup.people, series = cleanup.series, "removed orphans");
        }
        Ok(cleanup)
    }
}
