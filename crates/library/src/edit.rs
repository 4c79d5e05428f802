//! Catalog edits made by a person rather than a scan.
//!
//! Every edit is recorded with the `Manual` source, so no later scan can undo
//! it. Afterwards the affected books are mirrored to their sidecars and, when
//! their library organizes files, moved to match their new names.

use std::collections::BTreeSet;
use std::sync::Arc;
use tome_catalog::Renamed;
use tome_catalog::ids::{BookId, FileId, LibraryId, PersonId, SeriesId};
use tome_catalog::models::{BookDetail, Person, Series};
use tome_media::DataSource;
use tracing::instrument;

use crate::Context;
use crate::error::{CatalogResultExt, Error, ErrorKind, Result};
use crate::mirror::mirror_book;
use crate::organize::FileOrganizer;
use crate::reconcile::{BookFacts, Layer};
use crate::resolve::Resolver;

pub struct Editor {
    ctx: Arc<Context>,
    organizer: Arc<dyn FileOrganizer>,
}
impl Editor {
    pub fn new(ctx: Arc<Context>, organizer: Arc<dyn FileOrganizer>) -> Self {
        Self { ctx, organizer }
    }

    /// Rename a person. If somebody in the library already has the new name,
    /// the two become one.
    #[instrument(skip(self))]
    pub async fn rename_person(&self, person_id: PersonId, name: &str) -> Result<Renamed> {
        let repo = &self.ctx.repo;
        let person = repo.person(person_id).await.or_catalog()?;
        let books = repo.books_by_person(person_id).await.or_catalog()?;
        let narrated = repo.files_narrated_by(person_id).await.or_catalog()?;
        let renamed = repo.rename_person(person_id, name).await.or_catalog()?;
        match &renamed {
            Renamed::Renamed(p) => tracing::info!(person = %p.id, from = %person.name, to = %p.name, "renamed person"),
            Renamed::Merged(p) => tracing::info!(person = %person.id, into = %p.id, name = %p.name, "renamed person into existing"),
        }
        self.propagate(person.library_id, books, narrated).await?;
        Ok(renamed)
    }

    /// Fold one person into another and bring their books up to date.
    pub async fn merge_people(&self, target: PersonId, source: PersonId) -> Result<Person> {
        let repo = &self.ctx.repo;
        let books = repo.books_by_person(source).await.or_catalog()?;
        let narrated = repo.files_narrated_by(source).await.or_catalog()?;
        let merged = Resolver::new(repo).merge_people(target, source).await?;
        self.propagate(merged.library_id, books, narrated).await?;
        Ok(merged)
    }

    pub async fn merge_series(&self, target: SeriesId, source: SeriesId) -> Result<Series> {
        let repo = &self.ctx.repo;
        let books = repo.books_in_series(source).await.or_catalog()?;
        let merged = Resolver::new(repo).merge_series(target, source).await?;
        self.propagate(merged.library_id, books, Vec::new()).await?;
        Ok(merged)
    }

    /// Set a book's title by hand. The sort title follows unless it was set
    /// by hand as well.
    #[instrument(skip(self))]
    pub async fn set_book_title(&self, book_id: BookId, title: &str) -> Result<BookDetail> {
        let title = title.trim();
        if title.is_empty() {
            exn::bail!(ErrorKind::InvalidInput("a book title cannot be empty".to_string()));
        }
        let repo = &self.ctx.repo;
        let detail = repo.book_detail(book_id).await.or_catalog()?;
        let facts = BookFacts {
            title: Some(title.to_string()),
            ..BookFacts::default()
        };
        let layers = [Layer::new(DataSource::Manual, facts)];
        let reconciled = self
            .ctx
            .reconciler
            .book(Some(&detail.fields()), &layers)
            .ok_or_else(|| Error::from(ErrorKind::Catalog))?;
        if reconciled.is_changed() {
            repo.update_metadata(detail.book.library_id, Some((book_id, &reconciled.value)), None)
                .await
                .or_catalog()?;
            tracing::info!(book = %book_id, title, changed = ?reconciled.changed, "set book title");
        }
        self.propagate(detail.book.library_id, vec![book_id], Vec::new()).await?;
        repo.book_detail(book_id).await.or_catalog()
    }

    /// Mirror every affected book, then re-organize books and rename files
    /// narrated in books that were not re-organized anyway.
    async fn propagate(&self, library_id: LibraryId, authored: Vec<BookId>, narrated: Vec<FileId>) -> Result<()> {
        let repo = &self.ctx.repo;
        let library = repo.library(library_id).await.or_catalog()?;
        let authored: BTreeSet<BookId> = authored.into_iter().collect();
        let mut touched = authored.clone();
        let mut renames = Vec::new();
        for file_id in narrated {
            let file = repo.file(file_id).await.or_catalog()?;
            if !authored.contains(&file.book_id) {
                renames.push(file_id);
            }
            touched.insert(file.book_id);
        }
        for book_id in &touched {
            let detail = repo.book_detail(*book_id).await.or_catalog()?;
            mirror_book(&self.ctx, &library, &detail).await?;
        }
        if !self.organizer.library_organize_setting(library_id).await? {
            return Ok(());
        }
        for file_id in renames {
            self.organizer.rename_narrated_file(file_id).await?;
        }
        for book_id in authored {
            self.organizer.organize_book_files(book_id).await?;
        }
        Ok(())
    }
}
