//! Multi-table writes that keep books and files consistent.

use crate::error::{ErrorKind, Result, SqlxResultExt};
use crate::ids::{BookId, FileId, LibraryId};
use crate::models::{Book, BookFields, File, FileFields};
use crate::repo::Repository;
use exn::ResultExt;
use facet_json::to_string as to_json;
use std::path::PathBuf;
use tome_media::{FileRole, FileType};
use tracing::instrument;

/// Where an ingested file goes.
#[derive(Debug, Clone)]
pub enum IngestTarget {
    /// Create a book for the file.
    NewBook { filepath: PathBuf, fields: BookFields },
    /// Attach the file to a book that already exists.
    ExistingBook(BookId),
}

#[derive(Debug, Clone)]
pub struct NewFile {
    pub filepath: PathBuf,
    pub file_type: FileType,
    /// Whether the file may become its book's main file.
    pub can_be_main: bool,
    pub fields: FileFields,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ingested {
    pub book_id: BookId,
    pub file_id: FileId,
    pub book_created: bool,
    pub role: FileRole,
}

/// New locations for a book and its files after they moved on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct Relocation {
    pub book_filepath: PathBuf,
    pub files: Vec<RelocatedFile>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RelocatedFile {
    pub id: FileId,
    pub filepath: PathBuf,
    pub cover_filename: Option<String>,
}

/// What happened to a book when one of its files was removed.
#[derive(Debug, Clone, PartialEq)]
pub enum Removal {
    /// A supplement went away; the book is unaffected.
    Removed,
    /// The main file went away and this supplement took its place.
    Promoted(FileId),
    /// Nothing could take the main file's place, so the book was deleted
    /// along with the files that were still attached to it.
    BookDeleted { book: Book, remaining: Vec<File> },
}

impl Repository {
    /// Record a newly discovered file, creating its book if asked to.
    ///
    /// The file becomes the book's main file when it may be one and the book
    /// has none yet; otherwise it is a supplement.
    #[instrument(skip_all, fields(path = %file.filepath.display()))]
    pub async fn ingest(&self, library_id: LibraryId, target: &IngestTarget, file: &NewFile) -> Result<Ingested> {
        self.retrying(|| async move {
            let mut tx = self.pool.begin().await.or_db()?;
            let (book_id, book_created) = match target {
                IngestTarget::NewBook { filepath, fields } => {
                    (Self::insert_book_tx(&mut tx, library_id, filepath, fields).await?, true)
                },
                IngestTarget::ExistingBook(id) => {
                    let book = Self::book_tx(&mut tx, *id).await?;
                    if book.library_id != library_id {
                        exn::bail!(ErrorKind::Invariant(format!("book {id} belongs to another library")));
                    }
                    (*id, false)
                },
            };
            let has_main: bool =
                sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM files WHERE book_id = ? AND file_role = 'main')")
                    .bind(book_id)
                    .fetch_one(&mut *tx)
                    .await
                    .or_db()?;
            let role = match file.can_be_main && !has_main {
                true => FileRole::Main,
                false => FileRole::Supplement,
            };
            let file_id = Self::insert_file_tx(
                &mut tx,
                library_id,
                book_id,
                &file.filepath,
                file.file_type,
                role,
                &file.fields,
            )
            .await?;
            if role == FileRole::Main {
                Self::set_primary_file_tx(&mut tx, book_id, file_id).await?;
            }
            tx.commit().await.or_db()?;
            Ok(Ingested {
                book_id,
                file_id,
                book_created,
                role,
            })
        })
        .await
    }

    async fn set_primary_file_tx(conn: &mut sqlx::SqliteConnection, book_id: BookId, file_id: FileId) -> Result<()> {
        sqlx::query("UPDATE books SET primary_file_id = ?, updated_at = ? WHERE id = ?")
            .bind(file_id)
            .bind(Self::now())
            .bind(book_id)
            .execute(conn)
            .await
            .or_db()?;
        Ok(())
    }

    /// Write reconciled metadata for a book, one of its files, or both, in a
    /// single transaction. Authors, series and narrators are replaced.
    #[instrument(skip_all, fields(book = ?book.map(|b| b.0), file = ?file.map(|f| f.0)))]
    pub async fn update_metadata(
        &self,
        library_id: LibraryId,
        book: Option<(BookId, &BookFields)>,
        file: Option<(FileId, &FileFields)>,
    ) -> Result<()> {
        self.retrying(|| async move {
            let mut tx = self.pool.begin().await.or_db()?;
            if let Some((id, fields)) = book {
                Self::book_tx(&mut tx, id).await?;
                Self::update_book_tx(&mut tx, library_id, id, fields).await?;
            }
            if let Some((id, fields)) = file {
                Self::file_tx(&mut tx, id).await?;
                Self::update_file_tx(&mut tx, library_id, id, fields).await?;
            }
            tx.commit().await.or_db()?;
            Ok(())
        })
        .await
    }

    /// Point a book and its files at their new locations.
    #[instrument(skip(self, relocation), fields(to = %relocation.book_filepath.display()))]
    pub async fn relocate(&self, book_id: BookId, relocation: &Relocation) -> Result<()> {
        self.retrying(|| async move {
            let mut tx = self.pool.begin().await.or_db()?;
            let now = Self::now();
            sqlx::query("UPDATE books SET filepath = ?, updated_at = ? WHERE id = ?")
                .bind(Self::sqlx_hates_paths(&relocation.book_filepath)?)
                .bind(now)
                .bind(book_id)
                .execute(&mut *tx)
                .await
                .or_db()?;
            for file in &relocation.files {
                let result = sqlx::query(include_str!("../../queries/relocate_file.sql"))
                    .bind(Self::sqlx_hates_paths(&file.filepath)?)
                    .bind(file.cover_filename.as_deref())
                    .bind(now)
                    .bind(file.id)
                    .bind(book_id)
                    .execute(&mut *tx)
                    .await
                    .or_db()?;
                if result.rows_affected() == 0 {
                    exn::bail!(ErrorKind::NotFound("file", file.id.0));
                }
            }
            tx.commit().await.or_db()?;
            Ok(())
        })
        .await
    }

    /// Remove a file from the catalog, keeping its book consistent.
    ///
    /// When the main file goes, the oldest remaining file whose type is in
    /// `promotable` becomes main. If there is none, the book is deleted.
    #[instrument(skip(self, promotable))]
    pub async fn remove_file(&self, id: FileId, promotable: &[FileType]) -> Result<Removal> {
        let types: Vec<&str> = promotable.iter().map(FileType::as_str).collect();
        let types = to_json(&types).or_raise(|| ErrorKind::InvalidData("promotable file types"))?;
        let types = types.as_str();
        self.retrying(|| async move {
            let mut tx = self.pool.begin().await.or_db()?;
            let file = Self::file_tx(&mut tx, id).await?;
            sqlx::query("DELETE FROM files WHERE id = ?").bind(id).execute(&mut *tx).await.or_db()?;
            let removal = match file.file_role {
                FileRole::Supplement => Removal::Removed,
                FileRole::Main => {
                    let candidate: Option<FileId> =
                        sqlx::query_scalar(include_str!("../../queries/next_main_candidate.sql"))
                            .bind(file.book_id)
                            .bind(types)
                            .fetch_optional(&mut *tx)
                            .await
                            .or_db()?;
                    match candidate {
                        Some(next) => {
                            sqlx::query("UPDATE files SET file_role = 'main', updated_at = ? WHERE id = ?")
                                .bind(Self::now())
                                .bind(next)
                                .execute(&mut *tx)
                                .await
                                .or_db()?;
                            Self::set_primary_file_tx(&mut tx, file.book_id, next).await?;
                            Removal::Promoted(next)
                        },
                        None => {
                            let book = Self::book_tx(&mut tx, file.book_id).await?;
                            let remaining = Self::files_for_book_tx(&mut tx, file.book_id).await?;
                            sqlx::query("DELETE FROM books WHERE id = ?")
                                .bind(file.book_id)
                                .execute(&mut *tx)
                                .await
                                .or_db()?;
                            Removal::BookDeleted { book, remaining }
                        },
                    }
                },
            };
            tx.commit().await.or_db()?;
            Ok(removal)
        })
        .await
    }
}
