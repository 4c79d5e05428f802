//! Moving books and their files to where catalog metadata says they belong.
//!
//! Every book lives in one folder directly under its library root, named
//! from the folder template, and each file in it is named from the file
//! template. A move is all-or-nothing per book: the media file moves first,
//! then its side files (cover, sidecars). If any step fails, including the
//! catalog update that follows, every move is reversed and any folder created
//! for the move is removed again.
//!
//! Nothing here touches the disk unless the library has
//! `organize_file_structure` enabled.

mod conflict;
mod file;
mod journal;
mod stream;

pub use self::stream::{OrganizeEvent, organize_library};

use async_trait::async_trait;
use exn::ResultExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tome_catalog::ids::{BookId, FileId, LibraryId};
use tome_catalog::models::{File, FileDetail, Library};
use tome_catalog::{Relocation, Removal};
use tome_storage::relative_to;
use tracing::instrument;

use crate::Context;
use crate::error::{CatalogResultExt, ErrorKind, Result};
use crate::mirror::mirror_book;
use crate::organize::conflict::free_folder;
use crate::organize::file::{delete_side_files, delete_with_side_files, move_file, relocated};
use crate::organize::journal::{MoveJournal, remove_empty_dirs};

/// The narrow view of the organizer that catalog editing depends on.
#[async_trait]
pub trait FileOrganizer: Send + Sync {
    /// Move a book's files into the folder and names its metadata implies.
    async fn organize_book_files(&self, book_id: BookId) -> Result<Organized>;

    /// Rename a single file in place after its narrators changed. Returns
    /// the new path if anything moved.
    async fn rename_narrated_file(&self, file_id: FileId) -> Result<Option<PathBuf>>;

    async fn library_organize_setting(&self, library_id: LibraryId) -> Result<bool>;
}

/// The outcome of organizing one book.
#[derive(Debug, Clone, PartialEq)]
pub enum Organized {
    /// The library leaves its files where they are.
    Disabled,
    /// Everything was already in place.
    Unchanged,
    Moved { book_filepath: PathBuf, files: usize },
}

pub struct Organizer {
    ctx: Arc<Context>,
}
impl Organizer {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    /// Remove a file from the catalog and, when asked and the library
    /// organizes files, from disk.
    ///
    /// Removing a main file promotes the oldest remaining supplement of a
    /// supported type; without one the book goes too.
    #[instrument(skip(self))]
    pub async fn delete_file(&self, file_id: FileId, from_disk: bool) -> Result<Removal> {
        let repo = &self.ctx.repo;
        let detail = repo.file_detail(file_id).await.or_catalog()?;
        let library = repo.library(detail.file.library_id).await.or_catalog()?;
        let removal = repo.remove_file(file_id, &self.ctx.promotable()).await.or_catalog()?;
        if from_disk && library.organize_file_structure {
            let located = self.ctx.locate(&library, &detail.file.filepath)?;
            delete_with_side_files(located.backend.as_ref(), &detail, &located.relative).await?;
        }
        self.after_removal(&library, &detail, &removal).await?;
        Ok(removal)
    }

    /// Tidy up after a file left the catalog: refresh sidecars and naming for
    /// a promoted file, or clear out the remains of a deleted book.
    pub(crate) async fn after_removal(&self, library: &Library, removed: &FileDetail, removal: &Removal) -> Result<()> {
        let organize = library.organize_file_structure;
        let located = self.ctx.locate(library, &removed.file.filepath)?;
        let backend = located.backend.as_ref();
        if organize {
            delete_side_files(backend, removed, &located.relative).await?;
        }
        match removal {
            Removal::Removed => {},
            Removal::Promoted(promoted) => {
                tracing::info!(book = %removed.file.book_id, promoted = %promoted, "promoted supplement to main file");
                let detail = self.ctx.repo.book_detail(removed.file.book_id).await.or_catalog()?;
                mirror_book(&self.ctx, library, &detail).await?;
                self.organize_book_files(removed.file.book_id).await?;
            },
            Removal::BookDeleted { book, remaining } => {
                tracing::info!(book = %book.id, title = %book.title.value, "deleted book without a main file");
                if organize {
                    match book.filepath == removed.file.filepath {
                        true => {
                            for file in remaining {
                                self.delete_remaining(library, file).await?;
                            }
                        },
                        false => {
                            if let Some(dir) = relative_to(&located.root, &book.filepath) {
                                backend.remove_dir_all(&dir).await.or_raise(|| ErrorKind::Storage)?;
                            }
                        },
                    }
                }
            },
        }
        if organize && let Some(parent) = located.relative.parent() {
            remove_empty_dirs(backend, parent).await;
        }
        Ok(())
    }

    async fn delete_remaining(&self, library: &Library, file: &File) -> Result<()> {
        let located = self.ctx.locate(library, &file.filepath)?;
        let detail = FileDetail {
            file: file.clone(),
            narrators: Vec::new(),
        };
        delete_with_side_files(located.backend.as_ref(), &detail, &located.relative).await
    }

    async fn library(&self, library_id: LibraryId) -> Result<Library> {
        self.ctx.repo.library(library_id).await.or_catalog()
    }
}

#[async_trait]
impl FileOrganizer for Organizer {
    #[instrument(skip(self))]
    async fn organize_book_files(&self, book_id: BookId) -> Result<Organized> {
        let ctx = &self.ctx;
        let detail = ctx.repo.book_detail(book_id).await.or_catalog()?;
        let library = self.library(detail.book.library_id).await?;
        if !library.organize_file_structure {
            return Ok(Organized::Disabled);
        }
        let Some(main) = detail.main_file() else {
            return Ok(Organized::Unchanged);
        };
        let located = ctx.locate(&library, &main.file.filepath)?;
        let backend = located.backend.as_ref();
        let current_dir = match detail.book.filepath == main.file.filepath {
            true => None,
            false => relative_to(&located.root, &detail.book.filepath),
        };
        let folder_name = ctx.naming.folder_name(&detail)?;
        let folder = free_folder(backend, current_dir.as_deref(), &folder_name, ctx.max_collisions).await?;

        let mut journal = MoveJournal::new(backend);
        let mut moved = Vec::new();
        let outcome: Result<()> = async {
            journal.note_new_dir(&folder).await?;
            for file in &detail.files {
                let Some(current) = relative_to(&located.root, &file.file.filepath) else {
                    tracing::warn!(path = %file.file.filepath.display(), "file outside the book's root left alone");
                    continue;
                };
                let name = ctx.naming.file_name(&detail, file)?;
                if let Some((target, cover)) =
                    move_file(&mut journal, backend, file, &current, &folder, &name, ctx.max_collisions).await?
                {
                    moved.push(relocated(file, &located.root, &target, cover));
                }
            }
            Ok(())
        }
        .await;
        if let Err(err) = outcome {
            tracing::warn!(book = %book_id, error = ?err, "organize failed, rolling back");
            journal.rollback().await;
            return Err(err);
        }
        if journal.is_empty() && current_dir.as_deref() == Some(folder.as_path()) {
            return Ok(Organized::Unchanged);
        }

        let relocation = Relocation {
            book_filepath: located.root.join(&folder),
            files: moved,
        };
        if let Err(err) = ctx.repo.relocate(book_id, &relocation).await.or_catalog() {
            tracing::warn!(book = %book_id, error = ?err, "catalog relocation failed, rolling back");
            journal.rollback().await;
            return Err(err);
        }
        for dir in journal.vacated_dirs() {
            remove_empty_dirs(backend, &dir).await;
        }
        tracing::info!(book = %book_id, folder = %folder.display(), files = relocation.files.len(), "organized book");
        Ok(Organized::Moved {
            book_filepath: relocation.book_filepath,
            files: relocation.files.len(),
        })
    }

    #[instrument(skip(self))]
    async fn rename_narrated_file(&self, file_id: FileId) -> Result<Option<PathBuf>> {
        let ctx = &self.ctx;
        let file = ctx.repo.file_detail(file_id).await.or_catalog()?;
        let library = self.library(file.file.library_id).await?;
        if !library.organize_file_structure {
            return Ok(None);
        }
        let detail = ctx.repo.book_detail(file.file.book_id).await.or_catalog()?;
        let located = ctx.locate(&library, &file.file.filepath)?;
        let backend = located.backend.as_ref();
        let dir = located.relative.parent().unwrap_or(Path::new("")).to_path_buf();
        let name = ctx.naming.file_name(&detail, &file)?;

        let mut journal = MoveJournal::new(backend);
        let moved = match move_file(&mut journal, backend, &file, &located.relative, &dir, &name, ctx.max_collisions).await
        {
            Ok(Some((target, cover))) => relocated(&file, &located.root, &target, cover),
            Ok(None) => return Ok(None),
            Err(err) => {
                journal.rollback().await;
                return Err(err);
            },
        };
        // A book directly under the root is identified by its main file.
        let book_filepath = match detail.book.filepath == file.file.filepath {
            true => moved.filepath.clone(),
            false => detail.book.filepath.clone(),
        };
        let new_path = moved.filepath.clone();
        let relocation = Relocation {
            book_filepath,
            files: vec![moved],
        };
        if let Err(err) = ctx.repo.relocate(detail.book.id, &relocation).await.or_catalog() {
            journal.rollback().await;
            return Err(err);
        }
        Ok(Some(new_path))
    }

    async fn library_organize_setting(&self, library_id: LibraryId) -> Result<bool> {
        Ok(self.library(library_id).await?.organize_file_structure)
    }
}
