use std::path::Path;
use tome_catalog::ids::BookId;
use tome_catalog::models::{BookFields, CoverRef, File, Intrinsic, Library, name_key};
use tome_catalog::{IngestTarget, NewFile};
use tome_media::models::Cover;
use tome_media::{DataSource, FileRole, FileType, ParsedMetadata, Sourced, infer_from_path};
use tome_sidecar::{BookSidecar, FileSidecar, PersonEntry};
use tome_storage::StorageBackend;

use crate::Context;
use crate::error::{CatalogResultExt, Result};
use crate::mirror::mirror_book;
use crate::naming::cover_file_name;
use crate::reconcile::{BookFacts, FileFacts, Layer};
use crate::scan::discover::{Discovered, Kind};
use crate::scan::{Outcome, ScanError, Stage};

/// Everything read from disk for one file, ready to be applied to the
/// catalog. Preparing touches no catalog state, so it runs concurrently.
pub(super) struct Prepared {
    pub(super) item: Discovered,
    metadata: ParsedMetadata,
    book_sidecar: Option<BookSidecar>,
    file_sidecar: Option<FileSidecar>,
    pub(super) warnings: Vec<ScanError>,
}

pub(super) async fn prepare(ctx: &Context, item: Discovered) -> std::result::Result<Prepared, ScanError> {
    let backend = item.backend.as_ref();
    let mut warnings = Vec::new();
    let (metadata, book_sidecar) = match item.kind {
        Kind::Supported(_) => {
            let metadata = ctx.parsers.parse(backend, &item.relative).await.map_err(|err| {
                tracing::warn!(path = %item.relative.display(), error = ?err, "could not parse file");
                ScanError::new(item.absolute(), Stage::Parse, err.to_string())
            })?;
            let sidecar = tome_sidecar::read_book(backend, &item.relative).await;
            (metadata, sidecar_or_warn(sidecar, &item, &mut warnings))
        },
        Kind::Supplement => (ParsedMetadata::default(), None),
    };
    let file_sidecar = tome_sidecar::read_file(backend, &item.relative).await;
    let file_sidecar = sidecar_or_warn(file_sidecar, &item, &mut warnings);
    Ok(Prepared {
        item,
        metadata,
        book_sidecar,
        file_sidecar,
        warnings,
    })
}

/// A broken sidecar is reported and ignored; the file is still catalogued
/// from its other sources.
fn sidecar_or_warn<T>(
    result: tome_sidecar::error::Result<Option<T>>,
    item: &Discovered,
    warnings: &mut Vec<ScanError>,
) -> Option<T> {
    result.unwrap_or_else(|err| {
        tracing::warn!(path = %item.relative.display(), error = ?err, "ignoring unreadable sidecar");
        warnings.push(ScanError::new(item.absolute(), Stage::Sidecar, err.to_string()));
        None
    })
}

pub(super) struct Applied {
    pub(super) outcome: Outcome,
    pub(super) warnings: Vec<ScanError>,
}

/// Applies prepared files to the catalog, one at a time.
pub(super) struct Applier<'a> {
    ctx: &'a Context,
    library: &'a Library,
    /// Root-level books touched during this scan. They are organized once
    /// every file is in, so later root-level files can still join them.
    pub(super) to_organize: Vec<BookId>,
}
impl<'a> Applier<'a> {
    pub(super) fn new(ctx: &'a Context, library: &'a Library) -> Self {
        Self {
            ctx,
            library,
            to_organize: Vec::new(),
        }
    }

    pub(super) async fn apply(&mut self, prepared: Prepared) -> Result<Applied> {
        match prepared.item.kind {
            Kind::Supported(file_type) => self.apply_supported(prepared, file_type).await,
            Kind::Supplement => self.apply_supplement(prepared).await,
        }
    }

    async fn apply_supported(&mut self, prepared: Prepared, file_type: FileType) -> Result<Applied> {
        let Prepared {
            item,
            metadata,
            book_sidecar,
            file_sidecar,
            mut warnings,
        } = prepared;
        let absolute = item.absolute();
        let from_path = infer_from_path(&item.relative);

        let mut book_layers = Vec::with_capacity(3);
        let mut file_layers = Vec::with_capacity(3);
        if let Some(sidecar) = &book_sidecar {
            book_layers.push(Layer::new(DataSource::Sidecar, BookFacts::from(sidecar)));
        }
        if let Some(sidecar) = &file_sidecar {
            file_layers.push(Layer::new(DataSource::Sidecar, FileFacts::from(sidecar)));
        }
        book_layers.push(Layer::new(DataSource::Format, BookFacts::from(&metadata)));
        file_layers.push(Layer::new(DataSource::Format, FileFacts::from(&metadata)));
        book_layers.push(Layer::new(DataSource::Filepath, BookFacts::from(&from_path)));
        file_layers.push(Layer::new(DataSource::Filepath, FileFacts::from(&from_path)));

        let intrinsic = Intrinsic {
            size: item.size,
            duration: metadata.duration,
            bitrate: metadata.bitrate,
            codec: metadata.codec.clone(),
        };
        let cover = match &metadata.cover {
            Some(cover) => store_cover(item.backend.as_ref(), &item.relative, cover, self.library.organize_file_structure)
                .await
                .map_err(|message| warnings.push(ScanError::new(&absolute, Stage::Cover, message)))
                .ok()
                .flatten(),
            None => None,
        };

        let sidecar_people = book_sidecar.iter().flat_map(|s| &s.authors);
        let sidecar_people = sidecar_people.chain(file_sidecar.iter().flat_map(|s| &s.narrators));
        self.adopt_sidecar_sort_names(sidecar_people).await?;

        let repo = &self.ctx.repo;
        let reconciler = &self.ctx.reconciler;
        let library_id = self.library.id;

        if let Some(existing) = repo.file_by_path(library_id, &absolute).await.or_catalog()? {
            let outcome = self.refresh(&existing, &book_layers, &file_layers, intrinsic, cover).await?;
            self.mirror(existing.book_id, &absolute, &mut warnings).await;
            return Ok(Applied { outcome, warnings });
        }

        let Some(book) = reconciler.book(None, &book_layers) else {
            warnings.push(ScanError::new(&absolute, Stage::Parse, "no title from any source"));
            return Ok(Applied {
                outcome: Outcome::Skipped,
                warnings,
            });
        };
        let file = reconciler.file(None, &file_layers, intrinsic, cover);
        let parent = item.relative.parent().filter(|p| !p.as_os_str().is_empty());
        let target = match parent {
            Some(parent) => {
                let dir = item.root.join(parent);
                match repo.book_by_path(library_id, &dir).await.or_catalog()? {
                    Some(existing) => IngestTarget::ExistingBook(existing.id),
                    None => IngestTarget::NewBook {
                        filepath: dir,
                        fields: book.value.clone(),
                    },
                }
            },
            None => match self.coalesce_target(&book.value).await? {
                Some(existing) => IngestTarget::ExistingBook(existing),
                None => IngestTarget::NewBook {
                    filepath: absolute.clone(),
                    fields: book.value.clone(),
                },
            },
        };
        let new_file = NewFile {
            filepath: absolute.clone(),
            file_type,
            can_be_main: true,
            fields: file.value,
        };
        let ingested = repo.ingest(library_id, &target, &new_file).await.or_catalog()?;
        tracing::info!(
            path = %absolute.display(),
            book = %ingested.book_id,
            role = ingested.role.as_str(),
            new_book = ingested.book_created,
            "catalogued file"
        );

        // A file that takes over as main of an existing book gets to describe it.
        if !ingested.book_created && ingested.role == FileRole::Main {
            let detail = repo.book_detail(ingested.book_id).await.or_catalog()?;
            if let Some(reconciled) = reconciler.book(Some(&detail.fields()), &book_layers)
                && reconciled.is_changed()
            {
                repo.update_metadata(library_id, Some((ingested.book_id, &reconciled.value)), None)
                    .await
                    .or_catalog()?;
            }
        }
        if parent.is_none() && self.library.organize_file_structure && !self.to_organize.contains(&ingested.book_id) {
            self.to_organize.push(ingested.book_id);
        }
        self.mirror(ingested.book_id, &absolute, &mut warnings).await;
        Ok(Applied {
            outcome: Outcome::Created,
            warnings,
        })
    }

    /// Re-reconcile a file the catalog already knows. Nothing is written
    /// unless a field actually changes.
    async fn refresh(
        &self,
        existing: &File,
        book_layers: &[Layer<BookFacts>],
        file_layers: &[Layer<FileFacts>],
        intrinsic: Intrinsic,
        cover: Option<CoverRef>,
    ) -> Result<Outcome> {
        let repo = &self.ctx.repo;
        let reconciler = &self.ctx.reconciler;
        let current = repo.file_detail(existing.id).await.or_catalog()?;
        let file = reconciler.file(Some(&current.fields()), file_layers, intrinsic, cover);
        let book = match existing.file_role {
            FileRole::Main => {
                let detail = repo.book_detail(existing.book_id).await.or_catalog()?;
                reconciler.book(Some(&detail.fields()), book_layers).filter(|b| b.is_changed())
            },
            FileRole::Supplement => None,
        };
        if book.is_none() && !file.is_changed() {
            return Ok(Outcome::Unchanged);
        }
        tracing::debug!(
            file = %existing.id,
            book_fields = ?book.as_ref().map(|b| &b.changed),
            file_fields = ?file.changed,
            "metadata changed"
        );
        repo.update_metadata(
            self.library.id,
            book.as_ref().map(|b| (existing.book_id, &b.value)),
            file.is_changed().then_some((existing.id, &file.value)),
        )
        .await
        .or_catalog()?;
        Ok(Outcome::Updated)
    }

    async fn apply_supplement(&mut self, prepared: Prepared) -> Result<Applied> {
        let Prepared {
            item,
            file_sidecar,
            warnings,
            ..
        } = prepared;
        let repo = &self.ctx.repo;
        let absolute = item.absolute();
        let layers: Vec<_> = file_sidecar
            .iter()
            .map(|sidecar| Layer::new(DataSource::Sidecar, FileFacts::from(sidecar)))
            .collect();
        let intrinsic = Intrinsic {
            size: item.size,
            ..Intrinsic::default()
        };
        self.adopt_sidecar_sort_names(file_sidecar.iter().flat_map(|s| &s.narrators)).await?;

        if let Some(existing) = repo.file_by_path(self.library.id, &absolute).await.or_catalog()? {
            let outcome = self.refresh(&existing, &[], &layers, intrinsic, None).await?;
            return Ok(Applied { outcome, warnings });
        }
        let Some(book_id) = self.owning_book(&item).await? else {
            tracing::debug!(path = %absolute.display(), "supplement outside any book folder");
            return Ok(Applied {
                outcome: Outcome::Skipped,
                warnings,
            });
        };
        let file = self.ctx.reconciler.file(None, &layers, intrinsic, None);
        let new_file = NewFile {
            filepath: absolute.clone(),
            file_type: FileType::Other,
            can_be_main: false,
            fields: file.value,
        };
        repo.ingest(self.library.id, &IngestTarget::ExistingBook(book_id), &new_file)
            .await
            .or_catalog()?;
        tracing::info!(path = %absolute.display(), book = %book_id, "catalogued supplement");
        Ok(Applied {
            outcome: Outcome::Created,
            warnings,
        })
    }

    /// The nearest enclosing folder that is a book.
    async fn owning_book(&self, item: &Discovered) -> Result<Option<BookId>> {
        let mut dir = item.relative.parent();
        while let Some(current) = dir.filter(|d| !d.as_os_str().is_empty()) {
            let path = item.root.join(current);
            if let Some(book) = self.ctx.repo.book_by_path(self.library.id, &path).await.or_catalog()? {
                return Ok(Some(book.id));
            }
            dir = current.parent();
        }
        Ok(None)
    }

    /// An existing root-level book with the same title and primary author.
    async fn coalesce_target(&self, fields: &BookFields) -> Result<Option<BookId>> {
        let repo = &self.ctx.repo;
        let author = fields.authors.as_ref().and_then(|a| a.value.first()).map(|a| name_key(a));
        for candidate in repo.books_by_title(self.library.id, &fields.title.value).await.or_catalog()? {
            let detail = repo.book_detail(candidate.id).await.or_catalog()?;
            let root_level = detail.main_file().is_some_and(|main| main.file.filepath == detail.book.filepath);
            let primary = detail.primary_author().map(|p| name_key(&p.name));
            if root_level && primary == author {
                return Ok(Some(candidate.id));
            }
        }
        Ok(None)
    }

    /// Sort names carried by sidecars are applied before the people are
    /// linked, so a rebuilt catalog keeps them.
    async fn adopt_sidecar_sort_names(&self, people: impl Iterator<Item = &PersonEntry>) -> Result<()> {
        for person in people {
            if let Some(sort_name) = &person.sort_name {
                let sort_name = Sourced::new(sort_name.clone(), DataSource::Sidecar);
                self.ctx
                    .repo
                    .find_or_create_person(self.library.id, &person.name, Some(&sort_name))
                    .await
                    .or_catalog()?;
            }
        }
        Ok(())
    }

    async fn mirror(&self, book_id: BookId, path: &Path, warnings: &mut Vec<ScanError>) {
        let result = async {
            let detail = self.ctx.repo.book_detail(book_id).await.or_catalog()?;
            mirror_book(self.ctx, self.library, &detail).await
        }
        .await;
        if let Err(err) = result {
            tracing::warn!(book = %book_id, error = ?err, "could not write sidecars");
            warnings.push(ScanError::new(path, Stage::Sidecar, err.to_string()));
        }
    }
}

/// Write an embedded cover next to its file unless it is already there.
///
/// Libraries that do not organize their files are never written to; a cover
/// someone already put in place is still picked up.
async fn store_cover(
    backend: &dyn StorageBackend,
    relative: &Path,
    cover: &Cover,
    writable: bool,
) -> std::result::Result<Option<CoverRef>, String> {
    let file_name = relative.file_name().and_then(|n| n.to_str()).ok_or("file name is not valid UTF-8")?;
    let filename = cover_file_name(file_name, cover.extension());
    let path = relative.with_file_name(&filename);
    let exists = backend.exists(&path).await.map_err(|err| err.to_string())?;
    match (exists, writable) {
        (true, _) => {},
        (false, true) => {
            backend.write(&path, &cover.data).await.map_err(|err| err.to_string())?;
            tracing::debug!(path = %path.display(), "wrote cover");
        },
        (false, false) => return Ok(None),
    }
    Ok(Some(CoverRef {
        filename,
        mime: cover.mime.clone(),
        source: DataSource::Format,
    }))
}
