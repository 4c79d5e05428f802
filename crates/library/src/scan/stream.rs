use async_stream::stream;
use exn::ResultExt;
use futures::{Stream, StreamExt};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tome_catalog::ids::{FileId, LibraryId};
use tome_catalog::models::Library;

use crate::Context;
use crate::error::{CatalogResultExt, ErrorKind, Result};
use crate::organize::{FileOrganizer, Organizer};
use crate::resolve::Resolver;
use crate::scan::discover::{Discovery, discover};
use crate::scan::file::{Applier, prepare};
use crate::scan::{Outcome, ScanError, ScanEvent, Stage};

/// Streams [`ScanEvent`]s while bringing one library's catalog in line with
/// its roots.
///
/// Files are parsed concurrently, up to the configured parse concurrency,
/// but applied to the catalog one at a time in discovery order: supported
/// files first so that supplements find the books they belong to.
pub fn scan(ctx: Arc<Context>, library_id: LibraryId) -> impl Stream<Item = Result<ScanEvent>> {
    stream! {
        for await event in scan_inner(ctx, library_id) {
            yield match event {
                Err(err) if err.is_retryable() => Err(err),
                event => event.or_raise(|| ErrorKind::Scan),
            };
        }
    }
}

fn scan_inner(ctx: Arc<Context>, library_id: LibraryId) -> impl Stream<Item = Result<ScanEvent>> {
    // `rustfmt` does not format macros that use braces. Wrap in parentheses!
    stream!({
        yield Ok(ScanEvent::Started);

        let library = match ctx.repo.library(library_id).await.or_catalog() {
            Ok(library) if library.deleted_at.is_some() => {
                yield Err(ErrorKind::LibraryDeleted(library_id.0).into());
                return;
            },
            Ok(library) => library,
            Err(err) => {
                yield Err(err);
                return;
            },
        };
        tracing::info!(library = %library.id, name = %library.name, roots = library.paths.len(), "scanning library");

        let Discovery {
            files,
            failed_roots,
            errors,
        } = discover(&ctx, &library).await;
        let seen: HashSet<PathBuf> = files.iter().map(|f| f.absolute()).collect();
        yield Ok(ScanEvent::DiscoveryComplete(files.len() as u64));
        for error in errors {
            yield Ok(ScanEvent::Failed(error));
        }

        let mut applier = Applier::new(&ctx, &library);
        let concurrency = ctx.scan.parse_concurrency.max(1);
        let mut prepared = std::pin::pin!(futures::stream::iter(files).map(|item| prepare(&ctx, item)).buffered(concurrency));
        while let Some(result) = prepared.next().await {
            let prepared = match result {
                Ok(prepared) => prepared,
                Err(error) => {
                    let path = error.path.clone();
                    yield Ok(ScanEvent::Failed(error));
                    yield Ok(ScanEvent::Processed { path, outcome: Outcome::Skipped });
                    continue;
                },
            };
            let path = prepared.item.absolute();
            let applied = match applier.apply(prepared).await {
                Ok(applied) => applied,
                Err(err) => {
                    yield Err(err);
                    return;
                },
            };
            for warning in applied.warnings {
                yield Ok(ScanEvent::Failed(warning));
            }
            yield Ok(ScanEvent::Processed { path, outcome: applied.outcome });
        }

        let organizer = Organizer::new(ctx.clone());
        for book_id in std::mem::take(&mut applier.to_organize) {
            if let Err(err) = organizer.organize_book_files(book_id).await {
                tracing::warn!(book = %book_id, error = ?err, "could not organize new book");
                let path = match ctx.repo.book(book_id).await {
                    Ok(book) => book.filepath,
                    Err(_) => PathBuf::from(book_id.to_string()),
                };
                yield Ok(ScanEvent::Failed(ScanError::new(path, Stage::Organize, err.to_string())));
            }
        }

        let catalogued = match ctx.repo.files_in_library(library.id).await.or_catalog() {
            Ok(files) => files,
            Err(err) => {
                yield Err(err);
                return;
            },
        };
        for file in catalogued {
            if seen.contains(&file.filepath) {
                continue;
            }
            match remove_if_gone(&ctx, &organizer, &library, &failed_roots, file.id).await {
                Ok(Removed::Gone(path)) => yield Ok(ScanEvent::Removed { path }),
                Ok(Removed::Kept) => {},
                Ok(Removed::GoneWithWarning(path, warning)) => {
                    yield Ok(ScanEvent::Failed(warning));
                    yield Ok(ScanEvent::Removed { path });
                },
                Err(err) => {
                    yield Err(err);
                    return;
                },
            }
        }

        if let Err(err) = Resolver::new(&ctx.repo).cleanup_orphans(library.id).await {
            yield Err(err);
            return;
        }
        yield Ok(ScanEvent::Complete);
    })
}

enum Removed {
    /// Still on disk, or already taken out with its book.
    Kept,
    Gone(PathBuf),
    /// Removed from the catalog, but tidying up the disk afterwards failed.
    GoneWithWarning(PathBuf, ScanError),
}

/// Forget a catalogued file that discovery did not see, once it is certain
/// the file really is gone.
async fn remove_if_gone(
    ctx: &Context,
    organizer: &Organizer,
    library: &Library,
    failed_roots: &[PathBuf],
    file_id: FileId,
) -> Result<Removed> {
    // Removing a book earlier in this pass may already have taken this file.
    let detail = match ctx.repo.file_detail(file_id).await {
        Ok(detail) => detail,
        Err(err) if matches!(&*err, tome_catalog::error::ErrorKind::NotFound(..)) => return Ok(Removed::Kept),
        Err(err) => return Err(err).or_catalog(),
    };
    let path = detail.file.filepath.clone();
    let Some(root) = library.root_for(&path) else {
        tracing::warn!(path = %path.display(), "catalogued file outside every library root");
        return Ok(Removed::Kept);
    };
    if failed_roots.iter().any(|failed| failed == root) {
        return Ok(Removed::Kept);
    }
    let located = ctx.locate(library, &path)?;
    if located.backend.exists(&located.relative).await.unwrap_or(true) {
        return Ok(Removed::Kept);
    }

    let removal = ctx.repo.remove_file(file_id, &ctx.promotable()).await.or_catalog()?;
    tracing::info!(path = %path.display(), removal = ?removal, "file gone from disk");
    match organizer.after_removal(library, &detail, &removal).await {
        Ok(()) => Ok(Removed::Gone(path)),
        Err(err) if err.is_retryable() => Err(err),
        Err(err) => {
            let warning = ScanError::new(&path, Stage::Organize, err.to_string());
            Ok(Removed::GoneWithWarning(path, warning))
        },
    }
}
