use async_stream::stream;
use futures::Stream;
use tome_catalog::ids::{BookId, LibraryId};

use crate::error::{CatalogResultExt, ErrorKind, Result};
use crate::organize::{FileOrganizer, Organized, Organizer};

/// Progress events emitted by [`organize_library`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started), exactly once.
/// 2. [`DiscoveryComplete`](Self::DiscoveryComplete), exactly once, with the
///    number of books.
/// 3. [`Organized`](Self::Organized) or [`Failed`](Self::Failed), once per book.
/// 4. [`Complete`](Self::Complete), exactly once.
///
/// A failure to list the library's books terminates the stream early and
/// [`Complete`](Self::Complete) is never emitted.
#[derive(Debug)]
pub enum OrganizeEvent {
    Started,
    DiscoveryComplete(u64),
    Organized { book: BookId, outcome: Organized },
    /// Organizing one book failed and was rolled back; the rest carry on.
    Failed { book: BookId, message: String },
    Complete,
}

/// Organize every book of a library, one book at a time.
///
/// Books are handled sequentially: two books may want the same folder name,
/// and collision resolution relies on seeing the previous book's result.
pub fn organize_library(organizer: &Organizer, library_id: LibraryId) -> impl Stream<Item = Result<OrganizeEvent>> + '_ {
    stream!({
        yield Ok(OrganizeEvent::Started);

        let library = match organizer.ctx.repo.library(library_id).await.or_catalog() {
            Ok(library) => library,
            Err(err) => {
                yield Err(err);
                return;
            },
        };
        if library.deleted_at.is_some() {
            yield Err(ErrorKind::LibraryDeleted(library_id.0).into());
            return;
        }
        let books = match organizer.ctx.repo.books_in_library(library_id).await.or_catalog() {
            Ok(books) => books,
            Err(err) => {
                yield Err(err);
                return;
            },
        };
        yield Ok(OrganizeEvent::DiscoveryComplete(books.len() as u64));

        for book in books {
            match organizer.organize_book_files(book.id).await {
                Ok(outcome) => yield Ok(OrganizeEvent::Organized { book: book.id, outcome }),
                Err(err) => {
                    tracing::warn!(book = %book.id, error = ?err, "could not organize book");
                    yield Ok(OrganizeEvent::Failed { book: book.id, message: err.to_string() });
                },
            }
        }

        yield Ok(OrganizeEvent::Complete);
    })
}
