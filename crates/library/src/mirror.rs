//! Mirrors authoritative catalog state into sidecar files.

use exn::ResultExt;
use tome_catalog::models::{BookDetail, FileDetail, Library, Person};
use tome_media::models::SeriesEntry;
use tome_media::{DataSource, FileRole};
use tome_sidecar::{BookSidecar, FileSidecar, PersonEntry};
use tracing::instrument;

use crate::Context;
use crate::error::{ErrorKind, Result};

/// Sort names only travel when somebody chose them, by hand or in a
/// sidecar; generated ones are regenerated on the way back in.
fn person_entry(person: &Person) -> PersonEntry {
    let chosen = matches!(person.sort_name.source, DataSource::Manual | DataSource::Sidecar);
    PersonEntry {
        name: person.name.clone(),
        sort_name: chosen.then(|| person.sort_name.value.clone()),
    }
}

pub(crate) fn book_sidecar(detail: &BookDetail) -> BookSidecar {
    let book = &detail.book;
    BookSidecar {
        title: Some(book.title.value.clone()),
        subtitle: book.subtitle.as_ref().map(|s| s.value.clone()),
        sort_title: Some(book.sort_title.value.clone()),
        description: book.description.as_ref().map(|d| d.value.clone()),
        authors: detail.authors.iter().map(person_entry).collect(),
        series: detail.series.iter().map(|m| SeriesEntry::new(m.series.name.value.clone(), m.number)).collect(),
        ..BookSidecar::default()
    }
}

pub(crate) fn file_sidecar(detail: &FileDetail) -> FileSidecar {
    let file = &detail.file;
    FileSidecar {
        narrators: detail.narrators.iter().map(person_entry).collect(),
        identifiers: file.identifiers.as_ref().map(|i| i.value.clone()).unwrap_or_default(),
        chapters: file.chapters.as_ref().map(|c| c.value.clone()).unwrap_or_default(),
        ..FileSidecar::default()
    }
}

/// Write the book sidecar next to the main file and a file sidecar next to
/// every file that has something to say. Unchanged sidecars are left alone.
#[instrument(skip_all, fields(book = detail.book.id.0))]
pub(crate) async fn mirror_book(ctx: &Context, library: &Library, detail: &BookDetail) -> Result<()> {
    if !ctx.write_sidecars {
        return Ok(());
    }
    for file in &detail.files {
        let located = ctx.locate(library, &file.file.filepath)?;
        let backend = located.backend.as_ref();
        if file.file.file_role == FileRole::Main {
            tome_sidecar::write_book(backend, &located.relative, &book_sidecar(detail))
                .await
                .or_raise(|| ErrorKind::Sidecar)?;
        }
        let sidecar = file_sidecar(file);
        if !sidecar.is_empty() {
            tome_sidecar::write_file(backend, &located.relative, &sidecar).await.or_raise(|| ErrorKind::Sidecar)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tome_catalog::ids::{LibraryId, PersonId};
    use tome_media::Sourced;

    #[test]
    fn test_generated_sort_names_are_not_written() {
        let generated = Person {
            id: PersonId(1),
            library_id: LibraryId(1),
            name: "Jane Doe".to_string(),
            sort_name: Sourced::new("Doe, Jane".to_string(), DataSource::Filepath),
        };
        let manual = Person {
            sort_name: Sourced::new("Doe-Smith, Jane".to_string(), DataSource::Manual),
            ..generated.clone()
        };
        assert_eq!(person_entry(&generated), PersonEntry::new("Jane Doe"));
        assert_eq!(person_entry(&manual).sort_name.as_deref(), Some("Doe-Smith, Jane"));
    }
}
