use std::path::PathBuf;
use time::UtcDateTime;
use tome_media::models::SeriesEntry;
use tome_media::{DataSource, FileRole, Sourced};

use crate::error::Result;
use crate::ids::{BookId, FileId, LibraryId};
use crate::models::{FileDetail, Person, Series, source, sourced, timestamp};

#[derive(Debug, Clone, PartialEq)]
pub struct Book {
    pub id: BookId,
    pub library_id: LibraryId,
    /// Directory holding the book's files, or the file itself for a book
    /// sitting directly under a library root.
    pub filepath: PathBuf,
    pub title: Sourced<String>,
    pub subtitle: Option<Sourced<String>>,
    pub sort_title: Sourced<String>,
    pub description: Option<Sourced<String>>,
    pub authors_source: Option<DataSource>,
    pub series_source: Option<DataSource>,
    pub primary_file_id: Option<FileId>,
    pub created_at: UtcDateTime,
    pub updated_at: UtcDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SeriesMembership {
    pub series: Series,
    pub number: Option<f64>,
}

/// A book with everything linked to it, in display order.
#[derive(Debug, Clone, PartialEq)]
pub struct BookDetail {
    pub book: Book,
    pub authors: Vec<Person>,
    pub series: Vec<SeriesMembership>,
    pub files: Vec<FileDetail>,
}
impl BookDetail {
    pub fn main_file(&self) -> Option<&FileDetail> {
        self.files.iter().find(|f| f.file.file_role == FileRole::Main)
    }

    pub fn primary_author(&self) -> Option<&Person> {
        self.authors.first()
    }

    /// The current editable state, in the shape the reconciler works on.
    pub fn fields(&self) -> BookFields {
        BookFields {
            title: self.book.title.clone(),
            subtitle: self.book.subtitle.clone(),
            sort_title: self.book.sort_title.clone(),
            description: self.book.description.clone(),
            authors: self.book.authors_source.map(|src| {
                Sourced::new(self.authors.iter().map(|p| p.name.clone()).collect(), src)
            }),
            series: self.book.series_source.map(|src| {
                Sourced::new(
                    self.series.iter().map(|m| SeriesEntry::new(m.series.name.value.clone(), m.number)).collect(),
                    src,
                )
            }),
        }
    }
}

/// Editable book metadata, each field tagged with where it came from.
#[derive(Debug, Clone, PartialEq)]
pub struct BookFields {
    pub title: Sourced<String>,
    pub subtitle: Option<Sourced<String>>,
    pub sort_title: Sourced<String>,
    pub description: Option<Sourced<String>>,
    pub authors: Option<Sourced<Vec<String>>>,
    pub series: Option<Sourced<Vec<SeriesEntry>>>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct BookRow {
    pub(crate) id: BookId,
    pub(crate) library_id: LibraryId,
    pub(crate) filepath: String,
    pub(crate) title: String,
    pub(crate) title_source: String,
    pub(crate) subtitle: Option<String>,
    pub(crate) subtitle_source: Option<String>,
    pub(crate) sort_title: String,
    pub(crate) sort_title_source: String,
    pub(crate) description: Option<String>,
    pub(crate) description_source: Option<String>,
    pub(crate) authors_source: Option<String>,
    pub(crate) series_source: Option<String>,
    pub(crate) primary_file_id: Option<FileId>,
    pub(crate) created_at: i64,
    pub(crate) updated_at: i64,
}
impl TryFrom<BookRow> for Book {
    type Error = crate::error::Error;
    fn try_from(row: BookRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            library_id: row.library_id,
            filepath: PathBuf::from(row.filepath),
            title: Sourced::new(row.title, source(&row.title_source, "title source")?),
            subtitle: sourced(row.subtitle, row.subtitle_source, "subtitle source")?,
            sort_title: Sourced::new(row.sort_title, source(&row.sort_title_source, "sort title source")?),
            description: sourced(row.description, row.description_source, "description source")?,
            authors_source: row.authors_source.map(|s| source(&s, "authors source")).transpose()?,
            series_source: row.series_source.map(|s| source(&s, "series source")).transpose()?,
            primary_file_id: row.primary_file_id,
            created_at: timestamp(row.created_at, "book created at")?,
            updated_at: timestamp(row.updated_at, "book updated at")?,
        })
    }
}
