mod book;
mod facet;
mod file;
mod job;
mod library;
mod person;

pub use self::book::{Book, BookDetail, BookFields, SeriesMembership};
pub use self::file::{CoverRef, File, FileDetail, FileFields, Intrinsic};
pub use self::job::{Job, JobFilter, JobLog, JobStatus, LogLevel, NewJobLog};
pub use self::library::{CoverAspectRatio, Library, NewLibrary};
pub use self::person::{Person, Series, sort_name_for};
pub(crate) use self::book::BookRow;
pub(crate) use self::file::{FileColumns, FileRow};
pub(crate) use self::job::{JobLogRow, JobRow};
pub(crate) use self::library::LibraryRow;
pub(crate) use self::person::{MembershipRow, PersonRow, SeriesRow};

use crate::error::{Error, ErrorKind, Result};
use exn::ResultExt;
use time::UtcDateTime;
use tome_media::{DataSource, Sourced};

pub(crate) fn timestamp(value: i64, field: &'static str) -> Result<UtcDateTime> {
    UtcDateTime::from_unix_timestamp(value).or_raise(|| ErrorKind::InvalidData(field))
}

pub(crate) fn source(value: &str, field: &'static str) -> Result<DataSource> {
    value.parse::<DataSource>().or_raise(|| ErrorKind::InvalidData(field))
}

/// Pair an optional column with its optional source column.
pub(crate) fn sourced(
    value: Option<String>,
    source_column: Option<String>,
    field: &'static str,
) -> Result<Option<Sourced<String>>> {
    match (value, source_column) {
        (Some(value), Some(src)) => Ok(Some(Sourced::new(value, source(&src, field)?))),
        (Some(_), None) => Err(Error::from(ErrorKind::InvalidData(field))),
        (None, _) => Ok(None),
    }
}

/// Unicode-aware identity key for case-insensitive name matching.
pub fn name_key(name: &str) -> String {
    name.trim().to_lowercase()
}
