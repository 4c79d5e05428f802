use std::fmt::{Display, Formatter, Result as FmtResult};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use time::UtcDateTime;

use crate::error::{Error, ErrorKind, Result};
use crate::ids::LibraryId;
use crate::models::timestamp;

/// Which file's cover represents a book that has both an ebook and an
/// audiobook edition.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CoverAspectRatio {
    #[default]
    Book,
    Audiobook,
    BookFallbackAudiobook,
    AudiobookFallbackBook,
}
impl CoverAspectRatio {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Book => "book",
            Self::Audiobook => "audiobook",
            Self::BookFallbackAudiobook => "book_fallback_audiobook",
            Self::AudiobookFallbackBook => "audiobook_fallback_book",
        }
    }
}
impl FromStr for CoverAspectRatio {
    type Err = Error;
    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s {
            "book" => Self::Book,
            "audiobook" => Self::Audiobook,
            "book_fallback_audiobook" => Self::BookFallbackAudiobook,
            "audiobook_fallback_book" => Self::AudiobookFallbackBook,
            _ => exn::bail!(ErrorKind::InvalidData("cover aspect ratio")),
        })
    }
}
impl Display for CoverAspectRatio {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Library {
    pub id: LibraryId,
    pub name: String,
    /// Whether the organizer may move and rename files on disk.
    pub organize_file_structure: bool,
    pub cover_aspect_ratio: CoverAspectRatio,
    pub paths: Vec<PathBuf>,
    pub created_at: UtcDateTime,
    pub deleted_at: Option<UtcDateTime>,
}
impl Library {
    /// The library root that contains `path`, if any.
    pub fn root_for(&self, path: &Path) -> Option<&Path> {
        self.paths.iter().map(PathBuf::as_path).filter(|root| path.starts_with(root)).max_by_key(|root| root.as_os_str().len())
    }
}

#[derive(Debug, Clone)]
pub struct NewLibrary {
    pub name: String,
    pub paths: Vec<PathBuf>,
    pub organize_file_structure: bool,
    pub cover_aspect_ratio: CoverAspectRatio,
}

#[derive(sqlx::FromRow)]
pub(crate) struct LibraryRow {
    pub(crate) id: LibraryId,
    pub(crate) name: String,
    pub(crate) organize_file_structure: bool,
    pub(crate) cover_aspect_ratio: String,
    pub(crate) created_at: i64,
    pub(crate) deleted_at: Option<i64>,
}
impl LibraryRow {
    pub(crate) fn into_library(self, paths: Vec<PathBuf>) -> Result<Library> {
        Ok(Library {
            id: self.id,
            name: self.name,
            organize_file_structure: self.organize_file_structure,
            cover_aspect_ratio: self.cover_aspect_ratio.parse()?,
            paths,
            created_at: timestamp(self.created_at, "library created at")?,
            deleted_at: self.deleted_at.map(|t| timestamp(t, "library deleted at")).transpose()?,
        })
    }
}
