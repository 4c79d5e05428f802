use exn::ResultExt;
use facet_json::{from_str as from_json, to_string as to_json};
use std::path::PathBuf;
use time::UtcDateTime;
use tome_media::models::{Chapter, Identifier};
use tome_media::{DataSource, FileRole, FileType, Sourced};

use crate::error::{Error, ErrorKind, Result};
use crate::ids::{BookId, FileId, LibraryId};
use crate::models::facet::{ChapterProxy, IdentifierProxy, flatten_chapters, nest_chapters};
use crate::models::{Person, source, timestamp};

/// A cover image stored next to its file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverRef {
    pub filename: String,
    pub mime: String,
    pub source: DataSource,
}

/// Facts about the file itself. These are never edited and never written to
/// a sidecar; every scan refreshes them.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Intrinsic {
    pub size: u64,
    pub duration: Option<f64>,
    pub bitrate: Option<u32>,
    pub codec: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct File {
    pub id: FileId,
    pub library_id: LibraryId,
    pub book_id: BookId,
    pub filepath: PathBuf,
    pub file_type: FileType,
    pub file_role: FileRole,
    pub intrinsic: Intrinsic,
    pub cover: Option<CoverRef>,
    pub narrators_source: Option<DataSource>,
    pub identifiers: Option<Sourced<Vec<Identifier>>>,
    pub chapters: Option<Sourced<Vec<Chapter>>>,
    pub created_at: UtcDateTime,
    pub updated_at: UtcDateTime,
}

#[derive(Debug, Clone, PartialEq)]
pub struct FileDetail {
    pub file: File,
    pub narrators: Vec<Person>,
}
impl FileDetail {
    pub fn fields(&self) -> FileFields {
        FileFields {
            narrators: self
                .file
                .narrators_source
                .map(|src| Sourced::new(self.narrators.iter().map(|p| p.name.clone()).collect(), src)),
            identifiers: self.file.identifiers.clone(),
            chapters: self.file.chapters.clone(),
            cover: self.file.cover.clone(),
            intrinsic: self.file.intrinsic.clone(),
        }
    }
}

/// File metadata in the shape the reconciler works on.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FileFields {
    pub narrators: Option<Sourced<Vec<String>>>,
    pub identifiers: Option<Sourced<Vec<Identifier>>>,
    pub chapters: Option<Sourced<Vec<Chapter>>>,
    pub cover: Option<CoverRef>,
    pub intrinsic: Intrinsic,
}

#[derive(sqlx::FromRow)]
pub(crate) struct FileRow {
    pub(crate) id: FileId,
    pub(crate) library_id: LibraryId,
    pub(crate) book_id: BookId,
    pub(crate) filepath: String,
    pub(crate) file_type: String,
    pub(crate) file_role: String,
    pub(crate) size: i64,
    pub(crate) cover_filename: Option<String>,
    pub(crate) cover_mime: Option<String>,
    pub(crate) cover_source: Option<String>,
    pub(crate) duration: Option<f64>,
    pub(crate) bitrate: Option<i64>,
    pub(crate) codec: Option<String>,
    pub(crate) narrators_source: Option<String>,
    pub(crate) identifiers: String,
    pub(crate) identifiers_source: Option<String>,
    pub(crate) chapters: String,
    pub(crate) chapters_source: Option<String>,
    pub(crate) created_at: i64,
    pub(crate) updated_at: i64,
}

/// Column values for the JSON and cover columns of a file row.
pub(crate) struct FileColumns {
    pub(crate) size: i64,
    pub(crate) bitrate: Option<i64>,
    pub(crate) identifiers: String,
    pub(crate) identifiers_source: Option<&'static str>,
    pub(crate) chapters: String,
    pub(crate) chapters_source: Option<&'static str>,
    pub(crate) narrators_source: Option<&'static str>,
    pub(crate) cover_filename: Option<String>,
    pub(crate) cover_mime: Option<String>,
    pub(crate) cover_source: Option<&'static str>,
}
impl TryFrom<&FileFields> for FileColumns {
    type Error = Error;
    fn try_from(fields: &FileFields) -> Result<Self> {
        let identifiers = fields
            .identifiers
            .as_ref()
            .map(|i| i.value.iter().map(IdentifierProxy::from).collect::<Vec<_>>())
            .unwrap_or_default();
        let chapters = fields.chapters.as_ref().map(|c| flatten_chapters(&c.value)).unwrap_or_default();
        Ok(Self {
            size: i64::try_from(fields.intrinsic.size).or_raise(|| ErrorKind::InvalidData("file size"))?,
            bitrate: fields.intrinsic.bitrate.map(i64::from),
            identifiers: to_json(&identifiers).or_raise(|| ErrorKind::InvalidData("identifiers"))?,
            identifiers_source: fields.identifiers.as_ref().map(|i| i.source.as_str()),
            chapters: to_json(&chapters).or_raise(|| ErrorKind::InvalidData("chapters"))?,
            chapters_source: fields.chapters.as_ref().map(|c| c.source.as_str()),
            narrators_source: fields.narrators.as_ref().map(|n| n.source.as_str()),
            cover_filename: fields.cover.as_ref().map(|c| c.filename.clone()),
            cover_mime: fields.cover.as_ref().map(|c| c.mime.clone()),
            cover_source: fields.cover.as_ref().map(|c| c.source.as_str()),
        })
    }
}

impl TryFrom<FileRow> for File {
    type Error = Error;
    fn try_from(row: FileRow) -> Result<Self> {
        let identifiers = match row.identifiers_source {
            Some(src) => Some(Sourced::new(
                from_json::<Vec<IdentifierProxy>>(&row.identifiers)
                    .or_raise(|| ErrorKind::InvalidData("identifiers"))?
                    .into_iter()
                    .map(Identifier::from)
                    .collect(),
                source(&src, "identifiers source")?,
            )),
            None => None,
        };
        let chapters = match row.chapters_source {
            Some(src) => Some(Sourced::new(
                nest_chapters(from_json::<Vec<ChapterProxy>>(&row.chapters).or_raise(|| ErrorKind::InvalidData("chapters"))?),
                source(&src, "chapters source")?,
            )),
            None => None,
        };
        let cover = match (row.cover_filename, row.cover_mime, row.cover_source) {
            (Some(filename), Some(mime), Some(src)) => Some(CoverRef {
                filename,
                mime,
                source: source(&src, "cover source")?,
            }),
            (None, _, _) => None,
            _ => exn::bail!(ErrorKind::InvalidData("cover")),
        };
        Ok(Self {
            id: row.id,
            library_id: row.library_id,
            book_id: row.book_id,
            filepath: PathBuf::from(row.filepath),
            file_type: row.file_type.parse::<FileType>().or_raise(|| ErrorKind::InvalidData("file type"))?,
            file_role: row.file_role.parse::<FileRole>().or_raise(|| ErrorKind::InvalidData("file role"))?,
            intrinsic: Intrinsic {
                size: u64::try_from(row.size).or_raise(|| ErrorKind::InvalidData("file size"))?,
                duration: row.duration,
                bitrate: row.bitrate.map(|b| u32::try_from(b).or_raise(|| ErrorKind::InvalidData("bitrate"))).transpose()?,
                codec: row.codec,
            },
            cover,
            narrators_source: row.narrators_source.map(|s| source(&s, "narrators source")).transpose()?,
            identifiers,
            chapters,
            created_at: timestamp(row.created_at, "file created at")?,
            updated_at: timestamp(row.updated_at, "file updated at")?,
        })
    }
}
