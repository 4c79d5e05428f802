use async_trait::async_trait;
use exn::ResultExt;
use std::path::Path;
use tome_storage::StorageBackend;

use crate::consts::{MP4_FTYP, ZIP_MAGIC};
use crate::error::{ErrorKind, Result};
use crate::models::{FileType, ParsedMetadata};
use crate::parser::MediaFileParser;

/// Verifies the container signature and reports nothing else.
///
/// Lets a deployment without format parsers still catalog files, with every
/// descriptive field coming from filepath conventions. A file whose header
/// doesn't match its extension is rejected the same way a real parser would.
pub struct IntrinsicParser;

#[async_trait]
impl MediaFileParser for IntrinsicParser {
    fn name(&self) -> &str {
        "intrinsic"
    }

    fn file_types(&self) -> &[FileType] {
        &[FileType::Epub, FileType::M4b, FileType::Cbz]
    }

    async fn parse(&self, backend: &dyn StorageBackend, path: &Path) -> Result<ParsedMetadata> {
        let file_type = FileType::from_path(path);
        let head = backend.read_head(path, 8).await.or_raise(|| ErrorKind::Read(path.to_path_buf()))?;
        let valid = match file_type {
            FileType::Epub | FileType::Cbz => head.starts_with(ZIP_MAGIC),
            FileType::M4b => head.get(4..8) == Some(MP4_FTYP),
            FileType::Other => exn::bail!(ErrorKind::Unsupported(path.to_path_buf())),
        };
        if !valid {
            exn::bail!(ErrorKind::Malformed {
                file_type,
                reason: "unrecognised container signature".to_string(),
            });
        }
        Ok(ParsedMetadata::default())
    }
}
