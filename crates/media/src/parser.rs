use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;
use tome_storage::StorageBackend;

use crate::error::{ErrorKind, Result};
use crate::intrinsic::IntrinsicParser;
use crate::models::{FileType, ParsedMetadata};

/// Extracts normalized metadata from one family of container formats.
///
/// Implementations read through the [`StorageBackend`] serving the library
/// root, so they work the same against local disks and in-memory test
/// backends. A parser only ever looks at metadata headers.
#[async_trait]
pub trait MediaFileParser: Send + Sync {
    /// Used in logs and per-file error reports.
    fn name(&self) -> &str;

    /// The file types this parser understands.
    fn file_types(&self) -> &[FileType];

    async fn parse(&self, backend: &dyn StorageBackend, path: &Path) -> Result<ParsedMetadata>;
}

pub type ParserHandle = Arc<dyn MediaFileParser>;

/// Dispatches files to the parser registered for their type.
///
/// Later registrations take precedence over earlier ones, so a format parser
/// registered after the defaults replaces [`IntrinsicParser`] for its types.
#[derive(Clone, Default)]
pub struct ParserRegistry {
    parsers: Vec<ParserHandle>,
}
impl ParserRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry that catalogs every known type using header sniffing only.
    pub fn with_defaults() -> Self {
        Self::new().register(Arc::new(IntrinsicParser))
    }

    pub fn register(mut self, parser: ParserHandle) -> Self {
        self.parsers.push(parser);
        self
    }

    pub fn for_type(&self, file_type: FileType) -> Option<&ParserHandle> {
        self.parsers.iter().rev().find(|p| p.file_types().contains(&file_type))
    }

    /// Whether files of this type can be catalogued as a book's main file.
    pub fn supports(&self, file_type: FileType) -> bool {
        self.for_type(file_type).is_some()
    }

    /// Parse a file with whichever parser claims its extension.
    #[tracing::instrument(level = "debug", skip(self, backend), fields(backend = backend.name()))]
    pub async fn parse(&self, backend: &dyn StorageBackend, path: &Path) -> Result<ParsedMetadata> {
        let file_type = FileType::from_path(path);
        let parser = self
            .for_type(file_type)
            .ok_or_else(|| exn::Exn::from(ErrorKind::Unsupported(path.to_path_buf())))?;
        let metadata = parser.parse(backend, path).await?;
        Ok(metadata.normalized())
    }
}
