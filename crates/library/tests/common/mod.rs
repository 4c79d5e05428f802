#![allow(dead_code)]

use async_trait::async_trait;
use exn::ResultExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tome_catalog::models::{BookDetail, CoverAspectRatio, Library, NewLibrary};
use tome_catalog::{Database, Repository};
use tome_library::{Context, Mounter, ScanResult, StaticMounter, scan_library};
use tome_media::error::{ErrorKind, Result};
use tome_media::models::{Cover, SeriesEntry};
use tome_media::{FileType, MediaFileParser, ParsedMetadata, ParserRegistry};
use tome_storage::StorageBackend;
use tome_storage::backend::MockBackend;

pub const ROOT: &str = "/library";

/// Reads `key=value` lines instead of a real container format.
pub struct LineParser;

#[async_trait]
impl MediaFileParser for LineParser {
    fn name(&self) -> &str {
        "lines"
    }

    fn file_types(&self) -> &[FileType] {
        &[FileType::Epub, FileType::M4b, FileType::Cbz]
    }

    async fn parse(&self, backend: &dyn StorageBackend, path: &Path) -> Result<ParsedMetadata> {
        let bytes = backend.read(path).await.or_raise(|| ErrorKind::Read(path.to_path_buf()))?;
        let text = String::from_utf8_lossy(&bytes);
        if text.starts_with("corrupt") {
            exn::bail!(ErrorKind::Malformed {
                file_type: FileType::from_path(path),
                reason: "not a container".to_string(),
            });
        }
        let mut metadata = ParsedMetadata::default();
        for line in text.lines() {
            match line.split_once('=') {
                Some(("title", value)) => metadata.title = Some(value.to_string()),
                Some(("author", value)) => metadata.authors.push(value.to_string()),
                Some(("narrator", value)) => metadata.narrators.push(value.to_string()),
                Some(("series", value)) => {
                    let (name, number) = value.split_once('#').unwrap_or((value, ""));
                    metadata.series.push(SeriesEntry::new(name, number.parse().ok()));
                },
                Some(("duration", value)) => metadata.duration = value.parse().ok(),
                Some(("cover", value)) => {
                    metadata.cover = Some(Cover {
                        data: value.as_bytes().to_vec(),
                        mime: "image/jpeg".to_string(),
                    })
                },
                _ => {},
            }
        }
        Ok(metadata)
    }
}

pub struct Harness {
    pub db: Database,
    pub ctx: Arc<Context>,
    pub backend: Arc<MockBackend>,
    pub library: Library,
}
impl Harness {
    pub async fn new(files: &[(&str, &str)], organize: bool) -> Self {
        let backend = Arc::new(MockBackend::with_files(
            files.iter().map(|(path, content)| (PathBuf::from(path), content.as_bytes().to_vec())),
        ));
        let mounter = StaticMounter::new().with(ROOT, backend.clone());
        Self::with_mounter(backend, Arc::new(mounter), &[ROOT], organize).await
    }

    pub async fn with_mounter(backend: Arc<MockBackend>, mounter: Arc<dyn Mounter>, roots: &[&str], organize: bool) -> Self {
        let db = Database::connect_in_memory().await.unwrap();
        let repo = Repository::from(&db);
        let library = repo
            .create_library(&NewLibrary {
                name: "Books".to_string(),
                paths: roots.iter().map(PathBuf::from).collect(),
                organize_file_structure: organize,
                cover_aspect_ratio: CoverAspectRatio::Book,
            })
            .await
            .unwrap();
        let ctx = Context::new(repo, mounter)
            .unwrap()
            .with_parsers(ParserRegistry::new().register(Arc::new(LineParser)));
        Self {
            db,
            ctx: Arc::new(ctx),
            backend,
            library,
        }
    }

    /// Stop mirroring metadata to sidecars, so a rescan only sees what the
    /// media files and their paths say.
    pub fn without_sidecars(self) -> Self {
        let Ok(ctx) = Arc::try_unwrap(self.ctx) else {
            panic!("context is shared");
        };
        Self {
            ctx: Arc::new(ctx.with_sidecars(false)),
            ..self
        }
    }

    pub async fn scan(&self) -> ScanResult {
        scan_library(&self.ctx, self.library.id).await.unwrap()
    }

    pub async fn paths(&self) -> Vec<String> {
        self.backend.paths().await.into_iter().map(|p| p.display().to_string()).collect()
    }

    pub async fn books(&self) -> Vec<BookDetail> {
        let repo = self.ctx.repo();
        let mut details = Vec::new();
        for book in repo.books_in_library(self.library.id).await.unwrap() {
            details.push(repo.book_detail(book.id).await.unwrap());
        }
        details
    }

    pub async fn only_book(&self) -> BookDetail {
        let mut books = self.books().await;
        assert_eq!(books.len(), 1, "expected exactly one book");
        books.remove(0)
    }
}

pub fn absolute(relative: &str) -> PathBuf {
    Path::new(ROOT).join(relative)
}
