use exn::ResultExt;
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use tome_storage::StorageBackend;
use tracing::instrument;

use crate::error::{ErrorKind, Result};
use crate::migrate::upgrade;
use crate::models::{BookSidecar, FileSidecar};

pub const SIDECAR_SUFFIX: &str = ".metadata.json";

/// Location of the book-level sidecar that travels with a book's main file.
pub fn book_sidecar_path(main_file: &Path) -> PathBuf {
    let stem = main_file.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
    main_file.with_file_name(format!("{stem}{SIDECAR_SUFFIX}"))
}

/// Location of the sidecar describing one particular file.
pub fn file_sidecar_path(file: &Path) -> PathBuf {
    let name = file.file_name().map(|s| s.to_string_lossy()).unwrap_or_default();
    file.with_file_name(format!("{name}{SIDECAR_SUFFIX}"))
}

pub fn is_sidecar_path(path: &Path) -> bool {
    path.file_name().and_then(|n| n.to_str()).is_some_and(|n| n.ends_with(SIDECAR_SUFFIX))
}

pub async fn read_book(backend: &dyn StorageBackend, main_file: &Path) -> Result<Option<BookSidecar>> {
    read(backend, &book_sidecar_path(main_file)).await
}

pub async fn read_file(backend: &dyn StorageBackend, file: &Path) -> Result<Option<FileSidecar>> {
    read(backend, &file_sidecar_path(file)).await
}

/// Write the book sidecar, returning `false` when the existing one already
/// holds exactly this content.
pub async fn write_book(backend: &dyn StorageBackend, main_file: &Path, sidecar: &BookSidecar) -> Result<bool> {
    write(backend, &book_sidecar_path(main_file), sidecar).await
}

/// Write the file sidecar, returning `false` when nothing changed.
pub async fn write_file(backend: &dyn StorageBackend, file: &Path, sidecar: &FileSidecar) -> Result<bool> {
    write(backend, &file_sidecar_path(file), sidecar).await
}

#[instrument(level = "debug", skip(backend))]
async fn read<T: DeserializeOwned>(backend: &dyn StorageBackend, path: &Path) -> Result<Option<T>> {
    let bytes = match backend.read(path).await {
        Ok(bytes) => bytes,
        Err(e) if e.is_not_found() => return Ok(None),
        Err(e) => return Err(e).or_raise(|| ErrorKind::Read(path.to_path_buf())),
    };
    let mut document: Map<String, Value> =
        serde_json::from_slice(&bytes).or_raise(|| ErrorKind::Malformed(path.to_path_buf()))?;
    upgrade(&mut document)?;
    let sidecar = serde_json::from_value(Value::Object(document)).or_raise(|| ErrorKind::Malformed(path.to_path_buf()))?;
    Ok(Some(sidecar))
}

#[instrument(level = "debug", skip(backend, sidecar))]
async fn write<T: Serialize>(backend: &dyn StorageBackend, path: &Path, sidecar: &T) -> Result<bool> {
    let mut bytes = serde_json::to_vec_pretty(sidecar).or_raise(|| ErrorKind::Write(path.to_path_buf()))?;
    bytes.push(b'\n');
    match backend.read(path).await {
        Ok(existing) if existing == bytes => return Ok(false),
        Ok(_) => {},
        Err(e) if e.is_not_found() => {},
        Err(e) => return Err(e).or_raise(|| ErrorKind::Read(path.to_path_buf())),
    }
    backend.write(path, &bytes).await.or_raise(|| ErrorKind::Write(path.to_path_buf()))?;
    tracing::debug!(path = %path.display(), "sidecar written");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CURRENT_VERSION, PersonEntry};
    use rstest::rstest;
    use tome_media::models::{Identifier, SeriesEntry};
    use tome_storage::backend::MockBackend;

    #[rstest]
    #[case("[A] B/B.epub", "[A] B/B.metadata.json", "[A] B/B.epub.metadata.json")]
    #[case("B {Reader}.m4b", "B {Reader}.metadata.json", "B {Reader}.m4b.metadata.json")]
    fn test_paths(#[case] file: &str, #[case] book: &str, #[case] per_file: &str) {
        assert_eq!(book_sidecar_path(Path::new(file)), Path::new(book));
        assert_eq!(file_sidecar_path(Path::new(file)), Path::new(per_file));
        assert!(is_sidecar_path(Path::new(book)));
        assert!(!is_sidecar_path(Path::new(file)));
    }

    #[tokio::test]
    async fn test_write_then_read_skips_identical_rewrite() {
        let backend = MockBackend::default();
        let sidecar = BookSidecar {
            title: Some("My Book".to_string()),
            authors: vec![PersonEntry::new("Jane Doe")],
            series: vec![SeriesEntry::new("Saga", Some(2.0))],
            ..Default::default()
        };
        let main = Path::new("[Jane Doe] My Book/My Book.epub");
        assert!(write_book(&backend, main, &sidecar).await.unwrap());
        assert!(!write_book(&backend, main, &sidecar).await.unwrap());
        assert_eq!(read_book(&backend, main).await.unwrap(), Some(sidecar));
    }

    #[tokio::test]
    async fn test_missing_is_none() {
        let backend = MockBackend::default();
        assert_eq!(read_file(&backend, Path::new("x.m4b")).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_reads_v0() {
        let backend = MockBackend::with_files([(
            "Old.metadata.json",
            br#"{"title": "Old", "authors": ["Jane Doe"]}"#.to_vec(),
        )]);
        let sidecar = read_book(&backend, Path::new("Old.epub")).await.unwrap().unwrap();
        assert_eq!(sidecar.version, CURRENT_VERSION);
        assert_eq!(sidecar.authors, vec![PersonEntry::new("Jane Doe")]);
    }

    #[tokio::test]
    async fn test_never_writes_intrinsic_or_source_fields() {
        let backend = MockBackend::default();
        let sidecar = FileSidecar {
            narrators: vec![PersonEntry::new("John Roe")],
            identifiers: vec![Identifier::new("asin", "B000")],
            ..Default::default()
        };
        write_file(&backend, Path::new("a.m4b"), &sidecar).await.unwrap();
        let raw = String::from_utf8(backend.read(Path::new("a.m4b.metadata.json")).await.unwrap()).unwrap();
        assert!(!raw.contains("duration"));
        assert!(!raw.contains("source"));
        assert!(raw.contains("\"version\": 1"));
    }

    #[tokio::test]
    async fn test_malformed() {
        let backend = MockBackend::with_files([("Bad.metadata.json", b"not json".to_vec())]);
        let err = read_book(&backend, Path::new("Bad.epub")).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Malformed(_)));
    }
}
