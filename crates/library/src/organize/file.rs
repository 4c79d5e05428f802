use exn::ResultExt;
use std::path::{Path, PathBuf};
use tome_catalog::RelocatedFile;
use tome_catalog::models::FileDetail;
use tome_media::FileRole;
use tome_sidecar::{book_sidecar_path, file_sidecar_path};
use tome_storage::StorageBackend;

use crate::error::{ErrorKind, Result};
use crate::naming::cover_file_name;
use crate::organize::conflict::free_file;
use crate::organize::journal::MoveJournal;

/// Files that travel with a media file: its cover, its file sidecar, and for
/// a main file the book sidecar. Paths are relative to the root.
pub(super) fn side_files(file: &FileDetail, relative: &Path) -> Vec<PathBuf> {
    let mut paths = Vec::new();
    if let Some(cover) = &file.file.cover {
        paths.push(relative.with_file_name(&cover.filename));
    }
    paths.push(file_sidecar_path(relative));
    // Keyed to the role, so a supplement sharing the main file's stem never
    // drags the book sidecar along.
    if file.file.file_role == FileRole::Main {
        paths.push(book_sidecar_path(relative));
    }
    paths
}

/// Move one media file into `dir` under `name` (or a free variant of it),
/// then its side files. Returns `None` when the file is already in place.
///
/// Every move is journaled; the caller rolls the journal back on error.
pub(super) async fn move_file(
    journal: &mut MoveJournal<'_>,
    backend: &dyn StorageBackend,
    file: &FileDetail,
    current: &Path,
    dir: &Path,
    name: &str,
    max_attempts: u32,
) -> Result<Option<(PathBuf, Option<String>)>> {
    let target = free_file(backend, dir, current, name, max_attempts).await?;
    if target == current {
        return Ok(None);
    }
    let Some(target_name) = target.file_name().and_then(|n| n.to_str()) else {
        exn::bail!(ErrorKind::Conflict(target.clone()));
    };
    journal.rename(current, &target).await?;

    let cover_filename = file.file.cover.as_ref().map(|cover| {
        let extension = Path::new(&cover.filename).extension().and_then(|e| e.to_str()).unwrap_or("jpg");
        cover_file_name(target_name, extension)
    });
    if let (Some(cover), Some(new_name)) = (&file.file.cover, &cover_filename) {
        journal.rename_if_exists(&current.with_file_name(&cover.filename), &target.with_file_name(new_name)).await?;
    }
    journal.rename_if_exists(&file_sidecar_path(current), &file_sidecar_path(&target)).await?;
    if file.file.file_role == FileRole::Main {
        journal.rename_if_exists(&book_sidecar_path(current), &book_sidecar_path(&target)).await?;
    }
    Ok(Some((target, cover_filename)))
}

/// Delete a file and whatever travels with it. Missing files are fine.
pub(super) async fn delete_with_side_files(backend: &dyn StorageBackend, file: &FileDetail, relative: &Path) -> Result<()> {
    delete_quietly(backend, relative).await?;
    delete_side_files(backend, file, relative).await
}

/// Delete only what travels with a file, leaving the file itself.
pub(super) async fn delete_side_files(backend: &dyn StorageBackend, file: &FileDetail, relative: &Path) -> Result<()> {
    for path in side_files(file, relative) {
        delete_quietly(backend, &path).await?;
    }
    Ok(())
}

async fn delete_quietly(backend: &dyn StorageBackend, path: &Path) -> Result<()> {
    match backend.delete(path).await {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "deleted");
            Ok(())
        },
        Err(err) if err.is_not_found() => Ok(()),
        Err(err) => Err(err).or_raise(|| ErrorKind::Storage),
    }
}

pub(super) fn relocated(file: &FileDetail, root: &Path, target: &Path, cover_filename: Option<String>) -> RelocatedFile {
    RelocatedFile {
        id: file.file.id,
        filepath: root.join(target),
        cover_filename,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tome_catalog::models::{CoverRef, File, Intrinsic};
    use tome_media::{DataSource, FileType};
    use tome_storage::backend::MockBackend;

    fn detail(path: &str, role: FileRole, cover: Option<&str>) -> FileDetail {
        let now = time::UtcDateTime::now();
        FileDetail {
            file: File {
                id: 1.into(),
                library_id: 1.into(),
                book_id: 1.into(),
                filepath: PathBuf::from("/lib").join(path),
                file_type: FileType::from_path(Path::new(path)),
                file_role: role,
                intrinsic: Intrinsic::default(),
                cover: cover.map(|filename| CoverRef {
                    filename: filename.to_string(),
                    mime: "image/jpeg".to_string(),
                    source: DataSource::Format,
                }),
                narrators_source: None,
                identifiers: None,
                chapters: None,
                created_at: now,
                updated_at: now,
            },
            narrators: Vec::new(),
        }
    }

    #[tokio::test]
    async fn test_side_files_follow_the_main_file() {
        let backend = MockBackend::with_files([
            ("old/a.epub", b"a".to_vec()),
            ("old/a.epub.cover.jpg", b"c".to_vec()),
            ("old/a.metadata.json", b"{}".to_vec()),
        ]);
        let file = detail("old/a.epub", FileRole::Main, Some("a.epub.cover.jpg"));
        let mut journal = MoveJournal::new(&backend);
        let (target, cover) = move_file(&mut journal, &backend, &file, Path::new("old/a.epub"), Path::new("[X] A"), "A.epub", 10)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(target, Path::new("[X] A/A.epub"));
        assert_eq!(cover.as_deref(), Some("A.epub.cover.jpg"));
        assert_eq!(
            backend.paths().await,
            vec![
                PathBuf::from("[X] A/A.epub"),
                PathBuf::from("[X] A/A.epub.cover.jpg"),
                PathBuf::from("[X] A/A.metadata.json"),
            ]
        );
    }

    #[tokio::test]
    async fn test_supplement_leaves_book_sidecar() {
        let backend = MockBackend::with_files([("d/a.pdf", b"a".to_vec()), ("d/a.metadata.json", b"{}".to_vec())]);
        let file = detail("d/a.pdf", FileRole::Supplement, None);
        delete_with_side_files(&backend, &file, Path::new("d/a.pdf")).await.unwrap();
        assert_eq!(backend.paths().await, vec![PathBuf::from("d/a.metadata.json")]);
    }
}
