//! Finding a free name when the planned one is taken.

use exn::ResultExt;
use std::path::{Path, PathBuf};
use tome_storage::StorageBackend;

use crate::error::{Error, ErrorKind, Result};
use crate::naming::{is_variant_of, with_collision_suffix};

/// The folder a book should live in, relative to its root.
///
/// A book already sitting in `base` or one of its suffixed variants stays
/// put, so re-organizing never bounces a book between `Title (1)` and
/// `Title (2)`.
pub(super) async fn free_folder(
    backend: &dyn StorageBackend,
    current: Option<&Path>,
    base: &str,
    max_attempts: u32,
) -> Result<PathBuf> {
    if let Some(current) = current
        && current.components().count() == 1
        && current.to_str().is_some_and(|name| is_variant_of(name, base, false, max_attempts))
    {
        return Ok(current.to_path_buf());
    }
    for attempt in 0..=max_attempts {
        let candidate = PathBuf::from(candidate_name(base, attempt, false));
        if !backend.exists(&candidate).await.or_raise(|| ErrorKind::Storage)? {
            return Ok(candidate);
        }
    }
    Err(Error::from(ErrorKind::Conflict(PathBuf::from(base))))
}

/// Where a file called `base` can go inside `dir`. Returns `current` when the
/// file is already there under `base` or a suffixed variant of it.
pub(super) async fn free_file(
    backend: &dyn StorageBackend,
    dir: &Path,
    current: &Path,
    base: &str,
    max_attempts: u32,
) -> Result<PathBuf> {
    let current_name = current.file_name().and_then(|n| n.to_str());
    if current.parent() == Some(dir) && current_name.is_some_and(|name| is_variant_of(name, base, true, max_attempts)) {
        return Ok(current.to_path_buf());
    }
    for attempt in 0..=max_attempts {
        let candidate = dir.join(candidate_name(base, attempt, true));
        if !backend.exists(&candidate).await.or_raise(|| ErrorKind::Storage)? {
            return Ok(candidate);
        }
    }
    Err(Error::from(ErrorKind::Conflict(dir.join(base))))
}

fn candidate_name(base: &str, attempt: u32, is_file: bool) -> String {
    match attempt {
        0 => base.to_string(),
        n => with_collision_suffix(base, n, is_file),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tome_storage::backend::MockBackend;

    #[tokio::test]
    async fn test_folder_suffixes() {
        let backend = MockBackend::with_files([("[A] B/x.epub", b"x".to_vec()), ("[A] B (1)/y.epub", b"y".to_vec())]);
        let folder = free_folder(&backend, None, "[A] B", 100).await.unwrap();
        assert_eq!(folder, Path::new("[A] B (2)"));
        let folder = free_folder(&backend, Some(Path::new("[A] B (1)")), "[A] B", 100).await.unwrap();
        assert_eq!(folder, Path::new("[A] B (1)"));
    }

    #[tokio::test]
    async fn test_folder_conflict_after_max_attempts() {
        let backend = MockBackend::with_files([("[A] B/x.epub", b"x".to_vec()), ("[A] B (1)/y.epub", b"y".to_vec())]);
        let err = free_folder(&backend, None, "[A] B", 1).await.unwrap_err();
        assert!(matches!(&*err, ErrorKind::Conflict(_)));
    }

    #[tokio::test]
    async fn test_file_keeps_current_variant() {
        let backend = MockBackend::with_files([("dir/B.epub", b"x".to_vec()), ("dir/B (1).epub", b"y".to_vec())]);
        let dir = Path::new("dir");
        let kept = free_file(&backend, dir, Path::new("dir/B (1).epub"), "B.epub", 100).await.unwrap();
        assert_eq!(kept, Path::new("dir/B (1).epub"));
        let moved = free_file(&backend, dir, Path::new("elsewhere/B.epub"), "B.epub", 100).await.unwrap();
        assert_eq!(moved, Path::new("dir/B (2).epub"));
    }
}
