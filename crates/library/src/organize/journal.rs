use exn::ResultExt;
use std::path::{Path, PathBuf};
use tome_storage::StorageBackend;

use crate::error::{ErrorKind, Result};

/// Records every move made while organizing one book so the whole set can
/// be reversed if a later step fails.
pub(super) struct MoveJournal<'a> {
    backend: &'a dyn StorageBackend,
    moves: Vec<(PathBuf, PathBuf)>,
    created_dirs: Vec<PathBuf>,
}
impl<'a> MoveJournal<'a> {
    pub(super) fn new(backend: &'a dyn StorageBackend) -> Self {
        Self {
            backend,
            moves: Vec::new(),
            created_dirs: Vec::new(),
        }
    }

    pub(super) fn is_empty(&self) -> bool {
        self.moves.is_empty()
    }

    /// Directories that lost files, deepest first.
    pub(super) fn vacated_dirs(&self) -> Vec<PathBuf> {
        let mut dirs: Vec<PathBuf> = self
            .moves
            .iter()
            .filter_map(|(from, to)| from.parent().filter(|p| Some(*p) != to.parent()).map(Path::to_path_buf))
            .filter(|p| !p.as_os_str().is_empty())
            .collect();
        dirs.sort_by(|a, b| b.components().count().cmp(&a.components().count()).then_with(|| a.cmp(b)));
        dirs.dedup();
        dirs
    }

    /// Remember that `dir` did not exist before this organize run.
    pub(super) async fn note_new_dir(&mut self, dir: &Path) -> Result<()> {
        if !self.backend.exists(dir).await.or_raise(|| ErrorKind::Storage)? {
            self.created_dirs.push(dir.to_path_buf());
        }
        Ok(())
    }

    pub(super) async fn rename(&mut self, from: &Path, to: &Path) -> Result<()> {
        self.backend.rename(from, to).await.or_raise(|| ErrorKind::Storage)?;
        self.moves.push((from.to_path_buf(), to.to_path_buf()));
        Ok(())
    }

    /// Move a side file if it is there. Returns whether anything moved.
    pub(super) async fn rename_if_exists(&mut self, from: &Path, to: &Path) -> Result<bool> {
        if from == to || !self.backend.exists(from).await.or_raise(|| ErrorKind::Storage)? {
            return Ok(false);
        }
        self.rename(from, to).await?;
        Ok(true)
    }

    /// Put everything back where it was, newest move first. Failures are
    /// logged and skipped so one stuck file doesn't strand the rest.
    pub(super) async fn rollback(self) {
        for (from, to) in self.moves.iter().rev() {
            if let Err(err) = self.backend.rename(to, from).await {
                tracing::error!(from = %to.display(), to = %from.display(), error = ?err, "rollback move failed");
            }
        }
        for dir in self.created_dirs.iter().rev() {
            match self.backend.remove_dir(dir).await {
                Ok(true) => {},
                Ok(false) => tracing::warn!(dir = %dir.display(), "created folder not empty after rollback"),
                Err(err) => tracing::warn!(dir = %dir.display(), error = ?err, "could not remove created folder"),
            }
        }
    }
}

/// Remove `start` and then each parent in turn, stopping at the first
/// directory that still has entries or at the library root.
pub(super) async fn remove_empty_dirs(backend: &dyn StorageBackend, start: &Path) {
    let mut dir = Some(start);
    while let Some(current) = dir.filter(|d| !d.as_os_str().is_empty()) {
        match backend.remove_dir(current).await {
            Ok(true) => dir = current.parent(),
            Ok(false) => break,
            Err(err) => {
                tracing::debug!(dir = %current.display(), error = ?err, "stopped removing empty folders");
                break;
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tome_storage::backend::MockBackend;

    #[tokio::test]
    async fn test_rollback_restores_everything() {
        let backend = MockBackend::with_files([("a.epub", b"a".to_vec()), ("a.epub.metadata.json", b"{}".to_vec())]);
        let mut journal = MoveJournal::new(&backend);
        journal.note_new_dir(Path::new("Book")).await.unwrap();
        journal.rename(Path::new("a.epub"), Path::new("Book/a.epub")).await.unwrap();
        assert!(journal.rename_if_exists(Path::new("a.epub.metadata.json"), Path::new("Book/a.epub.metadata.json")).await.unwrap());
        assert!(!journal.rename_if_exists(Path::new("a.epub.cover.jpg"), Path::new("Book/a.epub.cover.jpg")).await.unwrap());
        journal.rollback().await;
        assert_eq!(backend.paths().await, vec![PathBuf::from("a.epub"), PathBuf::from("a.epub.metadata.json")]);
    }

    #[tokio::test]
    async fn test_vacated_dirs_deepest_first() {
        let backend = MockBackend::with_files([("x/y/a.epub", b"a".to_vec()), ("x/b.pdf", b"b".to_vec())]);
        let mut journal = MoveJournal::new(&backend);
        journal.rename(Path::new("x/y/a.epub"), Path::new("Book/a.epub")).await.unwrap();
        journal.rename(Path::new("x/b.pdf"), Path::new("Book/b.pdf")).await.unwrap();
        assert_eq!(journal.vacated_dirs(), vec![PathBuf::from("x/y"), PathBuf::from("x")]);
    }

    #[tokio::test]
    async fn test_vacated_dirs_are_listed_once() {
        let backend = MockBackend::with_files([
            ("x/a.epub", b"a".to_vec()),
            ("y/b.epub", b"b".to_vec()),
            ("x/c.pdf", b"c".to_vec()),
        ]);
        let mut journal = MoveJournal::new(&backend);
        for name in ["x/a.epub", "y/b.epub", "x/c.pdf"] {
            let to = Path::new("Book").join(Path::new(name).file_name().unwrap());
            journal.rename(Path::new(name), &to).await.unwrap();
        }
        assert_eq!(journal.vacated_dirs(), vec![PathBuf::from("x"), PathBuf::from("y")]);
    }

    #[tokio::test]
    async fn test_remove_empty_dirs_stops_at_content() {
        let local = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(local.path().join("a/b/c")).unwrap();
        std::fs::write(local.path().join("a/keep.txt"), b"keep").unwrap();
        let backend = tome_storage::backend::LocalBackend::new("test", local.path()).unwrap();
        remove_empty_dirs(&backend, Path::new("a/b/c")).await;
        assert!(!local.path().join("a/b").exists());
        assert!(local.path().join("a/keep.txt").exists());
    }
}
