//! A library root held in memory, for tests.

use super::FileEntryStream;
use crate::error::{ErrorKind, Result};
use crate::{FileEntry, StorageBackend, validate_path};
use async_trait::async_trait;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

#[derive(Default)]
struct State {
    files: BTreeMap<PathBuf, Vec<u8>>,
    /// Renames touching a path that contains any of these fail.
    failing_renames: Vec<String>,
}
impl State {
    /// Folders only exist while something lives below them.
    fn is_dir(&self, path: &Path) -> bool {
        self.files.keys().any(|file| file != path && file.starts_with(path))
    }

    fn occupied(&self, path: &Path) -> bool {
        self.files.contains_key(path) || self.is_dir(path)
    }

    fn rename_fails(&self, from: &Path, to: &Path) -> bool {
        let (from, to) = (from.to_string_lossy(), to.to_string_lossy());
        self.failing_renames.iter().any(|needle| from.contains(needle.as_str()) || to.contains(needle.as_str()))
    }
}

/// An in-memory library root that can be told to fail renames, which is
/// how the organizer's rollback gets exercised.
///
/// ```
/// use tome_storage::backend::{MockBackend, StorageBackend};
/// use std::path::Path;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = MockBackend::with_files([("[Jane Doe] My Book/My Book.epub", b"PK..".to_vec())]);
/// assert!(backend.exists(Path::new("[Jane Doe] My Book")).await?);
/// # Ok(())
/// # }
/// ```
pub struct MockBackend {
    state: Mutex<State>,
}

impl MockBackend {
    /// Panics on a path that would be rejected at runtime, so a broken
    /// fixture fails the test that uses it.
    pub fn with_files(files: impl IntoIterator<Item = (impl Into<PathBuf>, impl Into<Vec<u8>>)>) -> Self {
        let files = files
            .into_iter()
            .map(|(path, data)| {
                let path: PathBuf = path.into();
                match validate_path(&path) {
                    Ok(valid) => (valid, data.into()),
                    Err(_) => panic!("invalid fixture path {}", path.display()),
                }
            })
            .collect();
        Self {
            state: Mutex::new(State {
                files,
                failing_renames: Vec::new(),
            }),
        }
    }

    /// Fail every rename from or to a path containing `needle`.
    pub async fn fail_renames_matching(&self, needle: impl Into<String>) {
        self.state.lock().await.failing_renames.push(needle.into());
    }

    pub async fn clear_failures(&self) {
        self.state.lock().await.failing_renames.clear();
    }

    /// Every file, sorted by path.
    pub async fn paths(&self) -> Vec<PathBuf> {
        self.state.lock().await.files.keys().cloned().collect()
    }
}
impl Default for MockBackend {
    fn default() -> Self {
        Self::with_files(Vec::<(PathBuf, Vec<u8>)>::new())
    }
}

#[async_trait]
impl StorageBackend for MockBackend {
    fn name(&self) -> &str {
        "memory"
    }

    fn walk(&self) -> FileEntryStream<'_> {
        Box::pin(async_stream::stream! {
            let entries: Vec<FileEntry> = {
                let state = self.state.lock().await;
                state
                    .files
                    .iter()
                    .map(|(path, data)| FileEntry { path: path.clone(), size: data.len() as u64 })
                    .collect()
            };
            for entry in entries {
                yield Ok(entry);
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(self.state.lock().await.occupied(&path))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        let path = validate_path(path)?;
        match self.state.lock().await.files.get(&path) {
            Some(data) => Ok(data.clone()),
            None => exn::bail!(ErrorKind::NotFound(path)),
        }
    }

    async fn read_head(&self, path: &Path, bytes: usize) -> Result<Vec<u8>> {
        let mut data = self.read(path).await?;
        data.truncate(bytes);
        Ok(data)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let path = validate_path(path)?;
        self.state.lock().await.files.insert(path, data.to_vec());
        Ok(())
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        match self.state.lock().await.files.remove(&path) {
            Some(_) => Ok(()),
            None => exn::bail!(ErrorKind::NotFound(path)),
        }
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let from = validate_path(from)?;
        let to = validate_path(to)?;
        let mut state = self.state.lock().await;
        if state.rename_fails(&from, &to) {
            exn::bail!(ErrorKind::Io(from));
        }
        if state.occupied(&to) {
            exn::bail!(ErrorKind::AlreadyExists(to));
        }
        let Some(data) = state.files.remove(&from) else {
            exn::bail!(ErrorKind::NotFound(from));
        };
        state.files.insert(to, data);
        Ok(())
    }

    async fn remove_dir(&self, path: &Path) -> Result<bool> {
        let path = validate_path(path)?;
        Ok(!self.state.lock().await.is_dir(&path))
    }

    async fn remove_dir_all(&self, path: &Path) -> Result<()> {
        let path = validate_path(path)?;
        self.state.lock().await.files.retain(|file, _| !file.starts_with(&path));
        Ok(())
    }
}
