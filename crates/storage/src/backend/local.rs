//! Library roots on a mounted filesystem.

use crate::backend::FileEntryStream;
use crate::error::{ErrorKind, Result};
use crate::{FileEntry, StorageBackend, validate_path};
use async_stream::stream;
use async_trait::async_trait;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncReadExt;

/// A library root on local disk, NFS, or anything else the OS mounts.
///
/// ```no_run
/// use tome_storage::backend::LocalBackend;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let backend = LocalBackend::new("audiobooks", "/srv/media/audiobooks")?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct LocalBackend {
    name: String,
    root: PathBuf,
}
impl LocalBackend {
    /// The root must already exist. A missing root is almost always an
    /// unmounted drive, and scanning an empty folder in its place would
    /// remove every book.
    pub fn new(name: impl Into<String>, root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        if !root.is_absolute() || !root.is_dir() {
            exn::bail!(ErrorKind::InvalidPath(root));
        }
        Ok(Self { name: name.into(), root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn full(&self, relative: &Path) -> Result<PathBuf> {
        Ok(self.root.join(validate_path(relative)?))
    }

    async fn make_parent(full: &Path, relative: &Path) -> Result<()> {
        match full.parent() {
            Some(parent) => fs::create_dir_all(parent).await.map_err(|e| ErrorKind::io(e, relative)),
            None => Ok(()),
        }
    }
}

/// Moves between filesystems: copy, then drop the original. A partial copy
/// is cleaned up again.
async fn copy_across(source: &Path, target: &Path) -> std::io::Result<()> {
    if let Err(err) = fs::copy(source, target).await {
        let _ = fs::remove_file(target).await;
        return Err(err);
    }
    if let Err(err) = fs::remove_file(source).await {
        tracing::warn!(source = %source.display(), error = %err, "copied across filesystems but the original stayed behind");
    }
    Ok(())
}

#[async_trait]
impl StorageBackend for LocalBackend {
    fn name(&self) -> &str {
        &self.name
    }

    fn walk(&self) -> FileEntryStream<'_> {
        Box::pin(stream! {
            let mut pending = vec![PathBuf::new()];
            while let Some(dir) = pending.pop() {
                let mut entries = match fs::read_dir(self.root.join(&dir)).await {
                    Ok(entries) => entries,
                    Err(err) => {
                        yield Err(ErrorKind::io(err, &dir));
                        continue;
                    },
                };
                loop {
                    let entry = match entries.next_entry().await {
                        Ok(Some(entry)) => entry,
                        Ok(None) => break,
                        Err(err) => {
                            yield Err(ErrorKind::io(err, &dir));
                            break;
                        },
                    };
                    let relative = dir.join(entry.file_name());
                    // Symlinks are not followed.
                    match entry.metadata().await {
                        Ok(meta) if meta.is_dir() => pending.push(relative),
                        Ok(meta) if meta.is_file() => yield Ok(FileEntry { path: relative, size: meta.len() }),
                        Ok(_) => {},
                        Err(err) => yield Err(ErrorKind::io(err, &relative)),
                    }
                }
            }
        })
    }

    async fn exists(&self, path: &Path) -> Result<bool> {
        fs::try_exists(self.full(path)?).await.map_err(|e| ErrorKind::io(e, path))
    }

    async fn read(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(self.full(path)?).await.map_err(|e| ErrorKind::io(e, path))
    }

    async fn read_head(&self, path: &Path, bytes: usize) -> Result<Vec<u8>> {
        let file = fs::File::open(self.full(path)?).await.map_err(|e| ErrorKind::io(e, path))?;
        let mut head = Vec::with_capacity(bytes);
        file.take(bytes as u64).read_to_end(&mut head).await.map_err(|e| ErrorKind::io(e, path))?;
        Ok(head)
    }

    async fn write(&self, path: &Path, data: &[u8]) -> Result<()> {
        let full = self.full(path)?;
        Self::make_parent(&full, path).await?;
        fs::write(&full, data).await.map_err(|e| ErrorKind::io(e, path))
    }

    async fn delete(&self, path: &Path) -> Result<()> {
        fs::remove_file(self.full(path)?).await.map_err(|e| ErrorKind::io(e, path))
    }

    async fn rename(&self, from: &Path, to: &Path) -> Result<()> {
        let source = self.full(from)?;
        let target = self.full(to)?;
        fs::symlink_metadata(&source).await.map_err(|e| ErrorKind::io(e, from))?;
        if fs::try_exists(&target).await.map_err(|e| ErrorKind::io(e, to))? {
            exn::bail!(ErrorKind::AlreadyExists(to.to_path_buf()));
        }
        Self::make_parent(&target, to).await?;
        match fs::rename(&source, &target).await {
            Err(err) if err.kind() == IoErrorKind::CrossesDevices => {
                copy_across(&source, &target).await.map_err(|e| ErrorKind::io(e, to))
            },
            moved => moved.map_err(|e| ErrorKind::io(e, from)),
        }
    }

    async fn remove_dir(&self, path: &Path) -> Result<bool> {
        match fs::remove_dir(self.full(path)?).await {
            Ok(()) => Ok(true),
            Err(err) if err.kind() == IoErrorKind::NotFound => Ok(true),
            Err(err) if err.kind() == IoErrorKind::DirectoryNotEmpty => Ok(false),
            Err(err) => Err(ErrorKind::io(err, path)),
        }
    }

    async fn remove_dir_all(&self, path: &Path) -> Result<()> {
        match fs::remove_dir_all(self.full(path)?).await {
            Err(err) if err.kind() != IoErrorKind::NotFound => Err(ErrorKind::io(err, path)),
            _ => Ok(()),
        }
    }
}
