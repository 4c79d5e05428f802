//! The files under one library root, and the two ways of reaching them.
//!
//! Paths handed to a backend are relative to its root and pass through
//! [`validate_path`](crate::validate_path) before anything is touched.

mod local;
#[cfg(feature = "mock")]
mod mock;

pub use self::local::LocalBackend;
#[cfg(feature = "mock")]
pub use self::mock::MockBackend;
use crate::FileEntry;
use crate::error::Result;
use async_trait::async_trait;
use futures::Stream;
use std::path::Path;
use std::pin::Pin;

pub(crate) type FileEntryStream<'a> = Pin<Box<dyn Stream<Item = Result<FileEntry>> + Send + 'a>>;

/// What scanning and organizing need from a library root.
///
/// # Examples
///
/// ```
/// use std::path::Path;
/// use tome_storage::{StorageBackend, error::Result};
///
/// async fn move_into_place(backend: &dyn StorageBackend) -> Result<()> {
///     let from = Path::new("Unsorted/My Book.epub");
///     if backend.exists(from).await? {
///         backend.rename(from, Path::new("[Jane Doe] My Book/My Book.epub")).await?;
///         backend.remove_dir(Path::new("Unsorted")).await?;
///     }
///     Ok(())
/// }
/// ```
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Shown in logs next to paths from this backend.
    fn name(&self) -> &str;

    /// Every regular file under the root, in no particular order.
    ///
    /// A directory that cannot be read yields an error and the walk carries
    /// on with the rest, so one bad folder does not hide a whole library.
    ///
    /// ```
    /// use futures::TryStreamExt;
    /// # use tome_storage::{StorageBackend, error::Result};
    /// # async fn example(backend: &dyn StorageBackend) -> Result<()> {
    /// let mut files = backend.walk();
    /// while let Some(file) = files.try_next().await? {
    ///     println!("{}: {} bytes", file.path.display(), file.size);
    /// }
    /// # Ok(())
    /// # }
    /// ```
    fn walk(&self) -> FileEntryStream<'_>;

    /// Whether anything, file or directory, is at `path`.
    async fn exists(&self, path: &Path) -> Result<bool>;

    async fn read(&self, path: &Path) -> Result<Vec<u8>>;

    /// Up to `bytes` from the start of the file. Enough to sniff a container
    /// signature without loading a whole audiobook.
    async fn read_head(&self, path: &Path, bytes: usize) -> Result<Vec<u8>>;

    /// Create or replace a file, along with any missing folders above it.
    async fn write(&self, path: &Path, data: &[u8]) -> Result<()>;

    async fn delete(&self, path: &Path) -> Result<()>;

    /// Move a file, creating folders for the destination as needed.
    ///
    /// Fails with [`AlreadyExists`](crate::error::ErrorKind::AlreadyExists)
    /// rather than replace anything. Moves between filesystems fall back to
    /// copying.
    async fn rename(&self, from: &Path, to: &Path) -> Result<()>;

    /// Remove a folder if it is empty. Returns `false` when something is
    /// still inside; a folder that is already gone counts as removed.
    async fn remove_dir(&self, path: &Path) -> Result<bool>;

    /// Remove a folder and everything in it. A missing folder is fine.
    async fn remove_dir_all(&self, path: &Path) -> Result<()>;
}
