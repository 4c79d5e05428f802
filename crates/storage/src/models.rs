use std::path::PathBuf;

/// A regular file found while walking a library root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    /// Relative to the root it was found under.
    pub path: PathBuf,
    pub size: u64,
}
