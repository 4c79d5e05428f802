//! Errors raised while touching files under a library root.

use derive_more::{Display, Error};
use exn::Exn;
use std::io::{Error as IoError, ErrorKind as IoErrorKind};
use std::path::{Path, PathBuf};

pub type Error = Exn<ErrorKind>;
pub type Result<T> = std::result::Result<T, Error>;

/// Every variant carries the root-relative path it is about.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// Scans read this as "the file is gone" rather than as a failure.
    #[display("nothing at {}", _0.display())]
    NotFound(#[error(not(source))] PathBuf),
    /// Moves never overwrite; the organizer picks another name instead.
    #[display("{} is already taken", _0.display())]
    AlreadyExists(#[error(not(source))] PathBuf),
    /// Absolute, or climbs out of the root with `..`.
    #[display("{} is outside the library root", _0.display())]
    InvalidPath(#[error(not(source))] PathBuf),
    /// Any other filesystem failure. The I/O error is kept as a child.
    #[display("could not access {}", _0.display())]
    Io(#[error(not(source))] PathBuf),
}

impl ErrorKind {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(path) | Self::AlreadyExists(path) | Self::InvalidPath(path) | Self::Io(path) => path,
        }
    }

    /// Sort an I/O failure on `path` into the kind callers branch on.
    #[track_caller]
    pub(crate) fn io(err: IoError, path: &Path) -> Error {
        let path = path.to_path_buf();
        let kind = match err.kind() {
            IoErrorKind::NotFound => Self::NotFound(path),
            IoErrorKind::AlreadyExists => Self::AlreadyExists(path),
            _ => Self::Io(path),
        };
        Exn::new(err).raise(kind)
    }
}
