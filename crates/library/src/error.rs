//! Library Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction. Lower-level crate errors are raised into these kinds so
//! job handlers only ever have to look at one enum.

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A library error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for library operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The catalog stayed busy through every retry.
    #[display("catalog is busy")]
    Busy,
    #[display("catalog operation failed")]
    Catalog,
    #[display("storage operation failed")]
    Storage,
    #[display("sidecar operation failed")]
    Sidecar,
    #[display("media file could not be parsed")]
    Parse,
    #[display("issue with name generation from template")]
    Template,
    /// Every collision suffix up to the configured limit was taken.
    #[display("no free name for {}", _0.display())]
    Conflict(#[error(not(source))] PathBuf),
    /// No library root contains the path, or no backend serves the root.
    #[display("not inside a mounted library root: {}", _0.display())]
    Unmounted(#[error(not(source))] PathBuf),
    #[display("library {_0} has been deleted")]
    LibraryDeleted(#[error(not(source))] i64),
    #[display("invalid input: {_0}")]
    InvalidInput(#[error(not(source))] String),
    #[display("invalid configuration: {_0}")]
    InvalidConfig(#[error(not(source))] String),
    #[display("scan failed")]
    Scan,
    #[display("organize failed")]
    Organize,
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy)
    }
}

/// Raise catalog failures, keeping track of whether they were transient.
pub(crate) trait CatalogResultExt<T> {
    fn or_catalog(self) -> Result<T>;
}
impl<T> CatalogResultExt<T> for tome_catalog::error::Result<T> {
    #[track_caller]
    fn or_catalog(self) -> Result<T> {
        use exn::ResultExt;
        match self {
            Ok(value) => Ok(value),
            Err(err) => {
                let kind = match err.is_retryable() {
                    true => ErrorKind::Busy,
                    false => ErrorKind::Catalog,
                };
                Err(err).or_raise(|| kind)
            },
        }
    }
}
