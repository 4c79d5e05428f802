//! Media Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

use crate::models::FileType;

/// A media parsing error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for media operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// No parser is registered for this kind of file.
    #[display("unsupported file type: {}", _0.display())]
    Unsupported(#[error(not(source))] PathBuf),
    /// The file could not be read from storage.
    #[display("could not read media file: {}", _0.display())]
    Read(#[error(not(source))] PathBuf),
    /// The file content does not look like the container its extension claims.
    #[display("malformed {file_type} file: {reason}")]
    Malformed {
        file_type: FileType,
        reason: String,
    },
    /// A value could not be parsed.
    #[display("failed to parse field '{field}', found value: {value}")]
    ParseError {
        field: &'static str,
        value: String,
    },
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        // The bytes on disk are either readable or they aren't; a failed read
        // is surfaced per file and picked up again by the next scan.
        false
    }
}
