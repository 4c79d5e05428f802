//! Sidecar Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A sidecar error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for sidecar operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("could not read sidecar: {}", _0.display())]
    Read(#[error(not(source))] PathBuf),
    #[display("could not write sidecar: {}", _0.display())]
    Write(#[error(not(source))] PathBuf),
    /// The file exists but isn't a sidecar this version understands.
    #[display("malformed sidecar: {}", _0.display())]
    Malformed(#[error(not(source))] PathBuf),
    /// Written by a newer release; refuse rather than drop unknown fields.
    #[display("sidecar version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u64, supported: u64 },
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Read(_) | Self::Write(_))
    }
}
