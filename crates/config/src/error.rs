//! Config Error Types

use derive_more::{Display, Error};
use std::path::PathBuf;

/// A configuration error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for configuration loading.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// A source could not be read or did not match the expected shape.
    #[display("could not load configuration")]
    Load,
    /// An explicitly requested config file does not exist.
    #[display("config file not found: {}", _0.display())]
    Missing(#[error(not(source))] PathBuf),
    /// No home directory to derive default locations from.
    #[display("could not determine the configuration directory")]
    NoProjectDirs,
    #[display("invalid configuration: {_0}")]
    Invalid(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        false
    }
}
