//! Job Error Types

use derive_more::{Display, Error};

/// A job error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for job operations.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    /// The catalog stayed busy through every retry.
    #[display("catalog is busy")]
    Busy,
    #[display("catalog operation failed")]
    Catalog,
    /// No handler is registered for the job's type.
    #[display("unknown job type: {_0}")]
    UnknownJobType(#[error(not(source))] String),
    #[display("invalid payload for {_0} job")]
    InvalidPayload(#[error(not(source))] String),
    /// Somebody asked for the job to stop.
    #[display("job cancelled")]
    Cancelled,
    /// The worker is shutting down; the job goes back on the queue.
    #[display("job interrupted by shutdown")]
    Interrupted,
    #[display("job handler failed")]
    Handler,
    #[display("invalid configuration: {_0}")]
    InvalidConfig(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy | Self::Interrupted)
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

/// Raise library failures, keeping track of whether they were transient.
pub(crate) trait LibraryResultExt<T> {
    fn or_handler(self) -> Result<T>;
}
impl<T> LibraryResultExt<T> for tome_library::error::Result<T> {
    #[track_caller]
    fn or_handler(self) -> Result<T> {
        use exn::ResultExt;
        match self {
            Ok(value) => Ok(value),
            Err(err) => {
                let kind = match err.is_retryable() {
                    true => ErrorKind::Busy,
                    false => ErrorKind::Handler,
                };
                Err(err).or_raise(|| kind)
            },
        }
    }
}
