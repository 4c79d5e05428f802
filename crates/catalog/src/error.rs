//! Catalog Error Types
//!
//! Structured errors using `exn` for automatic location tracking and error
//! tree construction.

use derive_more::{Display, Error};

/// A catalog error with automatic location tracking.
pub type Error = exn::Exn<ErrorKind>;
/// Result type alias for catalog operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Actionable error categories.
///
/// These describe what the caller should *do*, not what went wrong internally.
#[derive(Debug, Display, Error)]
pub enum ErrorKind {
    #[display("database error")]
    Database,
    #[display("database migration error")]
    Migration,
    /// Another writer holds the database lock; try again shortly.
    #[display("database is busy")]
    Busy,
    /// A uniqueness constraint rejected the write.
    #[display("conflicting row already exists")]
    Conflict,
    #[display("{_0} not found: {_1}")]
    NotFound(#[error(not(source))] &'static str, #[error(not(source))] i64),
    /// Serialization/deserialization error.
    #[display("invalid catalog data: {_0}")]
    InvalidData(#[error(not(source))] &'static str),
    /// The operation would leave the catalog inconsistent and was refused.
    #[display("catalog invariant violated: {_0}")]
    Invariant(#[error(not(source))] String),
}

impl ErrorKind {
    /// Returns `true` if retrying might succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Busy)
    }

    /// SQLite signals lock contention through primary result codes 5
    /// (`SQLITE_BUSY`) and 6 (`SQLITE_LOCKED`), and their extended variants.
    fn from_sqlx(err: &sqlx::Error) -> Self {
        match err {
            sqlx::Error::PoolTimedOut => Self::Busy,
            sqlx::Error::Database(db) => {
                let code = db.code().and_then(|c| c.parse::<i64>().ok());
                match code.map(|c| c & 0xff) {
                    Some(5 | 6) => Self::Busy,
                    Some(19) if db.is_unique_violation() => Self::Conflict,
                    _ if db.message().contains("database is locked") => Self::Busy,
                    _ => Self::Database,
                }
            },
            _ => Self::Database,
        }
    }
}

/// Classify `sqlx` failures while raising them into the catalog error tree.
pub(crate) trait SqlxResultExt<T> {
    fn or_db(self) -> Result<T>;
}
impl<T> SqlxResultExt<T> for std::result::Result<T, sqlx::Error> {
    #[track_caller]
    fn or_db(self) -> Result<T> {
        use exn::ResultExt;
        match self {
            Ok(value) => Ok(value),
            Err(err) => {
                let kind = ErrorKind::from_sqlx(&err);
                Err(err).or_raise(|| kind)
            },
        }
    }
}
