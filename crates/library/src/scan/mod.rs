//! Bringing the catalog in line with what is on disk.
//!
//! A scan walks every root of a library, catalogues files it has not seen,
//! re-reads files it has, and forgets files that are gone. It is idempotent:
//! scanning an unchanged library twice leaves the catalog untouched the
//! second time.
//!
//! Problems with individual files never fail a scan. They are reported as
//! [`ScanEvent::Failed`] and collected into [`ScanResult::errors`]; only a
//! catalog write that keeps failing after its retries stops the scan.

mod discover;
mod file;
mod stream;

pub use self::stream::scan;

use derive_more::Display;
use futures::TryStreamExt;
use std::path::{Path, PathBuf};
use tome_catalog::ids::LibraryId;

use crate::Context;
use crate::error::Result;

/// What happened to one discovered file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Outcome {
    #[display("created")]
    Created,
    #[display("updated")]
    Updated,
    #[display("unchanged")]
    Unchanged,
    /// A supplement with no book to belong to.
    #[display("skipped")]
    Skipped,
}

/// The step a per-file error happened in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum Stage {
    #[display("discover")]
    Discover,
    #[display("parse")]
    Parse,
    #[display("sidecar")]
    Sidecar,
    #[display("cover")]
    Cover,
    #[display("organize")]
    Organize,
}

#[derive(Debug, Clone, PartialEq, Eq, Display)]
#[display("{stage} {}: {message}", path.display())]
pub struct ScanError {
    pub path: PathBuf,
    pub stage: Stage,
    pub message: String,
}
impl ScanError {
    pub fn new(path: impl AsRef<Path>, stage: Stage, message: impl Into<String>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            stage,
            message: message.into(),
        }
    }
}

/// Progress events emitted by [`scan`].
///
/// Events follow a strict ordering:
/// 1. [`Started`](Self::Started), exactly once.
/// 2. [`DiscoveryComplete`](Self::DiscoveryComplete), exactly once, with the
///    number of files that will be processed.
/// 3. [`Processed`](Self::Processed) once per discovered file, interleaved
///    with [`Failed`](Self::Failed) for files (or roots) that had problems.
/// 4. [`Removed`](Self::Removed) for every catalogued file that vanished.
/// 5. [`Complete`](Self::Complete), exactly once.
///
/// An `Err` item ends the stream; [`Complete`](Self::Complete) is then never
/// emitted.
#[derive(Debug, Clone, PartialEq)]
pub enum ScanEvent {
    Started,
    DiscoveryComplete(u64),
    Processed { path: PathBuf, outcome: Outcome },
    Failed(ScanError),
    Removed { path: PathBuf },
    Complete,
}

/// Totals for a finished scan.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScanResult {
    pub created: u64,
    pub updated: u64,
    pub removed: u64,
    pub errors: Vec<ScanError>,
}
impl ScanResult {
    pub fn record(&mut self, event: &ScanEvent) {
        match event {
            ScanEvent::Processed {
                outcome: Outcome::Created,
                ..
            } => self.created += 1,
            ScanEvent::Processed {
                outcome: Outcome::Updated,
                ..
            } => self.updated += 1,
            ScanEvent::Removed { .. } => self.removed += 1,
            ScanEvent::Failed(error) => self.errors.push(error.clone()),
            _ => {},
        }
    }

    /// Whether the scan changed nothing at all.
    pub fn is_noop(&self) -> bool {
        self.created == 0 && self.updated == 0 && self.removed == 0
    }
}

/// Run a whole scan and return its totals.
pub async fn scan_library(ctx: &std::sync::Arc<Context>, library_id: LibraryId) -> Result<ScanResult> {
    scan(ctx.clone(), library_id)
        .try_fold(ScanResult::default(), |mut result, event| async move {
            result.record(&event);
            Ok(result)
        })
        .await
}
