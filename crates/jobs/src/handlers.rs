//! Handlers for the job types the engine ships with.

use async_trait::async_trait;
use futures::StreamExt;
use serde::Serialize;
use serde_json::json;
use std::sync::Arc;
use tome_catalog::ids::LibraryId;
use tome_library::{Context, FileOrganizer, OrganizeEvent, Organized, Organizer, ScanEvent, ScanResult, organize_library, scan};

use crate::error::{CatalogResultExt, LibraryResultExt, Result};
use crate::handler::{JobContext, JobHandler};
use crate::types::{JobType, OrganizeJob, ScanJob, parse_payload};

/// Totals stored as a finished scan job's result.
#[derive(Debug, Default, Serialize)]
struct ScanSummary {
    libraries: usize,
    created: u64,
    updated: u64,
    removed: u64,
    errors: usize,
}
impl ScanSummary {
    fn add(&mut self, result: &ScanResult) {
        self.libraries += 1;
        self.created += result.created;
        self.updated += result.updated;
        self.removed += result.removed;
        self.errors += result.errors.len();
    }
}

/// How far a scan over several libraries has come, each library carrying
/// an equal share so the reported progress never moves backwards.
#[derive(Debug, Clone, Copy)]
struct ScanProgress {
    libraries: u64,
    finished: u64,
}
impl ScanProgress {
    const SHARE: u64 = 1000;

    fn new(libraries: usize) -> Self {
        Self {
            libraries: libraries as u64,
            finished: 0,
        }
    }

    /// `(done, total)` while the current library is `processed` of `found`
    /// files in.
    fn at(&self, processed: u64, found: u64) -> (u64, u64) {
        let current = match found {
            0 => 0,
            found => processed.min(found) * Self::SHARE / found,
        };
        (self.finished * Self::SHARE + current, self.libraries * Self::SHARE)
    }
}

pub struct ScanHandler {
    ctx: Arc<Context>,
}
impl ScanHandler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self { ctx }
    }

    async fn scan_one(&self, job: &JobContext, library_id: LibraryId, progress: ScanProgress) -> Result<ScanResult> {
        let mut result = ScanResult::default();
        let mut total = 0;
        let mut processed = 0;
        let mut events = std::pin::pin!(scan(self.ctx.clone(), library_id));
        while let Some(event) = events.next().await {
            let event = event.or_handler()?;
            result.record(&event);
            match &event {
                ScanEvent::Started => job.logger.info("scan started", Some(json!({ "library": library_id.0 }))).await,
                ScanEvent::DiscoveryComplete(found) => {
                    total = *found;
                    job.logger.info("discovery complete", Some(json!({ "files": found }))).await;
                },
                ScanEvent::Processed { path, outcome } => {
                    processed += 1;
                    job.logger
                        .debug(
                            "processed file",
                            Some(json!({ "path": path.display().to_string(), "outcome": outcome.to_string() })),
                        )
                        .await;
                    let (done, all) = progress.at(processed, total);
                    job.progress(done, all).await?;
                    job.checkpoint().await?;
                },
                ScanEvent::Failed(error) => {
                    let data = json!({
                        "path": error.path.display().to_string(),
                        "stage": error.stage.to_string(),
                        "error": error.message,
                    });
                    job.logger.warn("file error", Some(data)).await;
                },
                ScanEvent::Removed { path } => {
                    job.logger.info("removed missing file", Some(json!({ "path": path.display().to_string() }))).await;
                },
                ScanEvent::Complete => {
                    let data = json!({
                        "library": library_id.0,
                        "created": result.created,
                        "updated": result.updated,
                        "removed": result.removed,
                        "errors": result.errors.len(),
                    });
                    job.logger.info("scan complete", Some(data)).await;
                },
            }
        }
        Ok(result)
    }
}

#[async_trait]
impl JobHandler for ScanHandler {
    fn job_type(&self) -> JobType {
        JobType::Scan
    }

    async fn run(&self, job: &JobContext) -> Result<Option<String>> {
        let ScanJob {} = parse_payload(JobType::Scan, &job.job.data)?;
        let libraries = match job.job.library_id {
            Some(library_id) => vec![library_id],
            None => {
                let all = self.ctx.repo().list_libraries().await.or_catalog()?;
                all.into_iter().filter(|l| l.deleted_at.is_none()).map(|l| l.id).collect()
            },
        };
        let mut summary = ScanSummary::default();
        let mut progress = ScanProgress::new(libraries.len());
        for library_id in libraries {
            job.checkpoint().await?;
            let result = self.scan_one(job, library_id, progress).await?;
            summary.add(&result);
            progress.finished += 1;
            let (done, all) = progress.at(0, 0);
            job.progress(done, all).await?;
        }
        Ok(serde_json::to_string(&summary).ok())
    }
}

pub struct OrganizeHandler {
    organizer: Arc<Organizer>,
}
impl OrganizeHandler {
    pub fn new(ctx: Arc<Context>) -> Self {
        Self {
            organizer: Arc::new(Organizer::new(ctx)),
        }
    }
}

#[async_trait]
impl JobHandler for OrganizeHandler {
    fn job_type(&self) -> JobType {
        JobType::Organize
    }

    async fn run(&self, job: &JobContext) -> Result<Option<String>> {
        let payload: OrganizeJob = parse_payload(JobType::Organize, &job.job.data)?;
        if let Some(book_id) = payload.book() {
            let outcome = self.organizer.organize_book_files(book_id).await.or_handler()?;
            job.logger.info("organized book", Some(json!({ "book": book_id.0, "outcome": format!("{outcome:?}") }))).await;
            return Ok(None);
        }
        let Some(library_id) = job.job.library_id else {
            exn::bail!(crate::error::ErrorKind::InvalidPayload(JobType::Organize.to_string()));
        };

        let (mut total, mut done, mut moved, mut failed) = (0, 0, 0, 0);
        let mut events = std::pin::pin!(organize_library(&self.organizer, library_id));
        while let Some(event) = events.next().await {
            match event.or_handler()? {
                OrganizeEvent::Started => job.logger.info("organize started", Some(json!({ "library": library_id.0 }))).await,
                OrganizeEvent::DiscoveryComplete(books) => total = books,
                OrganizeEvent::Organized { book, outcome } => {
                    done += 1;
                    if let Organized::Moved { book_filepath, files } = &outcome {
                        moved += 1;
                        let data = json!({ "book": book.0, "path": book_filepath.display().to_string(), "files": files });
                        job.logger.info("moved book", Some(data)).await;
                    }
                    job.progress(done, total).await?;
                    job.checkpoint().await?;
                },
                OrganizeEvent::Failed { book, message } => {
                    done += 1;
                    failed += 1;
                    job.logger.warn("could not organize book", Some(json!({ "book": book.0, "error": message }))).await;
                },
                OrganizeEvent::Complete => {
                    let data = json!({ "books": total, "moved": moved, "failed": failed });
                    job.logger.info("organize complete", Some(data)).await;
                },
            }
        }
        Ok(Some(json!({ "books": total, "moved": moved, "failed": failed }).to_string()))
    }
}
