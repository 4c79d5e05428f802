//! Background jobs for tome.
//!
//! Jobs are rows in the catalog. A [`WorkerPool`] claims them one at a time
//! per worker, hands each to the [`JobHandler`] registered for its type, and
//! records the outcome. Claiming is a single atomic update whose predicate
//! keeps two jobs for the same library from running at once, so any number
//! of pools (in any number of processes) can share one catalog.
//!
//! ```no_run
//! use std::sync::Arc;
//! use tome_catalog::{Database, Repository};
//! use tome_jobs::{HandlerRegistry, JobQueue, JobRequest, PoolConfig, ScanHandler, WorkerPool};
//! use tome_library::{Context, LocalMounter};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::connect("tome.db").await?;
//! let repo = Repository::from(&db);
//! let ctx = Arc::new(Context::new(repo.clone(), Arc::new(LocalMounter))?);
//! let queue = JobQueue::new(repo);
//! queue.enqueue(&JobRequest::scan(None)).await?;
//!
//! let handlers = HandlerRegistry::new().register(Arc::new(ScanHandler::new(ctx)));
//! WorkerPool::new(queue, handlers, PoolConfig::default()).run().await?;
//! # Ok(())
//! # }
//! ```

pub mod error;
mod handler;
mod handlers;
mod housekeeping;
mod logger;
mod pool;
mod queue;
mod types;

pub use crate::handler::{HandlerHandle, HandlerRegistry, JobContext, JobHandler};
pub use crate::handlers::{OrganizeHandler, ScanHandler};
pub use crate::housekeeping::{DEFAULT_HOUSEKEEPING_INTERVAL, DEFAULT_LOG_RETENTION, Housekeeper};
pub use crate::logger::{JobLogger, stream_logs};
pub use crate::pool::{DEFAULT_MAX_JOB_ATTEMPTS, DEFAULT_POLL_INTERVAL, DEFAULT_WORKERS, Finished, PoolConfig, WorkerPool};
pub use crate::queue::{JobQueue, process_id};
pub use crate::types::{JobRequest, JobType, OrganizeJob, ScanJob};

/// Handlers for every job type the engine ships with.
pub fn default_handlers(ctx: std::sync::Arc<tome_library::Context>) -> HandlerRegistry {
    HandlerRegistry::new()
        .register(std::sync::Arc::new(ScanHandler::new(ctx.clone())))
        .register(std::sync::Arc::new(OrganizeHandler::new(ctx)))
}
