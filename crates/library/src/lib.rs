//! The library engine: scanning roots into the catalog, reconciling metadata
//! from competing sources, deduplicating people and series, and keeping the
//! files on disk organized to match.
//!
//! Everything works through a shared [`Context`]:
//!
//! ```no_run
//! use std::sync::Arc;
//! use tome_catalog::{Database, Repository};
//! use tome_library::{Context, LocalMounter, scan_library};
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::connect("tome.db").await?;
//! let ctx = Arc::new(Context::new(Repository::from(&db), Arc::new(LocalMounter))?);
//! let result = scan_library(&ctx, 1.into()).await?;
//! println!("{} new, {} updated, {} removed", result.created, result.updated, result.removed);
//! # Ok(())
//! # }
//! ```

mod context;
pub mod edit;
pub mod error;
mod mirror;
pub mod naming;
pub mod organize;
pub mod reconcile;
pub mod resolve;
pub mod scan;

pub use crate::context::{
    Context, DEFAULT_IGNORE_NAMES, DEFAULT_MAX_COLLISION_ATTEMPTS, DEFAULT_SUPPLEMENT_EXTENSIONS, LocalMounter,
    Mounter, ScanOptions, StaticMounter,
};
pub use crate::edit::Editor;
pub use crate::naming::{NameGenerator, sanitize_component};
pub use crate::organize::{FileOrganizer, OrganizeEvent, Organized, Organizer, organize_library};
pub use crate::reconcile::{Priority, Reconciler};
pub use crate::resolve::{Cleanup, Resolver};
pub use crate::scan::{Outcome, ScanError, ScanEvent, ScanResult, Stage, scan, scan_library};
