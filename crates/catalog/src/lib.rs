//! SQLite catalog for the library engine.
//!
//! The catalog is the system of record: libraries and their roots, books,
//! files, the people and series linked to them, and the persisted job queue
//! workers claim scans from. Every metadata field that can come from more
//! than one place is stored together with the [`DataSource`] it came from.
//!
//! [`DataSource`]: tome_media::DataSource

mod db;
pub mod error;
pub mod ids;
pub mod models;
mod repo;
pub mod retry;

pub use crate::db::Database;
pub use crate::repo::{
    IngestTarget, Ingested, NewFile, Recovered, RelocatedFile, Relocation, Removal, Renamed, Repository,
};
pub use crate::retry::RetryPolicy;
