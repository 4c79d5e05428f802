//! Metadata snapshots written next to media files, so edits survive even
//! when the media file itself is never rewritten.
//!
//! Sidecars hold editable fields only: never intrinsic facts such as
//! duration or size, and never the source tags the catalog tracks.

pub mod error;
mod migrate;
mod models;
mod store;

pub use crate::models::{BookSidecar, CURRENT_VERSION, FileSidecar, PersonEntry};
pub use crate::store::{
    SIDECAR_SUFFIX, book_sidecar_path, file_sidecar_path, is_sidecar_path, read_book, read_file, write_book,
    write_file,
};
