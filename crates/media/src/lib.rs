//! The contract between the library engine and format-specific metadata
//! parsers, plus the filepath conventions used as the lowest-priority source.

mod consts;
pub mod error;
mod filepath;
mod intrinsic;
pub mod models;
mod parser;

pub use crate::filepath::{has_volume_indicator, infer_from_path};
pub use crate::intrinsic::IntrinsicParser;
pub use crate::models::{DataSource, FileRole, FileType, ParsedMetadata, Sourced};
pub use crate::parser::{MediaFileParser, ParserHandle, ParserRegistry};
