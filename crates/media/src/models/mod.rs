mod file_type;
mod metadata;
mod source;

pub use self::file_type::{FileRole, FileType};
pub use self::metadata::{Chapter, Cover, Identifier, ParsedMetadata, SeriesEntry};
pub use self::source::{DataSource, Sourced};
