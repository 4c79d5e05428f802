use tome_media::models::{Chapter, Identifier, SeriesEntry};
use tome_media::{DataSource, ParsedMetadata};
use tome_sidecar::{BookSidecar, FileSidecar};

/// Book-level facts reported by a single source. Empty means "no opinion".
#[derive(Debug, Clone, PartialEq, Default)]
pub struct BookFacts {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub sort_title: Option<String>,
    pub description: Option<String>,
    pub authors: Vec<String>,
    pub series: Vec<SeriesEntry>,
}
impl From<&ParsedMetadata> for BookFacts {
    fn from(metadata: &ParsedMetadata) -> Self {
        Self {
            title: metadata.title.clone(),
            subtitle: metadata.subtitle.clone(),
            sort_title: None,
            description: metadata.description.clone(),
            authors: metadata.authors.clone(),
            series: metadata.series.clone(),
        }
    }
}
impl From<&BookSidecar> for BookFacts {
    fn from(sidecar: &BookSidecar) -> Self {
        Self {
            title: sidecar.title.clone(),
            subtitle: sidecar.subtitle.clone(),
            sort_title: sidecar.sort_title.clone(),
            description: sidecar.description.clone(),
            authors: sidecar.authors.iter().map(|a| a.name.clone()).collect(),
            series: sidecar.series.clone(),
        }
    }
}

/// File-level facts reported by a single source.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FileFacts {
    pub narrators: Vec<String>,
    pub identifiers: Vec<Identifier>,
    pub chapters: Vec<Chapter>,
}
impl From<&ParsedMetadata> for FileFacts {
    fn from(metadata: &ParsedMetadata) -> Self {
        Self {
            narrators: metadata.narrators.clone(),
            identifiers: metadata.identifiers.clone(),
            chapters: metadata.chapters.clone(),
        }
    }
}
impl From<&FileSidecar> for FileFacts {
    fn from(sidecar: &FileSidecar) -> Self {
        Self {
            narrators: sidecar.narrators.iter().map(|n| n.name.clone()).collect(),
            identifiers: sidecar.identifiers.clone(),
            chapters: sidecar.chapters.clone(),
        }
    }
}

/// Facts tagged with the source that reported them.
#[derive(Debug, Clone, PartialEq)]
pub struct Layer<T> {
    pub source: DataSource,
    pub facts: T,
}
impl<T> Layer<T> {
    pub fn new(source: DataSource, facts: T) -> Self {
        Self { source, facts }
    }
}
