use serde::{Deserialize, Serialize};
use tome_media::models::{Chapter, Identifier, SeriesEntry};

/// Current on-disk format version.
pub const CURRENT_VERSION: u64 = 1;

/// A person as written to a sidecar.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersonEntry {
    pub name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_name: Option<String>,
}
impl PersonEntry {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            sort_name: None,
        }
    }
}

/// Editable book-level metadata, stored as `{main file stem}.metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BookSidecar {
    pub version: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtitle: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<PersonEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub series: Vec<SeriesEntry>,
}
impl Default for BookSidecar {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            title: None,
            subtitle: None,
            sort_title: None,
            description: None,
            authors: Vec::new(),
            series: Vec::new(),
        }
    }
}

/// Editable file-level metadata, stored as `{file name}.metadata.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileSidecar {
    pub version: u64,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub narrators: Vec<PersonEntry>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub identifiers: Vec<Identifier>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chapters: Vec<Chapter>,
}
impl Default for FileSidecar {
    fn default() -> Self {
        Self {
            version: CURRENT_VERSION,
            narrators: Vec::new(),
            identifiers: Vec::new(),
            chapters: Vec::new(),
        }
    }
}
impl FileSidecar {
    pub fn is_empty(&self) -> bool {
        self.narrators.is_empty() && self.identifiers.is_empty() && self.chapters.is_empty()
    }
}
