/// A book's position within a series.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct SeriesEntry {
    pub name: String,
    /// Position in the series; fractional for novellas slotted between books.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub number: Option<f64>,
}
impl SeriesEntry {
    pub fn new(name: impl Into<String>, number: Option<f64>) -> Self {
        Self {
            name: name.into(),
            number,
        }
    }
}

/// An external identifier such as an ISBN or ASIN.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Identifier {
    pub kind: String,
    pub value: String,
}
impl Identifier {
    pub fn new(kind: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            value: value.into(),
        }
    }
}

/// One entry in a table of contents, possibly nested.
#[derive(Debug, Clone, PartialEq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Chapter {
    pub title: String,
    /// Offset into an audiobook, in seconds.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub start_seconds: Option<f64>,
    /// Page index into a comic.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub start_page: Option<u32>,
    /// Document reference inside an ebook.
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Option::is_none"))]
    pub href: Option<String>,
    #[cfg_attr(feature = "serde", serde(default, skip_serializing_if = "Vec::is_empty"))]
    pub children: Vec<Chapter>,
}

/// Embedded cover artwork.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cover {
    pub data: Vec<u8>,
    pub mime: String,
}
impl Cover {
    /// File extension matching the cover's MIME type.
    pub fn extension(&self) -> &'static str {
        match self.mime.as_str() {
            "image/png" => "png",
            "image/webp" => "webp",
            "image/gif" => "gif",
            _ => "jpg",
        }
    }
}

/// Normalized metadata every [`MediaFileParser`](crate::MediaFileParser)
/// produces, regardless of container format.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ParsedMetadata {
    pub title: Option<String>,
    pub subtitle: Option<String>,
    pub description: Option<String>,
    pub authors: Vec<String>,
    pub narrators: Vec<String>,
    pub series: Vec<SeriesEntry>,
    pub identifiers: Vec<Identifier>,
    pub chapters: Vec<Chapter>,
    pub cover: Option<Cover>,
    /// Audiobook length in seconds.
    pub duration: Option<f64>,
    /// Audiobook bitrate in bits per second.
    pub bitrate: Option<u32>,
    pub codec: Option<String>,
}
impl ParsedMetadata {
    /// Trim every string and drop values that end up empty.
    pub fn normalized(mut self) -> Self {
        fn clean(value: Option<String>) -> Option<String> {
            value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
        }
        fn clean_names(names: Vec<String>) -> Vec<String> {
            let mut seen = Vec::<String>::new();
            for name in names.into_iter().map(|n| n.split_whitespace().collect::<Vec<_>>().join(" ")) {
                if !name.is_empty() && !seen.iter().any(|s| s.to_lowercase() == name.to_lowercase()) {
                    seen.push(name);
                }
            }
            seen
        }
        self.title = clean(self.title);
        self.subtitle = clean(self.subtitle);
        self.description = clean(self.description);
        self.codec = clean(self.codec);
        self.authors = clean_names(self.authors);
        self.narrators = clean_names(self.narrators);
        self.series.retain_mut(|s| {
            s.name = s.name.trim().to_string();
            !s.name.is_empty()
        });
        self.identifiers.retain(|i| !i.value.trim().is_empty());
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalized_drops_blanks_and_duplicate_names() {
        let metadata = ParsedMetadata {
            title: Some("  My Book ".to_string()),
            subtitle: Some("   ".to_string()),
            authors: vec!["Jane  Doe".to_string(), "jane doe".to_string(), "".to_string()],
            series: vec![SeriesEntry::new(" ", Some(1.0)), SeriesEntry::new("Saga ", None)],
            ..Default::default()
        }
        .normalized();
        assert_eq!(metadata.title.as_deref(), Some("My Book"));
        assert_eq!(metadata.subtitle, None);
        assert_eq!(metadata.authors, vec!["Jane Doe".to_string()]);
        assert_eq!(metadata.series, vec![SeriesEntry::new("Saga", None)]);
    }

    #[test]
    fn test_cover_extension() {
        let cover = Cover {
            data: vec![],
            mime: "image/png".to_string(),
        };
        assert_eq!(cover.extension(), "png");
        let cover = Cover {
            data: vec![],
            mime: "image/jpeg".to_string(),
        };
        assert_eq!(cover.extension(), "jpg");
    }
}
