//! Metadata inferred from directory and file naming conventions.
//!
//! This is the lowest-priority source. It understands the layout the
//! organizer produces (`[Author] Title/Title {Narrator}.m4b`) and falls back
//! to bare names for anything else.

use std::path::Path;

use crate::consts::{BRACED_NARRATOR_REGEX, BRACKETED_AUTHOR_REGEX, COLLISION_SUFFIX_REGEX, NAME_SEPARATOR_REGEX};
use crate::consts::VOLUME_INDICATOR_REGEX;
use crate::models::{FileType, ParsedMetadata};

/// Infer title, authors and narrators from a path relative to a library root.
///
/// Files directly under the root are described by their own stem; files in a
/// directory are described by the directory they sit in.
///
/// ```
/// use std::path::Path;
/// use tome_media::infer_from_path;
///
/// let metadata = infer_from_path(Path::new("[Jane Doe] My Book/My Book {John Roe}.m4b"));
/// assert_eq!(metadata.title.as_deref(), Some("My Book"));
/// assert_eq!(metadata.authors, vec!["Jane Doe".to_string()]);
/// assert_eq!(metadata.narrators, vec!["John Roe".to_string()]);
/// ```
pub fn infer_from_path(relative: &Path) -> ParsedMetadata {
    let stem = relative.file_stem().and_then(|s| s.to_str()).unwrap_or_default();
    let (stem, narrators) = split_narrators(stem);
    let narrators = match FileType::from_path(relative).is_audiobook() {
        true => narrators,
        false => Vec::new(),
    };
    let described_by = relative
        .parent()
        .and_then(|p| p.file_name())
        .and_then(|n| n.to_str())
        .unwrap_or(stem.as_str());
    let (authors, title) = split_authors(described_by);
    ParsedMetadata {
        title: Some(strip_collision_suffix(&title).to_string()),
        authors,
        narrators,
        ..Default::default()
    }
    .normalized()
}

/// Whether a title already says which volume it is.
pub fn has_volume_indicator(title: &str) -> bool {
    VOLUME_INDICATOR_REGEX.is_match(title)
}

fn split_names(names: &str) -> Vec<String> {
    NAME_SEPARATOR_REGEX
        .split(names)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .map(str::to_string)
        .collect()
}

fn split_authors(name: &str) -> (Vec<String>, String) {
    match BRACKETED_AUTHOR_REGEX.captures(name) {
        Some(caps) => (split_names(&caps["authors"]), caps["title"].trim().to_string()),
        None => (Vec::new(), name.trim().to_string()),
    }
}

fn split_narrators(stem: &str) -> (String, Vec<String>) {
    match BRACED_NARRATOR_REGEX.captures(stem) {
        Some(caps) => {
            let narrators = split_names(&caps["narrators"]);
            let start = caps.get(0).map(|m| m.start()).unwrap_or(stem.len());
            (stem[..start].trim().to_string(), narrators)
        },
        None => (stem.trim().to_string(), Vec::new()),
    }
}

fn strip_collision_suffix(title: &str) -> &str {
    match COLLISION_SUFFIX_REGEX.find(title) {
        Some(m) => &title[..m.start()],
        None => title,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("My Book.epub", Some("My Book"), &[], &[])]
    #[case("[Jane Doe] My Book.epub", Some("My Book"), &["Jane Doe"], &[])]
    #[case("[Jane Doe] My Book/My Book.epub", Some("My Book"), &["Jane Doe"], &[])]
    #[case("[Jane Doe] My Book (1)/My Book.epub", Some("My Book"), &["Jane Doe"], &[])]
    #[case("[A. One & B. Two] Duet/Duet.epub", Some("Duet"), &["A. One", "B. Two"], &[])]
    #[case("[Jane Doe] Audio/Audio {John Roe & Ann Poe}.m4b", Some("Audio"), &["Jane Doe"], &["John Roe", "Ann Poe"])]
    #[case("Loose Folder/whatever.epub", Some("Loose Folder"), &[], &[])]
    fn test_infer(
        #[case] path: &str,
        #[case] title: Option<&str>,
        #[case] authors: &[&str],
        #[case] narrators: &[&str],
    ) {
        let metadata = infer_from_path(Path::new(path));
        assert_eq!(metadata.title.as_deref(), title);
        assert_eq!(metadata.authors, authors.iter().map(|s| s.to_string()).collect::<Vec<_>>());
        assert_eq!(metadata.narrators, narrators.iter().map(|s| s.to_string()).collect::<Vec<_>>());
    }

    #[test]
    fn test_braces_ignored_for_ebooks() {
        let metadata = infer_from_path(Path::new("Notes {draft}.epub"));
        assert_eq!(metadata.title.as_deref(), Some("Notes"));
        assert!(metadata.narrators.is_empty());
    }

    #[rstest]
    #[case("Saga v3", true)]
    #[case("Saga Vol. 3", true)]
    #[case("Saga Volume 12", true)]
    #[case("Saga #4", true)]
    #[case("Saga", false)]
    #[case("Vivid Dreams", false)]
    fn test_volume_indicator(#[case] title: &str, #[case] expected: bool) {
        assert_eq!(has_volume_indicator(title), expected);
    }
}
