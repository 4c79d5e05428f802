//! Folder and file naming for organized books.
//!
//! Names are rendered from user-configurable [upon] templates, then every
//! rendered component is sanitized so it is safe on any common filesystem.
//! Templates get library-specific extensions on top of upon's
//! Mustache-like syntax:
//!
//! - **`slug`** formatter: URL-safe slug, with quotation marks stripped first.
//! - **`braced`** formatter: wraps a value in `{…}`, as used for narrators.
//! - **`truncate`** function: cut to a byte length at a character boundary,
//!   usable as `truncate(value, n)` or `{{ value|truncate: n }}`.
//!
//! # Template Variables
//!
//! | Variable    | Type             | Description                                          |
//! |-------------|------------------|------------------------------------------------------|
//! | `title`     | `String`         | Book title                                           |
//! | `author`    | `Option<String>` | Primary author                                       |
//! | `authors`   | `String`         | Every author, joined with ` & `                      |
//! | `series`    | `Option<String>` | First series the book belongs to                     |
//! | `volume`    | `Option<String>` | Comic volume, when the title doesn't already say it  |
//! | `narrator`  | `Option<String>` | Audiobook narrators joined with ` & ` (files only)   |
//! | `file_type` | `String`         | `epub`, `m4b`, `cbz` or `other`                      |
//!
//! # Example
//!
//! ```
//! use tome_library::NameGenerator;
//!
//! let generator = NameGenerator::new("{{ author|slug }}", "{{ title|truncate: 4 }}").unwrap();
//! # let _ = generator;
//! ```

use exn::ResultExt;
use std::path::Path;
use tome_catalog::models::{BookDetail, FileDetail};
use tome_media::{FileType, has_volume_indicator};
use tracing::instrument;
use upon::{Engine, Template};

use crate::error::{ErrorKind, Result};

pub const DEFAULT_FOLDER_TEMPLATE: &str =
    "{% if author %}[{{ author }}] {% endif %}{{ title }}{% if volume %} v{{ volume }}{% endif %}";
pub const DEFAULT_FILE_TEMPLATE: &str = "{{ title }}{% if narrator %} {{ narrator|braced }}{% endif %}";
pub const DEFAULT_MAX_COMPONENT_LENGTH: usize = 200;
const UNKNOWN: &str = "Unknown";

/// Where a file belongs, expressed as one folder name and one file name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NamePlan {
    pub folder: String,
    pub file_name: String,
}

/// Renders sanitized folder and file names from catalog state.
///
/// Both templates are compiled eagerly so syntax errors surface when the
/// configuration is loaded rather than halfway through a scan.
pub struct NameGenerator {
    engine: Engine<'static>,
    folder: Template<'static>,
    file: Template<'static>,
    max_length: usize,
}
impl NameGenerator {
    pub fn new(folder: &str, file: &str) -> Result<Self> {
        let mut engine = Engine::new();
        addons::configure(&mut engine);
        let folder = engine.compile(folder.to_string()).or_raise(|| ErrorKind::Template)?;
        let file = engine.compile(file.to_string()).or_raise(|| ErrorKind::Template)?;
        Ok(Self {
            engine,
            folder,
            file,
            max_length: DEFAULT_MAX_COMPONENT_LENGTH,
        })
    }

    pub fn defaults() -> Result<Self> {
        Self::new(DEFAULT_FOLDER_TEMPLATE, DEFAULT_FILE_TEMPLATE)
    }

    /// Cap every rendered component at `max_length` bytes.
    pub fn with_max_length(mut self, max_length: usize) -> Self {
        self.max_length = max_length.max(1);
        self
    }

    pub fn max_length(&self) -> usize {
        self.max_length
    }

    #[instrument(level = "debug", skip_all, fields(book = book.book.id.0))]
    pub fn folder_name(&self, book: &BookDetail) -> Result<String> {
        let main_type = book.main_file().map(|f| f.file.file_type).unwrap_or(FileType::Other);
        let rendered = self
            .folder
            .render(&self.engine, Self::parameters(book, main_type, None))
            .to_string()
            .or_raise(|| ErrorKind::Template)?;
        Ok(sanitize_component(&rendered, self.max_length))
    }

    /// The file's new name, keeping its current extension.
    #[instrument(level = "debug", skip_all, fields(file = file.file.id.0))]
    pub fn file_name(&self, book: &BookDetail, file: &FileDetail) -> Result<String> {
        let file_type = file.file.file_type;
        let narrator = match file_type.is_audiobook() && !file.narrators.is_empty() {
            true => Some(file.narrators.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(" & ")),
            false => None,
        };
        let rendered = self
            .file
            .render(&self.engine, Self::parameters(book, file_type, narrator))
            .to_string()
            .or_raise(|| ErrorKind::Template)?;
        let extension = file.file.filepath.extension().and_then(|e| e.to_str()).unwrap_or_default();
        let max_stem = self.max_length.saturating_sub(extension.len() + 1).max(1);
        let stem = sanitize_component(&rendered, max_stem);
        Ok(match extension.is_empty() {
            true => stem,
            false => format!("{stem}.{extension}"),
        })
    }

    pub fn plan(&self, book: &BookDetail, file: &FileDetail) -> Result<NamePlan> {
        Ok(NamePlan {
            folder: self.folder_name(book)?,
            file_name: self.file_name(book, file)?,
        })
    }

    fn parameters(book: &BookDetail, file_type: FileType, narrator: Option<String>) -> upon::Value {
        let title = book.book.title.value.as_str();
        let first_series = book.series.first();
        let volume = match file_type.is_comic() && !has_volume_indicator(title) {
            true => first_series.and_then(|m| m.number).map(format_number),
            false => None,
        };
        let authors = book.authors.iter().map(|p| p.name.as_str()).collect::<Vec<_>>().join(" & ");
        upon::value! {
            title: title,
            author: book.primary_author().map(|p| p.name.clone()),
            authors: authors,
            series: first_series.map(|m| m.series.name.value.clone()),
            volume: volume,
            narrator: narrator,
            file_type: file_type.as_str(),
        }
    }
}

/// Series numbers print without a trailing `.0`.
fn format_number(number: f64) -> String {
    match number.fract() == 0.0 {
        true => format!("{}", number as i64),
        false => number.to_string(),
    }
}

/// Make one path component safe to create on any common filesystem.
///
/// Strips reserved and control characters, straightens smart quotes,
/// collapses whitespace, caps the length at a character boundary and trims
/// trailing dots and spaces. Anything that ends up empty is named
/// `Unknown`.
///
/// ```
/// use tome_library::sanitize_component;
///
/// assert_eq!(sanitize_component("Why? A/B: “Test”  ", 200), "Why AB Test");
/// assert_eq!(sanitize_component("...", 200), "Unknown");
/// ```
pub fn sanitize_component(raw: &str, max_length: usize) -> String {
    let cleaned: String = raw
        .chars()
        .filter_map(|c| match c {
            '\u{2018}' | '\u{2019}' | '\u{201A}' | '\u{201B}' => Some('\''),
            '\u{201C}' | '\u{201D}' | '\u{201E}' | '\u{201F}' => None,
            '<' | '>' | ':' | '"' | '/' | '\\' | '|' | '?' | '*' => None,
            c if c.is_whitespace() => Some(' '),
            c if c.is_control() => None,
            c => Some(c),
        })
        .collect();
    let collapsed = cleaned.split_whitespace().collect::<Vec<_>>().join(" ");
    let truncated = &collapsed[..collapsed.floor_char_boundary(max_length)];
    let trimmed = truncated.trim_end_matches(['.', ' ']).trim_start();
    match trimmed.is_empty() {
        true => UNKNOWN.to_string(),
        false => trimmed.to_string(),
    }
}

/// `name` with a collision suffix: `Title (2)`, or `Title (2).epub` for a
/// file name.
pub(crate) fn with_collision_suffix(name: &str, attempt: u32, is_file: bool) -> String {
    let path = Path::new(name);
    match (is_file, path.file_stem().and_then(|s| s.to_str()), path.extension().and_then(|e| e.to_str())) {
        (true, Some(stem), Some(ext)) => format!("{stem} ({attempt}).{ext}"),
        _ => format!("{name} ({attempt})"),
    }
}

const COVER_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "webp", "gif"];

/// Name of the cover image stored next to `file_name`.
pub(crate) fn cover_file_name(file_name: &str, extension: &str) -> String {
    format!("{file_name}.cover.{extension}")
}

/// Whether a file name looks like a cover stored next to a media file.
pub(crate) fn is_cover_file(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    let lower = name.to_lowercase();
    COVER_EXTENSIONS.iter().any(|ext| lower.ends_with(&format!(".cover.{ext}")))
}

/// Whether `name` is `base` or `base` with a collision suffix.
pub(crate) fn is_variant_of(name: &str, base: &str, is_file: bool, max_attempts: u32) -> bool {
    name == base || (1..=max_attempts).any(|attempt| with_collision_suffix(base, attempt, is_file) == name)
}

/// Custom [`upon`] extensions for path-safe string manipulation.
mod addons {
    use rslug::slugify;
    use std::fmt::Write;
    use upon::{Engine, Value, fmt as upon_fmt};

    /// Strips quotation marks before slugifying to avoid awkward slug output
    /// like `"hello"` becoming `-hello-`.
    fn slug_formatter(f: &mut upon_fmt::Formatter<'_>, value: &Value) -> upon_fmt::Result {
        match value {
            Value::String(s) => {
                let marks = [
                    '\u{0027}', '\u{0022}', '\u{2018}', '\u{2019}', '\u{201C}', '\u{201D}', '\u{201E}', '\u{201B}',
                    '\u{0060}', '\u{00AB}', '\u{00BB}', '\u{2039}', '\u{203A}',
                ];
                let stripped: String = s.chars().filter(|c| !marks.contains(c)).collect();
                write!(f, "{}", slugify!(&stripped))?
            },
            v => upon_fmt::default(f, v)?,
        };
        Ok(())
    }

    fn braced_formatter(f: &mut upon_fmt::Formatter<'_>, value: &Value) -> upon_fmt::Result {
        match value {
            Value::String(s) => write!(f, "{{{s}}}")?,
            v => upon_fmt::default(f, v)?,
        };
        Ok(())
    }

    fn truncate_to_char_boundary(s: &str, max_bytes: usize) -> String {
        s[..s.floor_char_boundary(max_bytes)].to_string()
    }

    pub(crate) fn configure(engine: &mut Engine<'_>) {
        engine.add_formatter("slug", slug_formatter);
        engine.add_formatter("braced", braced_formatter);
        engine.add_function("truncate", truncate_to_char_boundary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use std::path::PathBuf;
    use time::UtcDateTime;
    use tome_catalog::ids::{BookId, FileId, LibraryId, PersonId, SeriesId};
    use tome_catalog::models::{Book, File, Intrinsic, Person, Series, SeriesMembership};
    use tome_media::{DataSource, FileRole, Sourced};

    fn person(name: &str) -> Person {
        Person {
            id: PersonId(1),
            library_id: LibraryId(1),
            name: name.to_string(),
            sort_name: Sourced::new(name.to_string(), DataSource::Filepath),
        }
    }

    fn file(path: &str, narrators: &[&str]) -> FileDetail {
        let now = UtcDateTime::now();
        FileDetail {
            file: File {
                id: FileId(1),
                library_id: LibraryId(1),
                book_id: BookId(1),
                filepath: PathBuf::from(path),
                file_type: FileType::from_path(path),
                file_role: FileRole::Main,
                intrinsic: Intrinsic::default(),
                cover: None,
                narrators_source: None,
                identifiers: None,
                chapters: None,
                created_at: now,
                updated_at: now,
            },
            narrators: narrators.iter().map(|n| person(n)).collect(),
        }
    }

    fn book(title: &str, authors: &[&str], series: Option<f64>, main: &str) -> BookDetail {
        let now = UtcDateTime::now();
        BookDetail {
            book: Book {
                id: BookId(1),
                library_id: LibraryId(1),
                filepath: PathBuf::from("/lib/x"),
                title: Sourced::new(title.to_string(), DataSource::Format),
                subtitle: None,
                sort_title: Sourced::new(title.to_string(), DataSource::Format),
                description: None,
                authors_source: Some(DataSource::Format),
                series_source: None,
                primary_file_id: Some(FileId(1)),
                created_at: now,
                updated_at: now,
            },
            authors: authors.iter().map(|a| person(a)).collect(),
            series: series
                .map(|number| SeriesMembership {
                    series: Series {
                        id: SeriesId(1),
                        library_id: LibraryId(1),
                        name: Sourced::new("Saga".to_string(), DataSource::Format),
                        deleted_at: None,
                    },
                    number: Some(number),
                })
                .into_iter()
                .collect(),
            files: vec![file(main, &[])],
        }
    }

    #[rstest]
    #[case(book("My Book", &["Jane Doe"], None, "/lib/a.epub"), "[Jane Doe] My Book")]
    #[case(book("My Book", &["Jane Doe", "John Roe"], None, "/lib/a.epub"), "[Jane Doe] My Book")]
    #[case(book("Anonymous", &[], None, "/lib/a.epub"), "Anonymous")]
    #[case(book("Saga", &["A. Artist"], Some(3.0), "/lib/a.cbz"), "[A. Artist] Saga v3")]
    #[case(book("Saga", &["A. Artist"], Some(3.5), "/lib/a.cbz"), "[A. Artist] Saga v3.5")]
    #[case(book("Saga Vol. 3", &["A. Artist"], Some(3.0), "/lib/a.cbz"), "[A. Artist] Saga Vol. 3")]
    #[case(book("Saga", &["A. Artist"], Some(3.0), "/lib/a.epub"), "[A. Artist] Saga")]
    #[case(book("Who: What?", &["Q"], None, "/lib/a.epub"), "[Q] Who What")]
    fn test_folder_names(#[case] book: BookDetail, #[case] expected: &str) {
        let generator = NameGenerator::defaults().unwrap();
        assert_eq!(generator.folder_name(&book).unwrap(), expected);
    }

    #[rstest]
    #[case("/lib/old.m4b", &["John Roe"], "My Book {John Roe}.m4b")]
    #[case("/lib/old.m4b", &["John Roe", "Ann Poe"], "My Book {John Roe & Ann Poe}.m4b")]
    #[case("/lib/old.m4b", &[], "My Book.m4b")]
    #[case("/lib/old.epub", &["Ignored"], "My Book.epub")]
    #[case("/lib/notes", &[], "My Book")]
    fn test_file_names(#[case] path: &str, #[case] narrators: &[&str], #[case] expected: &str) {
        let generator = NameGenerator::defaults().unwrap();
        let book = book("My Book", &["Jane Doe"], None, path);
        assert_eq!(generator.file_name(&book, &file(path, narrators)).unwrap(), expected);
    }

    #[test]
    fn test_custom_templates_and_addons() {
        let generator = NameGenerator::new("{{ author|slug }}", "{{ title|truncate: 4 }} - {{ file_type }}").unwrap();
        let book = book("Long Title", &["Jane \"JD\" Doe"], None, "/lib/a.epub");
        let plan = generator.plan(&book, &book.files[0]).unwrap();
        assert_eq!(plan.folder, "jane-jd-doe");
        assert_eq!(plan.file_name, "Long - epub.epub");
    }

    #[test]
    fn test_invalid_template() {
        let err = NameGenerator::new("{{ title", DEFAULT_FILE_TEMPLATE).err().unwrap();
        assert!(matches!(&*err, ErrorKind::Template));
    }

    #[test]
    fn test_length_cap_respects_extension() {
        let generator = NameGenerator::defaults().unwrap().with_max_length(10);
        let book = book("Abcdefghijklmnop", &[], None, "/lib/a.epub");
        assert_eq!(generator.file_name(&book, &book.files[0]).unwrap(), "Abcde.epub");
        assert_eq!(generator.folder_name(&book).unwrap(), "Abcdefghij");
    }

    #[rstest]
    #[case("Plain", "Plain")]
    #[case("  spaced   out  ", "spaced out")]
    #[case("Trailing dots...", "Trailing dots")]
    #[case("It\u{2019}s", "It's")]
    #[case("a<b>c|d*e", "abcde")]
    #[case("tab\there", "tab here")]
    #[case("nul\0l", "null")]
    #[case("", "Unknown")]
    #[case("???", "Unknown")]
    fn test_sanitize(#[case] raw: &str, #[case] expected: &str) {
        assert_eq!(sanitize_component(raw, 200), expected);
    }

    #[test]
    fn test_sanitize_truncates_at_char_boundary() {
        assert_eq!(sanitize_component("ééé", 3), "é");
    }

    #[rstest]
    #[case("My Book.epub.cover.jpg", true)]
    #[case("My Book.m4b.COVER.PNG", true)]
    #[case("cover.jpg", false)]
    #[case("My Book.epub", false)]
    fn test_is_cover_file(#[case] name: &str, #[case] expected: bool) {
        assert_eq!(is_cover_file(Path::new(name)), expected);
    }

    #[test]
    fn test_is_variant_of() {
        assert!(is_variant_of("[A] B", "[A] B", false, 100));
        assert!(is_variant_of("[A] B (7)", "[A] B", false, 100));
        assert!(!is_variant_of("[A] B (7)", "[A] B", false, 5));
        assert!(is_variant_of("B (2).epub", "B.epub", true, 100));
        assert!(!is_variant_of("C.epub", "B.epub", true, 100));
    }

    #[rstest]
    #[case("My Book", 1, false, "My Book (1)")]
    #[case("My Book.epub", 2, true, "My Book (2).epub")]
    #[case("README", 3, true, "README (3)")]
    fn test_collision_suffix(#[case] name: &str, #[case] attempt: u32, #[case] is_file: bool, #[case] expected: &str) {
        assert_eq!(with_collision_suffix(name, attempt, is_file), expected);
    }
}
