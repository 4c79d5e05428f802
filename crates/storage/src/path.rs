//! Path validation for storage-relative paths.

use std::path::{Component, Path, PathBuf};

use crate::error::{ErrorKind, Result};

/// Validates a path relative to a library root, resolving `.` and `..`
/// components lexically.
///
/// Rejects anything that would climb above the root, absolute prefixes on
/// Windows, embedded null bytes, and paths that resolve to nothing.
///
/// ```
/// use std::path::Path;
/// use tome_storage::validate_path;
///
/// assert!(validate_path("Author/Book/book.epub").is_ok());
/// assert!(validate_path("../outside.epub").is_err());
/// assert_eq!(
///     validate_path("a/./b/../c.m4b").unwrap(),
///     Path::new("a/c.m4b"),
/// );
/// ```
pub fn validate(path: impl AsRef<Path>) -> Result<PathBuf> {
    let original = path.as_ref();
    let invalid = || exn::Exn::from(ErrorKind::InvalidPath(original.to_path_buf()));
    let mut resolved = Vec::new();
    for component in original.components() {
        match component {
            // Null bytes survive `components()` on Unix but truncate paths in syscalls.
            Component::Normal(part) if part.as_encoded_bytes().contains(&0) => return Err(invalid()),
            Component::Normal(part) => resolved.push(part),
            Component::CurDir | Component::RootDir => {},
            Component::Prefix(_) => return Err(invalid()),
            Component::ParentDir => {
                resolved.pop().ok_or_else(invalid)?;
            },
        }
    }
    if resolved.is_empty() {
        return Err(invalid());
    }
    Ok(resolved.into_iter().collect())
}

/// Express `path` relative to `root`, validating the remainder.
///
/// Returns `None` when `path` is not inside `root`, or when it *is* `root`.
pub fn relative_to(root: &Path, path: &Path) -> Option<PathBuf> {
    path.strip_prefix(root).ok().and_then(|rest| validate(rest).ok())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("Author/Book/book.epub", "Author/Book/book.epub")]
    #[case("book.m4b", "book.m4b")]
    #[case("a//b//c.cbz", "a/b/c.cbz")]
    #[case("a/./b/./c.cbz", "a/b/c.cbz")]
    #[case("a/b/..", "a")]
    #[case("[Jane Doe] My Book/", "[Jane Doe] My Book")]
    #[case("/leading/slash.epub", "leading/slash.epub")]
    fn test_valid(#[case] input: &str, #[case] expected: &str) {
        assert_eq!(validate(input).unwrap(), Path::new(expected));
    }

    #[rstest]
    #[case("")]
    #[case(".")]
    #[case("./.")]
    #[case("//")]
    #[case("..")]
    #[case("../etc/passwd")]
    #[case("a/../../b")]
    #[case("a\0b")]
    fn test_invalid(#[case] input: &str) {
        let err = validate(input).unwrap_err();
        assert!(matches!(&*err, ErrorKind::InvalidPath(_)));
    }

    #[test]
    fn test_relative_to() {
        let root = Path::new("/library/books");
        assert_eq!(
            relative_to(root, Path::new("/library/books/[A] B/B.epub")),
            Some(PathBuf::from("[A] B/B.epub"))
        );
        assert_eq!(relative_to(root, Path::new("/library/books")), None);
        assert_eq!(relative_to(root, Path::new("/library/other/B.epub")), None);
    }
}
