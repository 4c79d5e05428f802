use regex::Regex;
use std::sync::LazyLock;

macro_rules! regex {
    ($name:ident, $regex:expr) => {
        pub(crate) static $name: LazyLock<Regex> = LazyLock::new(|| Regex::new($regex).unwrap());
    };
}

// "[Author One & Author Two] Title" as produced by the organizer.
regex!(BRACKETED_AUTHOR_REGEX, r"^\s*\[(?P<authors>[^\]]+)\]\s*(?P<title>.*)$");
// "Title {Narrator}" for audiobook files.
regex!(BRACED_NARRATOR_REGEX, r"\s*\{(?P<narrators>[^}]+)\}\s*$");
// Collision suffix appended by the organizer: "Title (2)".
regex!(COLLISION_SUFFIX_REGEX, r"\s+\(\d{1,3}\)$");
// "v3", "Vol. 3", "Volume 3", "#3" anywhere in a title.
regex!(VOLUME_INDICATOR_REGEX, r"(?i)(?:\bv(?:ol(?:ume)?)?\.?\s*\d+|#\s*\d+)");
// Separators between several names in one bracket.
regex!(NAME_SEPARATOR_REGEX, r"\s*(?:&|;|\band\b)\s*");

/// Magic bytes at the start of every ZIP container (EPUB, CBZ).
pub(crate) const ZIP_MAGIC: &[u8] = b"PK\x03\x04";
/// MP4 containers carry `ftyp` at byte offset 4.
pub(crate) const MP4_FTYP: &[u8] = b"ftyp";
