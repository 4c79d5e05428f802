use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    path::Path,
    str::FromStr,
};

use crate::error::{Error, ErrorKind};

/// Container format of a catalogued file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum FileType {
    Epub,
    M4b,
    Cbz,
    /// Anything attached to a book that no parser understands (PDFs, notes).
    Other,
}
impl FileType {
    /// Detect the file type from a path's extension.
    pub fn from_path(path: impl AsRef<Path>) -> Self {
        path.as_ref()
            .extension()
            .and_then(|e| e.to_str())
            .map(Self::from_extension)
            .unwrap_or(Self::Other)
    }

    pub fn from_extension(ext: &str) -> Self {
        match ext.to_ascii_lowercase().as_str() {
            "epub" => Self::Epub,
            "m4b" => Self::M4b,
            "cbz" => Self::Cbz,
            _ => Self::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Epub => "epub",
            Self::M4b => "m4b",
            Self::Cbz => "cbz",
            Self::Other => "other",
        }
    }

    pub fn is_audiobook(&self) -> bool {
        matches!(self, Self::M4b)
    }

    pub fn is_comic(&self) -> bool {
        matches!(self, Self::Cbz)
    }
}
impl FromStr for FileType {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "epub" => Self::Epub,
            "m4b" => Self::M4b,
            "cbz" => Self::Cbz,
            "other" => Self::Other,
            _ => exn::bail!(ErrorKind::ParseError {
                field: "file type",
                value: s.to_string(),
            }),
        })
    }
}
impl Display for FileType {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// Whether a file is the edition that represents its book.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileRole {
    Main,
    Supplement,
}
impl FileRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Main => "main",
            Self::Supplement => "supplement",
        }
    }
}
impl FromStr for FileRole {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s {
            "main" => Self::Main,
            "supplement" => Self::Supplement,
            _ => exn::bail!(ErrorKind::ParseError {
                field: "file role",
                value: s.to_string(),
            }),
        })
    }
}
impl Display for FileRole {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}
