use std::{
    fmt::{Display, Formatter, Result as FmtResult},
    str::FromStr,
};

use crate::error::{Error, ErrorKind};

/// Where a metadata value came from.
///
/// The declaration order is the default precedence, highest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "lowercase"))]
pub enum DataSource {
    /// Edited by a person through the catalog.
    Manual,
    /// Read back from a sidecar file this system wrote earlier.
    Sidecar,
    /// Embedded in the media file itself (OPF, MP4 atoms, ComicInfo).
    Format,
    /// Inferred from directory and file names.
    Filepath,
}
impl DataSource {
    pub const ALL: [DataSource; 4] = [Self::Manual, Self::Sidecar, Self::Format, Self::Filepath];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Manual => "manual",
            Self::Sidecar => "sidecar",
            Self::Format => "format",
            Self::Filepath => "filepath",
        }
    }
}
impl FromStr for DataSource {
    type Err = Error;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.trim().to_ascii_lowercase().as_str() {
            "manual" | "user" => Self::Manual,
            "sidecar" => Self::Sidecar,
            "format" | "file" | "embedded" => Self::Format,
            "filepath" | "path" => Self::Filepath,
            _ => exn::bail!(ErrorKind::ParseError {
                field: "data source",
                value: s.to_string(),
            }),
        })
    }
}
impl TryFrom<String> for DataSource {
    type Error = Error;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}
impl Display for DataSource {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        f.write_str(self.as_str())
    }
}

/// A value paired with the source it was read from.
#[derive(Debug, Clone, PartialEq)]
pub struct Sourced<T> {
    pub value: T,
    pub source: DataSource,
}
impl<T> Sourced<T> {
    pub fn new(value: T, source: DataSource) -> Self {
        Self { value, source }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Sourced<U> {
        Sourced {
            value: f(self.value),
            source: self.source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("manual", DataSource::Manual)]
    #[case(" Sidecar ", DataSource::Sidecar)]
    #[case("FORMAT", DataSource::Format)]
    #[case("path", DataSource::Filepath)]
    fn test_parse(#[case] input: &str, #[case] expected: DataSource) {
        assert_eq!(input.parse::<DataSource>().unwrap(), expected);
    }

    #[test]
    fn test_round_trip_through_display() {
        for source in DataSource::ALL {
            assert_eq!(source.to_string().parse::<DataSource>().unwrap(), source);
        }
        assert!("metadata".parse::<DataSource>().is_err());
    }

    #[test]
    fn test_default_order() {
        assert!(DataSource::Manual < DataSource::Sidecar);
        assert!(DataSource::Sidecar < DataSource::Format);
        assert!(DataSource::Format < DataSource::Filepath);
    }
}
