use time::UtcDateTime;
use tome_media::Sourced;

use crate::error::{Error, Result};
use crate::ids::{LibraryId, PersonId, SeriesId};
use crate::models::{SeriesMembership, source, timestamp};

/// An author or narrator, unique per library by case-insensitive name.
#[derive(Debug, Clone, PartialEq)]
pub struct Person {
    pub id: PersonId,
    pub library_id: LibraryId,
    pub name: String,
    pub sort_name: Sourced<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Series {
    pub id: SeriesId,
    pub library_id: LibraryId,
    pub name: Sourced<String>,
    pub deleted_at: Option<UtcDateTime>,
}

#[derive(sqlx::FromRow)]
pub(crate) struct PersonRow {
    pub(crate) id: PersonId,
    pub(crate) library_id: LibraryId,
    pub(crate) name: String,
    pub(crate) sort_name: String,
    pub(crate) sort_name_source: String,
}
impl TryFrom<PersonRow> for Person {
    type Error = Error;
    fn try_from(row: PersonRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            library_id: row.library_id,
            name: row.name,
            sort_name: Sourced::new(row.sort_name, source(&row.sort_name_source, "sort name source")?),
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct SeriesRow {
    pub(crate) id: SeriesId,
    pub(crate) library_id: LibraryId,
    pub(crate) name: String,
    pub(crate) name_source: String,
    pub(crate) deleted_at: Option<i64>,
}
impl TryFrom<SeriesRow> for Series {
    type Error = Error;
    fn try_from(row: SeriesRow) -> Result<Self> {
        Ok(Self {
            id: row.id,
            library_id: row.library_id,
            name: Sourced::new(row.name, source(&row.name_source, "series name source")?),
            deleted_at: row.deleted_at.map(|t| timestamp(t, "series deleted at")).transpose()?,
        })
    }
}

#[derive(sqlx::FromRow)]
pub(crate) struct MembershipRow {
    #[sqlx(flatten)]
    pub(crate) series: SeriesRow,
    pub(crate) series_number: Option<f64>,
}
impl TryFrom<MembershipRow> for SeriesMembership {
    type Error = Error;
    fn try_from(row: MembershipRow) -> Result<Self> {
        Ok(Self {
            series: Series::try_from(row.series)?,
            number: row.series_number,
        })
    }
}

/// Derive a "Last, First" sort name from a display name.
///
/// Generational suffixes stay with the surname, single names are used
/// as-is, and names that already contain a comma are assumed to be sorted.
pub fn sort_name_for(name: &str) -> String {
    const SUFFIXES: [&str; 8] = ["jr", "jr.", "sr", "sr.", "ii", "iii", "iv", "phd"];
    let name = name.trim();
    if name.contains(',') {
        return name.to_string();
    }
    let mut parts: Vec<&str> = name.split_whitespace().collect();
    let suffix = match parts.last() {
        Some(last) if parts.len() > 2 && SUFFIXES.contains(&last.to_lowercase().as_str()) => parts.pop(),
        _ => None,
    };
    let Some((last, first)) = parts.split_last() else {
        return name.to_string();
    };
    if first.is_empty() {
        return name.to_string();
    }
    match suffix {
        Some(suffix) => format!("{last} {suffix}, {}", first.join(" ")),
        None => format!("{last}, {}", first.join(" ")),
    }
}
