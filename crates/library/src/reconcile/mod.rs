//! Merging metadata from several untrusted sources into catalog state.
//!
//! Each source reports its facts as a [`Layer`]. The layers are first
//! collapsed field by field to the most authoritative source that has a
//! value, then that single candidate is weighed against what the catalog
//! already holds. A field only moves when the incoming source ranks at least
//! as high as the current one, and an identical value never counts as a
//! change.

mod facts;
mod priority;

pub use self::facts::{BookFacts, FileFacts, Layer};
pub use self::priority::Priority;

use tome_catalog::models::{BookFields, CoverRef, FileFields, Intrinsic, name_key};
use tome_media::Sourced;

/// The outcome of reconciling one entity.
#[derive(Debug, Clone, PartialEq)]
pub struct Reconciled<T> {
    pub value: T,
    /// Names of the fields that changed, in declaration order.
    pub changed: Vec<&'static str>,
}
impl<T> Reconciled<T> {
    pub fn is_changed(&self) -> bool {
        !self.changed.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct Reconciler {
    priority: Priority,
}
impl Reconciler {
    pub fn new(priority: Priority) -> Self {
        Self { priority }
    }

    pub fn priority(&self) -> &Priority {
        &self.priority
    }

    /// Reconcile book metadata.
    ///
    /// Returns `None` only when there is neither a current book nor any
    /// source that knows its title.
    pub fn book(&self, current: Option<&BookFields>, layers: &[Layer<BookFacts>]) -> Option<Reconciled<BookFields>> {
        let mut changed = Vec::new();
        let title = self.field(
            "title",
            current.map(|c| &c.title),
            self.collapse(layers, |f| f.title.clone()),
            &mut changed,
            |a, b| a == b,
        )?;
        let subtitle = self.field(
            "subtitle",
            current.and_then(|c| c.subtitle.as_ref()),
            self.collapse(layers, |f| f.subtitle.clone()),
            &mut changed,
            |a, b| a == b,
        );
        let sort_title = self
            .collapse(layers, |f| f.sort_title.clone())
            .unwrap_or_else(|| Sourced::new(sort_title_for(&title.value), title.source));
        let sort_title = self
            .field("sort_title", current.map(|c| &c.sort_title), Some(sort_title), &mut changed, |a, b| a == b)
            .unwrap_or_else(|| Sourced::new(sort_title_for(&title.value), title.source));
        let description = self.field(
            "description",
            current.and_then(|c| c.description.as_ref()),
            self.collapse(layers, |f| f.description.clone()),
            &mut changed,
            |a, b| a == b,
        );
        let authors = self.field(
            "authors",
            current.and_then(|c| c.authors.as_ref()),
            self.collapse(layers, |f| Some(f.authors.clone()).filter(|a| !a.is_empty())),
            &mut changed,
            same_names,
        );
        let series = self.field(
            "series",
            current.and_then(|c| c.series.as_ref()),
            self.collapse(layers, |f| Some(f.series.clone()).filter(|s| !s.is_empty())),
            &mut changed,
            |a, b| a == b,
        );
        Some(Reconciled {
            value: BookFields {
                title,
                subtitle,
                sort_title,
                description,
                authors,
                series,
            },
            changed,
        })
    }

    /// Reconcile file metadata.
    ///
    /// Intrinsic facts bypass the priority gate and always take the incoming
    /// value; they describe the bytes on disk, not anyone's opinion of them.
    pub fn file(
        &self,
        current: Option<&FileFields>,
        layers: &[Layer<FileFacts>],
        intrinsic: Intrinsic,
        cover: Option<CoverRef>,
    ) -> Reconciled<FileFields> {
        let mut changed = Vec::new();
        let narrators = self.field(
            "narrators",
            current.and_then(|c| c.narrators.as_ref()),
            self.collapse(layers, |f| Some(f.narrators.clone()).filter(|n| !n.is_empty())),
            &mut changed,
            same_names,
        );
        let identifiers = self.field(
            "identifiers",
            current.and_then(|c| c.identifiers.as_ref()),
            self.collapse(layers, |f| Some(f.identifiers.clone()).filter(|i| !i.is_empty())),
            &mut changed,
            |a, b| a == b,
        );
        let chapters = self.field(
            "chapters",
            current.and_then(|c| c.chapters.as_ref()),
            self.collapse(layers, |f| Some(f.chapters.clone()).filter(|c| !c.is_empty())),
            &mut changed,
            |a, b| a == b,
        );
        let cover = match (current.and_then(|c| c.cover.as_ref()), cover) {
            (current, None) => current.cloned(),
            (Some(current), Some(incoming)) if *current == incoming => Some(incoming),
            (current, Some(incoming)) => match self.priority.should_overwrite(current.map(|c| c.source), incoming.source) {
                true => {
                    changed.push("cover");
                    Some(incoming)
                },
                false => current.cloned(),
            },
        };
        if current.is_none_or(|c| c.intrinsic != intrinsic) {
            changed.push("intrinsic");
        }
        Reconciled {
            value: FileFields {
                narrators,
                identifiers,
                chapters,
                cover,
                intrinsic,
            },
            changed,
        }
    }

    /// The value from the most authoritative layer that has one.
    fn collapse<T, V>(&self, layers: &[Layer<T>], pick: impl Fn(&T) -> Option<V>) -> Option<Sourced<V>> {
        let mut ordered: Vec<&Layer<T>> = layers.iter().collect();
        ordered.sort_by_key(|layer| self.priority.rank(layer.source));
        ordered.into_iter().find_map(|layer| pick(&layer.facts).map(|value| Sourced::new(value, layer.source)))
    }

    fn field<T: Clone>(
        &self,
        name: &'static str,
        current: Option<&Sourced<T>>,
        incoming: Option<Sourced<T>>,
        changed: &mut Vec<&'static str>,
        same: impl Fn(&T, &T) -> bool,
    ) -> Option<Sourced<T>> {
        match (current, incoming) {
            (current, None) => current.cloned(),
            (Some(current), Some(incoming)) if same(&current.value, &incoming.value) => Some(current.clone()),
            (current, Some(incoming)) => match self.priority.should_overwrite(current.map(|c| c.source), incoming.source) {
                true => {
                    changed.push(name);
                    Some(incoming)
                },
                false => current.cloned(),
            },
        }
    }
}

/// People lists match when they name the same identities in the same order.
fn same_names(a: &Vec<String>, b: &Vec<String>) -> bool {
    a.len() == b.len() && a.iter().zip(b).all(|(a, b)| name_key(a) == name_key(b))
}

/// Move a leading English article to the end: "The Hobbit" sorts as
/// "Hobbit, The".
pub fn sort_title_for(title: &str) -> String {
    let title = title.trim();
    for article in ["The", "An", "A"] {
        let Some(head) = title.get(..article.len()) else {
            continue;
        };
        let rest = &title[article.len()..];
        if head.eq_ignore_ascii_case(article) && rest.starts_with(' ') && !rest.trim().is_empty() {
            return format!("{}, {head}", rest.trim());
        }
    }
    title.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tome_media::DataSource::{self, *};
    use tome_media::models::SeriesEntry;

    fn facts(title: &str) -> BookFacts {
        BookFacts {
            title: Some(title.to_string()),
            ..Default::default()
        }
    }

    fn existing(title: &str, source: DataSource) -> BookFields {
        BookFields {
            title: Sourced::new(title.to_string(), source),
            subtitle: None,
            sort_title: Sourced::new(sort_title_for(title), source),
            description: None,
            authors: None,
            series: None,
        }
    }

    #[rstest]
    #[case("The Hobbit", "Hobbit, The")]
    #[case("a tale of two cities", "tale of two cities, a")]
    #[case("An Instance", "Instance, An")]
    #[case("Anathem", "Anathem")]
    #[case("The", "The")]
    #[case("Theory", "Theory")]
    #[case("Éclat", "Éclat")]
    fn test_sort_title(#[case] title: &str, #[case] expected: &str) {
        assert_eq!(sort_title_for(title), expected);
    }

    #[test]
    fn test_layers_collapse_per_field() {
        let layers = [
            Layer::new(Filepath, BookFacts {
                title: Some("from path".to_string()),
                authors: vec!["Path Author".to_string()],
                ..Default::default()
            }),
            Layer::new(Format, BookFacts {
                title: Some("From Format".to_string()),
                description: Some("Blurb".to_string()),
                ..Default::default()
            }),
            Layer::new(Sidecar, BookFacts {
                series: vec![SeriesEntry::new("Saga", Some(2.0))],
                ..Default::default()
            }),
        ];
        let book = Reconciler::default().book(None, &layers).unwrap().value;
        assert_eq!(book.title, Sourced::new("From Format".to_string(), Format));
        assert_eq!(book.sort_title, Sourced::new("From Format".to_string(), Format));
        assert_eq!(book.description.unwrap().source, Format);
        assert_eq!(book.authors, Some(Sourced::new(vec!["Path Author".to_string()], Filepath)));
        assert_eq!(book.series.unwrap().source, Sidecar);
    }

    #[test]
    fn test_manual_survives_rescan() {
        let current = existing("Edited", Manual);
        let layers = [Layer::new(Sidecar, facts("Sidecar Title")), Layer::new(Format, facts("Embedded"))];
        let reconciled = Reconciler::default().book(Some(&current), &layers).unwrap();
        assert!(!reconciled.is_changed());
        assert_eq!(reconciled.value, current);
    }

    #[test]
    fn test_equal_value_keeps_source() {
        let current = existing("Same", Filepath);
        let reconciled = Reconciler::default().book(Some(&current), &[Layer::new(Sidecar, facts("Same"))]).unwrap();
        assert!(!reconciled.is_changed());
        assert_eq!(reconciled.value.title.source, Filepath);
    }

    #[test]
    fn test_higher_source_replaces_and_rederives_sort_title() {
        let current = existing("the path title", Filepath);
        let reconciled = Reconciler::default().book(Some(&current), &[Layer::new(Format, facts("The Real Title"))]).unwrap();
        assert_eq!(reconciled.changed, vec!["title", "sort_title"]);
        assert_eq!(reconciled.value.sort_title, Sourced::new("Real Title, The".to_string(), Format));
    }

    #[test]
    fn test_missing_title_without_current() {
        let layers = [Layer::new(Format, BookFacts::default())];
        assert!(Reconciler::default().book(None, &layers).is_none());
    }

    #[test]
    fn test_author_case_is_not_a_change() {
        let mut current = existing("Book", Format);
        current.authors = Some(Sourced::new(vec!["Jane Doe".to_string()], Format));
        let layers = [Layer::new(Format, BookFacts {
            title: Some("Book".to_string()),
            authors: vec!["JANE DOE".to_string()],
            ..Default::default()
        })];
        assert!(!Reconciler::default().book(Some(&current), &layers).unwrap().is_changed());
    }

    #[test]
    fn test_intrinsic_bypasses_priority() {
        let current = FileFields {
            narrators: Some(Sourced::new(vec!["Reader".to_string()], Manual)),
            intrinsic: Intrinsic {
                size: 10,
                ..Default::default()
            },
            ..Default::default()
        };
        let layers = [Layer::new(Format, FileFacts {
            narrators: vec!["Someone Else".to_string()],
            ..Default::default()
        })];
        let intrinsic = Intrinsic {
            size: 20,
            duration: Some(3600.0),
            ..Default::default()
        };
        let reconciled = Reconciler::default().file(Some(&current), &layers, intrinsic.clone(), None);
        assert_eq!(reconciled.changed, vec!["intrinsic"]);
        assert_eq!(reconciled.value.intrinsic, intrinsic);
        assert_eq!(reconciled.value.narrators, current.narrators);
    }

    #[test]
    fn test_unchanged_file() {
        let current = FileFields::default();
        let reconciled = Reconciler::default().file(Some(&current), &[], Intrinsic::default(), None);
        assert!(!reconciled.is_changed());
    }

    #[test]
    fn test_cover_respects_priority() {
        let manual = CoverRef {
            filename: "a.epub.cover.png".to_string(),
            mime: "image/png".to_string(),
            source: Manual,
        };
        let current = FileFields {
            cover: Some(manual.clone()),
            ..Default::default()
        };
        let embedded = CoverRef {
            filename: "a.epub.cover.jpg".to_string(),
            mime: "image/jpeg".to_string(),
            source: Format,
        };
        let reconciled = Reconciler::default().file(Some(&current), &[], Intrinsic::default(), Some(embedded.clone()));
        assert_eq!(reconciled.value.cover, Some(manual));
        let reconciled = Reconciler::default().file(None, &[], Intrinsic::default(), Some(embedded.clone()));
        assert_eq!(reconciled.value.cover, Some(embedded));
        assert_eq!(reconciled.changed, vec!["cover", "intrinsic"]);
    }
}
