use futures::StreamExt;
use std::path::{Component, Path, PathBuf};
use tome_catalog::models::Library;
use tome_media::FileType;
use tome_sidecar::is_sidecar_path;
use tome_storage::BackendHandle;

use crate::Context;
use crate::naming::is_cover_file;
use crate::scan::{ScanError, Stage};

/// How a discovered file takes part in the scan.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum Kind {
    /// A parser claims it, so it can describe (and be) a book.
    Supported(FileType),
    /// Catalogued next to a book without being parsed.
    Supplement,
}

pub(super) struct Discovered {
    pub(super) backend: BackendHandle,
    pub(super) root: PathBuf,
    pub(super) relative: PathBuf,
    pub(super) size: u64,
    pub(super) kind: Kind,
}
impl Discovered {
    pub(super) fn absolute(&self) -> PathBuf {
        self.root.join(&self.relative)
    }
}

#[derive(Default)]
pub(super) struct Discovery {
    /// Supported files first, then supplements, each in path order.
    pub(super) files: Vec<Discovered>,
    /// Roots that could not be listed completely.
    pub(super) failed_roots: Vec<PathBuf>,
    pub(super) errors: Vec<ScanError>,
}

/// Walk every root of a library and pick out the files worth cataloguing.
pub(super) async fn discover(ctx: &Context, library: &Library) -> Discovery {
    let mut discovery = Discovery::default();
    for root in &library.paths {
        let backend = match ctx.mounter.mount(root) {
            Ok(backend) => backend,
            Err(err) => {
                tracing::warn!(root = %root.display(), error = ?err, "library root unavailable");
                discovery.failed_roots.push(root.clone());
                discovery.errors.push(ScanError::new(root, Stage::Discover, err.to_string()));
                continue;
            },
        };
        let mut files = backend.walk();
        let mut found = Vec::new();
        while let Some(entry) = files.next().await {
            match entry {
                Ok(file) => {
                    if let Some(kind) = classify(ctx, &file.path) {
                        found.push((file.path, file.size, kind));
                    }
                },
                Err(err) => {
                    tracing::warn!(root = %root.display(), error = ?err, "could not list part of library root");
                    if !discovery.failed_roots.contains(root) {
                        discovery.failed_roots.push(root.clone());
                    }
                    discovery.errors.push(ScanError::new(root, Stage::Discover, err.to_string()));
                },
            }
        }
        discovery.files.extend(found.into_iter().map(|(relative, size, kind)| Discovered {
            backend: backend.clone(),
            root: root.clone(),
            relative,
            size,
            kind,
        }));
    }
    discovery.files.sort_by(|a, b| {
        let rank = |d: &Discovered| matches!(d.kind, Kind::Supplement);
        rank(a).cmp(&rank(b)).then_with(|| a.absolute().cmp(&b.absolute()))
    });
    discovery
}

fn classify(ctx: &Context, relative: &Path) -> Option<Kind> {
    let options = &ctx.scan;
    let hidden_or_ignored = relative.components().any(|c| match c {
        Component::Normal(name) => name
            .to_str()
            .is_none_or(|name| name.starts_with('.') || options.ignore_names.iter().any(|i| i == name)),
        _ => true,
    });
    if hidden_or_ignored || is_sidecar_path(relative) || is_cover_file(relative) {
        return None;
    }
    let file_type = FileType::from_path(relative);
    if file_type != FileType::Other && ctx.parsers.supports(file_type) {
        return Some(Kind::Supported(file_type));
    }
    let extension = relative.extension().and_then(|e| e.to_str())?.to_ascii_lowercase();
    options.supplement_extensions.iter().any(|e| e.eq_ignore_ascii_case(&extension)).then_some(Kind::Supplement)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::StaticMounter;
    use rstest::rstest;
    use std::sync::Arc;
    use tome_catalog::{Database, Repository};

    async fn context() -> (Database, Context) {
        let db = Database::connect_in_memory().await.unwrap();
        let ctx = Context::new(Repository::from(&db), Arc::new(StaticMounter::new())).unwrap();
        (db, ctx)
    }

    #[rstest]
    #[case("[A] B/B.epub", Some(Kind::Supported(FileType::Epub)))]
    #[case("B.M4B", Some(Kind::Supported(FileType::M4b)))]
    #[case("[A] B/extras.pdf", Some(Kind::Supplement))]
    #[case("[A] B/notes.docx", None)]
    #[case("[A] B/B.metadata.json", None)]
    #[case("[A] B/B.epub.metadata.json", None)]
    #[case("[A] B/B.epub.cover.jpg", None)]
    #[case(".trash/B.epub", None)]
    #[case("[A] B/.B.epub", None)]
    #[case("__MACOSX/B.epub", None)]
    #[case("[A] B/@eaDir/B.epub", None)]
    #[tokio::test]
    async fn test_classify(#[case] path: &str, #[case] expected: Option<Kind>) {
        let (_db, ctx) = context().await;
        assert_eq!(classify(&ctx, Path::new(path)), expected);
    }
}
