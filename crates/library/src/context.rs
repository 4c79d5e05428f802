use exn::ResultExt;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tome_catalog::Repository;
use tome_catalog::models::Library;
use tome_media::{FileType, ParserRegistry};
use tome_storage::backend::LocalBackend;
use tome_storage::{BackendHandle, relative_to};

use crate::error::{Error, ErrorKind, Result};
use crate::naming::NameGenerator;
use crate::reconcile::{Priority, Reconciler};

pub const DEFAULT_IGNORE_NAMES: [&str; 5] = [".DS_Store", "Thumbs.db", "desktop.ini", "__MACOSX", "@eaDir"];
pub const DEFAULT_SUPPLEMENT_EXTENSIONS: [&str; 6] = ["pdf", "mobi", "azw3", "txt", "nfo", "mp3"];
pub const DEFAULT_MAX_COLLISION_ATTEMPTS: u32 = 100;

/// Hands out the storage backend serving a library root.
pub trait Mounter: Send + Sync {
    fn mount(&self, root: &Path) -> Result<BackendHandle>;
}

/// Serves every root straight from the local filesystem.
#[derive(Debug, Default, Clone, Copy)]
pub struct LocalMounter;
impl Mounter for LocalMounter {
    fn mount(&self, root: &Path) -> Result<BackendHandle> {
        let name = root.display().to_string();
        let backend = LocalBackend::new(name, root).or_raise(|| ErrorKind::Unmounted(root.to_path_buf()))?;
        Ok(Arc::new(backend))
    }
}

/// A fixed set of pre-built backends, keyed by root. Mostly for tests.
#[derive(Default, Clone)]
pub struct StaticMounter {
    backends: HashMap<PathBuf, BackendHandle>,
}
impl StaticMounter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, root: impl Into<PathBuf>, backend: BackendHandle) -> Self {
        self.backends.insert(root.into(), backend);
        self
    }
}
impl Mounter for StaticMounter {
    fn mount(&self, root: &Path) -> Result<BackendHandle> {
        self.backends.get(root).cloned().ok_or_else(|| Error::from(ErrorKind::Unmounted(root.to_path_buf())))
    }
}

/// What the scanner looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanOptions {
    /// File and directory names skipped wherever they appear.
    pub ignore_names: Vec<String>,
    /// Extensions, without the dot, catalogued as supplements next to a book.
    pub supplement_extensions: Vec<String>,
    /// Files parsed at once.
    pub parse_concurrency: usize,
}
impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            ignore_names: DEFAULT_IGNORE_NAMES.iter().map(|s| s.to_string()).collect(),
            supplement_extensions: DEFAULT_SUPPLEMENT_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            parse_concurrency: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
        }
    }
}

/// A path resolved to the root that holds it.
pub(crate) struct Located {
    pub(crate) backend: BackendHandle,
    pub(crate) root: PathBuf,
    pub(crate) relative: PathBuf,
}
impl Located {
    pub(crate) fn absolute(&self, relative: &Path) -> PathBuf {
        self.root.join(relative)
    }
}

/// Everything the engine needs to work on a library: the catalog, parsers,
/// storage and the policies that steer them.
pub struct Context {
    pub(crate) repo: Repository,
    pub(crate) parsers: ParserRegistry,
    pub(crate) mounter: Arc<dyn Mounter>,
    pub(crate) reconciler: Reconciler,
    pub(crate) naming: NameGenerator,
    pub(crate) scan: ScanOptions,
    pub(crate) write_sidecars: bool,
    pub(crate) max_collisions: u32,
}
impl Context {
    /// A context with the default parsers, priority and naming templates.
    pub fn new(repo: Repository, mounter: Arc<dyn Mounter>) -> Result<Self> {
        Ok(Self {
            repo,
            parsers: ParserRegistry::with_defaults(),
            mounter,
            reconciler: Reconciler::default(),
            naming: NameGenerator::defaults()?,
            scan: ScanOptions::default(),
            write_sidecars: true,
            max_collisions: DEFAULT_MAX_COLLISION_ATTEMPTS,
        })
    }

    pub fn with_parsers(mut self, parsers: ParserRegistry) -> Self {
        self.parsers = parsers;
        self
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.reconciler = Reconciler::new(priority);
        self
    }

    pub fn with_naming(mut self, naming: NameGenerator) -> Self {
        self.naming = naming;
        self
    }

    pub fn with_scan_options(mut self, scan: ScanOptions) -> Self {
        self.scan = scan;
        self
    }

    pub fn with_sidecars(mut self, enabled: bool) -> Self {
        self.write_sidecars = enabled;
        self
    }

    pub fn with_max_collisions(mut self, attempts: u32) -> Self {
        self.max_collisions = attempts.max(1);
        self
    }

    pub fn repo(&self) -> &Repository {
        &self.repo
    }

    pub fn reconciler(&self) -> &Reconciler {
        &self.reconciler
    }

    /// File types that may become a book's main file.
    pub(crate) fn promotable(&self) -> Vec<FileType> {
        [FileType::Epub, FileType::M4b, FileType::Cbz]
            .into_iter()
            .filter(|t| self.parsers.supports(*t))
            .collect()
    }

    /// Find the root holding `path` and the backend serving it.
    pub(crate) fn locate(&self, library: &Library, path: &Path) -> Result<Located> {
        let unmounted = || Error::from(ErrorKind::Unmounted(path.to_path_buf()));
        let root = library.root_for(path).ok_or_else(unmounted)?;
        let relative = relative_to(root, path).ok_or_else(unmounted)?;
        Ok(Located {
            backend: self.mounter.mount(root)?,
            root: root.to_path_buf(),
            relative,
        })
    }
}
