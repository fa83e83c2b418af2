use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use glob::Pattern;
use ignore::{DirEntry, WalkBuilder};
use once_cell::sync::Lazy;
use tracing::debug;

use crate::error::{CodeGraphError, Result};
use crate::languages::LanguageRegistry;

/// Directories never descended into: dependencies, VCS metadata, build output.
const EXCLUDED_DIRS: &[&str] = &[
    "node_modules",
    "vendor",
    "__pycache__",
    ".venv",
    "venv",
    ".git",
    ".hg",
    ".svn",
    "target",
    "build",
    "dist",
    ".tox",
    ".mypy_cache",
    "site-packages",
];

const TEST_DIRS: &[&str] = &["test", "tests", "__tests__"];

static TEST_FILE_PATTERNS: Lazy<Vec<Pattern>> = Lazy::new(|| {
    ["test_*", "*_test.*", "*.test.*", "*.spec.*"]
        .iter()
        .filter_map(|p| Pattern::new(p).ok())
        .collect()
});

/// A candidate source file found by the walk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalkedFile {
    pub path: PathBuf,
    /// Relative to the walk root, `/`-separated.
    pub relative: String,
    pub language: String,
}

pub struct FileWalker {
    registry: Arc<LanguageRegistry>,
    include_tests: bool,
}

impl FileWalker {
    pub fn new(registry: Arc<LanguageRegistry>, include_tests: bool) -> Self {
        Self {
            registry,
            include_tests,
        }
    }

    /// Start a fresh walk of `root`. Nothing is read until the returned
    /// iterator is advanced, and calling `walk` again starts over.
    pub fn walk(&self, root: &Path) -> Result<WalkFiles> {
        if !root.is_dir() {
            return Err(CodeGraphError::DirectoryNotFound(root.to_path_buf()));
        }

        let filtered = Arc::new(AtomicUsize::new(0));
        let visited_dirs: Arc<Mutex<HashSet<PathBuf>>> = Arc::new(Mutex::new(HashSet::new()));

        let filter = EntryFilter {
            root: root.to_path_buf(),
            registry: Arc::clone(&self.registry),
            include_tests: self.include_tests,
            filtered: Arc::clone(&filtered),
            visited_dirs,
        };

        let inner = WalkBuilder::new(root)
            .hidden(true)
            .git_ignore(true)
            .git_global(true)
            .git_exclude(true)
            .ignore(true)
            .follow_links(true)
            .filter_entry(move |entry| filter.accept(entry))
            .build();

        Ok(WalkFiles {
            inner,
            root: root.to_path_buf(),
            registry: Arc::clone(&self.registry),
            seen: HashSet::new(),
            filtered,
        })
    }
}

/// Lazy sequence of files from one walk.
pub struct WalkFiles {
    inner: ignore::Walk,
    root: PathBuf,
    registry: Arc<LanguageRegistry>,
    seen: HashSet<PathBuf>,
    filtered: Arc<AtomicUsize>,
}

impl WalkFiles {
    /// Files of a configured language skipped so far as tests, either by
    /// name or by sitting under a test directory.
    pub fn filtered(&self) -> usize {
        self.filtered.load(Ordering::Relaxed)
    }
}

impl Iterator for WalkFiles {
    type Item = WalkedFile;

    fn next(&mut self) -> Option<WalkedFile> {
        for entry in self.inner.by_ref() {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry: {}", e);
                    continue;
                }
            };

            if !entry.file_type().map(|t| t.is_file()).unwrap_or(false) {
                continue;
            }
            let path = entry.path();
            let Some(language) = self.registry.get_for_file(path) else {
                continue;
            };

            // the same file reached twice through symlinks
            let real = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
            if !self.seen.insert(real) {
                continue;
            }

            let relative = relative_path(&self.root, path);
            return Some(WalkedFile {
                path: path.to_path_buf(),
                relative,
                language: language.name().to_string(),
            });
        }
        None
    }
}

struct EntryFilter {
    root: PathBuf,
    registry: Arc<LanguageRegistry>,
    include_tests: bool,
    filtered: Arc<AtomicUsize>,
    visited_dirs: Arc<Mutex<HashSet<PathBuf>>>,
}

impl EntryFilter {
    fn accept(&self, entry: &DirEntry) -> bool {
        let name = entry.file_name().to_string_lossy();
        let is_dir = entry.file_type().map(|t| t.is_dir()).unwrap_or(false);

        if is_dir {
            if entry.depth() > 0 && EXCLUDED_DIRS.contains(&name.as_ref()) {
                return false;
            }
            return self.first_visit(entry.path()) || entry.depth() == 0;
        }

        // files below a test directory count as filtered too
        if !self.include_tests && (is_test_file(&name) || self.in_test_dir(entry.path())) {
            if self.registry.get_for_file(entry.path()).is_some() {
                self.filtered.fetch_add(1, Ordering::Relaxed);
            }
            return false;
        }
        true
    }

    fn in_test_dir(&self, file: &Path) -> bool {
        let relative = file.strip_prefix(&self.root).unwrap_or(file);
        relative
            .parent()
            .map(|dir| {
                dir.components()
                    .any(|c| TEST_DIRS.contains(&c.as_os_str().to_string_lossy().as_ref()))
            })
            .unwrap_or(false)
    }

    /// Records the real path of a directory; false if it was seen before.
    fn first_visit(&self, dir: &Path) -> bool {
        let real = dir.canonicalize().unwrap_or_else(|_| dir.to_path_buf());
        let mut visited = self
            .visited_dirs
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        visited.insert(real)
    }
}

pub fn is_test_file(file_name: &str) -> bool {
    TEST_FILE_PATTERNS.iter().any(|p| p.matches(file_name))
}

fn relative_path(root: &Path, path: &Path) -> String {
    let relative = path.strip_prefix(root).unwrap_or(path);
    relative
        .components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}
