use std::path::{Path, PathBuf};

use walkdir::WalkDir;

use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum EntryKind {
    Dir,
    File,
}

/// One child of a logical path.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct Entry {
    pub name: String,
    pub kind: EntryKind,
}

impl Entry {
    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::Dir,
        }
    }

    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            kind: EntryKind::File,
        }
    }
}

/// A physical place namespaces can live in.
///
/// Paths are relative, `/`-separated, without leading or trailing `/`; the
/// empty path is the root of the location.
pub trait Location: std::fmt::Debug {
    /// Immediate children of `path`.
    ///
    /// # Errors
    ///
    /// Returns `ScanFailed` if `path` cannot be read.
    fn children(&self, path: &str) -> Result<Vec<Entry>>;

    /// Whether `path` exists as a directory in this location.
    fn has_dir(&self, path: &str) -> bool;
}

/// Loose files under a directory on disk.
#[derive(Debug, Clone)]
pub struct DirLocation {
    root: PathBuf,
}

impl DirLocation {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, path: &str) -> PathBuf {
        path.split('/')
            .filter(|s| !s.is_empty())
            .fold(self.root.clone(), |acc, s| acc.join(s))
    }
}

impl Location for DirLocation {
    /// Symlinked directories are skipped, so a link back up the tree
    /// cannot make the walk loop.
    fn children(&self, path: &str) -> Result<Vec<Entry>> {
        let mut entries = vec![];
        for entry in WalkDir::new(self.resolve(path)).min_depth(1).max_depth(1) {
            let entry = entry?;
            let Some(name) = entry.file_name().to_str() else {
                tracing::debug!("skip non utf-8 name {:?}", entry.path());
                continue;
            };
            if entry.file_type().is_dir() {
                entries.push(Entry::dir(name));
            } else if entry.path_is_symlink() && entry.path().is_dir() {
                tracing::debug!("skip symlinked directory {}", entry.path().display());
            } else {
                entries.push(Entry::file(name));
            }
        }
        entries.sort();
        Ok(entries)
    }

    fn has_dir(&self, path: &str) -> bool {
        self.resolve(path).is_dir()
    }
}
