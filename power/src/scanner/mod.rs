//! Namespace scanning over a classpath of directories and archives.
//!
//! A namespace such as `server.admin` is looked up as the relative path
//! `server/admin` under every classpath root. Each file below it ending with
//! the artifact suffix names one type: `server/admin/AdminServer.svc` is
//! `server.admin.AdminServer`.

mod archive;
mod location;

pub use archive::ArchiveLocation;
pub use location::{DirLocation, Entry, EntryKind, Location};

use std::{
    collections::{BTreeSet, HashSet},
    path::{Path, PathBuf},
};

use serde::{Deserialize, Serialize};

use crate::Result;

pub const DEFAULT_SUFFIX: &str = ".svc";

/// Fully-qualified, dot-separated type name found by a scan.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TypeReference(String);

impl TypeReference {
    pub fn new(namespace: &str, simple_name: &str) -> Self {
        if namespace.is_empty() {
            Self(simple_name.to_string())
        } else {
            Self(format!("{namespace}.{simple_name}"))
        }
    }

    #[must_use]
    pub fn name(&self) -> &str {
        &self.0
    }

    /// Everything before the last `.`, empty for top-level types.
    #[must_use]
    pub fn namespace(&self) -> &str {
        self.0.rsplit_once('.').map_or("", |(ns, _)| ns)
    }

    #[must_use]
    pub fn simple_name(&self) -> &str {
        self.0.rsplit_once('.').map_or(&self.0, |(_, name)| name)
    }
}

impl std::fmt::Display for TypeReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TypeReference {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Finds type names under a namespace.
///
/// Every failure is local: an unreadable root or directory is logged and
/// skipped, and a namespace found nowhere yields an empty set.
#[derive(Debug, Clone)]
pub struct Scanner {
    roots: Vec<PathBuf>,
    recursive: bool,
    suffix: String,
}

impl Scanner {
    pub fn new<P: Into<PathBuf>>(classpath: impl IntoIterator<Item = P>) -> Self {
        Self {
            roots: classpath.into_iter().map(Into::into).collect(),
            recursive: true,
            suffix: DEFAULT_SUFFIX.to_string(),
        }
    }

    /// Whether sub-namespaces are scanned too. On by default.
    #[must_use]
    pub fn recursive(mut self, recursive: bool) -> Self {
        self.recursive = recursive;
        self
    }

    #[must_use]
    pub fn suffix(mut self, suffix: impl Into<String>) -> Self {
        self.suffix = suffix.into();
        self
    }

    pub fn scan(&self, namespace: &str) -> BTreeSet<TypeReference> {
        let path = namespace.replace('.', "/");
        let mut found = BTreeSet::new();
        for location in self.locations(&path) {
            tracing::debug!("scanning {namespace} in {location:?}");
            self.walk(location.as_ref(), namespace, &path, &mut found);
        }
        found
    }

    /// Every classpath location holding `path`, each physical root once.
    pub fn locations(&self, path: &str) -> Vec<Box<dyn Location>> {
        let mut seen = HashSet::new();
        let mut locations: Vec<Box<dyn Location>> = vec![];
        for root in &self.roots {
            let root = match root.canonicalize() {
                Ok(root) => root,
                Err(e) => {
                    tracing::debug!("skip classpath root {}: {e}", root.display());
                    continue;
                }
            };
            if !seen.insert(root.clone()) {
                continue;
            }

            match Self::open(&root) {
                Ok(location) if location.has_dir(path) => locations.push(location),
                Ok(_) => {}
                Err(e) => tracing::warn!("skip classpath root {}: {e}", root.display()),
            }
        }
        locations
    }

    fn open(root: &Path) -> Result<Box<dyn Location>> {
        if root.is_dir() {
            Ok(Box::new(DirLocation::new(root)))
        } else {
            Ok(Box::new(ArchiveLocation::open(root)?))
        }
    }

    fn walk(
        &self,
        location: &dyn Location,
        namespace: &str,
        path: &str,
        found: &mut BTreeSet<TypeReference>,
    ) {
        let children = match location.children(path) {
            Ok(children) => children,
            Err(e) => {
                tracing::warn!("skip {path} in {location:?}: {e}");
                return;
            }
        };

        for entry in children {
            match entry.kind {
                EntryKind::Dir if self.recursive => {
                    let namespace = join(namespace, '.', &entry.name);
                    let path = join(path, '/', &entry.name);
                    self.walk(location, &namespace, &path, found);
                }
                EntryKind::Dir => {}
                EntryKind::File => {
                    if let Some(simple_name) = entry.name.strip_suffix(self.suffix.as_str())
                        && !simple_name.is_empty()
                    {
                        found.insert(TypeReference::new(namespace, simple_name));
                    }
                }
            }
        }
    }
}

fn join(parent: &str, separator: char, name: &str) -> String {
    if parent.is_empty() {
        name.to_string()
    } else {
        format!("{parent}{separator}{name}")
    }
}
