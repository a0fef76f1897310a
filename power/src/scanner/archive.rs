use std::{
    collections::{BTreeMap, BTreeSet},
    fs::File,
    path::{Path, PathBuf},
};

use zip::ZipArchive;

use super::location::{Entry, EntryKind, Location};
use crate::Result;

/// A zip archive (`.zip`, `.jar`, ...) whose entry names form a tree.
///
/// The central directory is read once on open; nested directories exist
/// implicitly through the entries below them.
#[derive(Debug, Clone)]
pub struct ArchiveLocation {
    path: PathBuf,
    names: BTreeSet<String>,
}

impl ArchiveLocation {
    /// # Errors
    ///
    /// Returns `ScanFailed` if the file is unreadable or not a zip archive.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let archive = ZipArchive::new(File::open(&path)?)?;
        Ok(Self::from_names(path, archive.file_names()))
    }

    pub(crate) fn from_names<'a>(path: PathBuf, names: impl IntoIterator<Item = &'a str>) -> Self {
        let names = names
            .into_iter()
            .map(|name| name.strip_prefix('/').unwrap_or(name).to_string())
            .collect();
        Self { path, names }
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn under<'a>(&'a self, prefix: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.names
            .range::<str, _>((std::ops::Bound::Included(prefix), std::ops::Bound::Unbounded))
            .take_while(move |name| name.starts_with(prefix))
            .map(move |name| &name[prefix.len()..])
    }
}

fn dir_prefix(path: &str) -> String {
    if path.is_empty() {
        String::new()
    } else {
        format!("{path}/")
    }
}

impl Location for ArchiveLocation {
    fn children(&self, path: &str) -> Result<Vec<Entry>> {
        let prefix = dir_prefix(path);
        let mut children = BTreeMap::new();
        for rest in self.under(&prefix) {
            match rest.split_once('/') {
                Some((dir, _)) if !dir.is_empty() => {
                    children.insert(dir, EntryKind::Dir);
                }
                Some(_) => {}
                None if rest.is_empty() => {}
                None => {
                    children.entry(rest).or_insert(EntryKind::File);
                }
            }
        }
        Ok(children
            .into_iter()
            .map(|(name, kind)| Entry {
                name: name.to_string(),
                kind,
            })
            .collect())
    }

    fn has_dir(&self, path: &str) -> bool {
        let prefix = dir_prefix(path);
        self.under(&prefix).next().is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn location(names: &[&str]) -> ArchiveLocation {
        ArchiveLocation::from_names(PathBuf::from("test.jar"), names.iter().copied())
    }

    #[test]
    fn test_children_with_nested_namespaces() {
        let location = location(&[
            "META-INF/MANIFEST.MF",
            "server/",
            "server/HelloServer.svc",
            "/server/admin/AdminServer.svc",
            "serverless/Other.svc",
        ]);

        assert!(location.has_dir("server"));
        assert!(location.has_dir("server/admin"));
        assert!(!location.has_dir("client"));
        assert_eq!(
            location.children("server").unwrap(),
            [Entry::file("HelloServer.svc"), Entry::dir("admin")]
        );
        assert_eq!(
            location.children("server/admin").unwrap(),
            [Entry::file("AdminServer.svc")]
        );
        assert_eq!(
            location.children("").unwrap(),
            [
                Entry::dir("META-INF"),
                Entry::dir("server"),
                Entry::dir("serverless"),
            ]
        );
    }

    #[test]
    fn test_directory_markers_only() {
        let location = location(&["server/", "server/empty/"]);
        assert!(location.has_dir("server"));
        assert_eq!(location.children("server").unwrap(), [Entry::dir("empty")]);
        assert!(location.children("server/empty").unwrap().is_empty());
    }

    #[test]
    fn test_open_zip() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("services.jar");
        {
            let mut writer = zip::ZipWriter::new(File::create(&path).unwrap());
            let options = zip::write::SimpleFileOptions::default();
            writer.add_directory("server/", options).unwrap();
            writer.start_file("server/HelloServer.svc", options).unwrap();
            writer.finish().unwrap();
        }

        let location = ArchiveLocation::open(&path).unwrap();
        assert_eq!(location.path(), path);
        assert_eq!(
            location.children("server").unwrap(),
            [Entry::file("HelloServer.svc")]
        );

        let not_zip = tmp.path().join("plain.txt");
        std::fs::write(&not_zip, b"hello").unwrap();
        let err = ArchiveLocation::open(&not_zip).unwrap_err();
        assert_eq!(err.kind, crate::ErrorKind::ScanFailed);
    }
}
