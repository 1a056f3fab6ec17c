//! File metadata value type backing the mirror tree.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fs::Metadata;
use std::hash::{Hash, Hasher};
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use crate::error::Result;

/// Metadata snapshot of one filesystem entry.
///
/// Identity is by path: two `FileInfo`s for the same path compare equal even
/// when their metadata differ. Use [`FileInfo::same_stat`] to check whether
/// the entry's contents changed.
#[derive(Debug, Clone, Serialize, Deserialize, Eq)]
pub struct FileInfo {
    /// Absolute path of the entry.
    pub path: PathBuf,

    /// Whether the entry is a directory.
    pub is_dir: bool,

    /// Size in bytes (0 for directories).
    pub size: u64,

    /// Last write time, if the platform reports one.
    pub modified: Option<SystemTime>,
}

impl FileInfo {
    /// Build a `FileInfo` from an already-fetched metadata record.
    pub fn from_metadata(path: impl Into<PathBuf>, metadata: &Metadata) -> Self {
        let is_dir = metadata.is_dir();
        Self {
            path: path.into(),
            is_dir,
            size: if is_dir { 0 } else { metadata.len() },
            modified: metadata.modified().ok(),
        }
    }

    /// Stat `path` (without following symlinks) and build a `FileInfo`.
    pub async fn for_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let metadata = tokio::fs::symlink_metadata(&path).await?;
        Ok(Self::from_metadata(path, &metadata))
    }

    /// Synthetic directory entry, used as a placeholder before the initial scan.
    pub(crate) fn directory(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            is_dir: true,
            size: 0,
            modified: None,
        }
    }

    /// Whether `other` describes the same (size, last-write-time) state.
    ///
    /// This is the duplicate-suppression heuristic: a re-notification whose
    /// size and mtime are unchanged is not a real modification. A same-second
    /// content change with identical size is invisible to it; that imprecision
    /// is accepted and must not be "fixed" by comparing anything stronger.
    pub fn same_stat(&self, other: &FileInfo) -> bool {
        self.is_dir == other.is_dir && self.size == other.size && self.modified == other.modified
    }

    /// Final path component as a string, if representable.
    pub fn file_name(&self) -> Option<&str> {
        self.path.file_name()?.to_str()
    }

    /// Lowercased file extension, if any.
    pub fn extension(&self) -> Option<String> {
        self.path.extension()?.to_str().map(|s| s.to_lowercase())
    }

    /// Parent directory of the entry.
    pub fn parent(&self) -> Option<&Path> {
        self.path.parent()
    }
}

impl PartialEq for FileInfo {
    fn eq(&self, other: &Self) -> bool {
        self.path == other.path
    }
}

impl Hash for FileInfo {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.path.hash(state);
    }
}

impl Ord for FileInfo {
    fn cmp(&self, other: &Self) -> Ordering {
        self.path.cmp(&other.path)
    }
}

impl PartialOrd for FileInfo {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn file(path: &str, size: u64, modified: Option<SystemTime>) -> FileInfo {
        FileInfo {
            path: PathBuf::from(path),
            is_dir: false,
            size,
            modified,
        }
    }

    #[test]
    fn equality_is_by_path_only() {
        let now = SystemTime::now();
        let a = file("/a/b.txt", 10, Some(now));
        let b = file("/a/b.txt", 999, None);
        assert_eq!(a, b);
        assert_ne!(a, file("/a/c.txt", 10, Some(now)));
    }

    #[test]
    fn same_stat_compares_size_and_mtime() {
        let now = SystemTime::now();
        let a = file("/a/b.txt", 10, Some(now));
        assert!(a.same_stat(&file("/a/b.txt", 10, Some(now))));
        assert!(!a.same_stat(&file("/a/b.txt", 11, Some(now))));
        assert!(!a.same_stat(&file(
            "/a/b.txt",
            10,
            Some(now + Duration::from_secs(1))
        )));
    }

    #[test]
    fn same_stat_distinguishes_file_from_directory() {
        let a = file("/a/x", 0, None);
        let mut b = a.clone();
        b.is_dir = true;
        assert!(!a.same_stat(&b));
    }

    #[test]
    fn ordering_is_by_path() {
        let mut infos = vec![
            file("/a/c.txt", 0, None),
            file("/a/a.txt", 0, None),
            file("/a/b.txt", 0, None),
        ];
        infos.sort();
        let names: Vec<_> = infos.iter().map(|i| i.file_name().unwrap()).collect();
        assert_eq!(names, ["a.txt", "b.txt", "c.txt"]);
    }

    #[test]
    fn extension_is_lowercased() {
        assert_eq!(file("/a/NOTE.MD", 0, None).extension().as_deref(), Some("md"));
        assert_eq!(file("/a/Makefile", 0, None).extension(), None);
    }

    #[tokio::test]
    async fn for_path_stats_real_files() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("f.txt");
        tokio::fs::write(&path, b"hello").await.unwrap();

        let info = FileInfo::for_path(&path).await.unwrap();
        assert!(!info.is_dir);
        assert_eq!(info.size, 5);
        assert!(info.modified.is_some());

        let dir_info = FileInfo::for_path(dir.path()).await.unwrap();
        assert!(dir_info.is_dir);
        assert_eq!(dir_info.size, 0);
    }
}
