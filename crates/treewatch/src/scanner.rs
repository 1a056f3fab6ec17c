//! Recursive directory scanner producing [`FileTree`] snapshots.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use tracing::trace;

use crate::error::{Error, Result};
use crate::file_info::FileInfo;
use crate::filter::EventFilter;
use crate::tree::{FileTree, TreeNode};

/// Callback invoked with each directory the scanner is about to read.
///
/// Backends that watch directories individually hook this to install a watch
/// before the directory's children are enumerated, so no child event can
/// slip between the read and the watch.
pub type OnDescend<'a> = &'a mut (dyn FnMut(&Path) + Send);

/// Options controlling a scan.
#[derive(Debug, Clone, Default)]
pub struct ScanOptions {
    /// Whether to descend into subdirectories.
    pub recursive: bool,

    /// Filter applied to every entry below the root.
    pub filter: EventFilter,
}

/// Snapshots a directory subtree into a [`FileTree`].
#[derive(Debug, Clone)]
pub struct FileScanner {
    options: ScanOptions,
}

impl FileScanner {
    /// Create a scanner with the given options.
    pub fn new(options: ScanOptions) -> Self {
        Self { options }
    }

    /// Scan `root` into a fresh tree.
    ///
    /// The root must exist and be a directory; it is exempt from the filter.
    /// Entries that vanish mid-scan are skipped rather than failing the scan.
    pub async fn scan(&self, root: &Path, on_descend: Option<OnDescend<'_>>) -> Result<FileTree> {
        let metadata = tokio::fs::symlink_metadata(root).await?;
        if !metadata.is_dir() {
            return Err(Error::InvalidPath(root.to_path_buf()));
        }

        let mut noop = |_: &Path| {};
        let on_descend: OnDescend<'_> = match on_descend {
            Some(f) => f,
            None => &mut noop,
        };

        let mut root_node = TreeNode::leaf(FileInfo::from_metadata(root, &metadata));
        self.scan_children(&mut root_node, on_descend).await?;
        Ok(FileTree::from_root(root_node))
    }

    fn scan_children<'a>(
        &'a self,
        node: &'a mut TreeNode,
        on_descend: OnDescend<'a>,
    ) -> Pin<Box<dyn Future<Output = Result<()>> + Send + 'a>> {
        Box::pin(async move {
            let dir = node.info().path.clone();
            on_descend(&dir);

            let mut entries = match tokio::fs::read_dir(&dir).await {
                Ok(entries) => entries,
                // Directory vanished between discovery and read.
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                    trace!(path = %dir.display(), "directory vanished during scan");
                    return Ok(());
                }
                Err(e) => return Err(e.into()),
            };

            let mut children: Vec<FileInfo> = Vec::new();
            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(e.into()),
                };
                let path = entry.path();
                let metadata = match entry.metadata().await {
                    Ok(metadata) => metadata,
                    Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                    Err(e) => return Err(e.into()),
                };
                let info = FileInfo::from_metadata(&path, &metadata);
                if !self.options.filter.matches(&info) {
                    trace!(path = %path.display(), "entry excluded by filter");
                    continue;
                }
                children.push(info);
            }

            for info in children {
                let descend = info.is_dir && self.options.recursive;
                let mut child = TreeNode::leaf(info);
                if descend {
                    self.scan_children(&mut child, &mut *on_descend).await?;
                }
                node.push_child(child);
            }
            node.sort_children();
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    async fn layout(root: &Path) {
        // root/
        //   sub/inner.txt
        //   top.txt
        tokio::fs::create_dir(root.join("sub")).await.unwrap();
        tokio::fs::write(root.join("top.txt"), b"top").await.unwrap();
        tokio::fs::write(root.join("sub/inner.txt"), b"inner")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn recursive_scan_mirrors_subtree() {
        let dir = tempfile::tempdir().unwrap();
        layout(dir.path()).await;

        let scanner = FileScanner::new(ScanOptions {
            recursive: true,
            filter: EventFilter::default(),
        });
        let tree = scanner.scan(dir.path(), None).await.unwrap();

        assert_eq!(tree.len(), 4);
        assert!(tree.contains(&dir.path().join("sub/inner.txt")));
        assert_eq!(
            tree.find(&dir.path().join("top.txt")).unwrap().info().size,
            3
        );
    }

    #[tokio::test]
    async fn non_recursive_scan_lists_direct_children_only() {
        let dir = tempfile::tempdir().unwrap();
        layout(dir.path()).await;

        let scanner = FileScanner::new(ScanOptions::default());
        let tree = scanner.scan(dir.path(), None).await.unwrap();

        assert_eq!(tree.len(), 3);
        assert!(tree.contains(&dir.path().join("sub")));
        assert!(!tree.contains(&dir.path().join("sub/inner.txt")));
    }

    #[tokio::test]
    async fn missing_root_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let scanner = FileScanner::new(ScanOptions::default());
        let err = scanner.scan(&dir.path().join("gone"), None).await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn file_root_is_invalid() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        tokio::fs::write(&file, b"x").await.unwrap();

        let scanner = FileScanner::new(ScanOptions::default());
        assert!(matches!(
            scanner.scan(&file, None).await,
            Err(Error::InvalidPath(_))
        ));
    }

    #[tokio::test]
    async fn filter_applies_to_children_not_root() {
        let dir = tempfile::tempdir().unwrap();
        layout(dir.path()).await;
        tokio::fs::write(dir.path().join("skip.tmp"), b"x")
            .await
            .unwrap();

        let scanner = FileScanner::new(ScanOptions {
            recursive: true,
            filter: EventFilter::new().without_extensions(vec!["tmp".into()]),
        });
        // tempdir names start with ".tmp"; the root must still scan.
        let tree = scanner.scan(dir.path(), None).await.unwrap();
        assert!(!tree.contains(&dir.path().join("skip.tmp")));
        assert!(tree.contains(&dir.path().join("top.txt")));
    }

    #[tokio::test]
    async fn on_descend_sees_parents_before_children() {
        let dir = tempfile::tempdir().unwrap();
        layout(dir.path()).await;
        tokio::fs::create_dir(dir.path().join("sub/deeper"))
            .await
            .unwrap();

        let mut visited: Vec<PathBuf> = Vec::new();
        let mut record = |p: &Path| visited.push(p.to_path_buf());

        let scanner = FileScanner::new(ScanOptions {
            recursive: true,
            filter: EventFilter::default(),
        });
        scanner.scan(dir.path(), Some(&mut record)).await.unwrap();

        assert_eq!(visited[0], dir.path());
        let sub_idx = visited.iter().position(|p| p == &dir.path().join("sub"));
        let deeper_idx = visited
            .iter()
            .position(|p| p == &dir.path().join("sub/deeper"));
        assert!(sub_idx.unwrap() < deeper_idx.unwrap());
    }
}
