//! Scanning real directory layouts into mirror trees.

use std::path::{Path, PathBuf};
use treewatch::{EventFilter, FileScanner, ScanOptions};

async fn project_layout(root: &Path) {
    tokio::fs::create_dir_all(root.join("src/util")).await.unwrap();
    tokio::fs::create_dir(root.join(".git")).await.unwrap();
    tokio::fs::write(root.join("Cargo.toml"), b"[package]").await.unwrap();
    tokio::fs::write(root.join("src/lib.rs"), b"pub fn x() {}").await.unwrap();
    tokio::fs::write(root.join("src/util/mod.rs"), b"// util").await.unwrap();
    tokio::fs::write(root.join(".git/HEAD"), b"ref: main").await.unwrap();
    tokio::fs::write(root.join("notes.tmp"), b"scratch").await.unwrap();
}

#[tokio::test]
async fn recursive_scan_captures_nested_layout() {
    let dir = tempfile::tempdir().unwrap();
    project_layout(dir.path()).await;

    let scanner = FileScanner::new(ScanOptions {
        recursive: true,
        filter: EventFilter::default(),
    });
    let tree = scanner.scan(dir.path(), None).await.unwrap();

    assert_eq!(tree.root_path(), dir.path());
    assert!(tree.contains(&dir.path().join("src/util/mod.rs")));
    assert!(tree.contains(&dir.path().join(".git/HEAD")));
    assert_eq!(
        tree.find(&dir.path().join("src/lib.rs")).unwrap().info().size,
        13
    );
    // root + 3 dirs + 5 files
    assert_eq!(tree.len(), 9);
}

#[tokio::test]
async fn filters_shape_the_mirror() {
    let dir = tempfile::tempdir().unwrap();
    project_layout(dir.path()).await;

    let scanner = FileScanner::new(ScanOptions {
        recursive: true,
        filter: EventFilter::new()
            .exclude_hidden()
            .without_extensions(vec!["tmp".into()]),
    });
    let tree = scanner.scan(dir.path(), None).await.unwrap();

    assert!(!tree.contains(&dir.path().join(".git")));
    assert!(!tree.contains(&dir.path().join(".git/HEAD")));
    assert!(!tree.contains(&dir.path().join("notes.tmp")));
    assert!(tree.contains(&dir.path().join("src/util/mod.rs")));
}

#[tokio::test]
async fn extension_filter_keeps_directories_traversable() {
    let dir = tempfile::tempdir().unwrap();
    project_layout(dir.path()).await;

    let scanner = FileScanner::new(ScanOptions {
        recursive: true,
        filter: EventFilter::new().with_extensions(vec!["rs".into()]),
    });
    let tree = scanner.scan(dir.path(), None).await.unwrap();

    // Directories survive so the .rs files below them are reachable.
    assert!(tree.contains(&dir.path().join("src/util/mod.rs")));
    assert!(!tree.contains(&dir.path().join("Cargo.toml")));
}

#[tokio::test]
async fn descend_callback_runs_before_children_are_seen() {
    let dir = tempfile::tempdir().unwrap();
    project_layout(dir.path()).await;

    let mut visited: Vec<PathBuf> = Vec::new();
    let mut record = |p: &Path| visited.push(p.to_path_buf());

    let scanner = FileScanner::new(ScanOptions {
        recursive: true,
        filter: EventFilter::default(),
    });
    scanner.scan(dir.path(), Some(&mut record)).await.unwrap();

    // Every directory is announced, each before its subdirectories.
    let pos =
        |p: PathBuf| visited.iter().position(|v| v == &p).unwrap_or_else(|| panic!("{p:?}"));
    assert_eq!(visited[0], dir.path());
    assert!(pos(dir.path().join("src")) < pos(dir.path().join("src/util")));
    assert_eq!(visited.len(), 4);
}

#[tokio::test]
async fn non_recursive_scan_stops_at_the_first_level() {
    let dir = tempfile::tempdir().unwrap();
    project_layout(dir.path()).await;

    let scanner = FileScanner::new(ScanOptions {
        recursive: false,
        filter: EventFilter::default(),
    });
    let tree = scanner.scan(dir.path(), None).await.unwrap();

    assert!(tree.contains(&dir.path().join("src")));
    assert!(!tree.contains(&dir.path().join("src/lib.rs")));
    assert_eq!(tree.find(&dir.path().join("src")).unwrap().children().len(), 0);
}
