//! Ordered in-memory mirror of a watched directory subtree.
//!
//! One [`FileTree`] exists per registration and is mutated only by the
//! monitoring task. At any quiescent moment it is isomorphic to the watched
//! subtree of the filesystem, modulo entries excluded by the active filter.
//! Children are kept sorted by path so sibling lookup is a binary search and
//! diffing two snapshots is a deterministic merge walk.

use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::file_info::FileInfo;

/// One node of the mirror: an entry plus its (sorted) children.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TreeNode {
    info: FileInfo,
    children: Vec<TreeNode>,
}

impl TreeNode {
    /// Create a childless node.
    pub fn leaf(info: FileInfo) -> Self {
        Self {
            info,
            children: Vec::new(),
        }
    }

    /// The entry this node mirrors.
    pub fn info(&self) -> &FileInfo {
        &self.info
    }

    /// Sorted child nodes.
    pub fn children(&self) -> &[TreeNode] {
        &self.children
    }

    /// Whether the mirrored entry is a directory.
    pub fn is_dir(&self) -> bool {
        self.info.is_dir
    }

    /// Consume the node, keeping only its entry.
    pub fn into_info(self) -> FileInfo {
        self.info
    }

    pub(crate) fn push_child(&mut self, child: TreeNode) {
        self.children.push(child);
    }

    pub(crate) fn sort_children(&mut self) {
        self.children.sort_by(|a, b| a.info.path.cmp(&b.info.path));
    }

    fn find_child_idx(&self, path: &Path) -> Result<usize, usize> {
        self.children
            .binary_search_by(|c| c.info.path.as_path().cmp(path))
    }

    /// Pre-order traversal of this subtree (the node itself first).
    pub fn pre_order(&self) -> PreOrder<'_> {
        PreOrder { stack: vec![self] }
    }

    /// Post-order traversal of this subtree (children first, node last).
    ///
    /// Removal events are synthesized in this order so a directory is
    /// reported removed only after all of its descendants.
    pub fn post_order(&self) -> Vec<&FileInfo> {
        let mut out = Vec::new();
        self.collect_post_order(&mut out);
        out
    }

    fn collect_post_order<'a>(&'a self, out: &mut Vec<&'a FileInfo>) {
        for child in &self.children {
            child.collect_post_order(out);
        }
        out.push(&self.info);
    }

    /// Number of entries in this subtree, including the node itself.
    pub fn len(&self) -> usize {
        1 + self.children.iter().map(TreeNode::len).sum::<usize>()
    }

    /// A node mirrors at least itself, so this is always false.
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// Pre-order iterator over a subtree.
pub struct PreOrder<'a> {
    stack: Vec<&'a TreeNode>,
}

impl<'a> Iterator for PreOrder<'a> {
    type Item = &'a FileInfo;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(&node.info)
    }
}

/// The mirror of one registration's watched subtree.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileTree {
    root: TreeNode,
}

impl FileTree {
    /// Create a tree containing only `root_info`.
    pub fn new(root_info: FileInfo) -> Self {
        Self {
            root: TreeNode::leaf(root_info),
        }
    }

    pub(crate) fn from_root(root: TreeNode) -> Self {
        Self { root }
    }

    pub(crate) fn into_root(self) -> TreeNode {
        self.root
    }

    /// The root node.
    pub fn root(&self) -> &TreeNode {
        &self.root
    }

    /// Path of the watched root.
    pub fn root_path(&self) -> &Path {
        &self.root.info.path
    }

    /// Find the node mirroring `path`, if tracked.
    pub fn find(&self, path: &Path) -> Option<&TreeNode> {
        if path == self.root.info.path {
            return Some(&self.root);
        }
        let rel = path.strip_prefix(&self.root.info.path).ok()?;
        let mut node = &self.root;
        let mut cur = self.root.info.path.clone();
        for comp in rel.components() {
            cur.push(comp);
            let idx = node.find_child_idx(&cur).ok()?;
            node = &node.children[idx];
        }
        Some(node)
    }

    /// Whether `path` is tracked by this tree.
    pub fn contains(&self, path: &Path) -> bool {
        self.find(path).is_some()
    }

    fn find_mut(&mut self, path: &Path) -> Option<&mut TreeNode> {
        let root_path = self.root.info.path.clone();
        if path == root_path {
            return Some(&mut self.root);
        }
        let rel = path.strip_prefix(&root_path).ok()?;
        let mut node = &mut self.root;
        let mut cur = root_path;
        for comp in rel.components() {
            cur.push(comp);
            let idx = node.find_child_idx(&cur).ok()?;
            node = &mut node.children[idx];
        }
        Some(node)
    }

    /// Insert `node` under its parent, replacing an existing sibling with the
    /// same path. Returns false when the parent is not tracked.
    pub fn insert(&mut self, node: TreeNode) -> bool {
        let Some(parent) = node.info.path.parent().map(Path::to_path_buf) else {
            return false;
        };
        let Some(parent_node) = self.find_mut(&parent) else {
            return false;
        };
        match parent_node.find_child_idx(&node.info.path) {
            Ok(i) => parent_node.children[i] = node,
            Err(i) => parent_node.children.insert(i, node),
        }
        true
    }

    /// Detach and return the subtree rooted at `path`. The tree root itself
    /// cannot be removed.
    pub fn remove(&mut self, path: &Path) -> Option<TreeNode> {
        if path == self.root.info.path {
            return None;
        }
        let parent = path.parent()?.to_path_buf();
        let parent_node = self.find_mut(&parent)?;
        let idx = parent_node.find_child_idx(path).ok()?;
        Some(parent_node.children.remove(idx))
    }

    /// Replace the metadata of an already-tracked entry, keeping children.
    pub fn update_info(&mut self, info: FileInfo) -> bool {
        match self.find_mut(&info.path) {
            Some(node) => {
                node.info = info;
                true
            }
            None => false,
        }
    }

    /// Wholesale-replace the subtree rooted at `subtree`'s path.
    pub fn replace(&mut self, subtree: TreeNode) -> bool {
        if subtree.info.path == self.root.info.path {
            self.root = subtree;
            true
        } else {
            self.remove(&subtree.info.path);
            self.insert(subtree)
        }
    }

    /// Pre-order iterator over every tracked entry, root first.
    pub fn iter(&self) -> PreOrder<'_> {
        self.root.pre_order()
    }

    /// Number of tracked entries, including the root.
    pub fn len(&self) -> usize {
        self.root.len()
    }

    /// A tree always tracks at least its root.
    pub fn is_empty(&self) -> bool {
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn info(path: &str, is_dir: bool) -> FileInfo {
        FileInfo {
            path: PathBuf::from(path),
            is_dir,
            size: 0,
            modified: None,
        }
    }

    fn sample_tree() -> FileTree {
        // /root
        //   /root/a (dir) -> /root/a/x.txt
        //   /root/b.txt
        let mut tree = FileTree::new(info("/root", true));
        assert!(tree.insert(TreeNode::leaf(info("/root/b.txt", false))));
        assert!(tree.insert(TreeNode::leaf(info("/root/a", true))));
        assert!(tree.insert(TreeNode::leaf(info("/root/a/x.txt", false))));
        tree
    }

    #[test]
    fn find_walks_nested_paths() {
        let tree = sample_tree();
        assert!(tree.find(Path::new("/root")).is_some());
        assert!(tree.find(Path::new("/root/a/x.txt")).is_some());
        assert!(tree.find(Path::new("/root/a/missing.txt")).is_none());
        assert!(tree.find(Path::new("/elsewhere")).is_none());
    }

    #[test]
    fn children_stay_sorted_after_insert() {
        let tree = sample_tree();
        let names: Vec<_> = tree
            .root()
            .children()
            .iter()
            .map(|c| c.info().file_name().unwrap().to_string())
            .collect();
        assert_eq!(names, ["a", "b.txt"]);
    }

    #[test]
    fn insert_replaces_existing_sibling() {
        let mut tree = sample_tree();
        let mut replacement = info("/root/b.txt", false);
        replacement.size = 42;
        assert!(tree.insert(TreeNode::leaf(replacement)));
        assert_eq!(tree.find(Path::new("/root/b.txt")).unwrap().info().size, 42);
        assert_eq!(tree.root().children().len(), 2);
    }

    #[test]
    fn insert_without_tracked_parent_fails() {
        let mut tree = sample_tree();
        assert!(!tree.insert(TreeNode::leaf(info("/root/missing/y.txt", false))));
    }

    #[test]
    fn remove_detaches_whole_subtree() {
        let mut tree = sample_tree();
        let removed = tree.remove(Path::new("/root/a")).unwrap();
        assert_eq!(removed.len(), 2);
        assert!(!tree.contains(Path::new("/root/a/x.txt")));
        assert!(tree.remove(Path::new("/root")).is_none());
    }

    #[test]
    fn post_order_reports_children_before_directory() {
        let tree = sample_tree();
        let node = tree.find(Path::new("/root/a")).unwrap();
        let order: Vec<_> = node.post_order().iter().map(|i| i.path.clone()).collect();
        assert_eq!(
            order,
            [PathBuf::from("/root/a/x.txt"), PathBuf::from("/root/a")]
        );
    }

    #[test]
    fn pre_order_visits_root_first() {
        let tree = sample_tree();
        let order: Vec<_> = tree.iter().map(|i| i.path.clone()).collect();
        assert_eq!(order[0], PathBuf::from("/root"));
        assert_eq!(order.len(), 4);
        assert_eq!(tree.len(), 4);
    }

    #[test]
    fn update_info_keeps_children() {
        let mut tree = sample_tree();
        let mut updated = info("/root/a", true);
        updated.modified = Some(std::time::SystemTime::now());
        assert!(tree.update_info(updated));
        assert_eq!(tree.find(Path::new("/root/a")).unwrap().children().len(), 1);
    }

    #[test]
    fn replace_swaps_subtree_wholesale() {
        let mut tree = sample_tree();
        let mut fresh = TreeNode::leaf(info("/root/a", true));
        fresh.push_child(TreeNode::leaf(info("/root/a/y.txt", false)));
        assert!(tree.replace(fresh));
        assert!(tree.contains(Path::new("/root/a/y.txt")));
        assert!(!tree.contains(Path::new("/root/a/x.txt")));

        let new_root = TreeNode::leaf(info("/root", true));
        assert!(tree.replace(new_root));
        assert_eq!(tree.len(), 1);
    }
}
