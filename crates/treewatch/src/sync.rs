//! Tree-diff and event-synthesis engine.
//!
//! Backends translate raw notifications into calls on [`TreeSynchronizer`];
//! the synchronizer reconciles each against the mirror tree and appends the
//! classified events that describe the transition. Every emitted event is a
//! real tree mutation, so the mirror and the event stream stay consistent by
//! construction: a notification that changes nothing in the tree (a duplicate,
//! a filtered entry, an unknown path) produces no event.

use std::cmp::Ordering;
use std::path::Path;
use tracing::trace;

use crate::error::{Error, Result};
use crate::events::FileChangeEvent;
use crate::file_info::FileInfo;
use crate::filter::EventFilter;
use crate::scanner::{FileScanner, OnDescend, ScanOptions};
use crate::tree::{FileTree, TreeNode};

/// Reborrow the descend hook for one call without giving it away.
///
/// `Option::as_mut` would pin the inner `&mut dyn` to its full lifetime; an
/// explicit match is a coercion site, so the reborrow can be shortened.
fn reborrow<'s>(on_descend: &'s mut Option<OnDescend<'_>>) -> Option<OnDescend<'s>> {
    match on_descend {
        Some(f) => Some(&mut **f),
        None => None,
    }
}

/// Reconciles observed filesystem states against a mirror tree.
#[derive(Debug, Clone)]
pub struct TreeSynchronizer {
    recursive: bool,
    filter: EventFilter,
}

impl TreeSynchronizer {
    /// Create a synchronizer matching a registration's options.
    pub fn new(recursive: bool, filter: EventFilter) -> Self {
        Self { recursive, filter }
    }

    /// Whether `path` is within this registration's tracked depth.
    fn in_scope(&self, tree: &FileTree, path: &Path) -> bool {
        self.recursive || path.parent() == Some(tree.root_path())
    }

    /// Reconcile an entry that was observed to exist.
    ///
    /// Unknown entries are inserted and reported `Added` (whole subtrees for
    /// directories under a recursive registration, in pre-order). A known
    /// entry whose type flipped is removed and re-added. A known file whose
    /// stat changed is reported `Modified`; an unchanged stat is a duplicate
    /// notification and is dropped.
    pub async fn process_added(
        &self,
        tree: &mut FileTree,
        info: FileInfo,
        mut on_descend: Option<OnDescend<'_>>,
        events: &mut Vec<FileChangeEvent>,
    ) -> Result<()> {
        if !self.filter.matches(&info) || !self.in_scope(tree, &info.path) {
            return Ok(());
        }

        if let Some(existing) = tree.find(&info.path) {
            if existing.is_dir() == info.is_dir {
                if info.is_dir || existing.info().same_stat(&info) {
                    // Duplicate notification; directories never report
                    // Modified, their children do.
                    tree.update_info(info);
                } else {
                    tree.update_info(info.clone());
                    events.push(FileChangeEvent::modified(info));
                }
                return Ok(());
            }
            // Entry was replaced by one of the other type.
            self.process_removed(tree, &info.path, events);
        }

        if info.is_dir && self.recursive {
            let scanner = FileScanner::new(ScanOptions {
                recursive: true,
                filter: self.filter.clone(),
            });
            let subtree = match scanner
                .scan(&info.path, reborrow(&mut on_descend))
                .await
            {
                Ok(subtree) => subtree,
                // Vanished before we could scan it; a Remove will follow.
                Err(e) if e.is_not_found() => return Ok(()),
                Err(e) => return Err(e),
            };
            let added: Vec<FileInfo> = subtree.iter().cloned().collect();
            if tree.insert(subtree.into_root()) {
                events.extend(added.into_iter().map(FileChangeEvent::added));
            }
        } else if tree.insert(TreeNode::leaf(info.clone())) {
            events.push(FileChangeEvent::added(info));
        }
        Ok(())
    }

    /// Reconcile an in-place change to a known entry.
    ///
    /// Returns false when the entry is untracked or its type flipped, in
    /// which case the caller should route the observation through
    /// [`process_added`](Self::process_added) instead.
    pub fn process_modified(
        &self,
        tree: &mut FileTree,
        info: FileInfo,
        events: &mut Vec<FileChangeEvent>,
    ) -> bool {
        if !self.filter.matches(&info) || !self.in_scope(tree, &info.path) {
            return true;
        }
        let Some(existing) = tree.find(&info.path) else {
            return false;
        };
        if existing.is_dir() != info.is_dir {
            return false;
        }
        if info.is_dir || existing.info().same_stat(&info) {
            tree.update_info(info);
        } else {
            tree.update_info(info.clone());
            events.push(FileChangeEvent::modified(info));
        }
        true
    }

    /// Reconcile an entry that was observed to be gone.
    ///
    /// A tracked directory under a recursive registration reports its whole
    /// subtree removed in post-order (children before the directory), N+1
    /// events for a directory with N descendants. Untracked paths are
    /// silently dropped.
    pub fn process_removed(
        &self,
        tree: &mut FileTree,
        path: &Path,
        events: &mut Vec<FileChangeEvent>,
    ) {
        let Some(node) = tree.remove(path) else {
            trace!(path = %path.display(), "removal of untracked path ignored");
            return;
        };
        if node.is_dir() && self.recursive {
            let removed: Vec<FileInfo> = node.post_order().into_iter().cloned().collect();
            events.extend(removed.into_iter().map(FileChangeEvent::removed));
        } else {
            events.push(FileChangeEvent::removed(node.into_info()));
        }
    }

    /// Re-scan `dir` and reconcile the mirror against what is actually on
    /// disk, synthesizing the events that explain the difference.
    ///
    /// With `recursive` the whole subtree under `dir` is diffed structurally;
    /// otherwise only `dir`'s direct children are refreshed. A vanished `dir`
    /// is a subtree removal, except for the watched root itself, which is a
    /// terminal [`Error::RootLost`].
    pub async fn resync(
        &self,
        tree: &mut FileTree,
        dir: &Path,
        recursive: bool,
        mut on_descend: Option<OnDescend<'_>>,
        events: &mut Vec<FileChangeEvent>,
    ) -> Result<()> {
        let scanner = FileScanner::new(ScanOptions {
            recursive,
            filter: self.filter.clone(),
        });
        let fresh = match scanner
            .scan(dir, reborrow(&mut on_descend))
            .await
        {
            Ok(fresh) => fresh,
            Err(e) if e.is_not_found() => {
                if dir == tree.root_path() {
                    return Err(Error::RootLost(dir.to_path_buf()));
                }
                self.process_removed(tree, dir, events);
                return Ok(());
            }
            Err(Error::InvalidPath(_)) => {
                // The directory was replaced by a file.
                if dir == tree.root_path() {
                    return Err(Error::RootLost(dir.to_path_buf()));
                }
                self.process_removed(tree, dir, events);
                match FileInfo::for_path(dir).await {
                    Ok(info) => self.process_added(tree, info, None, events).await?,
                    Err(e) if e.is_not_found() => {}
                    Err(e) => return Err(e),
                }
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        if tree.find(dir).is_none() {
            // Directory appeared without a Create notification.
            let info = fresh.root().info().clone();
            return self
                .process_added(tree, info, reborrow(&mut on_descend), events)
                .await;
        }

        if recursive {
            if let Some(old) = tree.find(dir) {
                self.diff_nodes(old, fresh.root(), events);
            }
            tree.replace(fresh.into_root());
            return Ok(());
        }

        // Merge-walk the directory's direct children; both sides are sorted.
        let old_infos: Vec<FileInfo> = tree
            .find(dir)
            .map(|old| old.children().iter().map(|c| c.info().clone()).collect())
            .unwrap_or_default();
        let dir_info = fresh.root().info().clone();
        let new_infos: Vec<FileInfo> = fresh
            .root()
            .children()
            .iter()
            .map(|c| c.info().clone())
            .collect();

        let (mut i, mut j) = (0, 0);
        loop {
            match (old_infos.get(i), new_infos.get(j)) {
                (Some(old), Some(new)) => match old.path.cmp(&new.path) {
                    Ordering::Less => {
                        self.process_removed(tree, &old.path, events);
                        i += 1;
                    }
                    Ordering::Greater => {
                        self.process_added(
                            tree,
                            new.clone(),
                            reborrow(&mut on_descend),
                            events,
                        )
                        .await?;
                        j += 1;
                    }
                    Ordering::Equal => {
                        if old.is_dir != new.is_dir {
                            self.process_added(
                                tree,
                                new.clone(),
                                reborrow(&mut on_descend),
                                events,
                            )
                            .await?;
                        } else if !new.is_dir {
                            self.process_modified(tree, new.clone(), events);
                        } else {
                            tree.update_info(new.clone());
                        }
                        i += 1;
                        j += 1;
                    }
                },
                (Some(old), None) => {
                    self.process_removed(tree, &old.path, events);
                    i += 1;
                }
                (None, Some(new)) => {
                    self.process_added(
                        tree,
                        new.clone(),
                        reborrow(&mut on_descend),
                        events,
                    )
                    .await?;
                    j += 1;
                }
                (None, None) => break,
            }
        }
        tree.update_info(dir_info);
        Ok(())
    }

    /// Structural diff of two same-path directory nodes.
    fn diff_nodes(&self, old: &TreeNode, new: &TreeNode, events: &mut Vec<FileChangeEvent>) {
        let (mut i, mut j) = (0, 0);
        let old_children = old.children();
        let new_children = new.children();
        loop {
            match (old_children.get(i), new_children.get(j)) {
                (Some(o), Some(n)) => match o.info().path.cmp(&n.info().path) {
                    Ordering::Less => {
                        push_removed_subtree(o, events);
                        i += 1;
                    }
                    Ordering::Greater => {
                        push_added_subtree(n, events);
                        j += 1;
                    }
                    Ordering::Equal => {
                        if o.is_dir() != n.is_dir() {
                            push_removed_subtree(o, events);
                            push_added_subtree(n, events);
                        } else if n.is_dir() {
                            self.diff_nodes(o, n, events);
                        } else if !o.info().same_stat(n.info()) {
                            events.push(FileChangeEvent::modified(n.info().clone()));
                        }
                        i += 1;
                        j += 1;
                    }
                },
                (Some(o), None) => {
                    push_removed_subtree(o, events);
                    i += 1;
                }
                (None, Some(n)) => {
                    push_added_subtree(n, events);
                    j += 1;
                }
                (None, None) => break,
            }
        }
    }
}

fn push_removed_subtree(node: &TreeNode, events: &mut Vec<FileChangeEvent>) {
    for info in node.post_order() {
        events.push(FileChangeEvent::removed(info.clone()));
    }
}

fn push_added_subtree(node: &TreeNode, events: &mut Vec<FileChangeEvent>) {
    for info in node.pre_order() {
        events.push(FileChangeEvent::added(info.clone()));
    }
}
