//! Per-registration identity and state owned by the monitoring task.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::file_info::FileInfo;
use crate::filter::EventFilter;
use crate::sync::TreeSynchronizer;
use crate::tree::FileTree;

/// Opaque identity of one registration.
///
/// Handed to the client synchronously by `register`; every message on the
/// monitor queue carries the handle it concerns.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MonitorHandle {
    id: Uuid,
    path: PathBuf,
}

impl MonitorHandle {
    pub(crate) fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            id: Uuid::new_v4(),
            path: path.into(),
        }
    }

    /// Unique id of the registration.
    pub fn id(&self) -> Uuid {
        self.id
    }

    /// Root path the registration watches.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Lifecycle state of a registration inside the monitoring task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RegistrationState {
    /// Watching and publishing events.
    Active,
    /// Unregistered; kept until the next tick so late backend events for it
    /// are recognized and dropped instead of resurrecting the registration.
    Draining,
}

/// Everything the monitoring task tracks for one registration.
pub(crate) struct FileEventContext {
    pub handle: MonitorHandle,
    pub root: PathBuf,
    pub recursive: bool,
    pub filter: EventFilter,
    /// Mirror of the watched subtree; placeholder until the initial scan.
    pub tree: FileTree,
    pub state: RegistrationState,
}

impl FileEventContext {
    pub fn new(handle: MonitorHandle, recursive: bool, filter: EventFilter) -> Self {
        let root = handle.path().to_path_buf();
        let tree = FileTree::new(FileInfo::directory(&root));
        Self {
            handle,
            root,
            recursive,
            filter,
            tree,
            state: RegistrationState::Active,
        }
    }

    /// Synchronizer configured for this registration.
    pub fn synchronizer(&self) -> TreeSynchronizer {
        TreeSynchronizer::new(self.recursive, self.filter.clone())
    }

    /// Whether `path` falls under the watched root.
    pub fn contains(&self, path: &Path) -> bool {
        path.starts_with(&self.root)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handles_are_unique_per_registration() {
        let a = MonitorHandle::new("/watched");
        let b = MonitorHandle::new("/watched");
        assert_ne!(a, b);
        assert_eq!(a.path(), Path::new("/watched"));
        assert_eq!(a, a.clone());
    }

    #[test]
    fn context_scopes_paths_to_root() {
        let ctx = FileEventContext::new(
            MonitorHandle::new("/watched"),
            true,
            EventFilter::default(),
        );
        assert!(ctx.contains(Path::new("/watched/a/b.txt")));
        assert!(ctx.contains(Path::new("/watched")));
        assert!(!ctx.contains(Path::new("/elsewhere/b.txt")));
        assert_eq!(ctx.state, RegistrationState::Active);
    }
}
