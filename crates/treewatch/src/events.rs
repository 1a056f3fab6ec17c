//! Change events and the messages the supervisor publishes to its client.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;

use crate::context::MonitorHandle;
use crate::error::Error;
use crate::file_info::FileInfo;
use crate::tree::FileTree;

/// What happened to an entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChangeKind {
    /// Entry appeared (or replaced an entry of another type).
    Added,
    /// Entry disappeared.
    Removed,
    /// Entry's contents or metadata changed.
    Modified,
}

impl ChangeKind {
    /// Human-readable label.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChangeKind::Added => "added",
            ChangeKind::Removed => "removed",
            ChangeKind::Modified => "modified",
        }
    }
}

/// One semantically classified filesystem change.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileChangeEvent {
    /// Classification of the change.
    pub kind: ChangeKind,

    /// Metadata of the affected entry. For removals this is the last state
    /// the mirror tracked before the entry vanished.
    pub info: FileInfo,

    /// When the change was synthesized.
    pub timestamp: DateTime<Utc>,
}

impl FileChangeEvent {
    fn new(kind: ChangeKind, info: FileInfo) -> Self {
        Self {
            kind,
            info,
            timestamp: Utc::now(),
        }
    }

    /// Event for an entry that appeared.
    pub fn added(info: FileInfo) -> Self {
        Self::new(ChangeKind::Added, info)
    }

    /// Event for an entry that disappeared.
    pub fn removed(info: FileInfo) -> Self {
        Self::new(ChangeKind::Removed, info)
    }

    /// Event for an entry whose contents changed.
    pub fn modified(info: FileInfo) -> Self {
        Self::new(ChangeKind::Modified, info)
    }

    /// Path of the affected entry.
    pub fn path(&self) -> &Path {
        &self.info.path
    }
}

/// Messages the monitoring task publishes for the client to drain.
///
/// All messages carry the handle of the registration they concern, so one
/// drained queue can multiplex any number of registrations.
#[derive(Debug)]
pub enum MonitorMessage {
    /// Registration succeeded; `tree` is the initial mirror snapshot.
    Registered {
        /// Registration the message concerns.
        handle: MonitorHandle,
        /// Snapshot of the watched subtree at registration time.
        tree: FileTree,
    },

    /// Registration failed; no registration materialized.
    RegistrationError {
        /// Handle that was pre-allocated for the failed registration.
        handle: MonitorHandle,
        /// Why the registration failed.
        error: Error,
    },

    /// A batch of classified changes, in the order they were synthesized.
    FilesChanged {
        /// Registration the changes belong to.
        handle: MonitorHandle,
        /// The changes, already filtered and de-duplicated.
        events: Vec<FileChangeEvent>,
    },

    /// Monitoring failed irrecoverably; the registration has been torn down.
    MonitoringError {
        /// Registration that failed.
        handle: MonitorHandle,
        /// The terminal error.
        error: Error,
    },

    /// The registration is gone and no further messages will reference it.
    Unregistered {
        /// Registration that ended.
        handle: MonitorHandle,
    },
}

impl MonitorMessage {
    /// Handle of the registration this message concerns.
    pub fn handle(&self) -> &MonitorHandle {
        match self {
            MonitorMessage::Registered { handle, .. }
            | MonitorMessage::RegistrationError { handle, .. }
            | MonitorMessage::FilesChanged { handle, .. }
            | MonitorMessage::MonitoringError { handle, .. }
            | MonitorMessage::Unregistered { handle } => handle,
        }
    }
}
