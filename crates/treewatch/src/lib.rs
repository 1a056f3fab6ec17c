//! Cross-platform filesystem change monitoring with an in-memory tree
//! mirror.
//!
//! `treewatch` keeps a live [`FileTree`] mirror of each watched directory
//! and turns raw platform notifications into semantically classified
//! [`FileChangeEvent`]s: `Added`, `Removed`, `Modified`. Every event
//! corresponds to a real mutation of the mirror, so consumers can maintain
//! their own model of the watched subtree purely from the event stream.
//!
//! # Architecture
//!
//! - [`FileMonitor`] is the supervisor. It owns a single monitoring task;
//!   clients send commands to it and drain [`MonitorMessage`]s from a queue
//!   whenever convenient. No client code runs on the monitoring task.
//! - One platform backend is compiled in per target OS. Linux maintains one
//!   native watch per directory and updates the mirror surgically; macOS
//!   and Windows use a single recursive watch and reconcile by re-scanning,
//!   with Windows retrying recoverable failures on a budget.
//! - [`TreeSynchronizer`] is the shared engine all backends feed: it diffs
//!   observed filesystem state against the mirror and synthesizes exactly
//!   the events that explain the difference, suppressing duplicate
//!   notifications by (size, mtime) comparison.
//!
//! # Example
//!
//! ```no_run
//! use treewatch::{FileMonitor, MonitorMessage, WatchOptions};
//!
//! # async fn demo() -> treewatch::Result<()> {
//! let mut monitor = FileMonitor::new();
//! monitor.start()?;
//!
//! let handle = monitor.register("/some/project", WatchOptions::recursive())?;
//!
//! // Later, from wherever is convenient:
//! for message in monitor.check_for_changes() {
//!     match message {
//!         MonitorMessage::Registered { tree, .. } => {
//!             println!("watching {} entries", tree.len());
//!         }
//!         MonitorMessage::FilesChanged { events, .. } => {
//!             for event in events {
//!                 println!("{} {}", event.kind.as_str(), event.path().display());
//!             }
//!         }
//!         other => println!("{other:?}"),
//!     }
//! }
//!
//! monitor.unregister(&handle)?;
//! monitor.stop().await?;
//! # Ok(())
//! # }
//! ```

mod backend;
mod config;
mod context;
mod error;
mod events;
mod file_info;
mod filter;
mod monitor;
mod scanner;
mod sync;
mod tree;

pub use config::{MonitorConfig, WatchOptions};
pub use context::MonitorHandle;
pub use error::{Error, Result};
pub use events::{ChangeKind, FileChangeEvent, MonitorMessage};
pub use file_info::FileInfo;
pub use filter::EventFilter;
pub use monitor::FileMonitor;
pub use scanner::{FileScanner, OnDescend, ScanOptions};
pub use sync::TreeSynchronizer;
pub use tree::{FileTree, PreOrder, TreeNode};

/// Commonly used types, importable in one line.
pub mod prelude {
    pub use crate::{
        ChangeKind, Error, EventFilter, FileChangeEvent, FileInfo, FileMonitor, FileTree,
        MonitorConfig, MonitorHandle, MonitorMessage, Result, WatchOptions,
    };
}
