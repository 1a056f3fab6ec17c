//! macOS backend: one recursive native watch, rescan-driven reconciliation.
//!
//! The native stream is directory-granular and may coalesce, so instead of
//! trusting individual notifications the handler re-scans each affected
//! directory and lets the synchronizer derive events from the difference.
//! The root is tracked by identity: if the path stops resolving to the same
//! canonical directory (deleted, or swapped for another), monitoring ends
//! with a lost-root error.

use async_trait::async_trait;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use std::collections::BTreeSet;
use std::path::PathBuf;
use tracing::{debug, warn};

use crate::backend::{scoped_paths, EventHandler};
use crate::config::MonitorConfig;
use crate::context::FileEventContext;
use crate::error::{Error, Result};
use crate::events::FileChangeEvent;
use crate::scanner::{FileScanner, ScanOptions};

/// Handler backed by a single recursive FSEvents watch.
pub(crate) struct MacosEventHandler {
    canonical_root: Option<PathBuf>,
}

impl MacosEventHandler {
    /// Fail with [`Error::RootLost`] unless the root path still resolves to
    /// the directory that was registered.
    async fn check_root_identity(&self, ctx: &FileEventContext) -> Result<()> {
        let Some(expected) = &self.canonical_root else {
            return Ok(());
        };
        match tokio::fs::canonicalize(&ctx.root).await {
            Ok(actual) if &actual == expected => Ok(()),
            Ok(_) | Err(_) => Err(Error::RootLost(ctx.root.clone())),
        }
    }

    /// Directories to re-scan for one notification.
    ///
    /// A path that is (or has become) a directory is its own target;
    /// anything else resolves to its parent. Non-recursive registrations
    /// only ever re-scan the root itself.
    async fn rescan_targets(
        &self,
        ctx: &FileEventContext,
        event: &notify::Event,
    ) -> BTreeSet<PathBuf> {
        let mut targets = BTreeSet::new();
        if !ctx.recursive {
            targets.insert(ctx.root.clone());
            return targets;
        }
        for path in scoped_paths(ctx, event) {
            if path == ctx.root {
                targets.insert(path);
                continue;
            }
            let is_dir = match tokio::fs::symlink_metadata(&path).await {
                Ok(metadata) => metadata.is_dir(),
                Err(_) => ctx.tree.find(&path).is_some_and(|n| n.is_dir()),
            };
            if is_dir {
                targets.insert(path);
            } else if let Some(parent) = path.parent() {
                if ctx.contains(parent) {
                    targets.insert(parent.to_path_buf());
                }
            }
        }
        targets
    }
}

#[async_trait]
impl EventHandler for MacosEventHandler {
    fn new(_config: &MonitorConfig) -> Self {
        Self {
            canonical_root: None,
        }
    }

    async fn install(
        &mut self,
        ctx: &mut FileEventContext,
        watcher: &mut RecommendedWatcher,
    ) -> Result<()> {
        watcher.watch(&ctx.root, RecursiveMode::Recursive)?;
        self.canonical_root = Some(tokio::fs::canonicalize(&ctx.root).await?);

        let scanner = FileScanner::new(ScanOptions {
            recursive: ctx.recursive,
            filter: ctx.filter.clone(),
        });
        ctx.tree = scanner.scan(&ctx.root, None).await?;
        debug!(
            root = %ctx.root.display(),
            entries = ctx.tree.len(),
            "registration installed"
        );
        Ok(())
    }

    async fn handle_event(
        &mut self,
        ctx: &mut FileEventContext,
        _watcher: &mut RecommendedWatcher,
        event: notify::Event,
    ) -> Result<Vec<FileChangeEvent>> {
        self.check_root_identity(ctx).await?;

        // A rescan-flagged notification means history for this subtree was
        // dropped; diff it in full instead of just one directory level.
        let deep = ctx.recursive && event.need_rescan();
        let sync = ctx.synchronizer();
        let mut events = Vec::new();
        for dir in self.rescan_targets(ctx, &event).await {
            sync.resync(&mut ctx.tree, &dir, deep, None, &mut events)
                .await?;
        }
        Ok(events)
    }

    async fn handle_notify_error(
        &mut self,
        ctx: &mut FileEventContext,
        _watcher: &mut RecommendedWatcher,
        error: notify::Error,
    ) -> Result<Vec<FileChangeEvent>> {
        self.check_root_identity(ctx).await?;
        warn!(root = %ctx.root.display(), error = %error, "watcher error, re-scanning root");
        let sync = ctx.synchronizer();
        let root = ctx.root.clone();
        let mut events = Vec::new();
        sync.resync(&mut ctx.tree, &root, ctx.recursive, None, &mut events)
            .await?;
        Ok(events)
    }

    async fn tick(
        &mut self,
        _ctx: &mut FileEventContext,
        _watcher: &mut RecommendedWatcher,
    ) -> Result<Vec<FileChangeEvent>> {
        Ok(Vec::new())
    }

    fn remove(&mut self, ctx: &FileEventContext, watcher: &mut RecommendedWatcher) {
        let _ = watcher.unwatch(&ctx.root);
        debug!(root = %ctx.root.display(), "watch released");
    }
}
