//! Linux backend: one non-recursive native watch per tracked directory.
//!
//! The notification stream is precise enough to update the mirror
//! surgically, so no periodic rescans are needed. The cost is bookkeeping: a
//! registration table maps every watched directory both ways, watches are
//! installed on each directory before its children are first enumerated, and
//! an overflow drops the whole table and rebuilds it from a fresh scan.

use async_trait::async_trait;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify::event::{AccessKind, AccessMode, EventKind, ModifyKind, RenameMode};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{debug, trace, warn};

use crate::backend::{scoped_paths, EventHandler};
use crate::config::MonitorConfig;
use crate::context::FileEventContext;
use crate::error::{Error, Result};
use crate::events::{ChangeKind, FileChangeEvent};
use crate::file_info::FileInfo;
use crate::scanner::{FileScanner, ScanOptions};

/// Bidirectional registry of watched directories.
///
/// Ids are synthetic and only exist so a watch can be referenced from either
/// direction; the native watcher itself is keyed by path.
#[derive(Debug, Default)]
struct WatchTable {
    by_id: HashMap<u64, PathBuf>,
    by_path: HashMap<PathBuf, u64>,
    next_id: u64,
}

impl WatchTable {
    fn add(&mut self, path: PathBuf) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        self.by_id.insert(id, path.clone());
        self.by_path.insert(path, id);
        id
    }

    fn contains(&self, path: &Path) -> bool {
        self.by_path.contains_key(path)
    }

    fn remove_path(&mut self, path: &Path) -> Option<u64> {
        let id = self.by_path.remove(path)?;
        self.by_id.remove(&id);
        Some(id)
    }

    /// Remove every watch strictly below `prefix`, returning their paths.
    fn remove_descendants(&mut self, prefix: &Path) -> Vec<PathBuf> {
        let descendants: Vec<PathBuf> = self
            .by_path
            .keys()
            .filter(|p| p.as_path() != prefix && p.starts_with(prefix))
            .cloned()
            .collect();
        for path in &descendants {
            if let Some(id) = self.by_path.remove(path) {
                self.by_id.remove(&id);
            }
        }
        descendants
    }

    fn drain(&mut self) -> Vec<PathBuf> {
        self.by_id.clear();
        self.by_path.drain().map(|(path, _)| path).collect()
    }

    fn len(&self) -> usize {
        self.by_path.len()
    }
}

/// Handler backed by per-directory inotify watches.
pub(crate) struct LinuxEventHandler {
    watches: WatchTable,
}

impl LinuxEventHandler {
    /// Watch `dir` and record it, unless already watched. Failures are
    /// logged; a directory that vanished before we could watch it will
    /// surface as a removal.
    fn watch_dir(watches: &mut WatchTable, watcher: &mut RecommendedWatcher, dir: &Path) {
        if watches.contains(dir) {
            return;
        }
        match watcher.watch(dir, RecursiveMode::NonRecursive) {
            Ok(()) => {
                watches.add(dir.to_path_buf());
                trace!(path = %dir.display(), "watching directory");
            }
            Err(e) => {
                warn!(path = %dir.display(), error = %e, "failed to watch directory");
            }
        }
    }

    /// Stat `path` and reconcile whatever is actually there.
    async fn observe_present(
        &mut self,
        ctx: &mut FileEventContext,
        watcher: &mut RecommendedWatcher,
        path: PathBuf,
        events: &mut Vec<FileChangeEvent>,
    ) -> Result<()> {
        let sync = ctx.synchronizer();
        match FileInfo::for_path(&path).await {
            Ok(info) => {
                if sync.process_modified(&mut ctx.tree, info.clone(), events) {
                    return Ok(());
                }
                let watches = &mut self.watches;
                let mut on_descend = |dir: &Path| Self::watch_dir(watches, watcher, dir);
                sync.process_added(&mut ctx.tree, info, Some(&mut on_descend), events)
                    .await
            }
            Err(e) if e.is_not_found() => {
                sync.process_removed(&mut ctx.tree, &path, events);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Drop every watch and rebuild table, tree, and events from a fresh
    /// scan. Used when the native queue overflowed.
    async fn full_resync(
        &mut self,
        ctx: &mut FileEventContext,
        watcher: &mut RecommendedWatcher,
    ) -> Result<Vec<FileChangeEvent>> {
        debug!(root = %ctx.root.display(), "notification overflow, rebuilding watches");
        for path in self.watches.drain() {
            let _ = watcher.unwatch(&path);
        }
        watcher.watch(&ctx.root, RecursiveMode::NonRecursive).map_err(|e| {
            if matches!(e.kind, notify::ErrorKind::PathNotFound) {
                Error::RootLost(ctx.root.clone())
            } else {
                Error::from(e)
            }
        })?;
        self.watches.add(ctx.root.clone());

        let sync = ctx.synchronizer();
        let root = ctx.root.clone();
        let recursive = ctx.recursive;
        let mut events = Vec::new();
        let watches = &mut self.watches;
        let mut on_descend = |dir: &Path| {
            if dir != root.as_path() {
                Self::watch_dir(watches, watcher, dir);
            }
        };
        sync.resync(
            &mut ctx.tree,
            &root,
            recursive,
            Some(&mut on_descend),
            &mut events,
        )
        .await?;
        Ok(events)
    }

    /// Unwatch directories the mirror no longer tracks.
    fn prune_watches(&mut self, watcher: &mut RecommendedWatcher, events: &[FileChangeEvent]) {
        for event in events {
            if event.kind != ChangeKind::Removed || !event.info.is_dir {
                continue;
            }
            if self.watches.remove_path(event.path()).is_some() {
                // The kernel drops the watch with the directory; unwatch can
                // legitimately fail here.
                let _ = watcher.unwatch(event.path());
            }
            for path in self.watches.remove_descendants(event.path()) {
                let _ = watcher.unwatch(&path);
            }
        }
    }
}

#[async_trait]
impl EventHandler for LinuxEventHandler {
    fn new(_config: &MonitorConfig) -> Self {
        Self {
            watches: WatchTable::default(),
        }
    }

    async fn install(
        &mut self,
        ctx: &mut FileEventContext,
        watcher: &mut RecommendedWatcher,
    ) -> Result<()> {
        watcher.watch(&ctx.root, RecursiveMode::NonRecursive)?;
        self.watches.add(ctx.root.clone());

        let scanner = FileScanner::new(ScanOptions {
            recursive: ctx.recursive,
            filter: ctx.filter.clone(),
        });
        let root = ctx.root.clone();
        let watches = &mut self.watches;
        let mut on_descend = |dir: &Path| {
            if dir != root.as_path() {
                Self::watch_dir(watches, watcher, dir);
            }
        };
        ctx.tree = scanner.scan(&root, Some(&mut on_descend)).await?;
        debug!(
            root = %root.display(),
            watches = self.watches.len(),
            entries = ctx.tree.len(),
            "registration installed"
        );
        Ok(())
    }

    async fn handle_event(
        &mut self,
        ctx: &mut FileEventContext,
        watcher: &mut RecommendedWatcher,
        event: notify::Event,
    ) -> Result<Vec<FileChangeEvent>> {
        if event.need_rescan() {
            return self.full_resync(ctx, watcher).await;
        }

        let mut events = Vec::new();
        let paths = scoped_paths(ctx, &event);
        match event.kind {
            EventKind::Create(_)
            | EventKind::Modify(ModifyKind::Name(RenameMode::To))
            | EventKind::Modify(ModifyKind::Name(RenameMode::Any))
            | EventKind::Modify(ModifyKind::Data(_))
            | EventKind::Modify(ModifyKind::Metadata(_))
            | EventKind::Modify(ModifyKind::Any)
            | EventKind::Access(AccessKind::Close(AccessMode::Write))
            | EventKind::Any => {
                for path in paths {
                    self.observe_present(ctx, watcher, path, &mut events).await?;
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
                let sync = ctx.synchronizer();
                for path in paths {
                    sync.process_removed(&mut ctx.tree, &path, &mut events);
                }
            }
            EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => {
                if let [from, to] = &event.paths[..] {
                    if ctx.contains(from) {
                        let sync = ctx.synchronizer();
                        sync.process_removed(&mut ctx.tree, from, &mut events);
                    }
                    if ctx.contains(to) {
                        self.observe_present(ctx, watcher, to.clone(), &mut events)
                            .await?;
                    }
                } else {
                    for path in paths {
                        self.observe_present(ctx, watcher, path, &mut events).await?;
                    }
                }
            }
            EventKind::Remove(_) => {
                let sync = ctx.synchronizer();
                for path in paths {
                    if path == ctx.root {
                        return Err(Error::RootLost(path));
                    }
                    sync.process_removed(&mut ctx.tree, &path, &mut events);
                }
            }
            // Other access kinds and unclassifiable events carry no tree
            // state change.
            _ => {}
        }

        self.prune_watches(watcher, &events);
        Ok(events)
    }

    async fn handle_notify_error(
        &mut self,
        _ctx: &mut FileEventContext,
        _watcher: &mut RecommendedWatcher,
        error: notify::Error,
    ) -> Result<Vec<FileChangeEvent>> {
        Err(error.into())
    }

    async fn tick(
        &mut self,
        _ctx: &mut FileEventContext,
        _watcher: &mut RecommendedWatcher,
    ) -> Result<Vec<FileChangeEvent>> {
        Ok(Vec::new())
    }

    fn remove(&mut self, ctx: &FileEventContext, watcher: &mut RecommendedWatcher) {
        for path in self.watches.drain() {
            let _ = watcher.unwatch(&path);
        }
        debug!(root = %ctx.root.display(), "watches released");
    }
}
