//! Windows backend: one recursive native watch with buffered notifications.
//!
//! The native buffer can overflow and the watcher can report transient
//! errors while the registration is still viable, so recovery is a delayed
//! full rescan driven from the supervisor tick, retried on a budget. Only a
//! lost root or an exhausted budget ends the registration.

use async_trait::async_trait;
use notify::{RecommendedWatcher, RecursiveMode, Watcher};
use notify::event::{EventKind, ModifyKind, RenameMode};
use std::path::PathBuf;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use crate::backend::{scoped_paths, EventHandler};
use crate::config::MonitorConfig;
use crate::context::FileEventContext;
use crate::error::{Error, Result};
use crate::events::FileChangeEvent;
use crate::file_info::FileInfo;
use crate::scanner::{FileScanner, ScanOptions};

/// Handler backed by a single recursive ReadDirectoryChanges watch.
pub(crate) struct WindowsEventHandler {
    retry_delay: Duration,
    retry_limit: u32,
    /// Deadline of the pending recovery rescan, if one is scheduled.
    pending: Option<Instant>,
    attempts: u32,
}

impl WindowsEventHandler {
    fn schedule_retry(&mut self) {
        if self.pending.is_none() {
            self.pending = Some(Instant::now() + self.retry_delay);
            debug!(delay = ?self.retry_delay, "recovery rescan scheduled");
        }
    }

    /// Stat `path` and reconcile whatever is actually there.
    async fn observe_present(
        &self,
        ctx: &mut FileEventContext,
        path: PathBuf,
        events: &mut Vec<FileChangeEvent>,
    ) -> Result<()> {
        let sync = ctx.synchronizer();
        match FileInfo::for_path(&path).await {
            Ok(info) => {
                if sync.process_modified(&mut ctx.tree, info.clone(), events) {
                    return Ok(());
                }
                sync.process_added(&mut ctx.tree, info, None, events).await
            }
            Err(e) if e.is_not_found() => {
                sync.process_removed(&mut ctx.tree, &path, events);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

#[async_trait]
impl EventHandler for WindowsEventHandler {
    fn new(config: &MonitorConfig) -> Self {
        Self {
            retry_delay: config.retry_delay,
            retry_limit: config.retry_limit,
            pending: None,
            attempts: 0,
        }
    }

    async fn install(
        &mut self,
        ctx: &mut FileEventContext,
        watcher: &mut RecommendedWatcher,
    ) -> Result<()> {
        watcher.watch(&ctx.root, RecursiveMode::Recursive)?;

        let scanner = FileScanner::new(ScanOptions {
            recursive: ctx.recursive,
            filter: ctx.filter.clone(),
        });
        ctx.tree = scanner.scan(&ctx.root, None).await?;
        self.pending = None;
        self.attempts = 0;
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
        if event.need_rescan() {
            self.schedule_retry();
            return Ok(Vec::new());
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
            | EventKind::Any => {
                for path in paths {
                    self.observe_present(ctx, path, &mut events).await?;
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
                        self.observe_present(ctx, to.clone(), &mut events).await?;
                    }
                } else {
                    for path in paths {
                        self.observe_present(ctx, path, &mut events).await?;
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
            _ => {}
        }
        Ok(events)
    }

    async fn handle_notify_error(
        &mut self,
        ctx: &mut FileEventContext,
        _watcher: &mut RecommendedWatcher,
        error: notify::Error,
    ) -> Result<Vec<FileChangeEvent>> {
        if matches!(
            error.kind,
            notify::ErrorKind::PathNotFound | notify::ErrorKind::WatchNotFound
        ) && (error.paths.is_empty() || error.paths.iter().any(|p| p == &ctx.root))
        {
            return Err(Error::RootLost(ctx.root.clone()));
        }
        warn!(root = %ctx.root.display(), error = %error, "watcher error, scheduling rescan");
        self.schedule_retry();
        Ok(Vec::new())
    }

    async fn tick(
        &mut self,
        ctx: &mut FileEventContext,
        _watcher: &mut RecommendedWatcher,
    ) -> Result<Vec<FileChangeEvent>> {
        let Some(deadline) = self.pending else {
            return Ok(Vec::new());
        };
        if Instant::now() < deadline {
            return Ok(Vec::new());
        }

        let sync = ctx.synchronizer();
        let root = ctx.root.clone();
        let mut events = Vec::new();
        match sync
            .resync(&mut ctx.tree, &root, ctx.recursive, None, &mut events)
            .await
        {
            Ok(()) => {
                self.pending = None;
                self.attempts = 0;
                Ok(events)
            }
            Err(e @ Error::RootLost(_)) => Err(e),
            Err(e) => {
                self.attempts += 1;
                if self.attempts >= self.retry_limit {
                    Err(Error::RetryBudgetExhausted {
                        attempts: self.attempts,
                    })
                } else {
                    warn!(
                        error = %e,
                        attempt = self.attempts,
                        "recovery rescan failed, retrying"
                    );
                    self.pending = Some(Instant::now() + self.retry_delay);
                    // Whatever reconciled before the failure is still a real
                    // tree mutation and must be reported.
                    Ok(events)
                }
            }
        }
    }

    fn remove(&mut self, ctx: &FileEventContext, watcher: &mut RecommendedWatcher) {
        let _ = watcher.unwatch(&ctx.root);
        debug!(root = %ctx.root.display(), "watch released");
    }
}
