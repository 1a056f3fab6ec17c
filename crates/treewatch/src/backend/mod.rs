//! Platform backends translating raw watcher notifications into tree
//! reconciliation calls.
//!
//! Exactly one backend is compiled in, selected by target OS. All three
//! share the [`EventHandler`] contract; they differ in how much the native
//! notification stream can be trusted and therefore in how they recover:
//! per-directory watches and surgical updates on Linux, per-path rescans on
//! macOS, delayed full rescans with a retry budget on Windows.

use async_trait::async_trait;
use notify::RecommendedWatcher;
use std::path::PathBuf;

use crate::config::MonitorConfig;
use crate::context::FileEventContext;
use crate::error::Result;
use crate::events::FileChangeEvent;

#[cfg(target_os = "linux")]
mod linux;
#[cfg(target_os = "linux")]
pub(crate) use linux::LinuxEventHandler as PlatformEventHandler;

#[cfg(target_os = "macos")]
mod macos;
#[cfg(target_os = "macos")]
pub(crate) use macos::MacosEventHandler as PlatformEventHandler;

#[cfg(target_os = "windows")]
mod windows;
#[cfg(target_os = "windows")]
pub(crate) use windows::WindowsEventHandler as PlatformEventHandler;

#[cfg(not(any(target_os = "linux", target_os = "macos", target_os = "windows")))]
compile_error!("no filesystem monitoring backend for this target");

/// Per-registration backend driven by the monitoring task.
///
/// A returned `Err` is terminal for the registration: the supervisor
/// publishes a monitoring error and tears the registration down. Recoverable
/// trouble must be absorbed by the handler itself (rescans, retries).
#[async_trait]
pub(crate) trait EventHandler: Send {
    /// Create a handler for one registration.
    fn new(config: &MonitorConfig) -> Self
    where
        Self: Sized;

    /// Acquire native watches and populate `ctx.tree` with the initial scan.
    ///
    /// Failure here fails the registration; nothing is left watching.
    async fn install(
        &mut self,
        ctx: &mut FileEventContext,
        watcher: &mut RecommendedWatcher,
    ) -> Result<()>;

    /// Reconcile one native notification against the mirror.
    async fn handle_event(
        &mut self,
        ctx: &mut FileEventContext,
        watcher: &mut RecommendedWatcher,
        event: notify::Event,
    ) -> Result<Vec<FileChangeEvent>>;

    /// React to an error reported by the native watcher.
    async fn handle_notify_error(
        &mut self,
        ctx: &mut FileEventContext,
        watcher: &mut RecommendedWatcher,
        error: notify::Error,
    ) -> Result<Vec<FileChangeEvent>>;

    /// Periodic housekeeping (retry deadlines). Called on every supervisor
    /// tick.
    async fn tick(
        &mut self,
        ctx: &mut FileEventContext,
        watcher: &mut RecommendedWatcher,
    ) -> Result<Vec<FileChangeEvent>>;

    /// Release native watches. Infallible; failures are logged and ignored.
    fn remove(&mut self, ctx: &FileEventContext, watcher: &mut RecommendedWatcher);
}

/// Event paths that fall under the registration's root, in event order.
pub(crate) fn scoped_paths(ctx: &FileEventContext, event: &notify::Event) -> Vec<PathBuf> {
    event
        .paths
        .iter()
        .filter(|p| ctx.contains(p))
        .cloned()
        .collect()
}
