//! Monitor supervisor: owns the monitoring task and the client-facing
//! queues.
//!
//! All watcher state lives inside one spawned task. Clients talk to it
//! through a command channel and drain results from a message channel at
//! their own pace; no client code runs on the monitoring task and no
//! callbacks cross the boundary.

use flume::{Receiver, Sender};
use notify::{RecommendedWatcher, Watcher};
use std::collections::HashMap;
use std::path::PathBuf;
use tokio::task::JoinHandle;
use tokio::time::{interval, timeout, MissedTickBehavior};
use tracing::{debug, error, info, trace, warn};

use crate::backend::{EventHandler, PlatformEventHandler};
use crate::config::{MonitorConfig, WatchOptions};
use crate::context::{FileEventContext, MonitorHandle, RegistrationState};
use crate::error::{Error, Result};
use crate::events::MonitorMessage;

enum Command {
    Register {
        handle: MonitorHandle,
        options: WatchOptions,
    },
    Unregister(MonitorHandle),
    Stop,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MonitorState {
    Idle,
    Running,
    Stopped,
}

/// Supervisor for filesystem monitoring.
///
/// Registrations are asynchronous: [`register`](Self::register) returns a
/// [`MonitorHandle`] immediately, and the outcome arrives later as a
/// [`MonitorMessage::Registered`] or [`MonitorMessage::RegistrationError`]
/// on the queue drained by [`check_for_changes`](Self::check_for_changes).
pub struct FileMonitor {
    config: MonitorConfig,
    state: MonitorState,
    cmd_tx: Option<Sender<Command>>,
    msg_rx: Option<Receiver<MonitorMessage>>,
    task: Option<JoinHandle<()>>,
}

impl FileMonitor {
    /// Create a monitor with default configuration. It does nothing until
    /// [`start`](Self::start) is called.
    pub fn new() -> Self {
        Self::with_config(MonitorConfig::default())
    }

    /// Create a monitor with the given configuration.
    pub fn with_config(config: MonitorConfig) -> Self {
        Self {
            config,
            state: MonitorState::Idle,
            cmd_tx: None,
            msg_rx: None,
            task: None,
        }
    }

    /// Spawn the monitoring task. A stopped monitor cannot be restarted.
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            MonitorState::Running => return Err(Error::AlreadyRunning),
            MonitorState::Stopped => return Err(Error::Stopped),
            MonitorState::Idle => {}
        }
        let (cmd_tx, cmd_rx) = flume::unbounded();
        let (msg_tx, msg_rx) = flume::unbounded();
        let config = self.config.clone();
        self.task = Some(tokio::spawn(run_monitor_loop(config, cmd_rx, msg_tx)));
        self.cmd_tx = Some(cmd_tx);
        self.msg_rx = Some(msg_rx);
        self.state = MonitorState::Running;
        info!("file monitor started");
        Ok(())
    }

    /// Ask the monitoring task to watch `path`.
    ///
    /// The path must be absolute. The returned handle identifies the
    /// registration in every subsequent message; the registration itself
    /// materializes (or fails) asynchronously.
    pub fn register(
        &self,
        path: impl Into<PathBuf>,
        options: WatchOptions,
    ) -> Result<MonitorHandle> {
        if self.state != MonitorState::Running {
            return Err(Error::NotRunning);
        }
        let path = path.into();
        if !path.is_absolute() {
            return Err(Error::InvalidPath(path));
        }
        let handle = MonitorHandle::new(path);
        self.send(Command::Register {
            handle: handle.clone(),
            options,
        })?;
        Ok(handle)
    }

    /// Ask the monitoring task to stop watching a registration.
    ///
    /// Completion is signalled by [`MonitorMessage::Unregistered`].
    /// Unregistering a handle that is already gone is not an error.
    pub fn unregister(&self, handle: &MonitorHandle) -> Result<()> {
        if self.state != MonitorState::Running {
            return Err(Error::NotRunning);
        }
        self.send(Command::Unregister(handle.clone()))
    }

    /// Drain every message currently queued, without blocking.
    pub fn check_for_changes(&self) -> Vec<MonitorMessage> {
        match &self.msg_rx {
            Some(rx) => rx.try_iter().collect(),
            None => Vec::new(),
        }
    }

    /// Stop the monitoring task, releasing all watches. Idempotent.
    pub async fn stop(&mut self) -> Result<()> {
        if self.state != MonitorState::Running {
            self.state = MonitorState::Stopped;
            return Ok(());
        }
        if let Some(tx) = &self.cmd_tx {
            let _ = tx.send(Command::Stop);
        }
        if let Some(mut task) = self.task.take() {
            if timeout(self.config.shutdown_timeout, &mut task).await.is_err() {
                warn!("monitoring task did not stop in time, aborting it");
                task.abort();
            }
        }
        self.cmd_tx = None;
        self.state = MonitorState::Stopped;
        info!("file monitor stopped");
        Ok(())
    }

    fn send(&self, command: Command) -> Result<()> {
        match &self.cmd_tx {
            // A send failure means the monitoring task died out from under a
            // Running monitor; surface it as the channel fault it is.
            Some(tx) => tx.send(command).map_err(Error::from),
            None => Err(Error::NotRunning),
        }
    }
}

impl Default for FileMonitor {
    fn default() -> Self {
        Self::new()
    }
}

/// Everything the monitoring task owns for one registration.
struct Registration {
    ctx: FileEventContext,
    handler: PlatformEventHandler,
    watcher: RecommendedWatcher,
}

type TaggedEvent = (MonitorHandle, notify::Result<notify::Event>);

async fn run_monitor_loop(
    config: MonitorConfig,
    cmd_rx: Receiver<Command>,
    msg_tx: Sender<MonitorMessage>,
) {
    let (event_tx, event_rx) = flume::unbounded::<TaggedEvent>();
    let mut registrations: HashMap<MonitorHandle, Registration> = HashMap::new();
    let mut tick = interval(config.tick_interval);
    tick.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            cmd = cmd_rx.recv_async() => match cmd {
                Ok(Command::Register { handle, options }) => {
                    register_one(&config, &event_tx, &msg_tx, &mut registrations, handle, options)
                        .await;
                }
                Ok(Command::Unregister(handle)) => {
                    unregister_one(&msg_tx, &mut registrations, handle);
                }
                Ok(Command::Stop) | Err(_) => break,
            },
            incoming = event_rx.recv_async() => {
                if let Ok((handle, result)) = incoming {
                    dispatch_event(&msg_tx, &mut registrations, handle, result).await;
                }
            }
            _ = tick.tick() => {
                tick_all(&msg_tx, &mut registrations).await;
                // Draining registrations have outlived their purpose once a
                // tick has passed: late events for them were dropped above.
                registrations.retain(|_, reg| reg.ctx.state == RegistrationState::Active);
            }
        }
    }

    for (handle, mut reg) in registrations.drain() {
        if reg.ctx.state == RegistrationState::Active {
            reg.handler.remove(&reg.ctx, &mut reg.watcher);
            let _ = msg_tx.send(MonitorMessage::Unregistered { handle });
        }
    }
    debug!("monitoring task exited");
}

async fn register_one(
    config: &MonitorConfig,
    event_tx: &Sender<TaggedEvent>,
    msg_tx: &Sender<MonitorMessage>,
    registrations: &mut HashMap<MonitorHandle, Registration>,
    handle: MonitorHandle,
    options: WatchOptions,
) {
    let fail = |error: Error| MonitorMessage::RegistrationError {
        handle: handle.clone(),
        error: Error::Registration {
            path: handle.path().to_path_buf(),
            reason: error.to_string(),
        },
    };

    let tx = event_tx.clone();
    let tag = handle.clone();
    let mut watcher = match RecommendedWatcher::new(
        move |result| {
            let _ = tx.send((tag.clone(), result));
        },
        notify::Config::default(),
    ) {
        Ok(watcher) => watcher,
        Err(e) => {
            let _ = msg_tx.send(fail(e.into()));
            return;
        }
    };

    let mut ctx = FileEventContext::new(handle.clone(), options.recursive, options.filter);
    let mut handler = PlatformEventHandler::new(config);
    match handler.install(&mut ctx, &mut watcher).await {
        Ok(()) => {
            debug!(root = %handle.path().display(), "registered");
            let _ = msg_tx.send(MonitorMessage::Registered {
                handle: handle.clone(),
                tree: ctx.tree.clone(),
            });
            registrations.insert(
                handle,
                Registration {
                    ctx,
                    handler,
                    watcher,
                },
            );
        }
        Err(e) => {
            warn!(root = %handle.path().display(), error = %e, "registration failed");
            let _ = msg_tx.send(fail(e));
        }
    }
}

fn unregister_one(
    msg_tx: &Sender<MonitorMessage>,
    registrations: &mut HashMap<MonitorHandle, Registration>,
    handle: MonitorHandle,
) {
    match registrations.get_mut(&handle) {
        Some(reg) if reg.ctx.state == RegistrationState::Active => {
            reg.handler.remove(&reg.ctx, &mut reg.watcher);
            reg.ctx.state = RegistrationState::Draining;
            debug!(root = %handle.path().display(), "unregistered");
            let _ = msg_tx.send(MonitorMessage::Unregistered { handle });
        }
        _ => {
            trace!(root = %handle.path().display(), "unregister for unknown handle ignored");
        }
    }
}

async fn dispatch_event(
    msg_tx: &Sender<MonitorMessage>,
    registrations: &mut HashMap<MonitorHandle, Registration>,
    handle: MonitorHandle,
    result: notify::Result<notify::Event>,
) {
    let Some(reg) = registrations.get_mut(&handle) else {
        trace!("event for unknown registration dropped");
        return;
    };
    if reg.ctx.state != RegistrationState::Active {
        return;
    }
    let outcome = match result {
        Ok(event) => {
            reg.handler
                .handle_event(&mut reg.ctx, &mut reg.watcher, event)
                .await
        }
        Err(e) => {
            reg.handler
                .handle_notify_error(&mut reg.ctx, &mut reg.watcher, e)
                .await
        }
    };
    publish_outcome(msg_tx, reg, handle, outcome);
}

async fn tick_all(
    msg_tx: &Sender<MonitorMessage>,
    registrations: &mut HashMap<MonitorHandle, Registration>,
) {
    for (handle, reg) in registrations.iter_mut() {
        if reg.ctx.state != RegistrationState::Active {
            continue;
        }
        let outcome = reg.handler.tick(&mut reg.ctx, &mut reg.watcher).await;
        publish_outcome(msg_tx, reg, handle.clone(), outcome);
    }
}

fn publish_outcome(
    msg_tx: &Sender<MonitorMessage>,
    reg: &mut Registration,
    handle: MonitorHandle,
    outcome: Result<Vec<crate::events::FileChangeEvent>>,
) {
    match outcome {
        Ok(events) => {
            if !events.is_empty() {
                let _ = msg_tx.send(MonitorMessage::FilesChanged { handle, events });
            }
        }
        Err(e) => {
            error!(root = %handle.path().display(), error = %e, "monitoring failed");
            reg.handler.remove(&reg.ctx, &mut reg.watcher);
            let _ = msg_tx.send(MonitorMessage::MonitoringError {
                handle: handle.clone(),
                error: e,
            });
            let _ = msg_tx.send(MonitorMessage::Unregistered { handle });
            reg.ctx.state = RegistrationState::Draining;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn register_requires_running_monitor() {
        let monitor = FileMonitor::new();
        assert!(matches!(
            monitor.register("/tmp", WatchOptions::recursive()),
            Err(Error::NotRunning)
        ));
    }

    #[tokio::test]
    async fn start_is_not_reentrant_and_stop_is_final() {
        let mut monitor = FileMonitor::new();
        monitor.start().unwrap();
        assert!(matches!(monitor.start(), Err(Error::AlreadyRunning)));

        monitor.stop().await.unwrap();
        monitor.stop().await.unwrap();
        assert!(matches!(monitor.start(), Err(Error::Stopped)));
        assert!(matches!(
            monitor.register("/tmp", WatchOptions::default()),
            Err(Error::NotRunning)
        ));
    }

    #[tokio::test]
    async fn register_rejects_relative_paths() {
        let mut monitor = FileMonitor::new();
        monitor.start().unwrap();
        assert!(matches!(
            monitor.register("relative/path", WatchOptions::default()),
            Err(Error::InvalidPath(_))
        ));
        monitor.stop().await.unwrap();
    }

    #[test]
    fn check_for_changes_on_idle_monitor_is_empty() {
        let monitor = FileMonitor::new();
        assert!(monitor.check_for_changes().is_empty());
    }
}
