use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use crossbeam_channel::select;
use dirtally_config::{load_watch_roots, DaemonConfig};
use dirtally_core::panic_payload_to_str;
use dirtally_snapshot::SnapshotBuilder;
use dirtally_store::DurableStore;
use dirtally_watch::FileWatcher;

use crate::{shutdown_channel, EventRouter, Result, RouterConfig, ShutdownSignal, ShutdownTrigger};

/// Everything the daemon needs beyond its store and watcher.
#[derive(Debug, Clone)]
pub struct DaemonOptions {
    pub router: RouterConfig,
    pub watch_roots: PathBuf,
    pub data_file: PathBuf,
    pub index_file: PathBuf,
    pub dump_interval: Duration,
    pub check_interval: Duration,
    /// Pause between two directories of a reconciliation pass.
    pub check_one_folder_interval: Duration,
    pub swap_check_interval: Duration,
}

impl From<&DaemonConfig> for DaemonOptions {
    fn from(config: &DaemonConfig) -> Self {
        Self {
            router: RouterConfig::from_daemon(config),
            watch_roots: config.watch_roots.clone(),
            data_file: config.data_file.clone(),
            index_file: config.index_file.clone(),
            dump_interval: config.dump_interval(),
            check_interval: config.check_interval(),
            check_one_folder_interval: config.check_one_folder_interval(),
            swap_check_interval: config.swap_check_interval(),
        }
    }
}

/// A running daemon: event loop, initial build and the periodic services.
#[derive(Debug)]
pub struct Daemon {
    router: EventRouter,
    snapshots: Arc<SnapshotBuilder>,
    trigger: Option<ShutdownTrigger>,
    threads: Vec<JoinHandle<()>>,
}

impl Daemon {
    pub fn start(options: DaemonOptions, store: Arc<dyn DurableStore>, watcher: Box<dyn FileWatcher>) -> Result<Self> {
        let router = EventRouter::new(options.router, store, watcher)?;
        let snapshots = Arc::new(SnapshotBuilder::new(options.data_file.clone(), options.index_file.clone()));
        let (trigger, signal) = shutdown_channel();
        let options = Arc::new(options);

        let mut daemon = Self {
            router,
            snapshots,
            trigger: Some(trigger),
            threads: Vec::new(),
        };

        let router = daemon.router.clone();
        let shutdown = signal.clone();
        daemon.spawn("dirtally-events", move || run_event_loop(&router, &shutdown))?;

        let router = daemon.router.clone();
        let roots_path = options.watch_roots.clone();
        daemon.spawn("dirtally-build", move || {
            let roots = match load_watch_roots(&roots_path) {
                Ok(roots) => roots,
                Err(err) => {
                    tracing::error!(target = "dirtally.daemon", path = %roots_path.display(), error = %err, "failed to load watch roots");
                    Vec::new()
                }
            };
            if let Err(err) = router.initial_build(&roots) {
                tracing::error!(target = "dirtally.daemon", error = %err, "initial build failed");
            }
        })?;

        let router = daemon.router.clone();
        let shutdown = signal.clone();
        let interval = options.swap_check_interval;
        daemon.spawn("dirtally-swap", move || {
            while !shutdown.wait(interval) {
                if !router.is_build_complete() {
                    continue;
                }
                if let Err(err) = router.cache().swap_until_below_watermark() {
                    tracing::warn!(target = "dirtally.daemon", error = %err, "swap failed");
                }
            }
        })?;

        let router = daemon.router.clone();
        let shutdown = signal.clone();
        let snapshots = Arc::clone(&daemon.snapshots);
        let interval = options.dump_interval;
        daemon.spawn("dirtally-snapshot", move || {
            while !shutdown.wait(interval) {
                if !router.is_build_complete() {
                    continue;
                }
                if let Err(err) = router.build_snapshot(&snapshots) {
                    tracing::warn!(target = "dirtally.daemon", error = %err, "snapshot failed");
                }
            }
        })?;

        let router = daemon.router.clone();
        let check_options = Arc::clone(&options);
        daemon.spawn("dirtally-check", move || {
            run_checks(&router, &check_options, &signal);
        })?;

        tracing::info!(
            target = "dirtally.daemon",
            roots = %options.watch_roots.display(),
            lanes = options.router.layout.total(),
            "daemon started"
        );
        Ok(daemon)
    }

    pub fn router(&self) -> &EventRouter {
        &self.router
    }

    /// Stops every service, drains the lanes, flushes the cache and, when the
    /// initial build finished, publishes a final snapshot.
    pub fn shutdown(mut self) -> Result<()> {
        self.stop()
    }

    fn spawn(&mut self, name: &str, body: impl FnOnce() + Send + 'static) -> Result<()> {
        let handle = thread::Builder::new().name(name.to_owned()).spawn(body)?;
        self.threads.push(handle);
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let Some(trigger) = self.trigger.take() else {
            return Ok(());
        };
        trigger.trigger();
        for handle in self.threads.drain(..) {
            let name = handle.thread().name().unwrap_or("dirtally-service").to_owned();
            if let Err(payload) = handle.join() {
                tracing::error!(
                    target = "dirtally.daemon",
                    thread = %name,
                    panic = %panic_payload_to_str(payload.as_ref()),
                    "service thread panicked"
                );
            }
        }

        self.router.shutdown()?;
        if self.router.is_build_complete() {
            self.router.build_snapshot(&self.snapshots)?;
        }
        tracing::info!(target = "dirtally.daemon", "daemon stopped");
        Ok(())
    }
}

impl Drop for Daemon {
    fn drop(&mut self) {
        if let Err(err) = self.stop() {
            tracing::warn!(target = "dirtally.daemon", error = %err, "daemon shutdown failed");
        }
    }
}

fn run_event_loop(router: &EventRouter, shutdown: &ShutdownSignal) {
    loop {
        select! {
            recv(router.events()) -> msg => match msg {
                Ok(msg) => router.handle_message(msg),
                Err(_) => {
                    tracing::warn!(target = "dirtally.daemon", "watcher channel closed");
                    break;
                }
            },
            recv(shutdown.receiver()) -> _ => break,
        }
    }
}

fn run_checks(router: &EventRouter, options: &DaemonOptions, shutdown: &ShutdownSignal) {
    while !shutdown.wait(options.check_interval) {
        if !router.is_build_complete() {
            continue;
        }
        if let Err(err) = router.reload_roots(&options.watch_roots) {
            tracing::warn!(target = "dirtally.daemon", error = %err, "failed to reload watch roots");
        }
        match router.reconcile_once(shutdown, options.check_one_folder_interval) {
            Ok(report) => {
                tracing::debug!(target = "dirtally.daemon", checked = report.checked, corrected = report.corrected, "check finished");
            }
            Err(err) => {
                tracing::warn!(target = "dirtally.daemon", error = %err, "reconciliation failed");
            }
        }
    }
}
