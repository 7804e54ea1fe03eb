use std::collections::BTreeSet;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crossbeam_channel as channel;
use parking_lot::Mutex;

use crate::{FileWatcher, RawEvent, WatchEvent, WatchMessage};

const MANUAL_WATCH_QUEUE_CAPACITY: usize = 4096;

#[derive(Debug, Default)]
struct ManualState {
    watched: BTreeSet<PathBuf>,
    watch_calls: Vec<PathBuf>,
    unwatch_calls: Vec<PathBuf>,
}

/// Deterministic watcher for tests. Events are injected through
/// [`ManualFileWatcherHandle`]; watch registrations are recorded and can be
/// inspected through the same handle after the watcher moved elsewhere.
#[derive(Debug)]
pub struct ManualFileWatcher {
    tx: channel::Sender<WatchMessage>,
    rx: channel::Receiver<WatchMessage>,
    state: Arc<Mutex<ManualState>>,
}

#[derive(Debug, Clone)]
pub struct ManualFileWatcherHandle {
    tx: channel::Sender<WatchMessage>,
    state: Arc<Mutex<ManualState>>,
}

impl ManualFileWatcherHandle {
    pub fn push(&self, event: RawEvent) -> io::Result<()> {
        self.send(Ok(WatchEvent::Event(event)))
    }

    pub fn push_rescan(&self) -> io::Result<()> {
        self.send(Ok(WatchEvent::Rescan))
    }

    pub fn push_error(&self, error: io::Error) -> io::Result<()> {
        self.send(Err(error))
    }

    fn send(&self, msg: WatchMessage) -> io::Result<()> {
        match self.tx.try_send(msg) {
            Ok(()) => Ok(()),
            Err(channel::TrySendError::Full(_)) => Err(io::Error::new(
                io::ErrorKind::WouldBlock,
                "watch queue is full",
            )),
            Err(channel::TrySendError::Disconnected(_)) => Err(io::Error::new(
                io::ErrorKind::BrokenPipe,
                "watch receiver dropped",
            )),
        }
    }

    /// Currently watched paths, sorted.
    pub fn watched_paths(&self) -> Vec<PathBuf> {
        self.state.lock().watched.iter().cloned().collect()
    }

    pub fn is_watched(&self, path: &Path) -> bool {
        self.state.lock().watched.contains(path)
    }

    pub fn watch_calls(&self) -> Vec<PathBuf> {
        self.state.lock().watch_calls.clone()
    }

    pub fn unwatch_calls(&self) -> Vec<PathBuf> {
        self.state.lock().unwatch_calls.clone()
    }
}

impl Default for ManualFileWatcher {
    fn default() -> Self {
        Self::new()
    }
}

impl ManualFileWatcher {
    pub fn new() -> Self {
        let (tx, rx) = channel::bounded(MANUAL_WATCH_QUEUE_CAPACITY);
        Self {
            tx,
            rx,
            state: Arc::default(),
        }
    }

    pub fn handle(&self) -> ManualFileWatcherHandle {
        ManualFileWatcherHandle {
            tx: self.tx.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl FileWatcher for ManualFileWatcher {
    fn watch_path(&mut self, path: &Path) -> io::Result<()> {
        let mut state = self.state.lock();
        state.watch_calls.push(path.to_path_buf());
        state.watched.insert(path.to_path_buf());
        Ok(())
    }

    fn unwatch_path(&mut self, path: &Path) -> io::Result<()> {
        let mut state = self.state.lock();
        state.unwatch_calls.push(path.to_path_buf());
        state.watched.remove(path);
        Ok(())
    }

    fn receiver(&self) -> &channel::Receiver<WatchMessage> {
        &self.rx
    }
}
