use std::io;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crossbeam_channel as channel;
use notify::event::{AccessKind, AccessMode, CreateKind, Flag, ModifyKind, RemoveKind, RenameMode};

use crate::{EventKind, RawEvent, WatchEvent};
#[cfg(feature = "watch-notify")]
use crate::{FileWatcher, WatchMessage};

/// kqueue and FSEvents report no close-write; data modifications stand in.
const MODIFY_IS_CLOSE_WRITE: bool = !cfg!(target_os = "linux");

/// inotify reports both halves of a rename on their own before the paired
/// event.
const RENAME_BOTH_IS_DUPLICATE: bool = cfg!(target_os = "linux");

fn is_dir_on_disk(path: &Path) -> bool {
    std::fs::symlink_metadata(path)
        .map(|meta| meta.is_dir())
        .unwrap_or(false)
}

fn requests_rescan(event: &notify::Event) -> bool {
    matches!(event.attrs.flag(), Some(Flag::Rescan))
        || (matches!(event.kind, notify::EventKind::Other) && event.paths.is_empty())
}

/// Maps one notify event to zero or more raw events.
pub(crate) fn translate(event: notify::Event) -> Vec<WatchEvent> {
    if requests_rescan(&event) {
        return vec![WatchEvent::Rescan];
    }

    let notify::Event { kind, paths, .. } = event;
    let single = |kind: EventKind, is_dir: Option<bool>| -> Vec<WatchEvent> {
        paths
            .iter()
            .map(|path| {
                let is_dir = is_dir.unwrap_or_else(|| is_dir_on_disk(path));
                WatchEvent::Event(RawEvent::new(path.clone(), kind, is_dir))
            })
            .collect()
    };

    match kind {
        notify::EventKind::Create(CreateKind::File) => single(EventKind::Create, Some(false)),
        notify::EventKind::Create(CreateKind::Folder) => single(EventKind::Create, Some(true)),
        notify::EventKind::Create(_) => single(EventKind::Create, None),

        notify::EventKind::Access(AccessKind::Close(AccessMode::Write)) => {
            single(EventKind::CloseWrite, Some(false))
        }
        notify::EventKind::Modify(ModifyKind::Data(_)) if MODIFY_IS_CLOSE_WRITE => {
            single(EventKind::CloseWrite, Some(false))
        }

        notify::EventKind::Remove(RemoveKind::File) => single(EventKind::Delete, Some(false)),
        notify::EventKind::Remove(RemoveKind::Folder) => single(EventKind::Delete, Some(true)),
        notify::EventKind::Remove(_) => single(EventKind::DeleteSelf, Some(true)),

        notify::EventKind::Modify(ModifyKind::Name(RenameMode::From)) => {
            single(EventKind::MovedFrom, Some(false))
        }
        notify::EventKind::Modify(ModifyKind::Name(RenameMode::To)) => single(EventKind::MovedTo, None),
        notify::EventKind::Modify(ModifyKind::Name(RenameMode::Both)) if RENAME_BOTH_IS_DUPLICATE => {
            Vec::new()
        }
        notify::EventKind::Modify(ModifyKind::Name(RenameMode::Both)) => match paths.as_slice() {
            [from, to] => vec![
                WatchEvent::Event(RawEvent::new(from.clone(), EventKind::MovedFrom, false)),
                WatchEvent::Event(RawEvent::new(to.clone(), EventKind::MovedTo, is_dir_on_disk(to))),
            ],
            _ => Vec::new(),
        },
        // Unpaired renames from backends that cannot tell direction.
        notify::EventKind::Modify(ModifyKind::Name(_)) => paths
            .iter()
            .map(|path| {
                let event = match std::fs::symlink_metadata(path) {
                    Ok(meta) => RawEvent::new(path.clone(), EventKind::Create, meta.is_dir()),
                    Err(_) => RawEvent::new(path.clone(), EventKind::Delete, false),
                };
                WatchEvent::Event(event)
            })
            .collect(),

        _ => Vec::new(),
    }
}

#[cfg(feature = "watch-notify")]
const RAW_QUEUE_CAPACITY: usize = 65_536;
#[cfg(feature = "watch-notify")]
const EVENTS_QUEUE_CAPACITY: usize = 65_536;
const OVERFLOW_RETRY_INTERVAL: Duration = Duration::from_millis(50);

#[cfg(feature = "watch-notify")]
fn try_send_or_overflow<T>(tx: &channel::Sender<T>, overflowed: &AtomicBool, msg: T) {
    if let Err(channel::TrySendError::Full(_)) = tx.try_send(msg) {
        overflowed.store(true, Ordering::Release);
    }
}

#[cfg_attr(not(feature = "watch-notify"), allow(dead_code))]
fn run_drain_loop(
    raw_rx: channel::Receiver<notify::Result<notify::Event>>,
    events_tx: channel::Sender<io::Result<WatchEvent>>,
    stop_rx: channel::Receiver<()>,
    overflowed: Arc<AtomicBool>,
) {
    loop {
        if overflowed.load(Ordering::Acquire) {
            while raw_rx.try_recv().is_ok() {}
            match events_tx.try_send(Ok(WatchEvent::Rescan)) {
                Ok(()) => overflowed.store(false, Ordering::Release),
                Err(channel::TrySendError::Full(_)) => {}
                Err(channel::TrySendError::Disconnected(_)) => break,
            }
        }

        let tick = if overflowed.load(Ordering::Acquire) {
            channel::after(OVERFLOW_RETRY_INTERVAL)
        } else {
            channel::never()
        };

        channel::select! {
            recv(stop_rx) -> _ => break,
            recv(raw_rx) -> msg => {
                let Ok(res) = msg else { break };
                let outgoing = match res {
                    Ok(event) => translate(event).into_iter().map(Ok).collect(),
                    Err(err) => {
                        overflowed.store(true, Ordering::Release);
                        vec![Err(io::Error::other(err))]
                    }
                };
                for msg in outgoing {
                    match events_tx.try_send(msg) {
                        Ok(()) => {}
                        Err(channel::TrySendError::Full(_)) => {
                            overflowed.store(true, Ordering::Release);
                            break;
                        }
                        Err(channel::TrySendError::Disconnected(_)) => return,
                    }
                }
            }
            recv(tick) -> _ => {}
        }
    }
}

/// Watcher backed by the platform's recommended `notify` backend.
#[cfg(feature = "watch-notify")]
pub struct NotifyFileWatcher {
    watcher: notify::RecommendedWatcher,
    events_rx: channel::Receiver<WatchMessage>,
    stop_tx: channel::Sender<()>,
    thread: Option<std::thread::JoinHandle<()>>,
    watched: std::collections::HashSet<std::path::PathBuf>,
}

#[cfg(feature = "watch-notify")]
impl NotifyFileWatcher {
    pub fn new() -> io::Result<Self> {
        Self::with_capacities(RAW_QUEUE_CAPACITY, EVENTS_QUEUE_CAPACITY)
    }

    pub fn with_capacities(raw_queue_capacity: usize, events_queue_capacity: usize) -> io::Result<Self> {
        let (raw_tx, raw_rx) = channel::bounded::<notify::Result<notify::Event>>(raw_queue_capacity.max(1));
        let (events_tx, events_rx) = channel::bounded::<WatchMessage>(events_queue_capacity.max(1));
        let (stop_tx, stop_rx) = channel::bounded::<()>(0);
        let overflowed = Arc::new(AtomicBool::new(false));

        let overflowed_cb = Arc::clone(&overflowed);
        let watcher = notify::recommended_watcher(move |res| {
            try_send_or_overflow(&raw_tx, overflowed_cb.as_ref(), res);
        })
        .map_err(io::Error::other)?;

        let thread = std::thread::Builder::new()
            .name("dirtally-watch".to_string())
            .spawn(move || run_drain_loop(raw_rx, events_tx, stop_rx, overflowed))?;

        Ok(Self {
            watcher,
            events_rx,
            stop_tx,
            thread: Some(thread),
            watched: Default::default(),
        })
    }

    pub fn watched_count(&self) -> usize {
        self.watched.len()
    }
}

#[cfg(feature = "watch-notify")]
impl Drop for NotifyFileWatcher {
    fn drop(&mut self) {
        let _ = self.stop_tx.send(());
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::debug!(target = "dirtally.watch", "watch drain thread panicked");
            }
        }
    }
}

#[cfg(feature = "watch-notify")]
impl FileWatcher for NotifyFileWatcher {
    fn watch_path(&mut self, path: &Path) -> io::Result<()> {
        use notify::Watcher;

        if self.watched.contains(path) {
            return Ok(());
        }
        self.watcher
            .watch(path, notify::RecursiveMode::NonRecursive)
            .map_err(io::Error::other)?;
        self.watched.insert(path.to_path_buf());
        Ok(())
    }

    fn unwatch_path(&mut self, path: &Path) -> io::Result<()> {
        use notify::Watcher;

        if !self.watched.remove(path) {
            return Ok(());
        }
        match self.watcher.unwatch(path) {
            Ok(()) => Ok(()),
            // The kernel already dropped the watch of a deleted directory.
            Err(err) if matches!(err.kind, notify::ErrorKind::WatchNotFound) => Ok(()),
            Err(err) => Err(io::Error::other(err)),
        }
    }

    fn receiver(&self) -> &channel::Receiver<WatchMessage> {
        &self.events_rx
    }
}
