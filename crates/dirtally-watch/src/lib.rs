//! Filesystem notification source.
//!
//! The router only depends on [`FileWatcher`] and [`RawEvent`]. The
//! notify-backed implementation lives behind the `watch-notify` feature so
//! library crates and tests do not pull in OS watcher dependencies;
//! [`ManualFileWatcher`] injects events deterministically.
//!
//! Every watch is non-recursive: each tracked directory is watched on its
//! own and only reports changes to its direct children (and to itself).

mod event;
mod manual;
#[cfg(any(test, feature = "watch-notify"))]
mod notify_impl;

use std::io;
use std::path::Path;

use crossbeam_channel as channel;

pub use event::{EventKind, RawEvent, WatchEvent};
pub use manual::{ManualFileWatcher, ManualFileWatcherHandle};
#[cfg(feature = "watch-notify")]
pub use notify_impl::NotifyFileWatcher;

/// Watcher errors are delivered on the same stream as events.
pub type WatchMessage = io::Result<WatchEvent>;

pub trait FileWatcher: Send {
    /// Begins watching the direct children of `path`. Watching an already
    /// watched path is a no-op.
    fn watch_path(&mut self, path: &Path) -> io::Result<()>;

    /// Stops watching `path`. Unknown paths are ignored.
    fn unwatch_path(&mut self, path: &Path) -> io::Result<()>;

    fn receiver(&self) -> &channel::Receiver<WatchMessage>;

    /// Drains every pending message without blocking.
    fn poll(&mut self) -> io::Result<Vec<WatchEvent>> {
        let mut out = Vec::new();
        for msg in self.receiver().try_iter() {
            out.push(msg?);
        }
        Ok(out)
    }
}

impl<W: ?Sized + FileWatcher> FileWatcher for Box<W> {
    fn watch_path(&mut self, path: &Path) -> io::Result<()> {
        self.as_mut().watch_path(path)
    }

    fn unwatch_path(&mut self, path: &Path) -> io::Result<()> {
        self.as_mut().unwatch_path(path)
    }

    fn receiver(&self) -> &channel::Receiver<WatchMessage> {
        self.as_ref().receiver()
    }
}
