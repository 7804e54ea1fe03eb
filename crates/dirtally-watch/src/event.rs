use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Create,
    CloseWrite,
    Delete,
    /// The watched directory itself was removed.
    DeleteSelf,
    MovedFrom,
    MovedTo,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawEvent {
    pub path: PathBuf,
    pub kind: EventKind,
    pub is_dir: bool,
}

impl RawEvent {
    pub fn new(path: impl Into<PathBuf>, kind: EventKind, is_dir: bool) -> Self {
        Self {
            path: path.into(),
            kind,
            is_dir,
        }
    }

    pub fn file(path: impl Into<PathBuf>, kind: EventKind) -> Self {
        Self::new(path, kind, false)
    }

    pub fn dir(path: impl Into<PathBuf>, kind: EventKind) -> Self {
        Self::new(path, kind, true)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchEvent {
    Event(RawEvent),
    /// The backend dropped events; aggregates should be re-verified.
    Rescan,
}

impl From<RawEvent> for WatchEvent {
    fn from(event: RawEvent) -> Self {
        WatchEvent::Event(event)
    }
}
