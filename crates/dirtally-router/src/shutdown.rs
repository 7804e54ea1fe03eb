use std::time::Duration;

use crossbeam_channel as channel;

/// Requests shutdown when triggered or dropped.
#[derive(Debug)]
pub struct ShutdownTrigger {
    _tx: channel::Sender<()>,
}

impl ShutdownTrigger {
    pub fn trigger(self) {}
}

/// Shutdown-aware sleeping for service threads.
#[derive(Debug, Clone)]
pub struct ShutdownSignal {
    rx: channel::Receiver<()>,
}

pub fn shutdown_channel() -> (ShutdownTrigger, ShutdownSignal) {
    let (tx, rx) = channel::bounded(0);
    (ShutdownTrigger { _tx: tx }, ShutdownSignal { rx })
}

impl ShutdownSignal {
    /// A signal that never fires.
    pub fn never() -> Self {
        Self {
            rx: channel::never(),
        }
    }

    /// Sleeps for `timeout`; returns `true` as soon as shutdown is requested.
    pub fn wait(&self, timeout: Duration) -> bool {
        matches!(
            self.rx.recv_timeout(timeout),
            Err(channel::RecvTimeoutError::Disconnected)
        )
    }

    pub fn is_triggered(&self) -> bool {
        matches!(self.rx.try_recv(), Err(channel::TryRecvError::Disconnected))
    }

    pub(crate) fn receiver(&self) -> &channel::Receiver<()> {
        &self.rx
    }
}
