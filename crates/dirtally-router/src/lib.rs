//! Event routing and the daemon services around it.
//!
//! [`EventRouter`] owns the shared state (monitor table, object cache,
//! exclusions, pending deletions) and turns raw notifications into ordered
//! jobs on the [`JobDispatcher`](dirtally_scheduler::JobDispatcher):
//!
//! - classification runs on a single lane, so structural decisions see
//!   events in arrival order;
//! - file-content updates run on the sharded lane owning the file path;
//! - directory builds run on the posted lane after the sharded lanes drain.
//!
//! [`Daemon`] wires a router to a watcher and runs the background services:
//! initial build, swap monitor, snapshot publishing, reconciliation and
//! watch-root reload.

mod daemon;
mod error;
mod files;
mod reconcile;
mod router;
mod shutdown;
mod structure;

pub use daemon::{Daemon, DaemonOptions};
pub use error::{Result, RouterError};
pub use reconcile::{ReconcileReport, MISMATCH_LIMIT};
pub use router::{EventRouter, RouterConfig};
pub use shutdown::{shutdown_channel, ShutdownSignal, ShutdownTrigger};
