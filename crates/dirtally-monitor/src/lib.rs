//! In-memory directory state: which directories are tracked, their
//! aggregates, which paths are excluded, and which tracked directories
//! disappeared since the last snapshot.

mod exclude;
mod pending;
mod table;

pub use exclude::ExcludeMatcher;
pub use pending::PendingDeletions;
pub use table::{AddOutcome, MonitorEntry, MonitorTable};
