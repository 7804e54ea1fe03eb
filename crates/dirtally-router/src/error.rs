use dirtally_config::ConfigError;
use dirtally_scheduler::SchedulerError;
use dirtally_snapshot::SnapshotError;
use dirtally_store::StoreError;

pub type Result<T> = std::result::Result<T, RouterError>;

#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("invalid exclude pattern {pattern:?}: {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}
