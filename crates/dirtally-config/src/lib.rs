//! Configuration for the dirtally daemon.
//!
//! Two files drive a running daemon:
//! - the daemon config (TOML, [`DaemonConfig`]) with storage locations, service
//!   intervals, memory budget and logging;
//! - the watch-root list ([`WatchRoot`]) naming the directories to track, their
//!   decomposition level and exclusion patterns. It is re-read periodically so
//!   roots can be added without a restart.

mod logging;
mod roots;

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use logging::{init_tracing, LoggingConfig};
pub use roots::{load_watch_roots, parse_watch_roots, RootsFormat, WatchRoot};

pub type Result<T> = std::result::Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse toml config: {0}")]
    Toml(String),
    #[error("failed to parse watch roots {path}: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("invalid watch root {path}: {reason}")]
    InvalidRoot { path: String, reason: String },
}

impl From<toml::de::Error> for ConfigError {
    fn from(value: toml::de::Error) -> Self {
        Self::Toml(value.message().to_owned())
    }
}

/// Top-level daemon configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    /// Directory holding the durable object store.
    #[serde(default = "DaemonConfig::default_db_dir")]
    pub db_dir: PathBuf,

    /// File name of the durable object store inside `db_dir`.
    #[serde(default = "DaemonConfig::default_db_name")]
    pub db_name: String,

    /// Watch-root list (`.json` or `.toml`).
    #[serde(default = "DaemonConfig::default_watch_roots")]
    pub watch_roots: PathBuf,

    /// Published snapshot record file.
    #[serde(default = "DaemonConfig::default_data_file")]
    pub data_file: PathBuf,

    /// Published snapshot index file.
    #[serde(default = "DaemonConfig::default_index_file")]
    pub index_file: PathBuf,

    /// Memory budget of the object cache, in MiB.
    ///
    /// Values outside `(0, 3096)` fall back to 1024.
    #[serde(default = "DaemonConfig::default_max_memory_mb")]
    pub max_memory_mb: u64,

    #[serde(default = "DaemonConfig::default_dump_interval_secs")]
    pub dump_interval_secs: u64,

    /// Period of the reconciliation walker and of the watch-root reload.
    #[serde(default = "DaemonConfig::default_check_interval_secs")]
    pub check_interval_secs: u64,

    /// Pause between two directories during reconciliation.
    #[serde(default = "DaemonConfig::default_check_one_folder_interval_secs")]
    pub check_one_folder_interval_secs: u64,

    #[serde(default = "DaemonConfig::default_swap_check_interval_secs")]
    pub swap_check_interval_secs: u64,

    /// Fraction of the memory budget above which the swap monitor evicts.
    #[serde(default = "DaemonConfig::default_swap_high_watermark")]
    pub swap_high_watermark: f64,

    /// Number of per-path sharded lanes.
    #[serde(default = "DaemonConfig::default_sharded_lanes")]
    pub sharded_lanes: usize,

    /// Number of object cache hash buckets.
    #[serde(default = "DaemonConfig::default_cache_buckets")]
    pub cache_buckets: usize,

    /// Lane backlog size that triggers a warning.
    #[serde(default = "DaemonConfig::default_high_water_mark")]
    pub high_water_mark: usize,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl DaemonConfig {
    fn default_db_dir() -> PathBuf {
        PathBuf::from("/var/lib/dirtally")
    }

    fn default_db_name() -> String {
        "objects.redb".to_owned()
    }

    fn default_watch_roots() -> PathBuf {
        PathBuf::from("/etc/dirtally/roots.json")
    }

    fn default_data_file() -> PathBuf {
        PathBuf::from("/var/lib/dirtally/snapshot.dat")
    }

    fn default_index_file() -> PathBuf {
        PathBuf::from("/var/lib/dirtally/snapshot.idx")
    }

    fn default_max_memory_mb() -> u64 {
        1024
    }

    fn default_dump_interval_secs() -> u64 {
        60
    }

    fn default_check_interval_secs() -> u64 {
        300
    }

    fn default_check_one_folder_interval_secs() -> u64 {
        30
    }

    fn default_swap_check_interval_secs() -> u64 {
        120
    }

    fn default_swap_high_watermark() -> f64 {
        0.80
    }

    fn default_sharded_lanes() -> usize {
        128
    }

    fn default_cache_buckets() -> usize {
        1_024_000
    }

    fn default_high_water_mark() -> usize {
        100_000
    }

    /// Loads a TOML config file.
    ///
    /// Relative paths inside the file are resolved against the file's
    /// directory, and the result is [normalized](Self::normalized).
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mut config = Self::load_from_str(&text)?;
        if let Some(base) = path.parent() {
            config.resolve_relative_to(base);
        }
        Ok(config)
    }

    pub fn load_from_str(text: &str) -> Result<Self> {
        let config: DaemonConfig = toml::from_str(text)?;
        Ok(config.normalized())
    }

    /// Applies the clamping rules for out-of-range values.
    pub fn normalized(mut self) -> Self {
        if self.max_memory_mb == 0 || self.max_memory_mb >= 3096 {
            self.max_memory_mb = Self::default_max_memory_mb();
        }
        if self.check_interval_secs <= 10 {
            self.check_interval_secs = Self::default_check_interval_secs();
        }
        if self.check_one_folder_interval_secs <= 10 {
            self.check_one_folder_interval_secs = Self::default_check_one_folder_interval_secs();
        }
        if self.dump_interval_secs == 0 {
            self.dump_interval_secs = Self::default_dump_interval_secs();
        }
        if self.swap_check_interval_secs == 0 {
            self.swap_check_interval_secs = Self::default_swap_check_interval_secs();
        }
        if !(self.swap_high_watermark > 0.0 && self.swap_high_watermark <= 1.0) {
            self.swap_high_watermark = Self::default_swap_high_watermark();
        }
        self.sharded_lanes = self.sharded_lanes.max(1);
        self.cache_buckets = self.cache_buckets.max(1);
        self.high_water_mark = self.high_water_mark.max(1);
        self
    }

    fn resolve_relative_to(&mut self, base: &Path) {
        for path in [
            &mut self.db_dir,
            &mut self.watch_roots,
            &mut self.data_file,
            &mut self.index_file,
        ] {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        }
        if let Some(file) = self.logging.file.as_mut() {
            if file.is_relative() {
                *file = base.join(&*file);
            }
        }
    }

    pub fn db_path(&self) -> PathBuf {
        self.db_dir.join(&self.db_name)
    }

    pub fn max_memory_bytes(&self) -> u64 {
        self.max_memory_mb * 1024 * 1024
    }

    pub fn dump_interval(&self) -> Duration {
        Duration::from_secs(self.dump_interval_secs)
    }

    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn check_one_folder_interval(&self) -> Duration {
        Duration::from_secs(self.check_one_folder_interval_secs)
    }

    pub fn swap_check_interval(&self) -> Duration {
        Duration::from_secs(self.swap_check_interval_secs)
    }
}

impl Default for DaemonConfig {
    fn default() -> Self {
        Self {
            db_dir: Self::default_db_dir(),
            db_name: Self::default_db_name(),
            watch_roots: Self::default_watch_roots(),
            data_file: Self::default_data_file(),
            index_file: Self::default_index_file(),
            max_memory_mb: Self::default_max_memory_mb(),
            dump_interval_secs: Self::default_dump_interval_secs(),
            check_interval_secs: Self::default_check_interval_secs(),
            check_one_folder_interval_secs: Self::default_check_one_folder_interval_secs(),
            swap_check_interval_secs: Self::default_swap_check_interval_secs(),
            swap_high_watermark: Self::default_swap_high_watermark(),
            sharded_lanes: Self::default_sharded_lanes(),
            cache_buckets: Self::default_cache_buckets(),
            high_water_mark: Self::default_high_water_mark(),
            logging: LoggingConfig::default(),
        }
    }
}
