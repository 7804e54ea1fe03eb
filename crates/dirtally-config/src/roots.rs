use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::{ConfigError, Result};

/// One directory tree to track.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WatchRoot {
    pub path: PathBuf,

    /// Decomposition depth: 1 tracks only the root, k tracks every
    /// subdirectory down to k-1 levels as its own entry.
    #[serde(default = "WatchRoot::default_level")]
    pub level: u32,

    /// Patterns matched anywhere below the root; matching directories are
    /// not tracked.
    #[serde(default)]
    pub excludes: Vec<String>,

    /// Track byte totals in addition to file counts.
    #[serde(default = "WatchRoot::default_counts_size")]
    pub counts_size: bool,
}

impl WatchRoot {
    fn default_level() -> u32 {
        1
    }

    fn default_counts_size() -> bool {
        true
    }

    /// Regex sources for this root's exclusions: `^<root>/(.*)<pattern>(.*)$`.
    pub fn exclude_patterns(&self) -> Vec<String> {
        let root = self.path.to_string_lossy();
        let root = regex::escape(root.trim_end_matches('/'));
        self.excludes
            .iter()
            .filter(|pattern| !pattern.is_empty())
            .map(|pattern| format!("^{root}/(.*){pattern}(.*)$"))
            .collect()
    }

    fn validate(self) -> Result<Self> {
        if self.level == 0 {
            return Err(ConfigError::InvalidRoot {
                path: self.path.display().to_string(),
                reason: "level must be at least 1".to_owned(),
            });
        }
        if !self.path.is_absolute() {
            return Err(ConfigError::InvalidRoot {
                path: self.path.display().to_string(),
                reason: "path must be absolute".to_owned(),
            });
        }
        Ok(self)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RootsFormat {
    Json,
    Toml,
}

impl RootsFormat {
    pub fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => RootsFormat::Toml,
            _ => RootsFormat::Json,
        }
    }
}

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct TomlRoots {
    #[serde(default)]
    root: Vec<WatchRoot>,
}

/// Object form of a JSON root. `is_counter_size` is the integer flag used by
/// older root lists and is accepted in place of `counts_size`.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct JsonRoot {
    path: PathBuf,
    #[serde(default = "WatchRoot::default_level")]
    level: u32,
    #[serde(default)]
    excludes: Vec<String>,
    #[serde(default)]
    counts_size: Option<bool>,
    #[serde(default)]
    is_counter_size: Option<i64>,
}

impl From<JsonRoot> for WatchRoot {
    fn from(value: JsonRoot) -> Self {
        let counts_size = match (value.counts_size, value.is_counter_size) {
            (Some(flag), _) => flag,
            (None, Some(flag)) => flag != 0,
            (None, None) => WatchRoot::default_counts_size(),
        };
        WatchRoot {
            path: value.path,
            level: value.level,
            excludes: value.excludes,
            counts_size,
        }
    }
}

/// Either `{"path": .., "level": ..}` or the positional form
/// `[{"path": ..}, {"level": ..}, {"excludes": [..]}, {"is_counter_size": 1}]`.
#[derive(Deserialize)]
#[serde(untagged)]
enum JsonRootShape {
    Positional(Vec<Map<String, Value>>),
    Object(JsonRoot),
}

fn parse_json_roots(text: &str, origin: &str) -> Result<Vec<WatchRoot>> {
    let json_err = |source| ConfigError::Json {
        path: origin.to_owned(),
        source,
    };

    let shapes: Vec<JsonRootShape> = serde_json::from_str(text).map_err(json_err)?;
    let mut roots = Vec::with_capacity(shapes.len());
    for shape in shapes {
        let root = match shape {
            JsonRootShape::Object(root) => root,
            JsonRootShape::Positional(parts) => {
                let merged: Map<String, Value> = parts.into_iter().flatten().collect();
                serde_json::from_value(Value::Object(merged)).map_err(json_err)?
            }
        };
        roots.push(WatchRoot::from(root).validate()?);
    }
    Ok(roots)
}

/// Parses a watch-root list from text.
pub fn parse_watch_roots(text: &str, format: RootsFormat) -> Result<Vec<WatchRoot>> {
    match format {
        RootsFormat::Json => parse_json_roots(text, "<inline>"),
        RootsFormat::Toml => {
            let file: TomlRoots = toml::from_str(text)?;
            file.root.into_iter().map(WatchRoot::validate).collect()
        }
    }
}

/// Loads a watch-root list; the format is picked from the file extension.
pub fn load_watch_roots(path: impl AsRef<Path>) -> Result<Vec<WatchRoot>> {
    let path = path.as_ref();
    let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    match RootsFormat::for_path(path) {
        RootsFormat::Json => parse_json_roots(&text, &path.display().to_string()),
        RootsFormat::Toml => parse_watch_roots(&text, RootsFormat::Toml),
    }
}
