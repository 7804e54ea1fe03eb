use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use dirtally_config::{init_tracing, load_watch_roots, DaemonConfig, WatchRoot};
use dirtally_router::{Daemon, DaemonOptions};
use dirtally_snapshot::{SnapshotLookup, SnapshotReader};
use dirtally_store::RedbStore;
use dirtally_watch::NotifyFileWatcher;
use serde::Serialize;

#[derive(Parser)]
#[command(name = "dirtallyd", version, about = "Directory file-count and size tracking daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the daemon until interrupted
    Run(RunArgs),
    /// Look up directories in the published snapshot
    Query(QueryArgs),
    /// Validate the config and watch-root list
    CheckConfig(CheckConfigArgs),
}

#[derive(Args)]
struct RunArgs {
    /// Daemon config file (TOML)
    #[arg(long)]
    config: PathBuf,
}

#[derive(Args)]
struct QueryArgs {
    /// Daemon config file (TOML)
    #[arg(long)]
    config: PathBuf,
    /// Directories to look up
    #[arg(required = true)]
    dirs: Vec<PathBuf>,
    /// Emit JSON
    #[arg(long)]
    json: bool,
}

#[derive(Args)]
struct CheckConfigArgs {
    /// Daemon config file (TOML)
    #[arg(long)]
    config: PathBuf,
    /// Emit JSON
    #[arg(long)]
    json: bool,
}

fn main() {
    let cli = Cli::parse();
    let exit_code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            2
        }
    };

    std::process::exit(exit_code);
}

fn run(cli: Cli) -> Result<i32> {
    match cli.command {
        Command::Run(args) => run_daemon(&args.config),
        Command::Query(args) => query(&args),
        Command::CheckConfig(args) => check_config(&args),
    }
}

fn load_config(path: &Path) -> Result<DaemonConfig> {
    DaemonConfig::load_from_path(path).with_context(|| format!("failed to load config {}", path.display()))
}

fn run_daemon(config_path: &Path) -> Result<i32> {
    let config = load_config(config_path)?;
    init_tracing(&config.logging);

    let store = RedbStore::open(config.db_path())
        .with_context(|| format!("failed to open object store {}", config.db_path().display()))?;
    let watcher = NotifyFileWatcher::new().context("failed to start file watcher")?;

    let (stop_tx, stop_rx) = crossbeam_channel::bounded::<()>(1);
    ctrlc::set_handler(move || {
        let _ = stop_tx.try_send(());
    })
    .context("failed to install signal handler")?;

    let daemon = Daemon::start(DaemonOptions::from(&config), Arc::new(store), Box::new(watcher))?;
    let _ = stop_rx.recv();
    tracing::info!(target = "dirtally.cli", "shutdown requested");
    daemon.shutdown()?;
    Ok(0)
}

#[derive(Debug, Serialize)]
struct QueryRow {
    path: PathBuf,
    /// `found`, `not_found` or `not_yet_known`.
    status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    file_count: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_bytes: Option<i64>,
}

impl QueryRow {
    fn new(path: PathBuf, lookup: SnapshotLookup) -> Self {
        let (status, counters) = match lookup {
            SnapshotLookup::Found(counters) => ("found", Some(counters)),
            SnapshotLookup::NotFound => ("not_found", None),
            SnapshotLookup::NotYetKnown => ("not_yet_known", None),
        };
        Self {
            path,
            status,
            file_count: counters.map(|c| c.file_count),
            total_bytes: counters.map(|c| c.total_bytes),
        }
    }
}

fn query(args: &QueryArgs) -> Result<i32> {
    let config = load_config(&args.config)?;
    let reader = SnapshotReader::open(&config.data_file, &config.index_file)
        .with_context(|| format!("failed to open snapshot {}", config.index_file.display()))?;

    let rows: Vec<QueryRow> = args
        .dirs
        .iter()
        .map(|dir| {
            // Drops trailing separators so `/srv/` finds `/srv`.
            let path: PathBuf = dir.components().collect();
            let lookup = reader.lookup(&path);
            QueryRow::new(path, lookup)
        })
        .collect();
    let missing = rows.iter().any(|row| row.file_count.is_none());

    if args.json {
        println!("{}", serde_json::to_string_pretty(&rows)?);
    } else {
        for row in &rows {
            match (row.file_count, row.total_bytes) {
                (Some(files), Some(bytes)) => println!("{}: {files} files, {bytes} bytes", row.path.display()),
                _ => println!("{}: {}", row.path.display(), row.status.replace('_', " ")),
            }
        }
    }
    Ok(if missing { 1 } else { 0 })
}

#[derive(Serialize)]
struct ConfigReport<'a> {
    config: &'a DaemonConfig,
    roots: &'a [WatchRoot],
}

fn check_config(args: &CheckConfigArgs) -> Result<i32> {
    let config = load_config(&args.config)?;
    let roots = load_watch_roots(&config.watch_roots)
        .with_context(|| format!("failed to load watch roots {}", config.watch_roots.display()))?;

    if args.json {
        let report = ConfigReport {
            config: &config,
            roots: &roots,
        };
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(0);
    }

    println!("config: {}", args.config.display());
    println!("  store: {}", config.db_path().display());
    println!("  snapshot: {} / {}", config.data_file.display(), config.index_file.display());
    println!("  max_memory_mb: {}", config.max_memory_mb);
    println!("  sharded_lanes: {}", config.sharded_lanes);
    println!("  dump_interval_secs: {}", config.dump_interval_secs);
    println!("  check_interval_secs: {}", config.check_interval_secs);
    println!("roots: {}", config.watch_roots.display());
    for root in &roots {
        let mode = if root.counts_size { "count+size" } else { "count" };
        println!("  {} (level {}, {mode})", root.path.display(), root.level);
        for exclude in &root.excludes {
            println!("    exclude: {exclude}");
        }
    }
    Ok(0)
}
