use std::path::PathBuf;

use dirtally_config::{load_watch_roots, DaemonConfig, WatchRoot};

#[test]
fn positional_json_roots_are_accepted() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("roots.json");
    std::fs::write(
        &file,
        r#"[
  [{"path": "/data/projects"}, {"level": 3}, {"excludes": ["cache", "tmp"]}, {"is_counter_size": 1}],
  [{"path": "/data/logs"}, {"level": 1}, {"excludes": []}, {"is_counter_size": 0}]
]"#,
    )
    .unwrap();

    let roots = load_watch_roots(&file).unwrap();
    assert_eq!(
        roots,
        vec![
            WatchRoot {
                path: PathBuf::from("/data/projects"),
                level: 3,
                excludes: vec!["cache".to_owned(), "tmp".to_owned()],
                counts_size: true,
            },
            WatchRoot {
                path: PathBuf::from("/data/logs"),
                level: 1,
                excludes: vec![],
                counts_size: false,
            },
        ]
    );
}

#[test]
fn object_json_and_toml_roots_agree() {
    let tmp = tempfile::tempdir().unwrap();
    let json = tmp.path().join("roots.json");
    std::fs::write(
        &json,
        r#"[{"path": "/srv", "level": 2, "excludes": ["\\.git"], "counts_size": false}]"#,
    )
    .unwrap();
    let toml = tmp.path().join("roots.toml");
    std::fs::write(
        &toml,
        r#"
[[root]]
path = "/srv"
level = 2
excludes = ['\.git']
counts_size = false
"#,
    )
    .unwrap();

    assert_eq!(load_watch_roots(&json).unwrap(), load_watch_roots(&toml).unwrap());
}

#[test]
fn config_paths_resolve_against_config_dir() {
    let tmp = tempfile::tempdir().unwrap();
    let file = tmp.path().join("dirtally.toml");
    std::fs::write(
        &file,
        r#"
db_dir = "state"
watch_roots = "roots.json"
data_file = "/abs/snapshot.dat"
dump_interval_secs = 5

[logging]
level = "debug"
file = "logs/dirtally.log"
"#,
    )
    .unwrap();

    let config = DaemonConfig::load_from_path(&file).unwrap();
    assert_eq!(config.db_dir, tmp.path().join("state"));
    assert_eq!(config.watch_roots, tmp.path().join("roots.json"));
    assert_eq!(config.data_file, PathBuf::from("/abs/snapshot.dat"));
    assert_eq!(config.logging.file, Some(tmp.path().join("logs/dirtally.log")));
    assert_eq!(config.dump_interval().as_secs(), 5);
}

#[test]
fn missing_roots_file_reports_path() {
    let tmp = tempfile::tempdir().unwrap();
    let missing = tmp.path().join("nope.json");
    let err = load_watch_roots(&missing).unwrap_err();
    assert!(err.to_string().contains("nope.json"), "{err}");
}
