use std::path::PathBuf;

use assert_cmd::Command;
use assert_fs::prelude::*;
use assert_fs::TempDir;
use dirtally_core::Counters;
use dirtally_snapshot::SnapshotBuilder;
use predicates::prelude::*;

fn dirtallyd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("dirtallyd"))
}

fn write_config(temp: &TempDir) -> PathBuf {
    temp.child("dirtally.toml")
        .write_str(
            r#"db_dir = "db"
watch_roots = "roots.json"
data_file = "snapshot.dat"
index_file = "snapshot.idx"
max_memory_mb = 0

[logging]
level = "warn"
"#,
        )
        .unwrap();
    temp.child("dirtally.toml").path().to_path_buf()
}

#[test]
fn help_mentions_every_command() {
    dirtallyd().arg("--help").assert().success().stdout(
        predicate::str::contains("run")
            .and(predicate::str::contains("query"))
            .and(predicate::str::contains("check-config")),
    );
}

#[test]
fn check_config_prints_normalized_settings_and_roots() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp);
    temp.child("roots.json")
        .write_str(r#"[[{"path": "/srv/data"}, {"level": 2}, {"excludes": ["tmp"]}, {"is_counter_size": 0}]]"#)
        .unwrap();

    let output = dirtallyd()
        .arg("check-config")
        .arg("--config")
        .arg(&config)
        .arg("--json")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(v["config"]["max_memory_mb"].as_u64().unwrap(), 1024);
    assert_eq!(v["roots"][0]["path"].as_str().unwrap(), "/srv/data");
    assert_eq!(v["roots"][0]["level"].as_u64().unwrap(), 2);
    assert!(!v["roots"][0]["counts_size"].as_bool().unwrap());

    dirtallyd()
        .arg("check-config")
        .arg("--config")
        .arg(&config)
        .assert()
        .success()
        .stdout(predicate::str::contains("/srv/data (level 2, count)").and(predicate::str::contains("exclude: tmp")));
}

#[test]
fn check_config_rejects_a_relative_root() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp);
    temp.child("roots.json")
        .write_str(r#"[{"path": "relative/dir"}]"#)
        .unwrap();

    dirtallyd()
        .arg("check-config")
        .arg("--config")
        .arg(&config)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("failed to load watch roots"));
}

#[test]
fn missing_config_exits_with_status_2() {
    let temp = TempDir::new().unwrap();
    dirtallyd()
        .arg("run")
        .arg("--config")
        .arg(temp.child("absent.toml").path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("failed to load config"));
}

#[test]
fn query_reads_the_published_snapshot() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp);
    SnapshotBuilder::new(temp.child("snapshot.dat").path(), temp.child("snapshot.idx").path())
        .build_from(
            vec![
                (PathBuf::from("/srv/data"), Counters::new(12, 4096)),
                (PathBuf::from("/srv/data/logs"), Counters::new(3, 100)),
            ],
            &[],
        )
        .unwrap();

    let output = dirtallyd()
        .arg("query")
        .arg("--config")
        .arg(&config)
        .arg("/srv/data/")
        .arg("/srv/data/logs")
        .arg("--json")
        .output()
        .unwrap();
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let v: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(v[0]["path"].as_str().unwrap(), "/srv/data");
    assert_eq!(v[0]["status"].as_str().unwrap(), "found");
    assert_eq!(v[0]["file_count"].as_i64().unwrap(), 12);
    assert_eq!(v[0]["total_bytes"].as_i64().unwrap(), 4096);
    assert_eq!(v[1]["file_count"].as_i64().unwrap(), 3);

    dirtallyd()
        .arg("query")
        .arg("--config")
        .arg(&config)
        .arg("/srv/data")
        .arg("/srv/elsewhere")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("/srv/data: 12 files, 4096 bytes").and(predicate::str::contains("/srv/elsewhere: not")));
}

#[test]
fn query_before_any_snapshot_is_not_yet_known() {
    let temp = TempDir::new().unwrap();
    let config = write_config(&temp);

    dirtallyd()
        .arg("query")
        .arg("--config")
        .arg(&config)
        .arg("/srv/data")
        .assert()
        .code(1)
        .stdout(predicate::str::contains("not yet known"));
}
