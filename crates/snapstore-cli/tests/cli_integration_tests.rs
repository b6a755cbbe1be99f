//! CLI integration tests
//!
//! Drive the built `snapstore` binary against a temporary database.

use serde_json::Value;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn db_path(temp_dir: &TempDir) -> PathBuf {
    temp_dir.path().join("cli.db")
}

fn run(db: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_snapstore"))
        .env_remove("SNAPSTORE_DB")
        .env_remove("SNAPSTORE_POOL_SIZE")
        .args(["--db", db.to_str().unwrap(), "--collection", "widgets"])
        .args(args)
        .output()
        .expect("Failed to execute CLI")
}

fn stdout_json(output: &Output) -> Value {
    assert!(
        output.status.success(),
        "CLI command should succeed. Stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_add_promote_get() {
    let temp_dir = TempDir::new().unwrap();
    let db = db_path(&temp_dir);

    let added = stdout_json(&run(
        &db,
        &["add-version", "W1", r#"{"name":"a"}"#, "--affinity", "session-1"],
    ));
    assert_eq!(added["affinity_id"], "session-1");
    assert!(added["version_id"].as_i64().unwrap() > 0);

    let promoted = stdout_json(&run(&db, &["promote", "W1", "--affinity", "session-1"]));
    assert_eq!(promoted["was_duplicate"], false);

    let current = stdout_json(&run(&db, &["get", "W1"]));
    assert_eq!(current, serde_json::json!({"name": "a"}));

    let draft = stdout_json(&run(&db, &["get-version", "W1", "--affinity", "session-1"]));
    assert_eq!(draft, serde_json::json!({"name": "a"}));
}

#[test]
fn test_generated_affinity_is_reported() {
    let temp_dir = TempDir::new().unwrap();
    let db = db_path(&temp_dir);

    let added = stdout_json(&run(&db, &["add-version", "W1", "1"]));
    let affinity = added["affinity_id"].as_str().unwrap().to_string();
    assert!(!affinity.is_empty());

    let promoted = run(&db, &["promote", "W1", "--affinity", &affinity]);
    assert!(promoted.status.success());
}

#[test]
fn test_missing_snapshot_exits_with_not_found() {
    let temp_dir = TempDir::new().unwrap();
    let db = db_path(&temp_dir);

    let output = run(&db, &["get", "nope"]);
    assert_eq!(output.status.code(), Some(2));
    assert!(String::from_utf8_lossy(&output.stderr).contains("ERR_NOT_FOUND"));
}

#[test]
fn test_abort_conflict_exits_with_conflict() {
    let temp_dir = TempDir::new().unwrap();
    let db = db_path(&temp_dir);

    stdout_json(&run(&db, &["add-version", "W1", r#""alice""#, "--affinity", "alice"]));
    std::thread::sleep(std::time::Duration::from_millis(3));
    stdout_json(&run(&db, &["add-version", "W1", r#""bob""#, "--affinity", "bob"]));
    stdout_json(&run(&db, &["promote", "W1", "--affinity", "bob"]));
    std::thread::sleep(std::time::Duration::from_millis(3));

    let output = run(
        &db,
        &["promote", "W1", "--affinity", "alice", "--strategy", "abort"],
    );
    assert_eq!(output.status.code(), Some(3));
    let body: Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(body["conflict"]["current_affinity_id"], "bob");

    let current = stdout_json(&run(&db, &["get", "W1"]));
    assert_eq!(current, "bob");
}

#[test]
fn test_list_history_and_versions() {
    let temp_dir = TempDir::new().unwrap();
    let db = db_path(&temp_dir);

    for (id, value) in [("A", "1"), ("B", "2"), ("C", "3")] {
        stdout_json(&run(&db, &["add-version", id, value, "--affinity", "w"]));
        stdout_json(&run(&db, &["promote", id, "--affinity", "w"]));
    }
    stdout_json(&run(&db, &["add-version", "A", "10", "--affinity", "w"]));
    stdout_json(&run(&db, &["promote", "A", "--affinity", "w"]));

    let all = run(&db, &["list"]);
    assert!(all.status.success());
    let mut values: Vec<i64> = String::from_utf8_lossy(&all.stdout)
        .lines()
        .map(|line| line.parse().unwrap())
        .collect();
    values.sort();
    assert_eq!(values, vec![2, 3, 10]);

    let some = run(&db, &["list", "--id", "A", "--id", "missing"]);
    assert_eq!(String::from_utf8_lossy(&some.stdout).trim(), "10");

    let history = stdout_json(&run(&db, &["history", "A"]));
    let history = history.as_array().unwrap();
    assert_eq!(history.len(), 2);
    assert!(history[0]["date_until"].is_string());
    assert!(history[1]["date_until"].is_null());

    let versions = stdout_json(&run(&db, &["versions", "A"]));
    assert_eq!(versions.as_array().unwrap().len(), 2);
}

#[test]
fn test_invalid_payload_is_rejected() {
    let temp_dir = TempDir::new().unwrap();
    let db = db_path(&temp_dir);

    let output = run(&db, &["add-version", "W1", "{not json"]);
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("ERR_INVALID_INPUT"));
}

#[test]
fn test_config_file_is_honoured() {
    let temp_dir = TempDir::new().unwrap();
    let db = temp_dir.path().join("from-config.db");
    let config = temp_dir.path().join("snapstore.toml");
    std::fs::write(
        &config,
        format!(
            "path = {:?}\ncollections = [\"widgets\"]\ncursor_batch_size = 1\n",
            db.to_str().unwrap()
        ),
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_snapstore"))
        .env_remove("SNAPSTORE_DB")
        .env_remove("SNAPSTORE_POOL_SIZE")
        .args(["--config", config.to_str().unwrap(), "--collection", "widgets"])
        .args(["add-version", "W1", "true", "--affinity", "a"])
        .output()
        .expect("Failed to execute CLI");
    assert!(
        output.status.success(),
        "Stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    assert!(db.exists());
}
