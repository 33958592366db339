//! End-to-end tests for the `bizsync` binary against an isolated data dir.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

const SYNC_ENV: [&str; 6] = [
    "SYNC_ENABLED",
    "SYNC_REMOTE_URL",
    "SYNC_REMOTE_KEY",
    "SYNC_INTERVAL",
    "SYNC_ON_STARTUP",
    "SYNC_AUTO",
];

fn bizsync(home: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("bizsync").unwrap();
    cmd.env("BIZSYNC_HOME", home.path()).env_remove("BIZSYNC_LOG");
    for key in SYNC_ENV {
        cmd.env_remove(key);
    }
    cmd
}

fn json_output(cmd: &mut Command) -> serde_json::Value {
    let output = cmd.output().unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));
    serde_json::from_slice(&output.stdout).unwrap()
}

#[test]
fn test_status_on_fresh_home() {
    let home = TempDir::new().unwrap();
    let value = json_output(bizsync(&home).args(["status", "--output", "json"]));

    assert_eq!(value["enabled"], false);
    assert_eq!(value["is_syncing"], false);
    assert_eq!(value["pending"], 0);
    assert_eq!(value["total"], 0);
    assert!(home.path().join("bizsync.db").exists());
}

#[test]
fn test_capture_is_noop_when_disabled() {
    let home = TempDir::new().unwrap();
    bizsync(&home)
        .args(["capture", "contacts", "42", "create", "--data", r#"{"id":42}"#])
        .assert()
        .success()
        .stdout(predicate::str::contains("nothing captured"));

    let value = json_output(bizsync(&home).args(["status", "-o", "json"]));
    assert_eq!(value["total"], 0);
}

#[test]
fn test_capture_when_enabled_stays_pending() {
    let home = TempDir::new().unwrap();
    let captured = json_output(
        bizsync(&home)
            .env("SYNC_ENABLED", "true")
            .env("SYNC_REMOTE_URL", "http://127.0.0.1:9")
            .env("SYNC_REMOTE_KEY", "test-key")
            .args(["capture", "contacts", "42", "create", "-o", "json"])
            .args(["--data", r#"{"id":42,"name":"Alice"}"#]),
    );
    assert_eq!(captured["captured"], true);
    assert_eq!(captured["change"]["operation"], "create");

    // Captured rows survive sync being switched off again
    let value = json_output(bizsync(&home).args(["status", "-o", "json"]));
    assert_eq!(value["enabled"], false);
    assert_eq!(value["pending"], 1);

    let listed = json_output(bizsync(&home).args(["list", "--status", "pending", "-o", "json"]));
    assert_eq!(listed["count"], 1);
    assert_eq!(listed["items"][0]["record_id"], "42");
}

#[test]
fn test_run_without_remote_fails() {
    let home = TempDir::new().unwrap();
    bizsync(&home)
        .arg("run")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Sync is disabled"));
}

#[test]
fn test_push_to_unreachable_remote_marks_failed() {
    let home = TempDir::new().unwrap();
    let enabled = |cmd: &mut Command| {
        cmd.env("SYNC_ENABLED", "true")
            .env("SYNC_REMOTE_URL", "http://127.0.0.1:9")
            .env("SYNC_REMOTE_KEY", "test-key");
    };

    let mut capture = bizsync(&home);
    enabled(&mut capture);
    capture.args(["capture", "invoices", "7", "delete"]).assert().success();

    let mut run = bizsync(&home);
    enabled(&mut run);
    let result = json_output(run.args(["run", "-o", "json"]));
    assert_eq!(result["pushed"], 0);
    assert_eq!(result["failed"], 1);

    let failed = json_output(bizsync(&home).args(["list", "-s", "failed", "-o", "json"]));
    assert_eq!(failed["items"][0]["retry_count"], 1);
    assert!(failed["items"][0]["error_message"]
        .as_str()
        .unwrap()
        .starts_with("[transient]"));

    let retried = json_output(bizsync(&home).args(["retry", "--all", "-o", "json"]));
    assert_eq!(retried["requeued"], 1);
}

#[test]
fn test_tables_toggle() {
    let home = TempDir::new().unwrap();
    bizsync(&home)
        .args(["tables", "disable", "employees"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Sync disabled for 'employees'"));

    let value = json_output(bizsync(&home).args(["tables", "-o", "json"]));
    assert_eq!(value["items"][0]["sync_enabled"], false);
}

#[test]
fn test_config_masks_api_key() {
    let home = TempDir::new().unwrap();
    std::fs::write(
        home.path().join("config.yaml"),
        "sync:\n  enabled: true\n  remote:\n    url: https://db.example.com\n    api_key: super-secret-9876\n",
    )
    .unwrap();

    bizsync(&home)
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("9876"))
        .stdout(predicate::str::contains("super-secret").not());
}

#[test]
fn test_invalid_env_override_is_reported() {
    let home = TempDir::new().unwrap();
    bizsync(&home)
        .env("SYNC_INTERVAL", "soon")
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("SYNC_INTERVAL"));
}

#[test]
fn test_retry_requires_target() {
    let home = TempDir::new().unwrap();
    bizsync(&home).arg("retry").assert().failure();
}
