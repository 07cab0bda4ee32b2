use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

// Build a minimal valid TOML config for sim mode; every file lands in `dir`
fn write_config(dir: &tempfile::TempDir, extra: &str) -> PathBuf {
    let root = dir.path().display();
    let toml = format!(
        r#"
[site]
name = "Shed"

[transport]
kind = "sim"
sim_controller = 9
timeout_ms = 250

[server]
bind = "127.0.0.1"
port = 9082

[paths]
outage_log = "{root}/outage.txt"
feedback_file = "{root}/feedback.json"

{extra}
"#
    );
    let path = dir.path().join("genmon.toml");
    fs::write(&path, toml).unwrap();
    path
}

#[rstest]
#[case(&["--help"], 0, "Usage:", "stdout")]
#[case(&["check"], 0, "Config OK", "stdout")]
#[case(&["--json", "check"], 0, "\"ok\":true", "stdout")]
#[case(&[], 2, "Usage:", "stderr")]
#[case(&["query"], 2, "required", "stderr")]
fn cli_table_cases(
    #[case] args: &[&str],
    #[case] exit_code: i32,
    #[case] needle: &str,
    #[case] stream: &str,
) {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");

    let mut cmd = Command::cargo_bin("genmon").unwrap();
    cmd.arg("--config").arg(&cfg);
    for a in args {
        cmd.arg(a);
    }

    let assert = cmd.assert().code(exit_code);
    if stream == "stdout" {
        assert.stdout(predicate::str::contains(needle));
    } else {
        assert.stderr(predicate::str::contains(needle));
    }
}

#[test]
fn invalid_config_exits_with_config_code() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "[power]\nsample_secs = 0\n");

    Command::cargo_bin("genmon")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("check")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("power.sample_secs must be >= 1"));
}

#[test]
fn invalid_config_json_error() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "[logging]\nrotation = \"weekly\"\n");

    let out = Command::cargo_bin("genmon")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("--json")
        .arg("check")
        .output()
        .unwrap();
    assert_eq!(out.status.code(), Some(3));
    let v: serde_json::Value = serde_json::from_slice(&out.stderr).unwrap();
    assert_eq!(v["reason"], "InvalidConfig");
}

#[test]
fn missing_config_file_is_reported() {
    let dir = tempdir().unwrap();
    Command::cargo_bin("genmon")
        .unwrap()
        .arg("--config")
        .arg(dir.path().join("nope.toml"))
        .arg("check")
        .assert()
        .code(1)
        .stderr(predicate::str::contains("read config"));
}

#[test]
fn query_status_against_simulator() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");

    Command::cargo_bin("genmon")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .args(["query", "status"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Switch State : Auto"));
}

#[test]
fn query_json_and_plain_items() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, "");

    let out = Command::cargo_bin("genmon")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .args(["--json", "query", "maint"])
        .output()
        .unwrap();
    assert!(out.status.success());
    let v: serde_json::Value = serde_json::from_slice(&out.stdout).unwrap();
    assert!(v.get("Maintenance").is_some(), "{v}");

    Command::cargo_bin("genmon")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .args(["query", "getsitename"])
        .assert()
        .success()
        .stdout(predicate::str::diff("Shed\n"));
}
