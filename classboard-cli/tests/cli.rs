use std::fs;
use std::path::Path;
use std::process::Command;

use assert_cmd::prelude::*;
use chrono::{TimeZone, Utc};
use predicates::str::contains;
use tempfile::TempDir;

use classboard_core::{CardId, GroupingKey, RecordId};
use classboard_sync::state::{CardEntry, GroupEntry};
use classboard_sync::{FileStateStore, StateStore, SyncState};

const ENV_OVERRIDES: [&str; 7] = [
    "CANVAS_BASE_URL",
    "CANVAS_TOKEN",
    "CANVAS_TERM_ID",
    "TRELLO_KEY",
    "TRELLO_TOKEN",
    "TRELLO_BOARD_ID",
    "TRELLO_BOARD_URL",
];

fn classboard_cmd(home: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("classboard"));
    cmd.env("HOME", home).env("USERPROFILE", home);
    for name in ENV_OVERRIDES {
        cmd.env_remove(name);
    }
    cmd
}

#[test]
fn help_lists_every_command() {
    let home = TempDir::new().expect("home");
    let output = classboard_cmd(home.path())
        .arg("--help")
        .output()
        .expect("run --help");
    assert!(output.status.success());
    let help = String::from_utf8_lossy(&output.stdout);
    for command in ["init", "sync", "dedupe", "wipe", "status", "validate", "courses"] {
        assert!(help.contains(command), "missing {command} in:\n{help}");
    }
}

#[test]
fn init_writes_config_once() {
    let home = TempDir::new().expect("home");
    let config = home.path().join(".classboard").join("config.yaml");

    classboard_cmd(home.path())
        .arg("init")
        .assert()
        .success()
        .stdout(contains("Wrote starter config"));
    assert!(config.exists());

    fs::write(&config, "canvas:\n  base_url: https://canvas.example.edu\n").expect("edit config");
    classboard_cmd(home.path())
        .arg("init")
        .assert()
        .success()
        .stdout(contains("already present"));
    let contents = fs::read_to_string(&config).expect("read config");
    assert!(contents.contains("canvas.example.edu"));
}

#[test]
fn commands_without_config_point_at_init() {
    let home = TempDir::new().expect("home");
    classboard_cmd(home.path())
        .arg("validate")
        .assert()
        .failure()
        .stderr(contains("classboard init"));
}

#[test]
fn sync_refuses_to_run_with_incomplete_config() {
    let home = TempDir::new().expect("home");
    classboard_cmd(home.path()).arg("init").assert().success();

    classboard_cmd(home.path())
        .args(["sync", "--once"])
        .assert()
        .failure()
        .stderr(contains("missing required config"));
}

#[test]
fn wipe_flag_needs_a_confirmation() {
    let home = TempDir::new().expect("home");
    classboard_cmd(home.path())
        .args(["sync", "--once", "--wipe", "managed"])
        .assert()
        .failure()
        .stderr(contains("--wipe-confirm"));

    classboard_cmd(home.path())
        .args(["sync", "--wipe", "everything", "--wipe-confirm", "b1"])
        .assert()
        .failure()
        .stderr(contains("unknown wipe mode"));

    classboard_cmd(home.path())
        .arg("wipe")
        .assert()
        .failure()
        .stderr(contains("--confirm"));
}

#[test]
fn status_before_first_sync_says_never() {
    let home = TempDir::new().expect("home");
    classboard_cmd(home.path()).arg("init").assert().success();

    classboard_cmd(home.path())
        .arg("status")
        .assert()
        .success()
        .stdout(contains("Never synced"));
}

#[test]
fn status_json_reports_saved_state() {
    let home = TempDir::new().expect("home");
    classboard_cmd(home.path()).arg("init").assert().success();

    let group = GroupingKey::from("101");
    let mut state = SyncState::default();
    state.groups.insert(group.clone(), GroupEntry::default());
    let mut entry = CardEntry::new(CardId::from("card-1"), group.clone(), String::new());
    entry.locked = true;
    state
        .records
        .insert(RecordId::from("assignment:101:1"), entry);
    state.records.insert(
        RecordId::from("assignment:101:2"),
        CardEntry::new(CardId::from("card-2"), group, String::new()),
    );
    let ran = Utc.with_ymd_and_hms(2026, 10, 1, 12, 0, 0).unwrap();
    state.meta.last_run_at = Some(ran);
    state.meta.last_success_at = Some(ran);
    let path = home.path().join(".classboard").join("state.json");
    FileStateStore::new(&path).save(&state).expect("save state");

    let output = classboard_cmd(home.path())
        .args(["status", "--json"])
        .output()
        .expect("run status");
    assert!(output.status.success());
    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("status JSON");
    assert_eq!(json["records"], 2);
    assert_eq!(json["locked"], 1);
    assert_eq!(json["groups"][0]["cards"], 2);
    assert_eq!(json["last_run_at"], "2026-10-01T12:00:00Z");
}

#[test]
fn log_file_is_opened_before_the_command_runs() {
    let home = TempDir::new().expect("home");
    let log = home.path().join("logs").join("classboard.log");
    classboard_cmd(home.path()).arg("init").assert().success();

    classboard_cmd(home.path())
        .args(["--log-level", "debug", "--log-file"])
        .arg(&log)
        .args(["sync", "--once"])
        .assert()
        .failure();
    assert!(log.exists());
}

#[test]
fn log_http_is_accepted_before_any_command() {
    let home = TempDir::new().expect("home");
    classboard_cmd(home.path()).arg("init").assert().success();

    classboard_cmd(home.path())
        .args(["--log-http", "status"])
        .assert()
        .success()
        .stdout(contains("Never synced"));
}
