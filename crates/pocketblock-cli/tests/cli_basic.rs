//! Basic CLI E2E tests.
//!
//! Tests invoke the built binary against a temporary data directory and
//! verify outputs.

use std::path::Path;
use std::process::Command;

/// Run a CLI command and return (stdout, stderr, exit code).
fn run_cli(dir: &Path, args: &[&str]) -> (String, String, i32) {
    let output = Command::new(env!("CARGO_BIN_EXE_pocketblock-cli"))
        .args(args)
        .env("POCKETBLOCK_DATA_DIR", dir)
        .env("RUST_LOG", "off")
        .output()
        .expect("Failed to execute CLI command");

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    let code = output.status.code().unwrap_or(-1);

    (stdout, stderr, code)
}

fn run_ok(dir: &Path, args: &[&str]) -> String {
    let (stdout, stderr, code) = run_cli(dir, args);
    assert_eq!(code, 0, "{args:?} failed: {stderr}");
    stdout
}

#[test]
fn test_schedule_add_and_list() {
    let dir = tempfile::tempdir().unwrap();
    let id = run_ok(dir.path(), &["schedule", "add", "09:00", "17:00", "--name", "Work"]);
    let id = id.trim();

    let listed = run_ok(dir.path(), &["schedule", "list", "--json"]);
    let parsed: serde_json::Value = serde_json::from_str(&listed).unwrap();
    let schedules = parsed.as_array().unwrap();
    assert_eq!(schedules.len(), 1);
    assert_eq!(schedules[0]["id"], id);
    assert_eq!(schedules[0]["startHour"], 9);
    assert_eq!(schedules[0]["endHour"], 17);
    assert_eq!(schedules[0]["name"], "Work");
    assert_eq!(schedules[0]["isActive"], true);
}

#[test]
fn test_status_uses_exclusive_end() {
    let dir = tempfile::tempdir().unwrap();
    run_ok(dir.path(), &["schedule", "add", "09:00", "17:00"]);
    run_ok(dir.path(), &["schedule", "add", "23:00", "01:00"]);

    for (time, expected) in [
        ("12:00", "12:00: blocking"),
        ("17:00", "17:00: not blocking"),
        ("00:30", "00:30: blocking"),
        ("01:00", "01:00: not blocking"),
    ] {
        let out = run_ok(dir.path(), &["status", "--at", time]);
        assert!(out.starts_with(expected), "at {time}: {out}");
    }
}

#[test]
fn test_schedule_remove_by_prefix_and_deactivate() {
    let dir = tempfile::tempdir().unwrap();
    let id = run_ok(dir.path(), &["schedule", "add", "09:00", "17:00"]);
    let prefix = &id.trim()[..8];

    run_ok(dir.path(), &["schedule", "deactivate", prefix]);
    let out = run_ok(dir.path(), &["status", "--at", "12:00"]);
    assert!(out.starts_with("12:00: not blocking"));

    run_ok(dir.path(), &["schedule", "remove", prefix]);
    let out = run_ok(dir.path(), &["schedule", "list"]);
    assert!(out.contains("no schedules"));
}

#[test]
fn test_invalid_time_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (_, _, code) = run_cli(dir.path(), &["schedule", "add", "25:00", "17:00"]);
    assert_ne!(code, 0);
}

#[test]
fn test_apps_select_and_list() {
    let dir = tempfile::tempdir().unwrap();
    run_ok(dir.path(), &["apps", "select", "social", "games", "social"]);
    let out = run_ok(dir.path(), &["apps", "list", "--json"]);
    let tokens: Vec<String> = serde_json::from_str(&out).unwrap();
    assert_eq!(tokens, ["games", "social"]);

    run_ok(dir.path(), &["apps", "clear"]);
    let out = run_ok(dir.path(), &["apps", "list"]);
    assert!(out.trim().is_empty());
}

#[test]
fn test_unblock_start_status_end() {
    let dir = tempfile::tempdir().unwrap();
    let out = run_ok(dir.path(), &["unblock", "start", "--minutes", "5"]);
    assert!(out.starts_with("unblocked until"));

    let out = run_ok(dir.path(), &["unblock", "status"]);
    assert!(out.starts_with("unblocked until"), "{out}");

    run_ok(dir.path(), &["unblock", "end"]);
    let out = run_ok(dir.path(), &["unblock", "status"]);
    assert!(out.contains("not unblocked"));

    let (_, stderr, code) = run_cli(dir.path(), &["unblock", "end"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("error:"));
}

#[test]
fn test_overlong_unblock_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (_, stderr, code) = run_cli(dir.path(), &["unblock", "start", "--minutes", "4294967295"]);
    assert_ne!(code, 0);
    assert!(stderr.contains("between 1s and 86400s"), "{stderr}");

    let out = run_ok(dir.path(), &["unblock", "status"]);
    assert!(out.contains("not unblocked"));
}

#[test]
fn test_step_goal_unblocks() {
    let dir = tempfile::tempdir().unwrap();
    let out = run_ok(dir.path(), &["steps", "10"]);
    assert!(out.contains("10/15 steps"));
    assert!(!out.contains("goal reached"));

    let out = run_ok(dir.path(), &["steps", "15"]);
    assert!(out.contains("goal reached, unblocked until"));
}

#[test]
fn test_monitor_callbacks_drive_shield() {
    let dir = tempfile::tempdir().unwrap();
    run_ok(dir.path(), &["apps", "select", "social"]);
    let id = run_ok(dir.path(), &["schedule", "add", "00:00", "23:59"]);
    let id = id.trim();

    let out = run_ok(dir.path(), &["monitor", "start", id]);
    assert!(out.contains("shielded 1 apps"), "{out}");
}

#[test]
fn test_config_get_set() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(run_ok(dir.path(), &["config", "get", "step_goal"]).trim(), "15");
    run_ok(dir.path(), &["config", "set", "step_goal", "20"]);
    assert_eq!(run_ok(dir.path(), &["config", "get", "step_goal"]).trim(), "20");

    let (_, _, code) = run_cli(dir.path(), &["config", "set", "no_such_key", "1"]);
    assert_ne!(code, 0);
}

#[test]
fn test_onboarding_flag() {
    let dir = tempfile::tempdir().unwrap();
    assert_eq!(run_ok(dir.path(), &["onboarding", "show"]).trim(), "false");
    run_ok(dir.path(), &["onboarding", "complete"]);
    assert_eq!(run_ok(dir.path(), &["onboarding", "show"]).trim(), "true");
    run_ok(dir.path(), &["onboarding", "reset"]);
    assert_eq!(run_ok(dir.path(), &["onboarding", "show"]).trim(), "false");
}

#[test]
fn test_diagnostics_json() {
    let dir = tempfile::tempdir().unwrap();
    run_ok(dir.path(), &["schedule", "add", "09:00", "17:00"]);
    let out = run_ok(dir.path(), &["diagnostics", "json"]);
    let report: serde_json::Value = serde_json::from_str(&out).unwrap();
    assert_eq!(report["schedule_count"], 1);
    assert_eq!(report["unblock"]["state"], "enforcing");
}
