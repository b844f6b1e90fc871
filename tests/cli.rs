use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn harvest_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("harvest");
    path
}

const FIXTURE: &str = r#"{
  "sessions": [
    { "score": 120, "duration_seconds": 41.0, "items": [
      {"id": "a01", "title": "Morning routine", "date": "3 years ago", "likes": 10},
      {"id": "a02", "title": "Morning routine", "date": "2 years ago"},
      {"id": "a03", "title": "VIDEO_a03", "date": "5 months ago"},
      {"id": "a04", "title": "Kitchen tour", "date": "2 days ago", "likes": 4},
      {"id": "a05", "title": "Garden", "date": "1 year ago"},
      {"id": "a06", "title": "Rain", "date": "8 months ago"}
    ] },
    { "fail": true },
    { "score": 60, "items": [
      {"id": "a05", "title": "Garden", "date": "1 year ago"},
      {"id": "b01", "title": "Night walk", "date": "4 years ago"},
      {"id": "b02", "title": "Snow", "date": "3 years ago"}
    ] }
  ]
}"#;

/// Temp workspace with a replay fixture and a config with no waiting.
fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    fs::create_dir_all(root.join("config")).unwrap();
    fs::write(root.join("fixture.json"), FIXTURE).unwrap();

    let config_content = format!(
        r#"[state]
path = "{root}/data/harvest_results.json"

[schedule]
gap_floor_secs = 0
gap_ceiling_secs = 0
min_gap_secs = 0
max_gap_secs = 0
recovery_min_secs = 0
recovery_max_secs = 0

[collector]
kind = "replay"
replay_path = "{root}/fixture.json"
fallback_title_prefix = "VIDEO_"
"#,
        root = root.display()
    );
    let config_path = root.join("config").join("harvest.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_harvest(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = harvest_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .output()
        .unwrap_or_else(|e| panic!("Failed to run harvest binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn state_json(tmp: &TempDir) -> serde_json::Value {
    let content = fs::read_to_string(tmp.path().join("data/harvest_results.json")).unwrap();
    serde_json::from_str(&content).unwrap()
}

#[test]
fn test_run_persists_sessions() {
    let (tmp, config) = setup_test_env();
    let (stdout, stderr, success) = run_harvest(
        &config,
        &["run", "--sessions", "3", "--seed", "1", "--progress", "json"],
    );
    assert!(success, "run failed: {}", stderr);
    assert!(stdout.contains("Harvest finished: all sessions used"));
    assert!(stdout.contains("2 completed, 1 failed"));
    assert!(stderr.contains("\"event\":\"session_completed\""));
    assert!(stderr.contains("\"event\":\"session_failed\""));

    let state = state_json(&tmp);
    assert_eq!(state["metadata"]["version"], "2.0");
    assert_eq!(state["metadata"]["corpus_size"], 8);
    assert_eq!(state["metadata"]["sessions_run"], 2);
    assert_eq!(state["metadata"]["best_session_score"], 120);
    assert_eq!(state["sessions"].as_array().unwrap().len(), 2);
    assert_eq!(state["sessions"][0]["continuation"]["strategy"], "fresh_start");
    assert_eq!(state["items"].as_object().unwrap().len(), 8);
}

#[test]
fn test_run_stops_at_target() {
    let (tmp, config) = setup_test_env();
    let (stdout, stderr, success) =
        run_harvest(&config, &["run", "--sessions", "3", "--target", "5"]);
    assert!(success, "run failed: {}", stderr);
    assert!(stdout.contains("target corpus size reached"));
    assert_eq!(state_json(&tmp)["sessions"].as_array().unwrap().len(), 1);
}

#[test]
fn test_report_after_run() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, success) = run_harvest(&config, &["run", "--sessions", "3"]);
    assert!(success, "run failed: {}", stderr);

    let (stdout, stderr, success) = run_harvest(&config, &["report"]);
    assert!(success, "report failed: {}", stderr);
    assert!(stdout.contains("Collection Report"));
    assert!(stdout.contains("Items:       8"));
    assert!(stdout.contains("3 years ago"));
    assert!(stdout.contains("Proper titles:   7 / 8"));
    assert!(stdout.contains("Metadata:    consistent"));
}

#[test]
fn test_duplicates_lists_shared_titles() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, success) = run_harvest(&config, &["run", "--sessions", "1"]);
    assert!(success, "run failed: {}", stderr);

    let (stdout, _, success) = run_harvest(&config, &["duplicates"]);
    assert!(success);
    assert!(stdout.contains("1 titles shared by 2 items"));
    assert!(stdout.contains("Morning routine"));
    assert!(stdout.contains("- a01"));
    assert!(stdout.contains("- a02"));
}

#[test]
fn test_plan_previews_next_session() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, success) = run_harvest(&config, &["run", "--sessions", "3"]);
    assert!(success, "run failed: {}", stderr);

    let (stdout, _, success) = run_harvest(&config, &["plan"]);
    assert!(success);
    assert!(stdout.contains("Session 3 plan"));
    assert!(stdout.contains("video_anchor"));

    let (stdout, _, success) = run_harvest(&config, &["plan", "--session", "0"]);
    assert!(success);
    assert!(stdout.contains("fresh_start"));
    assert!(stdout.contains("Offset:          0"));
}

#[test]
fn test_corrupt_state_is_fatal() {
    let (tmp, config) = setup_test_env();
    fs::create_dir_all(tmp.path().join("data")).unwrap();
    fs::write(tmp.path().join("data/harvest_results.json"), "not json").unwrap();

    let (_, stderr, success) = run_harvest(&config, &["run", "--sessions", "1"]);
    assert!(!success, "corrupt state should fail the run");
    assert!(stderr.contains("unreadable"), "stderr: {}", stderr);
    assert_eq!(
        fs::read_to_string(tmp.path().join("data/harvest_results.json")).unwrap(),
        "not json"
    );
}

#[test]
fn test_missing_config_uses_defaults() {
    let tmp = TempDir::new().unwrap();
    let output = Command::new(harvest_binary())
        .current_dir(tmp.path())
        .args(["--config", "missing.toml", "report"])
        .output()
        .unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("No harvest state"));
}

#[test]
fn test_invalid_config_is_rejected() {
    let (_tmp, config) = setup_test_env();
    let (_, stderr, success) = run_harvest(
        &config,
        &["run", "--gap-min", "200", "--gap-max", "100"],
    );
    assert!(!success);
    assert!(stderr.contains("gap_floor_secs"));
}
