use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn chx_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_chx"))
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let config_dir = root.join("config");
    fs::create_dir_all(&config_dir).unwrap();

    let calendar_dir = root.join("calendar");
    fs::create_dir_all(&calendar_dir).unwrap();
    fs::write(
        calendar_dir.join("events.json"),
        r#"[
  {"uid":"evt-1","title":"Quarterly planning","notes":"Review the roadmap and hiring plan.","location":"Room 4","start":"2024-07-01T09:00:00Z","end":"2024-07-01T10:00:00Z"},
  {"uid":"evt-2","title":"Dentist","start":"2024-07-02T15:30:00Z"}
]"#,
    )
    .unwrap();

    // Port 1 refuses connections, so the chat source always fails.
    let config_content = format!(
        r#"[db]
path = "{root}/data/chx.sqlite"

[sync]
timeout_secs = 20

[http]
timeout_secs = 5

[sources.chat.team]
base_url = "http://127.0.0.1:1"
channels = ["general"]

[sources.calendar.personal]
command = "cat events.json"
working_dir = "{root}/calendar"
"#,
        root = root.display()
    );

    let config_path = config_dir.join("chx.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

fn run_chx(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = chx_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path)
        .args(args)
        .env_remove("CHX_LOG")
        .env_remove("RUST_LOG")
        .output()
        .unwrap_or_else(|e| panic!("Failed to run chx binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

#[test]
fn init_is_idempotent() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_chx(&config_path, &["init"]);
    assert!(success, "init failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("initialized"));

    let (_, stderr, success) = run_chx(&config_path, &["init"]);
    assert!(success, "second init failed: {}", stderr);
}

#[test]
fn sync_then_search() {
    let (_tmp, config_path) = setup_test_env();
    run_chx(&config_path, &["init"]);

    let (stdout, stderr, success) = run_chx(&config_path, &["sync"]);
    assert!(success, "sync failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("calendar:personal"));
    assert!(stdout.contains("2 items"));
    assert!(stdout.contains("failed"), "chat should fail: {}", stdout);
    assert!(stdout.contains("2 inserted"));
    assert!(stdout.trim_end().ends_with("ok"));

    let (stdout, _, success) = run_chx(&config_path, &["search", "roadmap"]);
    assert!(success);
    assert!(stdout.contains("Quarterly planning"));
    assert!(stdout.contains("calendar:evt-1"));

    let (stdout, _, success) = run_chx(&config_path, &["search", "nonexistentterm"]);
    assert!(success);
    assert!(stdout.contains("No results."));
}

#[test]
fn resync_does_not_duplicate() {
    let (_tmp, config_path) = setup_test_env();
    run_chx(&config_path, &["init"]);
    run_chx(&config_path, &["sync", "calendar"]);

    let (stdout, _, success) = run_chx(&config_path, &["sync", "calendar:personal"]);
    assert!(success);
    assert!(stdout.contains("0 inserted, 2 updated"));

    let (stdout, _, success) = run_chx(&config_path, &["stats"]);
    assert!(success);
    assert!(stdout.contains("Items:       2"));
}

#[test]
fn sources_show_last_success() {
    let (_tmp, config_path) = setup_test_env();
    run_chx(&config_path, &["init"]);
    run_chx(&config_path, &["sync"]);

    let (stdout, _, success) = run_chx(&config_path, &["sources"]);
    assert!(success);
    let calendar = stdout
        .lines()
        .find(|l| l.starts_with("calendar:personal"))
        .unwrap();
    assert!(!calendar.contains("never"));
    let chat = stdout.lines().find(|l| l.starts_with("chat:team")).unwrap();
    assert!(chat.contains("never"));
}

#[test]
fn get_prints_item_and_rejects_unknown_id() {
    let (_tmp, config_path) = setup_test_env();
    run_chx(&config_path, &["init"]);
    run_chx(&config_path, &["sync", "calendar"]);

    let (stdout, _, success) = run_chx(&config_path, &["get", "1"]);
    assert!(success);
    assert!(stdout.contains("--- Item ---"));
    assert!(stdout.contains("calendar:evt-"));

    let (_, stderr, success) = run_chx(&config_path, &["get", "999"]);
    assert!(!success);
    assert!(stderr.contains("item not found"));
}

#[test]
fn unknown_source_filter_fails() {
    let (_tmp, config_path) = setup_test_env();
    run_chx(&config_path, &["init"]);

    let (_, stderr, success) = run_chx(&config_path, &["sync", "mail"]);
    assert!(!success);
    assert!(stderr.contains("No 'mail' sources are configured"));
}
