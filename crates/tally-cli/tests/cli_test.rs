//! Integration tests for the tally binary

use std::process::{Command, Output};

use tally_core::testing::TestEnvironment;

/// Run tally with a private HOME so no user config leaks in
fn tally(home: &std::path::Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_tally"))
        .args(args)
        .env("HOME", home)
        .env_remove("TALLY_THREADS")
        .env_remove("TALLY_SOCKET")
        .env_remove("TALLY_DEADLINE_SECS")
        .output()
        .expect("Failed to execute tally")
}

fn stdout_json(output: &Output) -> serde_json::Value {
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    serde_json::from_slice(&output.stdout).unwrap()
}

fn fixture() -> TestEnvironment {
    let env = TestEnvironment::new().unwrap();
    env.create_file("second.txt", b"Second, file!").unwrap();
    env.create_zip(
        "file.zip",
        &[("test/folder1/first.txt", b"File file FILE.".as_slice())],
    )
    .unwrap();
    env
}

#[test]
fn test_count_keyed_root() {
    let env = fixture();
    let root = format!("1={}", env.root.display());
    let output = tally(&env.root, &["count", &root]);

    assert_eq!(
        stdout_json(&output),
        serde_json::json!({ "1": { "file": 4, "second": 1 } })
    );
}

#[test]
fn test_count_bare_roots_and_missing_root() {
    let env = fixture();
    let root = env.root.display().to_string();
    let missing = env.path("missing").display().to_string();
    let output = tally(&env.root, &["count", "-j", "2", &root, &missing]);

    let json = stdout_json(&output);
    assert_eq!(json["1"]["file"], 4);
    assert_eq!(json["2"], serde_json::json!({}));
}

#[test]
fn test_count_request_file() {
    let env = fixture();
    let request = env
        .create_file(
            "request.json",
            serde_json::json!({ "docs": env.root }).to_string().as_bytes(),
        )
        .unwrap();
    let output = tally(
        &env.root,
        &["count", "--request", request.to_str().unwrap(), "--pretty"],
    );

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    assert!(stdout.contains('\n'));
    assert_eq!(stdout_json(&output)["docs"]["second"], 1);
}

#[test]
fn test_count_requires_roots() {
    let env = TestEnvironment::new().unwrap();
    let output = tally(&env.root, &["count"]);
    assert!(!output.status.success());
}

#[test]
fn test_status_without_daemon_fails() {
    let env = TestEnvironment::new().unwrap();
    let socket = env.path("absent.sock").display().to_string();
    let output = tally(&env.root, &["status", "--socket", &socket]);

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("not running"));
}

#[test]
fn test_config_path() {
    let env = TestEnvironment::new().unwrap();
    let output = tally(&env.root, &["config", "path"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("Global:"));
    assert!(stdout.contains("Project:"));
}

#[test]
fn test_config_show_reads_global_file() {
    let env = TestEnvironment::new().unwrap();
    env.create_file(".tally/config.toml", b"[scan]\ntext_extension = \"md\"\n")
        .unwrap();
    let output = tally(&env.root, &["config", "show"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("[scan]"));
    assert!(stdout.contains("[daemon]"));
    assert!(stdout.contains("text_extension = \"md\""));
}
