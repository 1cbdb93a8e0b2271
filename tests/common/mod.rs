//! Shared helpers for `agentdock` CLI integration tests.
//!
//! Every test gets its own git repo and its own sqlite store in a temp
//! directory — no side effects on the real filesystem outside of it.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tempfile::TempDir;

/// Create a fresh git repo with one commit in a temp directory.
pub fn setup_test_repo() -> TempDir {
    let dir = TempDir::new().expect("failed to create temp dir");
    run_git(dir.path(), &["init", "-q"]);
    run_git(dir.path(), &["config", "user.email", "test@example.com"]);
    run_git(dir.path(), &["config", "user.name", "Test"]);
    std::fs::write(dir.path().join("README.md"), "# test repo\n").unwrap();
    run_git(dir.path(), &["add", "."]);
    run_git(dir.path(), &["commit", "-q", "-m", "initial commit"]);
    dir
}

fn run_git(dir: &Path, args: &[&str]) {
    let status = Command::new("git").args(args).current_dir(dir).status().expect("git available");
    assert!(status.success(), "git {args:?} failed");
}

/// A store path inside `dir` that does not yet exist, for `--db`.
pub fn db_path(dir: &Path) -> PathBuf {
    dir.join("state.db")
}

/// Run `agentdock` with the given args against `db` and `repo`, in JSON mode.
pub fn agentdock_json(db: &Path, repo: &Path, args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_agentdock"))
        .arg("--json")
        .arg("--db")
        .arg(db)
        .arg("--config")
        .arg(repo.join("agentdock-config.json"))
        .args(args)
        .current_dir(repo)
        .output()
        .expect("failed to execute agentdock")
}

/// Run `agentdock` and assert it succeeds, returning the parsed JSON envelope's
/// `data` field.
pub fn agentdock_ok(db: &Path, repo: &Path, args: &[&str]) -> serde_json::Value {
    let out = agentdock_json(db, repo, args);
    let stdout = String::from_utf8_lossy(&out.stdout);
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(out.status.success(), "agentdock {} failed:\nstdout: {stdout}\nstderr: {stderr}", args.join(" "));

    let envelope: serde_json::Value = serde_json::from_str(&stdout)
        .unwrap_or_else(|err| panic!("agentdock {} did not print JSON: {err}\nstdout: {stdout}", args.join(" ")));
    assert_eq!(envelope["success"], serde_json::json!(true));
    envelope["data"].clone()
}

/// Run `agentdock` expecting a non-zero exit, returning the parsed JSON
/// envelope's `error` message.
pub fn agentdock_err(db: &Path, repo: &Path, args: &[&str]) -> String {
    let out = agentdock_json(db, repo, args);
    assert!(!out.status.success(), "expected agentdock {} to fail", args.join(" "));

    let stdout = String::from_utf8_lossy(&out.stdout);
    let envelope: serde_json::Value = serde_json::from_str(&stdout)
        .unwrap_or_else(|err| panic!("agentdock {} did not print JSON: {err}\nstdout: {stdout}", args.join(" ")));
    assert_eq!(envelope["success"], serde_json::json!(false));
    envelope["error"].as_str().expect("error field present").to_owned()
}
