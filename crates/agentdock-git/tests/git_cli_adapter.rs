//! Exercises [`GitCliAdapter`] against a real git repository on disk.

use std::process::Command;

use agentdock_git::{GitCliAdapter, GitError, WorktreeAdapter};

fn init_repo(dir: &std::path::Path) {
    let run = |args: &[&str]| {
        let status = Command::new("git").args(args).current_dir(dir).status().expect("git available");
        assert!(status.success(), "git {args:?} failed");
    };
    run(&["init", "-q"]);
    run(&["config", "user.email", "test@example.com"]);
    run(&["config", "user.name", "Test"]);
    std::fs::write(dir.join("README.md"), "hello\n").unwrap();
    run(&["add", "."]);
    run(&["commit", "-q", "-m", "init"]);
}

#[test]
fn create_list_and_remove_worktree_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());
    let adapter = GitCliAdapter::new(dir.path().to_path_buf());

    let outcome = adapter.create_worktree("agent-1", "HEAD").unwrap();
    assert!(outcome.success, "{:?}", outcome.error);

    let worktrees = adapter.list_worktrees().unwrap();
    assert_eq!(worktrees.len(), 2);
    assert!(worktrees.iter().any(|w| w.branch.as_deref() == Some("agent-1")));
    assert!(worktrees.iter().filter(|w| w.is_main).count() == 1);

    let main_path = adapter.get_main_repo_path().unwrap();
    assert_eq!(main_path, dir.path().canonicalize().unwrap());

    let remove = adapter.remove_worktree("agent-1", true).unwrap();
    assert!(remove.success, "{:?}", remove.error);

    let worktrees_after = adapter.list_worktrees().unwrap();
    assert_eq!(worktrees_after.len(), 1);
}

#[test]
fn creating_a_worktree_twice_fails_without_touching_git() {
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());
    let adapter = GitCliAdapter::new(dir.path().to_path_buf());

    adapter.create_worktree("agent-1", "HEAD").unwrap();
    let err = adapter.create_worktree("agent-1", "HEAD").unwrap_err();
    assert!(matches!(err, GitError::WorktreeExists { .. }));
}

#[test]
fn removing_an_unknown_worktree_fails() {
    let dir = tempfile::tempdir().unwrap();
    init_repo(dir.path());
    let adapter = GitCliAdapter::new(dir.path().to_path_buf());

    let err = adapter.remove_worktree("does-not-exist", false).unwrap_err();
    assert!(matches!(err, GitError::WorktreeNotFound { .. }));
}
