//! End-to-end CLI test: register, list, and release a session.

mod common;

use common::{agentdock_err, agentdock_ok, db_path, setup_test_repo};

#[test]
fn register_list_and_release_a_session() {
    let repo = setup_test_repo();
    let db = db_path(repo.path());
    let repo_path = repo.path().to_string_lossy().into_owned();

    let registered = agentdock_ok(&db, repo.path(), &["register", "--repo-path", &repo_path, "--prompt", "fix the bug"]);
    assert_eq!(registered["is_main_repo"], serde_json::json!(true));
    let session_id = registered["id"].as_str().expect("session id").to_owned();

    let sessions = agentdock_ok(&db, repo.path(), &["sessions", "--repo-path", &repo_path]);
    let sessions = sessions.as_array().expect("sessions array");
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0]["id"], serde_json::json!(session_id));

    let released = agentdock_ok(&db, repo.path(), &["release", &session_id, "--repo-path", &repo_path]);
    assert_eq!(released["released"], serde_json::json!(session_id));

    let sessions_after = agentdock_ok(&db, repo.path(), &["sessions", "--repo-path", &repo_path]);
    assert_eq!(sessions_after.as_array().unwrap().len(), 0);

    // Releasing an already-released session id must fail, not silently succeed.
    let error = agentdock_err(&db, repo.path(), &["release", &session_id, "--repo-path", &repo_path]);
    assert!(error.contains(&session_id), "error should name the missing session: {error}");
}

#[test]
fn a_second_registration_against_the_same_repo_spawns_a_worktree() {
    let repo = setup_test_repo();
    let db = db_path(repo.path());
    let repo_path = repo.path().to_string_lossy().into_owned();

    // Each `agentdock` invocation is its own short-lived process, so the
    // first registration's own pid would already be dead by the time the
    // second one runs. Register it under this test process's pid instead,
    // which stays alive for the whole test, to simulate a still-running
    // first session.
    let live_pid = std::process::id().to_string();

    let first = agentdock_ok(&db, repo.path(), &["register", "--repo-path", &repo_path, "--pid", &live_pid]);
    assert_eq!(first["is_main_repo"], serde_json::json!(true));
    assert_eq!(first["parallel_sessions"], serde_json::json!(1));

    let second = agentdock_ok(&db, repo.path(), &["register", "--repo-path", &repo_path]);
    assert_eq!(second["is_main_repo"], serde_json::json!(false));
    assert_eq!(second["parallel_sessions"], serde_json::json!(2));
    let worktree_name = second["worktree_name"].as_str().expect("worktree name");
    assert!(worktree_name.starts_with("parallel-"));
}
