//! End-to-end CLI test: acquiring a conflicting claim surfaces the
//! conflicting session in the JSON error output (spec.md §8 scenario 3).

mod common;

use common::{agentdock_err, agentdock_ok, db_path, setup_test_repo};

#[test]
fn conflicting_exclusive_claims_report_the_holder() {
    let repo = setup_test_repo();
    let db = db_path(repo.path());
    let repo_path = repo.path().to_string_lossy().into_owned();

    let session_a = agentdock_ok(&db, repo.path(), &["register", "--repo-path", &repo_path]);
    let session_a_id = session_a["id"].as_str().unwrap().to_owned();

    let claim = agentdock_ok(
        &db,
        repo.path(),
        &[
            "claim",
            "acquire",
            "--session-id",
            &session_a_id,
            "--repo-path",
            &repo_path,
            "--file-path",
            "src/main.rs",
            "--mode",
            "EXCLUSIVE",
        ],
    );
    assert_eq!(claim["mode"], serde_json::json!("EXCLUSIVE"));

    // A fresh worktree session needs its own registration to get a session id.
    let session_b = agentdock_ok(&db, repo.path(), &["register", "--repo-path", &repo_path]);
    let session_b_id = session_b["id"].as_str().unwrap().to_owned();

    let error = agentdock_err(
        &db,
        repo.path(),
        &[
            "claim",
            "acquire",
            "--session-id",
            &session_b_id,
            "--repo-path",
            &repo_path,
            "--file-path",
            "src/main.rs",
            "--mode",
            "EXCLUSIVE",
        ],
    );
    assert!(error.contains("conflict"), "error should mention a conflict: {error}");
    assert!(error.contains("src/main.rs"), "error should name the contested file: {error}");
}

#[test]
fn check_reports_availability_excluding_the_callers_own_session() {
    let repo = setup_test_repo();
    let db = db_path(repo.path());
    let repo_path = repo.path().to_string_lossy().into_owned();

    let session = agentdock_ok(&db, repo.path(), &["register", "--repo-path", &repo_path]);
    let session_id = session["id"].as_str().unwrap().to_owned();

    agentdock_ok(
        &db,
        repo.path(),
        &[
            "claim",
            "acquire",
            "--session-id",
            &session_id,
            "--repo-path",
            &repo_path,
            "--file-path",
            "src/lib.rs",
            "--mode",
            "SHARED",
        ],
    );

    let check = agentdock_ok(
        &db,
        repo.path(),
        &[
            "claim",
            "check",
            "--repo-path",
            &repo_path,
            "--file-paths",
            "src/lib.rs",
            "--mode",
            "SHARED",
            "--excluded-session-id",
            &session_id,
        ],
    );
    assert_eq!(check["available"], serde_json::json!(true));
    assert_eq!(check["conflicts"].as_array().unwrap().len(), 0);
}
