//! Session table access.

use rusqlite::{params, Connection, OptionalExtension, Row};

use crate::db::Store;
use crate::error::StoreError;
use crate::models::{ExecutionMode, SandboxStatus, Session};
use crate::time;

fn row_to_session(row: &Row<'_>) -> rusqlite::Result<Session> {
    let created_at: String = row.get("created_at")?;
    let last_heartbeat_at: String = row.get("last_heartbeat_at")?;
    let execution_mode: String = row.get("execution_mode")?;
    let status: Option<String> = row.get("status")?;

    Ok(Session {
        id: row.get("id")?,
        pid: row.get("pid")?,
        repo_path: row.get("repo_path")?,
        worktree_path: row.get("worktree_path")?,
        worktree_name: row.get("worktree_name")?,
        is_main_repo: row.get::<_, i64>("is_main_repo")? != 0,
        created_at: time::from_storage_string(&created_at).unwrap_or_else(|_| time::now()),
        last_heartbeat_at: time::from_storage_string(&last_heartbeat_at).unwrap_or_else(|_| time::now()),
        execution_mode: ExecutionMode::from_db_str(&execution_mode),
        sandbox_id: row.get("sandbox_id")?,
        prompt: row.get("prompt")?,
        status: status.map(|s| SandboxStatus::from_db_str(&s)),
        output_log: row.get("output_log")?,
        budget_limit: row.get("budget_limit")?,
        estimated_cost: row.get("estimated_cost")?,
        actual_cost: row.get("actual_cost")?,
        template_name: row.get("template_name")?,
        git_user: row.get("git_user")?,
        git_email: row.get("git_email")?,
        ssh_key_provided: row.get::<_, i64>("ssh_key_provided")? != 0,
    })
}

const SELECT_COLUMNS: &str = "id, pid, repo_path, worktree_path, worktree_name, is_main_repo, \
     created_at, last_heartbeat_at, execution_mode, sandbox_id, prompt, status, output_log, \
     budget_limit, estimated_cost, actual_cost, template_name, git_user, git_email, ssh_key_provided";

impl Store {
    /// Insert a new session row.
    pub fn insert_session(&self, session: &Session) -> Result<(), StoreError> {
        self.with_txn(|tx| {
            tx.execute(
                "INSERT INTO sessions (id, pid, repo_path, worktree_path, worktree_name, \
                 is_main_repo, created_at, last_heartbeat_at, execution_mode, sandbox_id, \
                 prompt, status, output_log, budget_limit, estimated_cost, actual_cost, \
                 template_name, git_user, git_email, ssh_key_provided) \
                 VALUES (?1,?2,?3,?4,?5,?6,?7,?8,?9,?10,?11,?12,?13,?14,?15,?16,?17,?18,?19,?20)",
                params![
                    session.id,
                    session.pid,
                    session.repo_path,
                    session.worktree_path,
                    session.worktree_name,
                    i64::from(session.is_main_repo),
                    time::to_storage_string(session.created_at),
                    time::to_storage_string(session.last_heartbeat_at),
                    session.execution_mode.as_db_str(),
                    session.sandbox_id,
                    session.prompt,
                    session.status.map(SandboxStatus::as_db_str),
                    session.output_log,
                    session.budget_limit,
                    session.estimated_cost,
                    session.actual_cost,
                    session.template_name,
                    session.git_user,
                    session.git_email,
                    i64::from(session.ssh_key_provided),
                ],
            )?;
            Ok(())
        })
    }

    /// Fetch a session by id.
    pub fn get_session(&self, id: &str) -> Result<Option<Session>, StoreError> {
        self.with_conn(|conn| {
            get_session_by_id(conn, id)
        })
    }

    /// Fetch the session owning `pid`, if any.
    pub fn get_session_by_pid(&self, pid: i64) -> Result<Option<Session>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {SELECT_COLUMNS} FROM sessions WHERE pid = ?1");
            conn.query_row(&sql, params![pid], row_to_session)
                .optional()
                .map_err(StoreError::from)
        })
    }

    /// List all sessions registered against `repo_path`.
    pub fn list_sessions_for_repo(&self, repo_path: &str) -> Result<Vec<Session>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {SELECT_COLUMNS} FROM sessions WHERE repo_path = ?1");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(params![repo_path], row_to_session)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// List every session in the store (used by the stale-session sweep).
    pub fn list_all_sessions(&self) -> Result<Vec<Session>, StoreError> {
        self.with_conn(|conn| {
            let sql = format!("SELECT {SELECT_COLUMNS} FROM sessions");
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt.query_map([], row_to_session)?.collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Update `last_heartbeat_at` for the session owning `pid`. Returns
    /// `false` if no session is found for `pid`.
    pub fn touch_heartbeat(&self, pid: i64) -> Result<bool, StoreError> {
        self.with_txn(|tx| {
            let affected = tx.execute(
                "UPDATE sessions SET last_heartbeat_at = ?1 WHERE pid = ?2",
                params![time::to_storage_string(time::now()), pid],
            )?;
            Ok(affected > 0)
        })
    }

    /// Update sandbox-related fields for an `e2b`-mode session.
    pub fn update_sandbox_state(
        &self,
        session_id: &str,
        status: SandboxStatus,
        output_log: Option<&str>,
        estimated_cost: Option<f64>,
        actual_cost: Option<f64>,
    ) -> Result<(), StoreError> {
        self.with_txn(|tx| {
            tx.execute(
                "UPDATE sessions SET status = ?1, output_log = COALESCE(?2, output_log), \
                 estimated_cost = COALESCE(?3, estimated_cost), actual_cost = COALESCE(?4, actual_cost) \
                 WHERE id = ?5",
                params![status.as_db_str(), output_log, estimated_cost, actual_cost, session_id],
            )?;
            Ok(())
        })
    }

    /// Delete a session row by id.
    pub fn delete_session(&self, id: &str) -> Result<bool, StoreError> {
        self.with_txn(|tx| {
            let affected = tx.execute("DELETE FROM sessions WHERE id = ?1", params![id])?;
            Ok(affected > 0)
        })
    }
}

fn get_session_by_id(conn: &Connection, id: &str) -> Result<Option<Session>, StoreError> {
    let sql = format!("SELECT {SELECT_COLUMNS} FROM sessions WHERE id = ?1");
    conn.query_row(&sql, params![id], row_to_session)
        .optional()
        .map_err(StoreError::from)
}
