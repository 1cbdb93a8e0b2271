//! [`WorktreeAdapter`] implementation that shells out to `gtr` when present,
//! falling back to `git worktree` directly.
//!
//! gix (and libgit2) have no high-level worktree *lifecycle* API — creating
//! or removing a linked worktree means writing/removing the
//! `.git/worktrees/<name>` administrative directory by hand, which the
//! porcelain `git worktree` command already does correctly. Shelling out is
//! the documented fallback spec.md §6 requires, not a shortcut.

use std::path::{Path, PathBuf};
use std::process::Command;

use crate::adapter::WorktreeAdapter;
use crate::error::GitError;
use crate::types::{WorktreeInfo, WorktreeOutcome};

/// Worktree container directory created under the repo root for generated
/// worktrees (`.worktrees/<name>`), mirroring `spec.md`'s generated-name
/// worktrees without colliding with the repo's own tracked files.
pub const WORKTREE_CONTAINER: &str = ".worktrees";

/// Shells out to `gtr` if it is on `PATH`, otherwise to `git worktree`.
pub struct GitCliAdapter {
    repo_root: PathBuf,
}

impl GitCliAdapter {
    /// Build an adapter rooted at `repo_root`. Does not validate that
    /// `repo_root` is actually a git repository; call
    /// [`GitCliAdapter::discover`] for that.
    #[must_use]
    pub fn new(repo_root: PathBuf) -> Self {
        Self { repo_root }
    }

    /// Discover the repository root starting from `start` by running
    /// `git rev-parse --show-toplevel`.
    pub fn discover(start: &Path) -> Result<Self, GitError> {
        let output = Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .current_dir(start)
            .output()
            .map_err(|source| GitError::SpawnFailed {
                binary: "git".to_owned(),
                source,
            })?;
        if !output.status.success() {
            return Err(GitError::NotARepo {
                path: start.to_path_buf(),
            });
        }
        let root = String::from_utf8_lossy(&output.stdout).trim().to_owned();
        Ok(Self::new(PathBuf::from(root)))
    }

    fn gtr_available(&self) -> bool {
        which("gtr").is_some()
    }

    fn run(&self, binary: &str, args: &[&str]) -> Result<WorktreeOutcome, GitError> {
        let output = Command::new(binary)
            .args(args)
            .current_dir(&self.repo_root)
            .output()
            .map_err(|source| GitError::SpawnFailed {
                binary: binary.to_owned(),
                source,
            })?;
        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();
        if output.status.success() {
            Ok(WorktreeOutcome {
                success: true,
                output: stdout,
                error: None,
            })
        } else {
            Ok(WorktreeOutcome {
                success: false,
                output: stdout,
                error: Some(stderr),
            })
        }
    }

    fn worktree_path(&self, name: &str) -> PathBuf {
        crate::adapter::worktree_container_path(&self.repo_root, WORKTREE_CONTAINER, name)
    }
}

impl WorktreeAdapter for GitCliAdapter {
    fn create_worktree(&self, name: &str, from_ref: &str) -> Result<WorktreeOutcome, GitError> {
        let path = self.worktree_path(name);
        if path.exists() {
            return Err(GitError::WorktreeExists {
                name: name.to_owned(),
                path,
            });
        }
        let path_str = path.to_string_lossy().into_owned();

        if self.gtr_available() {
            let outcome = self.run("gtr", &["create", name, "--from", from_ref])?;
            if outcome.success {
                return Ok(outcome);
            }
            tracing::warn!(worktree = name, error = ?outcome.error, "gtr create failed, falling back to git worktree");
        }

        self.run(
            "git",
            &["worktree", "add", "-b", name, path_str.as_str(), from_ref],
        )
    }

    fn remove_worktree(&self, name: &str, delete_branch: bool) -> Result<WorktreeOutcome, GitError> {
        let path = self.worktree_path(name);
        if !path.exists() {
            return Err(GitError::WorktreeNotFound {
                name: name.to_owned(),
            });
        }
        let path_str = path.to_string_lossy().into_owned();

        if self.gtr_available() {
            let mut args = vec!["remove", name];
            if delete_branch {
                args.push("--delete-branch");
            }
            let outcome = self.run("gtr", &args)?;
            if outcome.success {
                return Ok(outcome);
            }
            tracing::warn!(worktree = name, error = ?outcome.error, "gtr remove failed, falling back to git worktree");
        }

        let outcome = self.run("git", &["worktree", "remove", "--force", path_str.as_str()])?;
        if outcome.success && delete_branch {
            return self.run("git", &["branch", "-D", name]);
        }
        Ok(outcome)
    }

    fn list_worktrees(&self) -> Result<Vec<WorktreeInfo>, GitError> {
        let output = Command::new("git")
            .args(["worktree", "list", "--porcelain"])
            .current_dir(&self.repo_root)
            .output()
            .map_err(|source| GitError::SpawnFailed {
                binary: "git".to_owned(),
                source,
            })?;
        if !output.status.success() {
            return Err(GitError::CommandFailed {
                command: "git worktree list --porcelain".to_owned(),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }
        Ok(parse_porcelain_worktree_list(&String::from_utf8_lossy(
            &output.stdout,
        )))
    }

    fn get_main_repo_path(&self) -> Option<PathBuf> {
        self.list_worktrees()
            .ok()?
            .into_iter()
            .find(|w| w.is_main)
            .map(|w| w.path)
    }
}

/// Parse `git worktree list --porcelain` output into [`WorktreeInfo`] entries.
///
/// Entries are separated by blank lines; the first entry is always the main
/// worktree.
fn parse_porcelain_worktree_list(raw: &str) -> Vec<WorktreeInfo> {
    let mut result = Vec::new();
    let mut path: Option<PathBuf> = None;
    let mut branch: Option<String> = None;
    let mut first = true;

    let flush = |result: &mut Vec<WorktreeInfo>,
                 path: &mut Option<PathBuf>,
                 branch: &mut Option<String>,
                 first: &mut bool| {
        if let Some(p) = path.take() {
            result.push(WorktreeInfo {
                path: p,
                branch: branch.take(),
                is_main: *first,
            });
            *first = false;
        }
    };

    for line in raw.lines() {
        if line.is_empty() {
            flush(&mut result, &mut path, &mut branch, &mut first);
            continue;
        }
        if let Some(rest) = line.strip_prefix("worktree ") {
            flush(&mut result, &mut path, &mut branch, &mut first);
            path = Some(PathBuf::from(rest));
        } else if let Some(rest) = line.strip_prefix("branch ") {
            branch = Some(rest.trim_start_matches("refs/heads/").to_owned());
        }
    }
    flush(&mut result, &mut path, &mut branch, &mut first);
    result
}

fn which(binary: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    std::env::split_paths(&path_var).find_map(|dir| {
        let candidate = dir.join(binary);
        candidate.is_file().then_some(candidate)
    })
}
