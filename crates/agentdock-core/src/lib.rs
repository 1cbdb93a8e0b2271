//! Session Coordinator (C3) and File Claim Manager (C4) business logic.
//!
//! This crate sits between the persistent [`agentdock_store`] layer and
//! the worktree adapter in [`agentdock_git`], implementing the decisions
//! the store doesn't know how to make: which claims conflict, which
//! sessions are stale, whether an escalation is legal.

pub mod claims;
pub mod coordinator;
pub mod error;
pub mod validate;

pub use claims::{CheckResult, ClaimManager};
pub use coordinator::{is_pid_alive, CleanupReport, Coordinator, Registration};
pub use error::{ClaimConflictEntry, CoreError};
