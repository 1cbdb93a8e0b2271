//! `agentdock`: coordinates multiple concurrent autonomous coding agent
//! sessions sharing one repository — worktree isolation, file claims,
//! sandboxed execution, and merge-event watching.
//!
//! This crate is a thin wiring layer over the workspace's sub-crates; see
//! `agentdock-store`, `agentdock-git`, `agentdock-core`, `agentdock-sandbox`,
//! and `agentdock-exec` for the actual component implementations.

pub mod config;
pub mod error;
pub mod telemetry;

pub use config::AgentdockConfig;
pub use error::CoordinatorError;
