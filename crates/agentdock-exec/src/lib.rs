//! Batch fan-out over parallel agent sandboxes, and merge-event watching.

pub mod error;
pub mod merge_watch;
pub mod parallel;

pub use error::ExecError;
pub use merge_watch::{run_once as run_merge_watch_once, watch_forever, MergeHistory, OnceReport};
pub use parallel::{
    run_batch, BatchConfig, BatchReport, ProgressUpdate, TaskResult, TaskSpec, TaskStatus, DEFAULT_MAX_CONCURRENT,
};
