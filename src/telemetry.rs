//! Telemetry initialization.
//!
//! This system has no distributed-tracing requirement, so the OTLP exporter
//! family the teacher's `telemetry` module carries is dropped. What remains
//! is the piece every component actually depends on: a `tracing` subscriber
//! controlled by `RUST_LOG`/`AGENTDOCK_LOG`, defaulting to `info`.

use tracing_subscriber::EnvFilter;

/// Initialize the global `tracing` subscriber. Idempotent-safe to call once
/// at binary entry; a second call is a programmer error and panics via
/// `tracing_subscriber`'s own guard, matching the teacher's single-init
/// contract.
pub fn init() {
    let filter = EnvFilter::try_from_env("AGENTDOCK_LOG")
        .or_else(|_| EnvFilter::try_from_default_env())
        .unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt().with_env_filter(filter).with_target(false).with_writer(std::io::stderr).init();
}
