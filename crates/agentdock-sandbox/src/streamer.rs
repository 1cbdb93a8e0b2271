//! Output Streamer (C8): polls a remote log file and republishes new bytes
//! as bounded, ordered chunks (spec.md §4.7, §9's event-emitter note).

use std::io::Write;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::provider::Sandbox;

/// Default poll interval.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(500);
/// In-memory ring ceiling.
pub const RING_CEILING_BYTES: usize = 50 * 1024;
/// Remote file size above which the remote file is truncated to its tail.
pub const REMOTE_SIZE_CEILING_BYTES: u64 = 100 * 1024 * 1024;

#[derive(Clone, Debug)]
pub enum StreamEvent {
    Chunk(String),
    Error(String),
    Complete,
}

/// Polls a single remote log file. One producer (the poll loop), any number
/// of consumers drained via [`OutputStreamer::drain_events`] — a channel of
/// chunk messages with a sentinel close, per the design notes' re-architecture
/// of the event-emitter pattern.
pub struct OutputStreamer {
    last_offset: u64,
    ring: String,
    local_mirror_path: Option<String>,
    events: Vec<StreamEvent>,
    stopped: AtomicBool,
}

impl OutputStreamer {
    #[must_use]
    pub fn new(local_mirror_path: Option<String>) -> Self {
        Self {
            last_offset: 0,
            ring: String::new(),
            local_mirror_path,
            events: Vec::new(),
            stopped: AtomicBool::new(false),
        }
    }

    /// Run one poll tick against `remote_log_path` in `sandbox`.
    pub async fn poll_once(&mut self, sandbox: &dyn Sandbox, remote_log_path: &str) {
        if self.stopped.load(Ordering::SeqCst) {
            return;
        }

        let size_output = sandbox
            .run(&format!("stat -c %s {remote_log_path} 2>/dev/null || echo 0"), 5_000)
            .await;
        let Ok(size_output) = size_output else {
            self.events.push(StreamEvent::Error("failed to stat remote log".to_owned()));
            return;
        };
        let Ok(size) = size_output.stdout.trim().parse::<u64>() else {
            return;
        };
        if size == 0 {
            return;
        }

        if size > REMOTE_SIZE_CEILING_BYTES {
            let _ = sandbox
                .run(
                    &format!("tail -c {REMOTE_SIZE_CEILING_BYTES} {remote_log_path} > {remote_log_path}.tmp && mv {remote_log_path}.tmp {remote_log_path}"),
                    10_000,
                )
                .await;
            self.last_offset = 0;
        }

        if size <= self.last_offset {
            return;
        }

        let read_result = sandbox
            .run(&format!("tail -c +{} {remote_log_path}", self.last_offset + 1), 10_000)
            .await;
        let Ok(chunk_output) = read_result else {
            self.events.push(StreamEvent::Error("failed to read remote log".to_owned()));
            return;
        };

        self.last_offset = size;
        let chunk = chunk_output.stdout;
        if chunk.is_empty() {
            return;
        }

        self.ring.push_str(&chunk);
        if self.ring.len() > RING_CEILING_BYTES {
            let excess = self.ring.len() - RING_CEILING_BYTES;
            self.ring.drain(..excess);
        }

        if let Some(path) = &self.local_mirror_path {
            if let Ok(mut file) = std::fs::OpenOptions::new().create(true).append(true).open(path) {
                let _ = file.write_all(chunk.as_bytes());
            }
        }

        self.events.push(StreamEvent::Chunk(chunk));
    }

    /// Stop the stream: clear any pending timer state and emit `complete`.
    pub fn stop(&mut self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.events.push(StreamEvent::Complete);
    }

    /// Drain and return events emitted since the last drain.
    pub fn drain_events(&mut self) -> Vec<StreamEvent> {
        std::mem::take(&mut self.events)
    }

    /// The in-memory tail, bounded to [`RING_CEILING_BYTES`].
    #[must_use]
    pub fn buffered_output(&self) -> &str {
        &self.ring
    }

    /// The full output, read from the local mirror file if one was
    /// configured, else `None`.
    #[must_use]
    pub fn full_output(&self) -> Option<String> {
        self.local_mirror_path.as_ref().and_then(|p| std::fs::read_to_string(p).ok())
    }
}
