//! Changeset lifecycle events and sinks.
//!
//! The executor reports what it did to each changeset so that callers can
//! feed webhooks, audit logs, or local debugging output without the executor
//! knowing about any of them.

use std::io;

use serde::{Deserialize, Serialize};

/// A structured event emitted after a changeset operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TelemetryEvent {
    /// The changeset was created on the code host.
    ChangesetPublished {
        /// Local changeset id.
        changeset_id: i64,
    },
    /// The changeset's commit, metadata, or draft state changed.
    ChangesetUpdated {
        /// Local changeset id.
        changeset_id: i64,
    },
    /// The changeset was closed on the code host.
    ChangesetClosed {
        /// Local changeset id.
        changeset_id: i64,
    },
    /// The changeset was merged on the code host.
    ChangesetMerged {
        /// Local changeset id.
        changeset_id: i64,
    },
    /// An operation on the changeset failed.
    ChangesetUpdateFailed {
        /// Local changeset id.
        changeset_id: i64,
        /// Error text of the failed operation.
        message: String,
    },
}

/// A sink that can record telemetry events.
pub trait TelemetrySink: Send + Sync {
    /// Records a telemetry event.
    fn record(&self, event: TelemetryEvent);
}

/// Telemetry sink that drops all events.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopTelemetrySink;

impl TelemetrySink for NoopTelemetrySink {
    fn record(&self, _event: TelemetryEvent) {}
}

/// Records telemetry events to stderr as JSON lines (JSONL).
#[derive(Debug, Default)]
pub struct StderrJsonlTelemetrySink;

impl TelemetrySink for StderrJsonlTelemetrySink {
    fn record(&self, event: TelemetryEvent) {
        let Ok(serialised) = serde_json::to_string(&event) else {
            return;
        };

        let _ignored = writeln_stderr(&serialised);
    }
}

fn writeln_stderr(message: &str) -> io::Result<()> {
    use io::Write;

    let mut stderr = io::stderr().lock();
    writeln!(stderr, "{message}")
}

/// Sink that keeps events in memory for assertions.
#[cfg(any(test, feature = "test-support"))]
#[derive(Debug, Default)]
pub struct RecordingTelemetrySink {
    events: std::sync::Mutex<Vec<TelemetryEvent>>,
}

#[cfg(any(test, feature = "test-support"))]
impl RecordingTelemetrySink {
    /// Removes and returns every recorded event, oldest first.
    #[must_use]
    pub fn take(&self) -> Vec<TelemetryEvent> {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .drain(..)
            .collect()
    }
}

#[cfg(any(test, feature = "test-support"))]
impl TelemetrySink for RecordingTelemetrySink {
    fn record(&self, event: TelemetryEvent) {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .push(event);
    }
}
