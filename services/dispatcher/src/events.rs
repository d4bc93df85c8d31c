//! Request event sinks.
//!
//! The handler emits one [`RequestEvent`] per successfully forwarded
//! request. Emission is fire-and-forget: sinks must not fail the request,
//! so the trait has no error channel. Downstream consumers (metrics,
//! autoscaler) hang off this seam.

use cascade_workload::RequestEvent;
use tracing::info;

/// Receiver of per-request outcome/timing events.
pub trait EventSink: Send + Sync {
    /// Handle one event. Must not block for long and cannot fail.
    fn handle_event(&self, event: RequestEvent);
}

/// Sink that emits events as structured log lines.
#[derive(Debug, Default)]
pub struct LogEventSink;

impl LogEventSink {
    pub fn new() -> Self {
        Self
    }
}

impl EventSink for LogEventSink {
    fn handle_event(&self, event: RequestEvent) {
        info!(
            status_code = event.status_code,
            duration_ms = event.duration.as_millis() as u64,
            "request forwarded"
        );
    }
}
