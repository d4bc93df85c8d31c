//! Per-request observability events.

use std::time::Duration;

/// Outcome of one forwarded request to the user container.
///
/// Events are ephemeral: they feed latency/throughput observability and
/// autoscaling downstream, and are never persisted, retried, or replayed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestEvent {
    /// HTTP status code returned by the user container.
    pub status_code: u16,

    /// Wall-clock time spent on the forward, including response read.
    pub duration: Duration,
}
