//! # cascade-dispatcher
//!
//! Queue-driven dispatch engine for asynchronous inference workloads.
//!
//! ## Architecture
//!
//! - **Queue Consumer**: pool of workers pulling messages from the queue
//!   and driving the [`MessageHandler`] contract; handler outcomes decide
//!   whether a message is acknowledged or left for redelivery.
//! - **Async Workload Handler**: the per-request state machine - fetch the
//!   payload, forward it to the user container over HTTP, persist the
//!   result, record status transitions as append-only markers, clean up.
//! - **Event Sink**: fire-and-forget per-request outcome/timing events for
//!   downstream observability and autoscaling.
//!
//! The object store and queue are external durable services reached
//! through the `cascade-store` and `cascade-queue` seams; everything is
//! constructor-injected so tests substitute fakes.

pub mod config;
pub mod consumer;
pub mod error;
pub mod events;
pub mod handler;

pub use config::Config;
pub use consumer::{MessageHandler, QueueConsumer};
pub use error::{ForwardError, HandlerError};
pub use events::{EventSink, LogEventSink};
pub use handler::{AsyncWorkloadHandler, HandlerConfig};
