//! # cascade-workload
//!
//! Core domain types for asynchronous workloads on the Cascade platform.
//!
//! ## Design Principles
//!
//! - Workload status is an ordered tag persisted as append-only marker
//!   objects; readers compute the current status as the highest-ranked
//!   marker present.
//! - Storage keys are derived deterministically from
//!   `(cluster_uid, api_name, request_id)` so any process can recompute
//!   them without a lookup table.
//! - Request events are ephemeral observability records, never persisted.

mod event;
mod keys;
mod status;

pub use event::RequestEvent;
pub use keys::{payload_key, result_key, status_key, storage_prefix};
pub use status::{current_status, Status, StatusParseError};
