//! Deterministic storage-key derivation for workload artifacts.
//!
//! Every artifact of a request lives under a shared prefix derived from
//! `(cluster_uid, api_name, request_id)`:
//!
//! ```text
//! {cluster_uid}/{api_name}/{request_id}/status/{state_name}
//! {cluster_uid}/{api_name}/{request_id}/payload
//! {cluster_uid}/{api_name}/{request_id}/result
//! ```
//!
//! Determinism lets the dispatcher and any external status-polling process
//! compute the same keys without coordination.

use crate::status::Status;

/// Shared key prefix for all requests of one API on one cluster.
pub fn storage_prefix(cluster_uid: &str, api_name: &str) -> String {
    format!("{cluster_uid}/{api_name}")
}

/// Key of the zero-content marker object for a reached status.
pub fn status_key(prefix: &str, request_id: &str, status: Status) -> String {
    format!("{prefix}/{request_id}/status/{status}")
}

/// Key of the request's input payload object.
pub fn payload_key(prefix: &str, request_id: &str) -> String {
    format!("{prefix}/{request_id}/payload")
}

/// Key of the request's result object (present only once completed).
pub fn result_key(prefix: &str, request_id: &str) -> String {
    format!("{prefix}/{request_id}/result")
}
