//! Error types for the dispatch engine.
//!
//! The split matters for queue semantics: a [`HandlerError`] returned to
//! the consumer leaves the message for redelivery, while a
//! [`ForwardError`] is terminal for the request - it is resolved into a
//! durable `Failed` marker and the message is acknowledged, so a broken or
//! unreachable user container is never hammered with retries.

use cascade_store::StoreError;
use cascade_workload::Status;
use thiserror::Error;

/// Retryable processing errors, propagated to the consumer so the queue
/// redelivers the message.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The queue message had no usable body; no request id can be derived
    /// and no status is recorded.
    #[error("unexpected message: {0}")]
    UnexpectedMessage(String),

    /// Writing a status marker failed.
    #[error("failed to mark request {request_id} as {status}")]
    MarkStatus {
        request_id: String,
        status: Status,
        #[source]
        source: StoreError,
    },

    /// Reading the request payload failed.
    #[error("failed to get payload for request {request_id}")]
    FetchPayload {
        request_id: String,
        #[source]
        source: StoreError,
    },

    /// Serializing the user container's result failed.
    #[error("failed to serialize result for request {request_id}")]
    SerializeResult {
        request_id: String,
        #[source]
        source: serde_json::Error,
    },

    /// Uploading the result object failed.
    #[error("failed to upload result for request {request_id}")]
    UploadResult {
        request_id: String,
        #[source]
        source: StoreError,
    },
}

/// Terminal application failures observed while forwarding a request to
/// the user container. These never cause redelivery.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// The container could not be reached (connection refused, DNS
    /// failure, or the bounded request timeout elapsed).
    #[error("user container not reachable")]
    NotReachable(#[source] reqwest::Error),

    /// The container responded with a non-200 status.
    #[error("user container responded with status {0}")]
    BadStatus(u16),

    /// The response `Content-Type` is not `application/json`.
    #[error("user container response Content-Type is not application/json (got {0:?})")]
    NotJsonContentType(Option<String>),

    /// The response body could not be decoded as JSON.
    #[error("user container response body is not JSON decodable")]
    NotJsonDecodable(#[source] reqwest::Error),
}
