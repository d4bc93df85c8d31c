//! Per-request state machine for asynchronous inference workloads.
//!
//! A request moves `Received -> InProgress -> {Completed | Failed}`. Each
//! reached state is persisted as an append-only marker object; a reader
//! resolves the current status as the highest-ranked marker present.
//!
//! The central policy: **infrastructure failures are retryable, failures
//! observed from the user container are terminal.** Store read/write
//! errors propagate to the consumer so the queue redelivers the message;
//! an unreachable, broken, or deterministically failing container gets a
//! durable `Failed` marker and the message is acknowledged, so it is never
//! hammered with retries.
//!
//! Redelivery caveat: if the `Completed` marker write fails after the
//! container call succeeded, redelivery re-runs the whole pipeline,
//! including a second container call with the same payload. This is an
//! accepted at-least-once trade-off; containers with non-idempotent side
//! effects must de-duplicate on the request id header.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use cascade_queue::Delivery;
use cascade_store::{ObjectStore, StoreError};
use cascade_workload::{payload_key, result_key, status_key, storage_prefix};
use cascade_workload::{RequestEvent, Status};
use tracing::{error, info};

use crate::consumer::MessageHandler;
use crate::error::{ForwardError, HandlerError};
use crate::events::EventSink;

/// Header carrying the workload request id to the user container.
pub const REQUEST_ID_HEADER: &str = "X-Cortex-Request-ID";

const DEFAULT_PAYLOAD_CONTENT_TYPE: &str = "application/octet-stream";

/// Static identity of the workload this handler serves.
#[derive(Debug, Clone)]
pub struct HandlerConfig {
    pub cluster_uid: String,
    pub bucket: String,
    pub api_name: String,
    pub target_url: String,
}

/// Message handler for asynchronous inference workloads.
pub struct AsyncWorkloadHandler {
    config: HandlerConfig,
    store: Arc<dyn ObjectStore>,
    http: reqwest::Client,
    event_sink: Arc<dyn EventSink>,
    storage_prefix: String,
}

struct UserPayload {
    body: Bytes,
    content_type: String,
}

impl AsyncWorkloadHandler {
    /// Create a handler. `target_timeout` bounds the HTTP forward and must
    /// be shorter than the queue's visibility timeout (validated by
    /// [`crate::Config`]).
    pub fn new(
        config: HandlerConfig,
        store: Arc<dyn ObjectStore>,
        event_sink: Arc<dyn EventSink>,
        target_timeout: Duration,
    ) -> Self {
        let http = reqwest::Client::builder()
            .timeout(target_timeout)
            .build()
            .expect("Failed to build HTTP client");
        let storage_prefix = storage_prefix(&config.cluster_uid, &config.api_name);

        Self {
            config,
            store,
            http,
            event_sink,
            storage_prefix,
        }
    }

    /// Process one delivery. The message body is the literal request id.
    pub async fn handle_delivery(&self, delivery: &Delivery) -> Result<(), HandlerError> {
        if delivery.body.is_empty() {
            return Err(HandlerError::UnexpectedMessage(
                "got message with empty body".to_string(),
            ));
        }

        self.process(&delivery.body).await
    }

    async fn process(&self, request_id: &str) -> Result<(), HandlerError> {
        info!(request_id, "Processing workload");

        self.mark_status(request_id, Status::InProgress).await?;

        let payload = match self.get_payload(request_id).await {
            Ok(payload) => payload,
            Err(e) => {
                // Best-effort terminal marker; the primary error still
                // propagates for redelivery.
                self.mark_failed_best_effort(request_id, "get payload").await;
                return Err(HandlerError::FetchPayload {
                    request_id: request_id.to_string(),
                    source: e,
                });
            }
        };

        let outcome = self.process_payload(request_id, payload).await;

        // The payload is never needed again once fetched, success or not.
        self.delete_payload(request_id).await;

        outcome
    }

    async fn process_payload(
        &self,
        request_id: &str,
        payload: UserPayload,
    ) -> Result<(), HandlerError> {
        let result = match self.submit_request(request_id, payload).await {
            Ok(result) => result,
            Err(e) => {
                // Terminal application failure: record it durably and
                // acknowledge, unless the marker write itself fails.
                error!(request_id, error = %e, "Failed to submit request to user container");
                return self.mark_status(request_id, Status::Failed).await;
            }
        };

        if let Err(e) = self.upload_result(request_id, &result).await {
            self.mark_failed_best_effort(request_id, "upload result").await;
            return Err(e);
        }

        self.mark_status(request_id, Status::Completed).await?;

        info!(request_id, "Workload processing complete");
        Ok(())
    }

    async fn submit_request(
        &self,
        request_id: &str,
        payload: UserPayload,
    ) -> Result<serde_json::Value, ForwardError> {
        let start = std::time::Instant::now();
        let response = self
            .http
            .post(&self.config.target_url)
            .header(reqwest::header::CONTENT_TYPE, payload.content_type)
            .header(REQUEST_ID_HEADER, request_id)
            .body(payload.body)
            .send()
            .await
            .map_err(ForwardError::NotReachable)?;
        let duration = start.elapsed();

        let status = response.status();
        if status != reqwest::StatusCode::OK {
            return Err(ForwardError::BadStatus(status.as_u16()));
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        if !content_type
            .as_deref()
            .is_some_and(|ct| ct.starts_with("application/json"))
        {
            return Err(ForwardError::NotJsonContentType(content_type));
        }

        let result: serde_json::Value = response
            .json()
            .await
            .map_err(ForwardError::NotJsonDecodable)?;

        self.event_sink.handle_event(RequestEvent {
            status_code: status.as_u16(),
            duration,
        });

        Ok(result)
    }

    async fn mark_status(&self, request_id: &str, status: Status) -> Result<(), HandlerError> {
        let key = status_key(&self.storage_prefix, request_id, status);
        self.store
            .put(&self.config.bucket, &key, Bytes::new(), None)
            .await
            .map_err(|e| HandlerError::MarkStatus {
                request_id: request_id.to_string(),
                status,
                source: e,
            })
    }

    /// Write a `Failed` marker without letting a secondary failure mask
    /// the primary error being propagated.
    async fn mark_failed_best_effort(&self, request_id: &str, stage: &str) {
        if let Err(e) = self.mark_status(request_id, Status::Failed).await {
            error!(
                request_id,
                stage,
                error = %e,
                "Failed to update status after processing failure"
            );
        }
    }

    async fn get_payload(&self, request_id: &str) -> Result<UserPayload, StoreError> {
        let key = payload_key(&self.storage_prefix, request_id);
        let object = self.store.get(&self.config.bucket, &key).await?;
        Ok(UserPayload {
            body: object.body,
            content_type: object
                .content_type
                .unwrap_or_else(|| DEFAULT_PAYLOAD_CONTENT_TYPE.to_string()),
        })
    }

    async fn delete_payload(&self, request_id: &str) {
        let key = payload_key(&self.storage_prefix, request_id);
        if let Err(e) = self.store.delete(&self.config.bucket, &key).await {
            error!(request_id, error = %e, "Failed to delete user payload");
        }
    }

    async fn upload_result(
        &self,
        request_id: &str,
        result: &serde_json::Value,
    ) -> Result<(), HandlerError> {
        let body = serde_json::to_vec(result).map_err(|e| HandlerError::SerializeResult {
            request_id: request_id.to_string(),
            source: e,
        })?;

        let key = result_key(&self.storage_prefix, request_id);
        self.store
            .put(
                &self.config.bucket,
                &key,
                Bytes::from(body),
                Some("application/json"),
            )
            .await
            .map_err(|e| HandlerError::UploadResult {
                request_id: request_id.to_string(),
                source: e,
            })
    }
}

#[async_trait]
impl MessageHandler for AsyncWorkloadHandler {
    async fn handle(&self, delivery: &Delivery) -> anyhow::Result<()> {
        self.handle_delivery(delivery).await.map_err(Into::into)
    }
}
