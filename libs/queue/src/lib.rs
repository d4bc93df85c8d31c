//! # cascade-queue
//!
//! At-least-once delivery queue interface for workload dispatch.
//!
//! The queue is an external durable service; this crate defines the seam
//! the dispatcher consumes through plus an in-memory implementation used
//! for development and tests.
//!
//! ## Delivery contract
//!
//! - A received message becomes invisible to other consumers for the
//!   queue's visibility timeout.
//! - Deleting the message within that window acknowledges it permanently.
//! - A message that is not deleted becomes visible again and is redelivered
//!   with an incremented receive count; dead-letter policies key off that
//!   count.
//! - All retry/backoff policy lives in the queue. Consumers never count
//!   retries themselves.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;
use tokio::time::Instant;

/// Queue errors.
#[derive(Debug, Error)]
pub enum QueueError {
    /// The backing service failed the operation.
    #[error("queue backend error: {0}")]
    Backend(String),

    /// The receipt no longer identifies an in-flight message; its
    /// visibility lease expired and the message may already have been
    /// redelivered to another consumer.
    #[error("receipt expired or unknown: {0}")]
    ReceiptExpired(String),
}

/// One delivery of a queue message.
///
/// The body of a workload message is the literal request id; there is no
/// structured envelope.
#[derive(Debug, Clone)]
pub struct Delivery {
    /// Stable id of the underlying message, identical across redeliveries.
    pub message_id: String,

    /// Receipt for this delivery; required to acknowledge or extend the
    /// visibility lease, and invalidated once the lease expires.
    pub receipt: String,

    /// Raw message body.
    pub body: String,

    /// How many times the message has been delivered, this one included.
    pub receive_count: u32,
}

/// At-least-once delivery queue.
#[async_trait]
pub trait QueueClient: Send + Sync {
    /// Receive one message, waiting up to `wait` for one to arrive.
    /// Returns `None` on timeout. The received message is hidden from
    /// other consumers for the queue's visibility timeout.
    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>, QueueError>;

    /// Acknowledge a delivery, permanently removing the message.
    async fn delete(&self, receipt: &str) -> Result<(), QueueError>;

    /// Extend the visibility lease of an in-flight delivery by `extra`.
    /// Long-running handlers heartbeat through this to keep a slow request
    /// from being redelivered mid-flight.
    async fn extend_visibility(&self, receipt: &str, extra: Duration) -> Result<(), QueueError>;
}

struct QueuedMessage {
    message_id: String,
    body: String,
    receive_count: u32,
    // Lease state for the current delivery, if any.
    receipt: Option<String>,
    invisible_until: Option<Instant>,
}

impl QueuedMessage {
    fn is_visible(&self, now: Instant) -> bool {
        match self.invisible_until {
            Some(deadline) => deadline <= now,
            None => true,
        }
    }

    fn lease_held(&self, receipt: &str, now: Instant) -> bool {
        self.receipt.as_deref() == Some(receipt)
            && self.invisible_until.is_some_and(|deadline| deadline > now)
    }
}

#[derive(Default)]
struct MemoryQueueInner {
    messages: VecDeque<QueuedMessage>,
    next_id: u64,
    next_receipt: u64,
}

/// In-memory queue for development and tests.
pub struct MemoryQueue {
    inner: Mutex<MemoryQueueInner>,
    visibility_timeout: Duration,
}

impl MemoryQueue {
    /// Create a queue with the given visibility timeout.
    pub fn new(visibility_timeout: Duration) -> Self {
        Self {
            inner: Mutex::new(MemoryQueueInner::default()),
            visibility_timeout,
        }
    }

    /// Enqueue a message, returning its message id.
    pub fn send(&self, body: impl Into<String>) -> String {
        let mut inner = self.inner.lock().unwrap();
        inner.next_id += 1;
        let message_id = format!("msg-{}", inner.next_id);
        inner.messages.push_back(QueuedMessage {
            message_id: message_id.clone(),
            body: body.into(),
            receive_count: 0,
            receipt: None,
            invisible_until: None,
        });
        message_id
    }

    /// Number of messages not yet acknowledged (visible or in flight).
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().messages.len()
    }

    /// Returns true when every message has been acknowledged.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn try_receive(&self) -> Option<Delivery> {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        inner.next_receipt += 1;
        let receipt = format!("rcpt-{}", inner.next_receipt);
        let visibility = self.visibility_timeout;

        let message = inner.messages.iter_mut().find(|m| m.is_visible(now))?;
        message.receive_count += 1;
        message.receipt = Some(receipt.clone());
        message.invisible_until = Some(now + visibility);

        Some(Delivery {
            message_id: message.message_id.clone(),
            receipt,
            body: message.body.clone(),
            receive_count: message.receive_count,
        })
    }
}

#[async_trait]
impl QueueClient for MemoryQueue {
    async fn receive(&self, wait: Duration) -> Result<Option<Delivery>, QueueError> {
        let deadline = Instant::now() + wait;
        loop {
            if let Some(delivery) = self.try_receive() {
                return Ok(Some(delivery));
            }
            if Instant::now() >= deadline {
                return Ok(None);
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    async fn delete(&self, receipt: &str) -> Result<(), QueueError> {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        let index = inner
            .messages
            .iter()
            .position(|m| m.lease_held(receipt, now))
            .ok_or_else(|| QueueError::ReceiptExpired(receipt.to_string()))?;
        inner.messages.remove(index);
        Ok(())
    }

    async fn extend_visibility(&self, receipt: &str, extra: Duration) -> Result<(), QueueError> {
        let now = Instant::now();
        let mut inner = self.inner.lock().unwrap();
        let message = inner
            .messages
            .iter_mut()
            .find(|m| m.lease_held(receipt, now))
            .ok_or_else(|| QueueError::ReceiptExpired(receipt.to_string()))?;
        // Lease extension is relative to the current deadline, as with SQS
        // ChangeMessageVisibility semantics approximated from "now".
        message.invisible_until = Some(now + extra);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn test_receive_hides_message_until_visibility_expires() {
        let queue = MemoryQueue::new(Duration::from_secs(30));
        queue.send("req-1");

        let first = queue.receive(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(first.body, "req-1");
        assert_eq!(first.receive_count, 1);

        // In flight: nothing to receive.
        assert!(queue.receive(Duration::from_secs(1)).await.unwrap().is_none());

        // Past the visibility timeout the message is redelivered.
        tokio::time::sleep(Duration::from_secs(31)).await;
        let second = queue.receive(Duration::from_secs(1)).await.unwrap().unwrap();
        assert_eq!(second.message_id, first.message_id);
        assert_eq!(second.receive_count, 2);
        assert_ne!(second.receipt, first.receipt);
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_acknowledges_permanently() {
        let queue = MemoryQueue::new(Duration::from_secs(30));
        queue.send("req-1");

        let delivery = queue.receive(Duration::from_secs(1)).await.unwrap().unwrap();
        queue.delete(&delivery.receipt).await.unwrap();
        assert!(queue.is_empty());

        tokio::time::sleep(Duration::from_secs(60)).await;
        assert!(queue.receive(Duration::from_secs(1)).await.unwrap().is_none());
    }

    #[tokio::test(start_paused = true)]
    async fn test_delete_with_expired_receipt_fails() {
        let queue = MemoryQueue::new(Duration::from_secs(5));
        queue.send("req-1");

        let delivery = queue.receive(Duration::from_secs(1)).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_secs(6)).await;

        let err = queue.delete(&delivery.receipt).await.unwrap_err();
        assert!(matches!(err, QueueError::ReceiptExpired(_)));
        // Message is still there for redelivery.
        assert_eq!(queue.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_extend_visibility_keeps_message_in_flight() {
        let queue = MemoryQueue::new(Duration::from_secs(5));
        queue.send("req-1");

        let delivery = queue.receive(Duration::from_secs(1)).await.unwrap().unwrap();
        tokio::time::sleep(Duration::from_secs(3)).await;
        queue
            .extend_visibility(&delivery.receipt, Duration::from_secs(10))
            .await
            .unwrap();

        // Original deadline has passed, but the lease was extended.
        tokio::time::sleep(Duration::from_secs(4)).await;
        assert!(queue.receive(Duration::from_millis(100)).await.unwrap().is_none());

        // Delete still works under the extended lease.
        queue.delete(&delivery.receipt).await.unwrap();
        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_receive_returns_none_on_empty_queue() {
        let queue = MemoryQueue::new(Duration::from_secs(5));
        assert!(queue.receive(Duration::from_millis(50)).await.unwrap().is_none());
    }
}
