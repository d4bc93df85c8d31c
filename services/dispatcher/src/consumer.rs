//! Queue consumer: pulls messages and drives the message handler contract.
//!
//! Outcome translation is the whole job:
//!
//! - handler returns `Ok` => the message is deleted (acknowledged). This
//!   covers true success and terminal application failures the handler has
//!   already recorded durably.
//! - handler returns `Err` => the message is left untouched; the queue's
//!   visibility timeout and receive-count policy govern backoff and
//!   dead-lettering. The consumer never counts retries itself.
//!
//! A handler error never crashes a worker; it is logged and the loop
//! continues with the next message.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cascade_queue::{Delivery, QueueClient};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// Processing contract invoked by the consumer for each delivered message.
///
/// Implemented by [`crate::AsyncWorkloadHandler`] for inference workloads;
/// other message types (batch jobs, ...) implement the same contract.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Process one delivery. `Ok` acknowledges the message, `Err` leaves
    /// it for redelivery.
    async fn handle(&self, delivery: &Delivery) -> anyhow::Result<()>;
}

/// Pool of workers consuming one queue through one handler.
pub struct QueueConsumer {
    queue: Arc<dyn QueueClient>,
    handler: Arc<dyn MessageHandler>,
    workers: usize,
    receive_wait: Duration,
}

impl QueueConsumer {
    /// Create a consumer. Each of the `workers` units processes one
    /// message at a time, end-to-end.
    pub fn new(
        queue: Arc<dyn QueueClient>,
        handler: Arc<dyn MessageHandler>,
        workers: usize,
        receive_wait: Duration,
    ) -> Self {
        Self {
            queue,
            handler,
            workers,
            receive_wait,
        }
    }

    /// Run all workers until shutdown is signalled.
    pub async fn run(self, shutdown: watch::Receiver<bool>) {
        info!(workers = self.workers, "Starting queue consumer");

        let mut handles = Vec::with_capacity(self.workers);
        for worker_id in 0..self.workers {
            let queue = Arc::clone(&self.queue);
            let handler = Arc::clone(&self.handler);
            let shutdown = shutdown.clone();
            let receive_wait = self.receive_wait;
            handles.push(tokio::spawn(async move {
                worker_loop(worker_id, queue, handler, receive_wait, shutdown).await;
            }));
        }

        for handle in handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Consumer worker panicked");
            }
        }

        info!("Queue consumer stopped");
    }
}

async fn worker_loop(
    worker_id: usize,
    queue: Arc<dyn QueueClient>,
    handler: Arc<dyn MessageHandler>,
    receive_wait: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    debug!(worker_id, "Consumer worker started");

    loop {
        tokio::select! {
            received = queue.receive(receive_wait) => {
                match received {
                    Ok(Some(delivery)) => {
                        process_delivery(worker_id, &*queue, &*handler, delivery).await;
                    }
                    Ok(None) => {
                        // Receive wait elapsed with no message.
                    }
                    Err(e) => {
                        error!(worker_id, error = %e, "Failed to receive from queue");
                        tokio::time::sleep(Duration::from_secs(1)).await;
                    }
                }
            }
            _ = shutdown.changed() => {
                if *shutdown.borrow() {
                    debug!(worker_id, "Consumer worker shutting down");
                    break;
                }
            }
        }
    }
}

async fn process_delivery(
    worker_id: usize,
    queue: &dyn QueueClient,
    handler: &dyn MessageHandler,
    delivery: Delivery,
) {
    match handler.handle(&delivery).await {
        Ok(()) => {
            if let Err(e) = queue.delete(&delivery.receipt).await {
                // The message will be redelivered; at-least-once semantics
                // make this safe, if wasteful.
                error!(
                    worker_id,
                    message_id = %delivery.message_id,
                    error = %e,
                    "Failed to acknowledge processed message"
                );
            }
        }
        Err(e) => {
            warn!(
                worker_id,
                message_id = %delivery.message_id,
                receive_count = delivery.receive_count,
                error = format!("{e:#}"),
                "Workload processing failed; leaving message for redelivery"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::atomic::{AtomicUsize, Ordering};

    use cascade_queue::MemoryQueue;

    /// Handler that fails deliveries whose body starts with "bad".
    struct SelectiveHandler {
        handled: AtomicUsize,
    }

    #[async_trait]
    impl MessageHandler for SelectiveHandler {
        async fn handle(&self, delivery: &Delivery) -> anyhow::Result<()> {
            self.handled.fetch_add(1, Ordering::SeqCst);
            if delivery.body.starts_with("bad") {
                anyhow::bail!("handler rejected {}", delivery.body);
            }
            Ok(())
        }
    }

    async fn run_consumer_until<F>(queue: Arc<MemoryQueue>, handler: Arc<SelectiveHandler>, done: F)
    where
        F: Fn(&SelectiveHandler) -> bool,
    {
        let consumer = QueueConsumer::new(
            Arc::clone(&queue) as Arc<dyn QueueClient>,
            Arc::clone(&handler) as Arc<dyn MessageHandler>,
            2,
            Duration::from_millis(50),
        );
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let run = tokio::spawn(consumer.run(shutdown_rx));

        while !done(handler.as_ref()) {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        shutdown_tx.send(true).unwrap();
        run.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_successful_messages_are_acknowledged() {
        let queue = Arc::new(MemoryQueue::new(Duration::from_secs(30)));
        queue.send("req-1");
        queue.send("req-2");

        let handler = Arc::new(SelectiveHandler {
            handled: AtomicUsize::new(0),
        });

        run_consumer_until(Arc::clone(&queue), Arc::clone(&handler), |h| {
            h.handled.load(Ordering::SeqCst) >= 2
        })
        .await;

        assert!(queue.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_message_left_for_redelivery() {
        let queue = Arc::new(MemoryQueue::new(Duration::from_secs(2)));
        queue.send("bad-req");

        let handler = Arc::new(SelectiveHandler {
            handled: AtomicUsize::new(0),
        });

        // The message is redelivered after the visibility timeout and
        // handled again; the worker survives the handler error.
        run_consumer_until(Arc::clone(&queue), Arc::clone(&handler), |h| {
            h.handled.load(Ordering::SeqCst) >= 2
        })
        .await;

        assert_eq!(queue.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_handler_error_does_not_stall_other_messages() {
        let queue = Arc::new(MemoryQueue::new(Duration::from_secs(60)));
        queue.send("bad-req");
        queue.send("req-ok");

        let handler = Arc::new(SelectiveHandler {
            handled: AtomicUsize::new(0),
        });

        run_consumer_until(Arc::clone(&queue), Arc::clone(&handler), |h| {
            h.handled.load(Ordering::SeqCst) >= 2
        })
        .await;

        // The good message was acknowledged; the bad one is still queued.
        assert_eq!(queue.len(), 1);
    }
}
