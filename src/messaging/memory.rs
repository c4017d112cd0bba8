//! # In-Memory Queue Gateway
//!
//! Broker double for tests and local development. Published payloads are
//! recorded per queue; deliveries are driven explicitly by the caller so
//! tests control interleaving. The acknowledgement policy mirrors the
//! pgmq gateway: malformed results are dropped, transient processing
//! failures are retried up to the delivery budget and then dead-lettered.

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use tracing::warn;

use super::errors::{MessagingError, MessagingResult};
use super::gateway::{DeliveryHandler, QueueGateway};
use crate::constants::queues::dead_letter_queue;
use crate::error::PipelineError;

#[derive(Default)]
struct QueueState {
    published: HashMap<String, Vec<Value>>,
    handlers: HashMap<String, Arc<dyn DeliveryHandler>>,
}

/// In-memory [`QueueGateway`] with failure injection.
pub struct InMemoryGateway {
    state: Mutex<QueueState>,
    next_msg_id: AtomicI64,
    fail_publish: AtomicBool,
    max_delivery_attempts: i32,
}

impl Default for InMemoryGateway {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryGateway {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(QueueState::default()),
            next_msg_id: AtomicI64::new(0),
            fail_publish: AtomicBool::new(false),
            max_delivery_attempts: 3,
        }
    }

    /// Make every subsequent publish fail with a queue-operation error.
    pub fn fail_publishes(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// Payloads published to `queue`, oldest first.
    pub fn published(&self, queue: &str) -> Vec<Value> {
        self.state
            .lock()
            .published
            .get(queue)
            .cloned()
            .unwrap_or_default()
    }

    /// Total number of published messages across all queues.
    pub fn published_count(&self) -> usize {
        self.state.lock().published.values().map(Vec::len).sum()
    }

    /// Deliver a payload to the handler bound to `queue` once, applying
    /// the same acknowledgement policy as the broker-backed gateway.
    /// Returns the handler outcome for assertions.
    pub async fn deliver(&self, queue: &str, payload: Value) -> crate::error::Result<()> {
        let handler = self.state.lock().handlers.get(queue).cloned();
        match handler {
            Some(handler) => handler.handle(payload).await,
            None => Err(PipelineError::configuration(format!(
                "no consumer bound for queue {queue}"
            ))),
        }
    }

    /// Deliver with redelivery semantics: a transiently failing handler is
    /// retried up to the delivery budget, then the payload lands on the
    /// dead-letter queue.
    pub async fn deliver_with_redelivery(&self, queue: &str, payload: Value) {
        for attempt in 1..=self.max_delivery_attempts {
            match self.deliver(queue, payload.clone()).await {
                Ok(()) => return,
                Err(err) if err.is_retryable_delivery() => {
                    if attempt == self.max_delivery_attempts {
                        self.state
                            .lock()
                            .published
                            .entry(dead_letter_queue(queue))
                            .or_default()
                            .push(payload.clone());
                    }
                }
                Err(err @ PipelineError::MalformedResult { .. }) => {
                    warn!(queue = queue, error = %err, "dropping malformed result");
                    return;
                }
                Err(_) => return,
            }
        }
    }
}

#[async_trait]
impl QueueGateway for InMemoryGateway {
    async fn publish(&self, queue: &str, payload: &Value) -> MessagingResult<i64> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(MessagingError::queue_operation(
                queue,
                "send",
                "injected publish failure",
            ));
        }

        let mut state = self.state.lock();
        state
            .published
            .entry(queue.to_string())
            .or_default()
            .push(payload.clone());
        Ok(self.next_msg_id.fetch_add(1, Ordering::SeqCst) + 1)
    }

    async fn bind_consumer(
        &self,
        queue: &str,
        handler: Arc<dyn DeliveryHandler>,
    ) -> MessagingResult<()> {
        let mut state = self.state.lock();
        if state.handlers.contains_key(queue) {
            return Err(MessagingError::consumer_already_bound(queue));
        }
        state.handlers.insert(queue.to_string(), handler);
        Ok(())
    }

    async fn shutdown(&self) -> MessagingResult<()> {
        self.state.lock().handlers.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_publish_records_per_queue() {
        let gateway = InMemoryGateway::new();
        gateway.publish("q1", &json!({"a": 1})).await.unwrap();
        gateway.publish("q1", &json!({"a": 2})).await.unwrap();
        gateway.publish("q2", &json!({"b": 1})).await.unwrap();

        assert_eq!(gateway.published("q1").len(), 2);
        assert_eq!(gateway.published("q2").len(), 1);
        assert_eq!(gateway.published_count(), 3);
    }

    #[tokio::test]
    async fn test_injected_publish_failure() {
        let gateway = InMemoryGateway::new();
        gateway.fail_publishes(true);
        let err = gateway.publish("q1", &json!({})).await.unwrap_err();
        assert!(matches!(err, MessagingError::QueueOperation { .. }));
        assert_eq!(gateway.published_count(), 0);
    }

    #[tokio::test]
    async fn test_double_bind_rejected() {
        struct Nop;
        #[async_trait]
        impl DeliveryHandler for Nop {
            async fn handle(&self, _payload: Value) -> crate::error::Result<()> {
                Ok(())
            }
        }

        let gateway = InMemoryGateway::new();
        gateway.bind_consumer("q", Arc::new(Nop)).await.unwrap();
        let err = gateway.bind_consumer("q", Arc::new(Nop)).await.unwrap_err();
        assert!(matches!(err, MessagingError::ConsumerAlreadyBound { .. }));
    }
}
