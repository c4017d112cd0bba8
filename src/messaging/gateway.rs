//! # Queue Gateway Contract
//!
//! The gateway owns the broker connection and is the only component that
//! talks to it. `publish` returns only after the broker has acknowledged
//! the message, so callers can safely order their own state transitions
//! after it. `bind_consumer` registers a handler for a queue's deliveries;
//! the binding layer — not the handler — decides acknowledgement:
//!
//! - handler success: acknowledge
//! - malformed result: acknowledge (drop; redelivery cannot fix it)
//! - domain processing failure: leave for redelivery until the delivery
//!   budget is exhausted, then route to the dead-letter queue
//! - anything else: acknowledge, so one bad message cannot poison a queue

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;

use super::errors::MessagingResult;
use crate::error::Result;

/// Receives one delivery at a time from a bound queue.
#[async_trait]
pub trait DeliveryHandler: Send + Sync {
    async fn handle(&self, payload: Value) -> Result<()>;
}

/// Broker access used by orchestrators and consumers.
#[async_trait]
pub trait QueueGateway: Send + Sync {
    /// Publish a payload to a durable queue, awaiting broker
    /// acknowledgement. Returns the broker-assigned message id.
    async fn publish(&self, queue: &str, payload: &Value) -> MessagingResult<i64>;

    /// Declare `queue` durable (with its dead-letter companion) and start
    /// delivering its messages to `handler`, one call per delivery.
    async fn bind_consumer(
        &self,
        queue: &str,
        handler: Arc<dyn DeliveryHandler>,
    ) -> MessagingResult<()>;

    /// Stop consumer tasks and release the broker connection.
    async fn shutdown(&self) -> MessagingResult<()>;
}
