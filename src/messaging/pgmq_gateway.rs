//! # PostgreSQL Message Queue Gateway
//!
//! pgmq-backed implementation of [`QueueGateway`]. Queues are durable
//! tables; an unacknowledged message reappears after its visibility
//! timeout, which gives at-least-once delivery with a per-message
//! delivery count (`read_ct`) the binding layer uses for its bounded
//! retry budget.
//!
//! One gateway instance owns the connection and every consumer task bound
//! through it; `shutdown` stops the tasks cooperatively through a watch
//! channel and joins them.

use async_trait::async_trait;
use parking_lot::Mutex;
use pgmq::PGMQueue;
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

use super::errors::{MessagingError, MessagingResult};
use super::gateway::{DeliveryHandler, QueueGateway};
use crate::constants::queues::dead_letter_queue;
use crate::error::PipelineError;

/// Tuning for the polling consumer tasks.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PgmqGatewayConfig {
    /// Sleep between empty polls.
    pub poll_interval_ms: u64,
    /// Messages fetched per poll.
    pub batch_size: i32,
    /// Seconds a delivered message stays invisible before redelivery.
    pub visibility_timeout_seconds: i32,
    /// Deliveries a message may consume before it is dead-lettered.
    pub max_delivery_attempts: i32,
}

impl Default for PgmqGatewayConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 500,
            batch_size: 10,
            visibility_timeout_seconds: 30,
            max_delivery_attempts: 3,
        }
    }
}

/// pgmq-backed queue gateway.
pub struct PgmqGateway {
    pgmq: PGMQueue,
    config: PgmqGatewayConfig,
    shutdown_tx: watch::Sender<bool>,
    consumers: Mutex<Vec<JoinHandle<()>>>,
    bound_queues: Mutex<HashSet<String>>,
}

impl PgmqGateway {
    /// Connect to the broker with its own connection pool.
    pub async fn connect(database_url: &str, config: PgmqGatewayConfig) -> MessagingResult<Self> {
        info!("Connecting queue gateway to pgmq");
        let pgmq = PGMQueue::new(database_url.to_string()).await?;
        Ok(Self::from_queue(pgmq, config))
    }

    /// Build the gateway on an existing connection pool.
    pub async fn with_pool(pool: sqlx::PgPool, config: PgmqGatewayConfig) -> Self {
        let pgmq = PGMQueue::new_with_pool(pool).await;
        Self::from_queue(pgmq, config)
    }

    fn from_queue(pgmq: PGMQueue, config: PgmqGatewayConfig) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            pgmq,
            config,
            shutdown_tx,
            consumers: Mutex::new(Vec::new()),
            bound_queues: Mutex::new(HashSet::new()),
        }
    }

    /// Create a queue if it does not exist.
    pub async fn create_queue(&self, queue: &str) -> MessagingResult<()> {
        self.pgmq
            .create(queue)
            .await
            .map_err(|e| MessagingError::queue_operation(queue, "create", e.to_string()))?;
        debug!(queue = queue, "queue ready");
        Ok(())
    }
}

#[async_trait]
impl QueueGateway for PgmqGateway {
    async fn publish(&self, queue: &str, payload: &Value) -> MessagingResult<i64> {
        let message_id = self
            .pgmq
            .send(queue, payload)
            .await
            .map_err(|e| MessagingError::queue_operation(queue, "send", e.to_string()))?;

        debug!(queue = queue, msg_id = message_id, "message published");
        Ok(message_id)
    }

    async fn bind_consumer(
        &self,
        queue: &str,
        handler: Arc<dyn DeliveryHandler>,
    ) -> MessagingResult<()> {
        {
            let mut bound = self.bound_queues.lock();
            if !bound.insert(queue.to_string()) {
                return Err(MessagingError::consumer_already_bound(queue));
            }
        }

        let dlq = dead_letter_queue(queue);
        self.create_queue(queue).await?;
        self.create_queue(&dlq).await?;

        let task = ConsumerTask {
            pgmq: self.pgmq.clone(),
            queue: queue.to_string(),
            dlq,
            handler,
            config: self.config.clone(),
            shutdown_rx: self.shutdown_tx.subscribe(),
        };

        info!(queue = queue, "consumer bound");
        self.consumers.lock().push(tokio::spawn(task.run()));
        Ok(())
    }

    async fn shutdown(&self) -> MessagingResult<()> {
        info!("shutting down queue gateway");
        let _ = self.shutdown_tx.send(true);

        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.consumers.lock());
        for result in futures::future::join_all(handles).await {
            if let Err(e) = result {
                warn!(error = %e, "consumer task ended abnormally");
            }
        }
        Ok(())
    }
}

/// One polling consumer loop bound to a single queue.
struct ConsumerTask {
    pgmq: PGMQueue,
    queue: String,
    dlq: String,
    handler: Arc<dyn DeliveryHandler>,
    config: PgmqGatewayConfig,
    shutdown_rx: watch::Receiver<bool>,
}

impl ConsumerTask {
    async fn run(mut self) {
        let poll_interval = Duration::from_millis(self.config.poll_interval_ms);

        loop {
            if *self.shutdown_rx.borrow() {
                debug!(queue = %self.queue, "consumer stopping");
                return;
            }

            match self.poll_once().await {
                Ok(0) => {
                    tokio::select! {
                        _ = sleep(poll_interval) => {}
                        _ = self.shutdown_rx.changed() => {}
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    // Broker-level failure: retried transparently.
                    warn!(queue = %self.queue, error = %e, "queue read failed, retrying");
                    tokio::select! {
                        _ = sleep(poll_interval) => {}
                        _ = self.shutdown_rx.changed() => {}
                    }
                }
            }
        }
    }

    async fn poll_once(&self) -> MessagingResult<usize> {
        let messages = self
            .pgmq
            .read_batch::<Value>(
                &self.queue,
                Some(self.config.visibility_timeout_seconds),
                self.config.batch_size,
            )
            .await
            .map_err(|e| MessagingError::queue_operation(&self.queue, "read", e.to_string()))?
            .unwrap_or_default();

        let count = messages.len();
        for message in messages {
            self.dispatch(message.msg_id, message.read_ct, message.message)
                .await;
        }
        Ok(count)
    }

    /// Deliver one message and apply the acknowledgement policy.
    async fn dispatch(&self, msg_id: i64, read_ct: i32, payload: Value) {
        match self.handler.handle(payload.clone()).await {
            Ok(()) => self.ack(msg_id).await,
            Err(err) if err.is_retryable_delivery() => {
                if read_ct >= self.config.max_delivery_attempts {
                    error!(
                        queue = %self.queue,
                        msg_id = msg_id,
                        deliveries = read_ct,
                        error = %err,
                        "delivery budget exhausted, dead-lettering"
                    );
                    self.dead_letter(msg_id, &payload).await;
                } else {
                    // Leave unacknowledged; the visibility timeout redelivers.
                    warn!(
                        queue = %self.queue,
                        msg_id = msg_id,
                        deliveries = read_ct,
                        error = %err,
                        "transient processing failure, leaving for redelivery"
                    );
                }
            }
            Err(err @ PipelineError::MalformedResult { .. }) => {
                warn!(queue = %self.queue, msg_id = msg_id, error = %err, "dropping malformed result");
                self.ack(msg_id).await;
            }
            Err(err) => {
                error!(queue = %self.queue, msg_id = msg_id, error = %err, "result handling failed");
                self.ack(msg_id).await;
            }
        }
    }

    async fn ack(&self, msg_id: i64) {
        if let Err(e) = self.pgmq.delete(&self.queue, msg_id).await {
            warn!(queue = %self.queue, msg_id = msg_id, error = %e, "failed to acknowledge message");
        }
    }

    async fn dead_letter(&self, msg_id: i64, payload: &Value) {
        if let Err(e) = self.pgmq.send(&self.dlq, payload).await {
            // The message stays on the source queue and will be retried
            // once more after the visibility timeout.
            error!(queue = %self.dlq, msg_id = msg_id, error = %e, "failed to dead-letter message");
            return;
        }
        self.ack(msg_id).await;
    }
}
