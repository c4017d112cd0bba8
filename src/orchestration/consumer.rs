//! # Stage Result Consumers
//!
//! One consumer per stage, bound to that stage's result queue. A
//! consumer holds no state: it logs the attempt, delegates to its
//! orchestrator, and reports the outcome to the binding layer, which
//! owns acknowledgement (malformed results are dropped, transient
//! processing failures follow the bounded-retry/dead-letter policy).

use async_trait::async_trait;
use serde_json::Value;
use std::sync::Arc;
use tracing::{info, warn};

use super::stage::StageOrchestrator;
use crate::error::Result;
use crate::messaging::{DeliveryHandler, QueueGateway};

pub struct StageResultConsumer {
    orchestrator: Arc<dyn StageOrchestrator>,
}

impl StageResultConsumer {
    pub fn new(orchestrator: Arc<dyn StageOrchestrator>) -> Self {
        Self { orchestrator }
    }

    /// Bind this consumer to its stage's result queue.
    pub async fn bind(self, gateway: &dyn QueueGateway) -> Result<()> {
        let queue = self.orchestrator.stage().result_queue();
        gateway.bind_consumer(queue, Arc::new(self)).await?;
        Ok(())
    }
}

#[async_trait]
impl DeliveryHandler for StageResultConsumer {
    async fn handle(&self, payload: Value) -> Result<()> {
        let stage = self.orchestrator.stage();
        info!(stage = %stage, queue = stage.result_queue(), "result message received");

        match self.orchestrator.handle_result(payload).await {
            Ok(()) => Ok(()),
            Err(err) => {
                warn!(stage = %stage, error = %err, "result handling failed");
                Err(err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;
    use crate::state_machine::Stage;
    use parking_lot::Mutex;
    use uuid::Uuid;

    struct RecordingOrchestrator {
        seen: Mutex<Vec<Value>>,
    }

    #[async_trait]
    impl StageOrchestrator for RecordingOrchestrator {
        fn stage(&self) -> Stage {
            Stage::Profiling
        }

        async fn start(&self, _dataset_id: Uuid) -> Result<super::super::stage::StartAck> {
            Err(PipelineError::validation("not under test"))
        }

        async fn handle_result(&self, raw: Value) -> Result<()> {
            self.seen.lock().push(raw);
            Ok(())
        }

        async fn poll(&self, _dataset_id: Uuid) -> Result<super::super::stage::StagePoll> {
            Err(PipelineError::validation("not under test"))
        }
    }

    #[tokio::test]
    async fn test_consumer_forwards_payload_to_orchestrator() {
        let orchestrator = Arc::new(RecordingOrchestrator {
            seen: Mutex::new(Vec::new()),
        });
        let consumer = StageResultConsumer::new(orchestrator.clone());

        let payload = serde_json::json!({"dataset_id": "d1"});
        consumer.handle(payload.clone()).await.unwrap();

        assert_eq!(orchestrator.seen.lock().as_slice(), &[payload]);
    }
}
