//! # Messaging
//!
//! Broker access for the pipeline: the queue gateway owning the broker
//! connection, the lenient worker-payload codec, and the typed request /
//! result payloads exchanged with the stage workers.

pub mod codec;
pub mod errors;
pub mod gateway;
pub mod memory;
pub mod payloads;
pub mod pgmq_gateway;

pub use errors::{MessagingError, MessagingResult};
pub use gateway::{DeliveryHandler, QueueGateway};
pub use memory::InMemoryGateway;
pub use pgmq_gateway::{PgmqGateway, PgmqGatewayConfig};
