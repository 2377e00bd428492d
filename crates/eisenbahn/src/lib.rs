//! Messaging layer: envelope, PUB/SUB over ZeroMQ or in-process, worker lifecycle.

pub mod error;
pub mod memory;
pub mod message;
pub mod messages;
pub mod pubsub;
pub mod shutdown;
pub mod traits;
pub mod transport;
pub mod worker;

pub use error::EisenbahnError;
pub use memory::{MemoryBus, MemoryPublisher, MemorySubscriber};
pub use message::Message;
pub use messages::events;
pub use messages::topics;
pub use pubsub::{ZmqPublisher, ZmqSubscriber};
pub use shutdown::ShutdownSignal;
pub use traits::{EventPublisher, EventSubscriber};
pub use transport::Transport;
pub use worker::{Worker, WorkerBuilder, WorkerRunner, WorkerRunnerConfig};
