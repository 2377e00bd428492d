use std::sync::Arc;

use async_trait::async_trait;

use crate::error::EisenbahnError;
use crate::message::Message;

/// Publishes messages to every subscriber whose prefix matches the topic.
///
/// Delivery is at-most-once per subscriber: a publisher with no subscribers
/// drops the message.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    async fn publish(&self, message: Message) -> Result<(), EisenbahnError>;
}

/// Blanket implementation so `Arc<dyn EventPublisher>` can be used directly.
#[async_trait]
impl<T: EventPublisher + ?Sized> EventPublisher for Arc<T> {
    async fn publish(&self, message: Message) -> Result<(), EisenbahnError> {
        (**self).publish(message).await
    }
}

/// Receives messages whose topics match the subscribed prefixes.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Subscribe to messages with topics matching the given prefix.
    /// An empty prefix matches everything.
    async fn subscribe(&self, topic_prefix: &str) -> Result<(), EisenbahnError>;

    /// Receive the next message. Blocks until a message is available.
    async fn recv(&self) -> Result<Message, EisenbahnError>;
}

#[async_trait]
impl<T: EventSubscriber + ?Sized> EventSubscriber for Arc<T> {
    async fn subscribe(&self, topic_prefix: &str) -> Result<(), EisenbahnError> {
        (**self).subscribe(topic_prefix).await
    }

    async fn recv(&self) -> Result<Message, EisenbahnError> {
        (**self).recv().await
    }
}
