//! In-process PUB/SUB bus with the same prefix-filtering contract as ZeroMQ.
//!
//! Used to wire stages inside one process (tests, single-binary deployments)
//! without sockets.

use std::sync::{Mutex as StdMutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, warn};

use crate::error::EisenbahnError;
use crate::message::Message;
use crate::traits::{EventPublisher, EventSubscriber};

/// Default per-subscriber buffer before slow subscribers start losing messages.
pub const DEFAULT_BUS_CAPACITY: usize = 4096;

/// Shared in-process message bus.
#[derive(Debug, Clone)]
pub struct MemoryBus {
    tx: broadcast::Sender<Message>,
}

impl Default for MemoryBus {
    fn default() -> Self {
        Self::new(DEFAULT_BUS_CAPACITY)
    }
}

impl MemoryBus {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn publisher(&self) -> MemoryPublisher {
        MemoryPublisher {
            tx: self.tx.clone(),
        }
    }

    /// A subscriber sees every message published after this call that
    /// matches one of its prefixes.
    pub fn subscriber(&self) -> MemorySubscriber {
        MemorySubscriber {
            rx: Mutex::new(self.tx.subscribe()),
            prefixes: StdMutex::new(Vec::new()),
        }
    }
}

#[derive(Debug, Clone)]
pub struct MemoryPublisher {
    tx: broadcast::Sender<Message>,
}

#[async_trait]
impl EventPublisher for MemoryPublisher {
    /// With no live subscribers the message is dropped, like a ZeroMQ PUB socket.
    async fn publish(&self, message: Message) -> Result<(), EisenbahnError> {
        let topic = message.topic.clone();
        match self.tx.send(message) {
            Ok(n) => debug!(topic = %topic, receivers = n, "published message"),
            Err(_) => debug!(topic = %topic, "no subscribers, message dropped"),
        }
        Ok(())
    }
}

#[derive(Debug)]
pub struct MemorySubscriber {
    rx: Mutex<broadcast::Receiver<Message>>,
    prefixes: StdMutex<Vec<String>>,
}

impl MemorySubscriber {
    fn matches(&self, topic: &str) -> bool {
        self.prefixes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .any(|p| topic.starts_with(p.as_str()))
    }
}

#[async_trait]
impl EventSubscriber for MemorySubscriber {
    async fn subscribe(&self, topic_prefix: &str) -> Result<(), EisenbahnError> {
        self.prefixes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(topic_prefix.to_string());
        debug!(topic_prefix = %topic_prefix, "subscribed to topic prefix");
        Ok(())
    }

    async fn recv(&self) -> Result<Message, EisenbahnError> {
        let mut rx = self.rx.lock().await;
        loop {
            match rx.recv().await {
                Ok(message) if self.matches(&message.topic) => return Ok(message),
                Ok(_) => continue,
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!(skipped, "subscriber lagged, messages lost");
                }
                Err(broadcast::error::RecvError::Closed) => return Err(EisenbahnError::Closed),
            }
        }
    }
}
