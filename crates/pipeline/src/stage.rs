//! Stage state machine and its receive/dispatch/drain loop.
//!
//! A stage owns one subscriber and one [`StageHandler`]. Messages are
//! dispatched to concurrently running handler tasks, bounded by a semaphore;
//! on shutdown the stage stops receiving, waits for every dispatched task,
//! lets the handler flush, then releases the subscriber.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use fusionguard_eisenbahn::{
    EisenbahnError, EventPublisher, EventSubscriber, Message, ShutdownSignal,
};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tokio::sync::{watch, Semaphore};
use tokio::task::{JoinError, JoinSet};
use tracing::{debug, info, warn};

use crate::counters::{CounterSnapshot, StageCounters};
use crate::error::StageError;

/// Pause after a transport receive error before trying again.
pub const RECV_BACKOFF: Duration = Duration::from_millis(100);

// ── State ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StageState {
    Idle,
    Subscribed,
    Running,
    Draining,
    Closed,
}

impl StageState {
    /// The lifecycle is strictly linear.
    pub fn can_transition_to(self, next: StageState) -> bool {
        use StageState::*;
        matches!(
            (self, next),
            (Idle, Subscribed) | (Subscribed, Running) | (Running, Draining) | (Draining, Closed)
        )
    }
}

impl fmt::Display for StageState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StageState::Idle => "idle",
            StageState::Subscribed => "subscribed",
            StageState::Running => "running",
            StageState::Draining => "draining",
            StageState::Closed => "closed",
        };
        f.write_str(s)
    }
}

// ── Handler ─────────────────────────────────────────────────────────

/// Per-message work of a stage. `handle` may run concurrently with itself.
#[async_trait]
pub trait StageHandler: Send + Sync + 'static {
    fn name(&self) -> &str;

    /// Topic prefixes the stage subscribes to.
    fn topics(&self) -> &[&'static str];

    fn counters(&self) -> &Arc<StageCounters>;

    async fn handle(&self, message: Message) -> Result<(), StageError>;

    /// Called once after every dispatched message has completed.
    async fn finish(&self) {}
}

/// Decode a payload, classifying failure as a malformed input.
pub fn decode<T: DeserializeOwned>(message: &Message) -> Result<T, StageError> {
    message.decode().map_err(|source| StageError::Malformed {
        topic: message.topic.clone(),
        source,
    })
}

/// A publisher plus the per-publish deadline applied to it.
#[derive(Clone)]
pub struct StageOutput {
    publisher: Arc<dyn EventPublisher>,
    timeout: Duration,
}

impl StageOutput {
    pub fn new(publisher: Arc<dyn EventPublisher>, timeout: Duration) -> Self {
        Self { publisher, timeout }
    }

    /// Publish within the deadline, recording the outcome in `counters`.
    pub async fn send(&self, message: Message, counters: &StageCounters) -> Result<(), StageError> {
        let topic = message.topic.clone();
        match tokio::time::timeout(self.timeout, self.publisher.publish(message)).await {
            Ok(Ok(())) => {
                counters.record_published();
                Ok(())
            }
            Ok(Err(source)) => {
                counters.record_publish_failure();
                Err(StageError::Publish { topic, source })
            }
            Err(_) => {
                counters.record_publish_failure();
                Err(StageError::PublishTimeout {
                    topic,
                    timeout: self.timeout,
                })
            }
        }
    }
}

// ── Stage ───────────────────────────────────────────────────────────

pub struct Stage<H: StageHandler> {
    handler: Arc<H>,
    subscriber: Option<Arc<dyn EventSubscriber>>,
    max_in_flight: usize,
    state: watch::Sender<StageState>,
}

impl<H: StageHandler> Stage<H> {
    pub fn new(handler: H, subscriber: Arc<dyn EventSubscriber>, max_in_flight: usize) -> Self {
        let (state, _) = watch::channel(StageState::Idle);
        Self {
            handler: Arc::new(handler),
            subscriber: Some(subscriber),
            max_in_flight: max_in_flight.max(1),
            state,
        }
    }

    pub fn state(&self) -> StageState {
        *self.state.borrow()
    }

    /// Observe state changes from another task.
    pub fn watch_state(&self) -> watch::Receiver<StageState> {
        self.state.subscribe()
    }

    pub fn handler(&self) -> &Arc<H> {
        &self.handler
    }

    fn check(&self, to: StageState) -> Result<(), StageError> {
        let from = self.state();
        if from.can_transition_to(to) {
            Ok(())
        } else {
            Err(StageError::InvalidTransition { from, to })
        }
    }

    fn transition(&self, to: StageState) -> Result<(), StageError> {
        self.check(to)?;
        let from = self.state.send_replace(to);
        debug!(stage = %self.handler.name(), %from, %to, "stage transition");
        Ok(())
    }

    /// Register the handler's topics. Idle → Subscribed.
    pub async fn subscribe(&mut self) -> Result<(), StageError> {
        self.check(StageState::Subscribed)?;
        if let Some(subscriber) = &self.subscriber {
            for topic in self.handler.topics() {
                subscriber.subscribe(topic).await?;
            }
        }
        self.transition(StageState::Subscribed)?;
        info!(stage = %self.handler.name(), topics = ?self.handler.topics(), "stage subscribed");
        Ok(())
    }

    /// Receive and dispatch until `shutdown` fires or the subscription closes,
    /// then drain and close. Returns the final counters.
    pub async fn run(&mut self, shutdown: ShutdownSignal) -> Result<CounterSnapshot, StageError> {
        let Some(subscriber) = self.subscriber.clone() else {
            return Err(StageError::InvalidTransition {
                from: self.state(),
                to: StageState::Running,
            });
        };
        self.transition(StageState::Running)?;

        let name = self.handler.name().to_string();
        let counters = self.handler.counters().clone();
        let permits = Arc::new(Semaphore::new(self.max_in_flight));
        let mut tasks: JoinSet<()> = JoinSet::new();

        info!(stage = %name, max_in_flight = self.max_in_flight, "stage running");

        loop {
            tokio::select! {
                biased;
                _ = shutdown.wait() => break,
                Some(joined) = tasks.join_next(), if !tasks.is_empty() => {
                    Self::reap(&name, &counters, joined);
                }
                permit = permits.clone().acquire_owned() => {
                    let Ok(permit) = permit else { break };
                    let received = tokio::select! {
                        biased;
                        _ = shutdown.wait() => break,
                        received = subscriber.recv() => received,
                    };
                    match received {
                        Ok(message) => {
                            counters.record_received();
                            let handler = self.handler.clone();
                            tasks.spawn(async move {
                                let _permit = permit;
                                Self::dispatch(&*handler, message).await;
                            });
                        }
                        Err(EisenbahnError::Closed) => {
                            warn!(stage = %name, "subscription closed");
                            break;
                        }
                        Err(e @ EisenbahnError::Deserialization(_)) => {
                            counters.record_received();
                            counters.record_malformed();
                            debug!(stage = %name, error = %e, "dropped undecodable envelope");
                        }
                        Err(e) => {
                            warn!(stage = %name, error = %e, "receive failed, backing off");
                            tokio::select! {
                                _ = shutdown.wait() => break,
                                _ = tokio::time::sleep(RECV_BACKOFF) => {}
                            }
                        }
                    }
                }
            }
        }

        self.transition(StageState::Draining)?;
        info!(stage = %name, in_flight = tasks.len(), "stage draining");
        while let Some(joined) = tasks.join_next().await {
            Self::reap(&name, &counters, joined);
        }
        self.handler.finish().await;

        drop(subscriber);
        self.subscriber = None;
        self.transition(StageState::Closed)?;

        let snapshot = counters.snapshot();
        info!(
            stage = %name,
            received = snapshot.received,
            processed = snapshot.processed,
            malformed = snapshot.malformed,
            failed = snapshot.failed,
            published = snapshot.published,
            publish_failures = snapshot.publish_failures,
            sink_dropped = snapshot.sink_dropped,
            "stage closed"
        );
        Ok(snapshot)
    }

    async fn dispatch(handler: &H, message: Message) {
        let topic = message.topic.clone();
        match handler.handle(message).await {
            Ok(()) => handler.counters().record_processed(),
            Err(e) if e.is_malformed() => {
                handler.counters().record_malformed();
                debug!(stage = %handler.name(), topic = %topic, error = %e, "dropped malformed message");
            }
            Err(e) => {
                handler.counters().record_failed();
                warn!(stage = %handler.name(), topic = %topic, error = %e, "message handling failed");
            }
        }
    }

    fn reap(name: &str, counters: &StageCounters, joined: Result<(), JoinError>) {
        if let Err(e) = joined {
            counters.record_failed();
            warn!(stage = %name, error = %e, "handler task aborted");
        }
    }
}
