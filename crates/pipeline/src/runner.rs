//! Adapts a [`Stage`] to the eisenbahn [`Worker`] lifecycle.

use async_trait::async_trait;
use fusionguard_eisenbahn::{EisenbahnError, ShutdownSignal, Worker};
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::counters::CounterSnapshot;
use crate::error::StageError;
use crate::stage::{Stage, StageHandler, StageState};

type RunHandle = JoinHandle<Result<CounterSnapshot, StageError>>;

/// Runs one stage as a worker: `start` subscribes and spawns the receive
/// loop, `stop` triggers `shutdown` and waits for the drain.
pub struct StageWorker<H: StageHandler> {
    name: String,
    stage: Mutex<Option<Stage<H>>>,
    state: watch::Receiver<StageState>,
    shutdown: ShutdownSignal,
    task: Mutex<Option<RunHandle>>,
}

impl<H: StageHandler> StageWorker<H> {
    /// `shutdown` should be the signal handed to the worker runner, so an OS
    /// signal starts the drain right away.
    pub fn new(name: impl Into<String>, stage: Stage<H>, shutdown: ShutdownSignal) -> Self {
        let state = stage.watch_state();
        Self {
            name: name.into(),
            stage: Mutex::new(Some(stage)),
            state,
            shutdown,
            task: Mutex::new(None),
        }
    }

    pub fn state(&self) -> StageState {
        *self.state.borrow()
    }
}

#[async_trait]
impl<H: StageHandler> Worker for StageWorker<H> {
    async fn start(&self) -> Result<(), EisenbahnError> {
        let mut stage = self
            .stage
            .lock()
            .await
            .take()
            .ok_or_else(|| EisenbahnError::Transport(format!("{} already started", self.name)))?;
        stage.subscribe().await?;

        let shutdown = self.shutdown.clone();
        let handle = tokio::spawn(async move { stage.run(shutdown).await });
        *self.task.lock().await = Some(handle);
        Ok(())
    }

    async fn stop(&self) -> Result<(), EisenbahnError> {
        self.shutdown.trigger();
        let Some(handle) = self.task.lock().await.take() else {
            return Ok(());
        };
        match handle.await {
            Ok(Ok(snapshot)) => {
                info!(worker = %self.name, counters = ?snapshot, "stage drained");
                Ok(())
            }
            Ok(Err(e)) => Err(e.into()),
            Err(e) => {
                warn!(worker = %self.name, error = %e, "stage task panicked");
                Err(EisenbahnError::Transport(e.to_string()))
            }
        }
    }

    fn name(&self) -> &str {
        &self.name
    }
}
