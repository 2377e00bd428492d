//! Worker trait and lifecycle management.
//!
//! Provides the [`Worker`] trait for long-running stages, [`WorkerBuilder`]
//! for configuration, and [`WorkerRunner`] which drives start, periodic
//! health pings, signal handling and a bounded graceful stop.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tracing::{info, warn};

use crate::error::EisenbahnError;
use crate::message::Message;
use crate::messages::events::{WorkerHealth, WorkerStatus};
use crate::messages::topics::WORKER_HEALTH;
use crate::shutdown::ShutdownSignal;
use crate::traits::EventPublisher;

// ── Worker trait ─────────────────────────────────────────────────────

/// A long-running process that participates in the messaging network.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Called once when the worker starts. Open subscriptions, spawn loops.
    async fn start(&self) -> Result<(), EisenbahnError>;

    /// Called once during graceful shutdown. Drain in-flight work.
    async fn stop(&self) -> Result<(), EisenbahnError>;

    /// Name used in health pings and logging.
    fn name(&self) -> &str;
}

// ── WorkerBuilder ────────────────────────────────────────────────────

pub struct WorkerBuilder {
    name: String,
    health_interval: Duration,
    shutdown_timeout: Duration,
}

impl WorkerBuilder {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            health_interval: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(5),
        }
    }

    /// Interval between health pings (default: 30s).
    pub fn health_interval(mut self, interval: Duration) -> Self {
        self.health_interval = interval;
        self
    }

    /// Upper bound on `Worker::stop` during shutdown (default: 5s).
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    pub fn build(self) -> WorkerRunnerConfig {
        WorkerRunnerConfig {
            name: self.name,
            health_interval: self.health_interval,
            shutdown_timeout: self.shutdown_timeout,
        }
    }
}

// ── WorkerRunnerConfig ───────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct WorkerRunnerConfig {
    pub name: String,
    pub health_interval: Duration,
    pub shutdown_timeout: Duration,
}

// ── WorkerRunner ─────────────────────────────────────────────────────

/// Runs a [`Worker`] until SIGINT/SIGTERM or until `shutdown` is triggered.
///
/// The same `shutdown` signal is triggered on an OS signal, so a worker that
/// handed a clone to its own loops sees it too.
pub struct WorkerRunner;

impl WorkerRunner {
    pub async fn run(
        worker: Arc<dyn Worker>,
        publisher: Arc<dyn EventPublisher>,
        config: WorkerRunnerConfig,
        shutdown: ShutdownSignal,
    ) -> Result<(), EisenbahnError> {
        let worker_name = config.name.clone();
        let started_at = Instant::now();
        info!(worker = %worker_name, "starting worker");

        worker.start().await?;
        info!(worker = %worker_name, "worker started");

        Self::publish_health(&*publisher, &worker_name, WorkerStatus::Healthy, started_at).await;

        let health_handle = tokio::spawn({
            let publisher = publisher.clone();
            let name = worker_name.clone();
            let shutdown = shutdown.clone();
            let interval = config.health_interval;
            async move {
                Self::health_loop(&*publisher, &name, interval, started_at, &shutdown).await;
            }
        });

        let signal_handle = tokio::spawn({
            let shutdown = shutdown.clone();
            let name = worker_name.clone();
            async move {
                Self::os_signal().await;
                info!(worker = %name, "shutdown signal received");
                shutdown.trigger();
            }
        });

        shutdown.wait().await;
        signal_handle.abort();
        if let Err(e) = health_handle.await {
            if !e.is_cancelled() {
                warn!(worker = %worker_name, error = %e, "health loop ended abnormally");
            }
        }

        info!(worker = %worker_name, timeout = ?config.shutdown_timeout, "stopping worker");
        match tokio::time::timeout(config.shutdown_timeout, worker.stop()).await {
            Ok(Ok(())) => info!(worker = %worker_name, "worker stopped gracefully"),
            Ok(Err(e)) => warn!(worker = %worker_name, error = %e, "worker stop returned error"),
            Err(_) => warn!(worker = %worker_name, "worker stop timed out, forcing shutdown"),
        }

        Self::publish_health(&*publisher, &worker_name, WorkerStatus::Unhealthy, started_at)
            .await;

        info!(worker = %worker_name, "worker shutdown complete");
        Ok(())
    }

    async fn health_loop(
        publisher: &dyn EventPublisher,
        worker_name: &str,
        interval: Duration,
        started_at: Instant,
        shutdown: &ShutdownSignal,
    ) {
        let mut ticker = tokio::time::interval(interval);
        // The initial ping was sent by `run`.
        ticker.tick().await;

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    Self::publish_health(publisher, worker_name, WorkerStatus::Healthy, started_at).await;
                }
                _ = shutdown.wait() => break,
            }
        }
    }

    async fn publish_health(
        publisher: &dyn EventPublisher,
        worker_name: &str,
        status: WorkerStatus,
        started_at: Instant,
    ) {
        let health = WorkerHealth {
            worker_id: worker_name.to_string(),
            status,
            uptime_secs: started_at.elapsed().as_secs(),
        };

        match Message::new(WORKER_HEALTH, &health) {
            Ok(msg) => {
                if let Err(e) = publisher.publish(msg).await {
                    warn!(worker = %worker_name, error = %e, "failed to publish health ping");
                }
            }
            Err(e) => {
                warn!(worker = %worker_name, error = %e, "failed to serialize health ping");
            }
        }
    }

    /// Wait for SIGINT or SIGTERM (Unix) or Ctrl+C elsewhere. Never resolves
    /// if the handlers cannot be installed.
    async fn os_signal() {
        #[cfg(unix)]
        {
            use tokio::signal::unix::{signal, SignalKind};
            match (
                signal(SignalKind::interrupt()),
                signal(SignalKind::terminate()),
            ) {
                (Ok(mut sigint), Ok(mut sigterm)) => {
                    tokio::select! {
                        _ = sigint.recv() => {}
                        _ = sigterm.recv() => {}
                    }
                }
                (Err(e), _) | (_, Err(e)) => {
                    warn!(error = %e, "failed to register signal handlers");
                    std::future::pending::<()>().await;
                }
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!(error = %e, "failed to listen for ctrl_c");
                std::future::pending::<()>().await;
            }
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────────
