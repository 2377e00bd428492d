//! Worker health pings observed over a real SUB socket.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;

use fusionguard_eisenbahn::error::EisenbahnError;
use fusionguard_eisenbahn::events::{WorkerHealth, WorkerStatus};
use fusionguard_eisenbahn::topics;
use fusionguard_eisenbahn::{
    EventSubscriber, ShutdownSignal, Transport, Worker, WorkerBuilder, WorkerRunner,
    ZmqPublisher, ZmqSubscriber,
};

const TIMEOUT: Duration = Duration::from_secs(5);
const SETTLE: Duration = Duration::from_millis(200);

struct NoopWorker;

#[async_trait]
impl Worker for NoopWorker {
    async fn start(&self) -> Result<(), EisenbahnError> {
        Ok(())
    }

    async fn stop(&self) -> Result<(), EisenbahnError> {
        Ok(())
    }

    fn name(&self) -> &str {
        "noop"
    }
}

#[tokio::test]
async fn health_pings_reach_subscribers() {
    let transport = Transport::tcp("127.0.0.1", 16200);
    let publisher = Arc::new(ZmqPublisher::bind(&transport).await.unwrap());
    tokio::time::sleep(SETTLE).await;

    let sub = ZmqSubscriber::connect(&transport).await.unwrap();
    sub.subscribe(topics::WORKER_HEALTH).await.unwrap();
    tokio::time::sleep(SETTLE).await;

    let shutdown = ShutdownSignal::new();
    let config = WorkerBuilder::new("noop")
        .health_interval(Duration::from_millis(100))
        .shutdown_timeout(Duration::from_secs(1))
        .build();
    let runner = tokio::spawn({
        let shutdown = shutdown.clone();
        async move { WorkerRunner::run(Arc::new(NoopWorker), publisher, config, shutdown).await }
    });

    let first = timeout(TIMEOUT, sub.recv()).await.expect("timed out").unwrap();
    assert_eq!(first.topic, topics::WORKER_HEALTH);
    let health: WorkerHealth = first.decode().unwrap();
    assert_eq!(health.worker_id, "noop");
    assert_eq!(health.status, WorkerStatus::Healthy);

    shutdown.trigger();
    timeout(TIMEOUT, runner).await.expect("runner hung").unwrap().unwrap();

    // Drain until the final ping shows up.
    loop {
        let msg = timeout(TIMEOUT, sub.recv()).await.expect("no final ping").unwrap();
        let health: WorkerHealth = msg.decode().unwrap();
        if health.status == WorkerStatus::Unhealthy {
            break;
        }
    }
}
