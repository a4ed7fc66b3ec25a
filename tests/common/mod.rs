//! Shared helpers for the integration tests.
#![allow(dead_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use fairq::handler::TaskHandler;
use fairq::model::Task;
use fairq::shutdown::Shutdown;
use fairq::store::MemoryStore;
use fairq::worker::{Worker, WorkerConfig};
use tokio::task::JoinHandle;

/// Worker tunables with short intervals so tests settle quickly.
pub fn test_config() -> WorkerConfig {
    WorkerConfig {
        per_task_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(10),
        max_redeliveries: 5,
    }
}

/// Handler that records every delivery and can be told to fail or dawdle.
#[derive(Clone, Default)]
pub struct RecordingHandler {
    seen: Arc<Mutex<Vec<(u32, String)>>>,
    delay: Duration,
    failures_remaining: Arc<Mutex<u32>>,
}

impl RecordingHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long inside each delivery.
    pub fn with_delay(delay: Duration) -> Self {
        Self {
            delay,
            ..Self::default()
        }
    }

    /// Fail the first `n` deliveries, then succeed.
    pub fn failing_first(n: u32) -> Self {
        Self {
            failures_remaining: Arc::new(Mutex::new(n)),
            ..Self::default()
        }
    }

    pub fn deliveries(&self) -> Vec<(u32, String)> {
        self.seen.lock().unwrap().clone()
    }

    /// Poll until at least `n` deliveries were recorded.
    pub async fn wait_for(&self, n: usize, timeout: Duration) {
        let deadline = tokio::time::Instant::now() + timeout;
        while self.seen.lock().unwrap().len() < n {
            assert!(
                tokio::time::Instant::now() < deadline,
                "timed out waiting for {n} deliveries, saw {:?}",
                self.deliveries()
            );
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    }
}

#[async_trait]
impl TaskHandler for RecordingHandler {
    async fn handle(&self, task: &Task) -> anyhow::Result<()> {
        if self.delay > Duration::ZERO {
            tokio::time::sleep(self.delay).await;
        }

        self.seen
            .lock()
            .unwrap()
            .push((task.client_id.get(), task.message.clone()));

        let mut remaining = self.failures_remaining.lock().unwrap();
        if *remaining > 0 {
            *remaining -= 1;
            anyhow::bail!("simulated handler failure");
        }
        Ok(())
    }
}

pub fn spawn_worker(
    store: MemoryStore,
    handler: RecordingHandler,
    config: WorkerConfig,
    shutdown: Shutdown,
) -> JoinHandle<fairq::error::Result<()>> {
    let worker = Worker::new(store, handler, config, shutdown);
    tokio::spawn(async move { worker.run().await })
}

/// Request shutdown and require the worker to exit cleanly.
pub async fn stop_worker(shutdown: &Shutdown, handle: JoinHandle<fairq::error::Result<()>>) {
    shutdown.request();
    tokio::time::timeout(Duration::from_secs(5), handle)
        .await
        .expect("worker did not stop after shutdown request")
        .expect("worker task panicked")
        .expect("worker returned an error");
}
