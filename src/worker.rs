//! Per-client consumption loop.
//!
//! Each worker cycles through five phases: select a client and lock it,
//! migrate its inbound tasks to pending, recover any task abandoned
//! in-flight by a crashed worker, drain pending one task at a time, and
//! release the lock. Workers coordinate only through the store, so any
//! number of them can run concurrently across processes.

use std::time::Duration;

use tracing::{debug, error, info, warn};

use crate::config::Config;
use crate::error::Result;
use crate::handler::TaskHandler;
use crate::model::{ClientId, TaskEnvelope};
use crate::shutdown::Shutdown;
use crate::store::Store;

/// Tunables for one worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Per-task processing budget; also the provisional lock TTL.
    pub per_task_timeout: Duration,
    /// Backoff when the waiting set is empty or a lock is contended.
    pub poll_interval: Duration,
    /// Crash-recovery redeliveries allowed before dead-lettering.
    pub max_redeliveries: u32,
}

impl From<&Config> for WorkerConfig {
    fn from(config: &Config) -> Self {
        Self {
            per_task_timeout: config.per_task_timeout,
            poll_interval: config.poll_interval,
            max_redeliveries: config.max_redeliveries,
        }
    }
}

pub struct Worker<S: Store, H: TaskHandler> {
    store: S,
    handler: H,
    config: WorkerConfig,
    shutdown: Shutdown,
}

impl<S: Store, H: TaskHandler> Worker<S, H> {
    pub fn new(store: S, handler: H, config: WorkerConfig, shutdown: Shutdown) -> Self {
        Self {
            store,
            handler,
            config,
            shutdown,
        }
    }

    /// Run until shutdown is requested.
    ///
    /// Store errors inside a cycle are retryable: they are logged and the
    /// loop moves on to the next selection round, never crashing the worker.
    pub async fn run(&self) -> Result<()> {
        info!("worker started");

        while let Some(client) = self.select_client().await {
            let outcome = self.process_client(client).await;
            if let Err(e) = &outcome {
                error!(client_id = %client, "processing cycle failed: {e}");
            }

            // The lock is deleted even after an interrupted or failed cycle
            // so another worker can resume the client.
            if let Err(e) = self.release(client).await {
                warn!(client_id = %client, "release failed: {e}");
            }
        }

        info!("worker stopped");
        Ok(())
    }

    /// Pick a random waiting client and acquire its lock.
    ///
    /// Polls with a fixed backoff while the waiting set is empty or the
    /// candidate's lock is contended. Returns None once shutdown is
    /// requested. Fairness is probabilistic: every member of the waiting
    /// set has the same selection odds each round.
    async fn select_client(&self) -> Option<ClientId> {
        loop {
            if self.shutdown.is_requested() {
                return None;
            }

            let candidate = match self.store.random_waiting_client().await {
                Ok(candidate) => candidate,
                Err(e) => {
                    warn!("store unavailable while selecting: {e}");
                    tokio::time::sleep(self.config.poll_interval).await;
                    continue;
                }
            };

            let Some(client) = candidate else {
                tokio::time::sleep(self.config.poll_interval).await;
                continue;
            };

            match self
                .store
                .try_lock(client, self.config.per_task_timeout)
                .await
            {
                Ok(true) => return Some(client),
                Ok(false) => {
                    // Another worker holds this client; back off and re-pick.
                    tokio::time::sleep(self.config.poll_interval).await;
                }
                Err(e) => {
                    warn!(client_id = %client, "lock attempt failed: {e}");
                    tokio::time::sleep(self.config.poll_interval).await;
                }
            }
        }
    }

    /// One full lock cycle for an acquired client: migrate, recover, drain.
    async fn process_client(&self, client: ClientId) -> Result<()> {
        let discovered = self
            .store
            .migrate_inbound(client, self.config.per_task_timeout)
            .await?;
        debug!(client_id = %client, discovered, "migrated inbound tasks");

        self.recover(client).await?;
        self.drain(client).await
    }

    /// Requeue a task a previous worker left in the in-flight slot.
    ///
    /// The recovered task goes to the consuming end of pending so it is
    /// redelivered before any other pending work. Each recovery bumps the
    /// envelope's redelivery counter; past the budget the task is parked on
    /// the dead-letter list instead, as is any payload that fails to decode.
    async fn recover(&self, client: ClientId) -> Result<()> {
        let Some(payload) = self.store.peek_in_flight(client).await? else {
            return Ok(());
        };

        match TaskEnvelope::decode(&payload) {
            Ok(mut envelope) => {
                envelope.redeliveries += 1;
                if envelope.redeliveries > self.config.max_redeliveries {
                    warn!(
                        client_id = %client,
                        redeliveries = envelope.redeliveries,
                        "redelivery budget exhausted, dead-lettering task"
                    );
                    self.store.dead_letter(client, envelope.encode()?).await?;
                } else {
                    info!(
                        client_id = %client,
                        redeliveries = envelope.redeliveries,
                        "recovering abandoned in-flight task"
                    );
                    self.store.redeliver(client, envelope.encode()?).await?;
                }
            }
            Err(e) => {
                warn!(client_id = %client, "undecodable in-flight payload, dead-lettering: {e}");
                self.store.dead_letter(client, payload).await?;
            }
        }

        Ok(())
    }

    /// Deliver pending tasks one at a time until pending is empty, the
    /// handler fails, or shutdown is requested.
    async fn drain(&self, client: ClientId) -> Result<()> {
        while let Some(payload) = self.store.dequeue_to_in_flight(client).await? {
            let envelope = match TaskEnvelope::decode(&payload) {
                Ok(envelope) => envelope,
                Err(e) => {
                    warn!(client_id = %client, "undecodable task payload, dead-lettering: {e}");
                    self.store.dead_letter(client, payload).await?;
                    continue;
                }
            };

            let task = envelope.task();
            match self.handler.handle(&task).await {
                Ok(()) => self.store.ack(client).await?,
                Err(e) => {
                    // The task stays in the in-flight slot; the next lock
                    // cycle for this client redelivers it.
                    warn!(
                        client_id = %client,
                        message = %task.message,
                        "handler failed, leaving task in flight: {e:#}"
                    );
                    break;
                }
            }

            // Safe checkpoint: the in-flight slot is empty right after an ack.
            if self.shutdown.is_requested() {
                break;
            }
        }

        Ok(())
    }

    /// Delete the lock and, outside shutdown, drop the client from the
    /// waiting set once nothing of its work remains anywhere in the
    /// pipeline. Cleanup is best-effort: a racing enqueue re-adds the id.
    async fn release(&self, client: ClientId) -> Result<()> {
        self.store.release_lock(client).await?;

        if !self.shutdown.is_requested() && self.store.queue_depths(client).await?.is_idle() {
            self.store.remove_waiting(client).await?;
        }

        Ok(())
    }
}
