//! Backing store abstraction.
//!
//! The queue core coordinates exclusively through a key-value/list store.
//! Each client owns four list/key slots plus a global advisory waiting set:
//!
//! - inbound   `client:{id}:queue`      — newly enqueued tasks
//! - pending   `client:{id}:pending`    — tasks claimed for this lock cycle
//! - in-flight `client:{id}:processing` — at most one task being handled
//! - lock      `client:{id}:lock`       — exclusivity token with a TTL
//! - dead      `client:{id}:dead`       — tasks parked after exhausting redeliveries
//!
//! Lists grow at the head and are consumed from the tail, so order within a
//! client is FIFO. [`RedisStore`] is the production adapter; [`MemoryStore`]
//! implements the same atomicity semantics for tests and local development.

pub mod memory;
pub mod redis;

use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::model::ClientId;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Global set of client ids believed to have unconsumed work.
pub(crate) const WAITING_SET: &str = "clients";

pub(crate) fn inbound_key(client: ClientId) -> String {
    format!("client:{client}:queue")
}

pub(crate) fn pending_key(client: ClientId) -> String {
    format!("client:{client}:pending")
}

pub(crate) fn in_flight_key(client: ClientId) -> String {
    format!("client:{client}:processing")
}

pub(crate) fn lock_key(client: ClientId) -> String {
    format!("client:{client}:lock")
}

pub(crate) fn dead_key(client: ClientId) -> String {
    format!("client:{client}:dead")
}

/// Queue lengths for one client's slots, fetched in a single round trip.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QueueDepths {
    pub inbound: u64,
    pub pending: u64,
    pub in_flight: u64,
}

impl QueueDepths {
    /// True when no task for this client sits anywhere in the pipeline.
    pub fn is_idle(&self) -> bool {
        self.inbound == 0 && self.pending == 0 && self.in_flight == 0
    }
}

/// Capability contract the queue core depends on.
///
/// Membership in the waiting set is advisory, not authoritative: transient
/// over-membership (a listed client with no work) is tolerated by design.
/// Every mutation that matters for delivery guarantees is atomic per method.
#[async_trait]
pub trait Store: Send + Sync + 'static {
    /// Append encoded tasks to the client's inbound queue (preserving order)
    /// and add the client to the waiting set, pipelined into one round trip.
    /// Not atomic across the batch; partial visibility is acceptable.
    async fn enqueue(&self, client: ClientId, payloads: Vec<String>) -> Result<()>;

    /// Uniformly random member of the waiting set, or None when empty.
    async fn random_waiting_client(&self) -> Result<Option<ClientId>>;

    /// Set-if-absent on the client's lock key with the given provisional
    /// expiry. Returns true when exclusivity was acquired.
    async fn try_lock(&self, client: ClientId, ttl: Duration) -> Result<bool>;

    /// Move every currently-inbound task to pending under a consistent
    /// snapshot, extending the lock expiry to `n × per_task_timeout + 1s`
    /// for the `n` tasks discovered. Retries on concurrent inbound writes
    /// until a snapshot commits. Returns `n`.
    async fn migrate_inbound(&self, client: ClientId, per_task_timeout: Duration) -> Result<u64>;

    /// Payload currently in the in-flight slot, if any, without removing it.
    async fn peek_in_flight(&self, client: ClientId) -> Result<Option<String>>;

    /// Atomically place `payload` at the consuming end of pending (so it is
    /// delivered before all other pending work) and clear the in-flight slot.
    async fn redeliver(&self, client: ClientId, payload: String) -> Result<()>;

    /// Atomically park `payload` on the dead-letter list and clear the
    /// in-flight slot.
    async fn dead_letter(&self, client: ClientId, payload: String) -> Result<()>;

    /// Atomically move one task from pending's consuming end into the
    /// in-flight slot. None when pending is empty.
    async fn dequeue_to_in_flight(&self, client: ClientId) -> Result<Option<String>>;

    /// Acknowledge the in-flight task by removing it.
    async fn ack(&self, client: ClientId) -> Result<()>;

    /// Delete the client's lock. Safe to call when the lock already expired.
    async fn release_lock(&self, client: ClientId) -> Result<()>;

    /// Lengths of the client's inbound/pending/in-flight slots.
    async fn queue_depths(&self, client: ClientId) -> Result<QueueDepths>;

    /// Remove the client from the waiting set (best-effort cleanup).
    async fn remove_waiting(&self, client: ClientId) -> Result<()>;
}
