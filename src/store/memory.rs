//! In-memory store adapter.
//!
//! Implements the full capability contract — including lock TTL expiry and
//! the consuming-end semantics of the list moves — under a single mutex, so
//! every trait method is trivially atomic. Used by the integration tests and
//! handy for local experiments without a Redis instance.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::seq::IteratorRandom;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::model::ClientId;

use super::{QueueDepths, Store};

/// Per-client slots. Lists keep their head at the front; consumption happens
/// from the back, matching the Redis adapter's LPUSH/LMOVE directions.
#[derive(Default)]
struct ClientSlots {
    inbound: VecDeque<String>,
    pending: VecDeque<String>,
    in_flight: VecDeque<String>,
    dead: Vec<String>,
}

#[derive(Default)]
struct State {
    slots: HashMap<u32, ClientSlots>,
    waiting: HashSet<u32>,
    /// Lock expiry deadlines. A past deadline counts as absent.
    locks: HashMap<u32, Instant>,
}

impl State {
    fn slots(&mut self, client: ClientId) -> &mut ClientSlots {
        self.slots.entry(client.get()).or_default()
    }

    fn lock_live(&self, client: ClientId) -> bool {
        self.locks
            .get(&client.get())
            .is_some_and(|deadline| *deadline > Instant::now())
    }
}

#[derive(Clone, Default)]
pub struct MemoryStore {
    state: Arc<Mutex<State>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    // -----------------------------------------------------------------------
    // Inspection helpers (tests and local tooling)
    // -----------------------------------------------------------------------

    pub async fn waiting_clients(&self) -> Vec<u32> {
        let state = self.state.lock().await;
        let mut members: Vec<u32> = state.waiting.iter().copied().collect();
        members.sort_unstable();
        members
    }

    pub async fn dead_tasks(&self, client: ClientId) -> Vec<String> {
        let mut state = self.state.lock().await;
        state.slots(client).dead.clone()
    }

    pub async fn lock_held(&self, client: ClientId) -> bool {
        let state = self.state.lock().await;
        state.lock_live(client)
    }

    /// Force the client's lock to count as expired, simulating a worker that
    /// died and let its TTL lapse.
    pub async fn expire_lock(&self, client: ClientId) {
        let mut state = self.state.lock().await;
        state.locks.remove(&client.get());
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn enqueue(&self, client: ClientId, payloads: Vec<String>) -> Result<()> {
        let mut state = self.state.lock().await;
        for payload in payloads {
            state.slots(client).inbound.push_front(payload);
        }
        state.waiting.insert(client.get());
        Ok(())
    }

    async fn random_waiting_client(&self) -> Result<Option<ClientId>> {
        let state = self.state.lock().await;
        let member = state
            .waiting
            .iter()
            .choose(&mut rand::thread_rng())
            .copied();
        Ok(member.and_then(|id| ClientId::new(id).ok()))
    }

    async fn try_lock(&self, client: ClientId, ttl: Duration) -> Result<bool> {
        let mut state = self.state.lock().await;
        if state.lock_live(client) {
            return Ok(false);
        }
        state.locks.insert(client.get(), Instant::now() + ttl);
        Ok(true)
    }

    async fn migrate_inbound(&self, client: ClientId, per_task_timeout: Duration) -> Result<u64> {
        let mut state = self.state.lock().await;
        let slots = state.slots(client);
        let discovered = slots.inbound.len() as u64;
        while let Some(payload) = slots.inbound.pop_back() {
            slots.pending.push_front(payload);
        }
        let ttl = per_task_timeout * discovered as u32 + Duration::from_secs(1);
        state.locks.insert(client.get(), Instant::now() + ttl);
        Ok(discovered)
    }

    async fn peek_in_flight(&self, client: ClientId) -> Result<Option<String>> {
        let mut state = self.state.lock().await;
        Ok(state.slots(client).in_flight.front().cloned())
    }

    async fn redeliver(&self, client: ClientId, payload: String) -> Result<()> {
        let mut state = self.state.lock().await;
        let slots = state.slots(client);
        slots.pending.push_back(payload);
        slots.in_flight.pop_front();
        Ok(())
    }

    async fn dead_letter(&self, client: ClientId, payload: String) -> Result<()> {
        let mut state = self.state.lock().await;
        let slots = state.slots(client);
        slots.dead.push(payload);
        slots.in_flight.pop_front();
        Ok(())
    }

    async fn dequeue_to_in_flight(&self, client: ClientId) -> Result<Option<String>> {
        let mut state = self.state.lock().await;
        let slots = state.slots(client);
        let Some(payload) = slots.pending.pop_back() else {
            return Ok(None);
        };
        slots.in_flight.push_front(payload.clone());
        Ok(Some(payload))
    }

    async fn ack(&self, client: ClientId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.slots(client).in_flight.pop_front();
        Ok(())
    }

    async fn release_lock(&self, client: ClientId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.locks.remove(&client.get());
        Ok(())
    }

    async fn queue_depths(&self, client: ClientId) -> Result<QueueDepths> {
        let mut state = self.state.lock().await;
        let slots = state.slots(client);
        Ok(QueueDepths {
            inbound: slots.inbound.len() as u64,
            pending: slots.pending.len() as u64,
            in_flight: slots.in_flight.len() as u64,
        })
    }

    async fn remove_waiting(&self, client: ClientId) -> Result<()> {
        let mut state = self.state.lock().await;
        state.waiting.remove(&client.get());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(id: u32) -> ClientId {
        ClientId::new(id).unwrap()
    }

    #[tokio::test]
    async fn lock_is_exclusive_until_released() {
        let store = MemoryStore::new();
        let c = client(1);
        let ttl = Duration::from_secs(10);

        assert!(store.try_lock(c, ttl).await.unwrap());
        assert!(!store.try_lock(c, ttl).await.unwrap());

        store.release_lock(c).await.unwrap();
        assert!(store.try_lock(c, ttl).await.unwrap());
    }

    #[tokio::test]
    async fn expired_lock_is_reacquirable() {
        let store = MemoryStore::new();
        let c = client(1);

        assert!(store.try_lock(c, Duration::from_secs(10)).await.unwrap());
        store.expire_lock(c).await;
        assert!(store.try_lock(c, Duration::from_secs(10)).await.unwrap());
    }

    #[tokio::test]
    async fn migration_preserves_fifo_order() {
        let store = MemoryStore::new();
        let c = client(7);

        store
            .enqueue(c, vec!["a".into(), "b".into(), "c".into()])
            .await
            .unwrap();
        let moved = store
            .migrate_inbound(c, Duration::from_secs(1))
            .await
            .unwrap();
        assert_eq!(moved, 3);

        let mut order = Vec::new();
        while let Some(payload) = store.dequeue_to_in_flight(c).await.unwrap() {
            order.push(payload);
            store.ack(c).await.unwrap();
        }
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[tokio::test]
    async fn redelivered_task_is_consumed_first() {
        let store = MemoryStore::new();
        let c = client(7);

        store
            .enqueue(c, vec!["old".into(), "newer".into()])
            .await
            .unwrap();
        store
            .migrate_inbound(c, Duration::from_secs(1))
            .await
            .unwrap();
        store.redeliver(c, "recovered".into()).await.unwrap();

        let first = store.dequeue_to_in_flight(c).await.unwrap().unwrap();
        assert_eq!(first, "recovered");
    }

    #[tokio::test]
    async fn release_of_missing_lock_is_idempotent() {
        let store = MemoryStore::new();
        store.release_lock(client(9)).await.unwrap();
        store.release_lock(client(9)).await.unwrap();
    }
}
