//! Redis adapter.
//!
//! One `RedisStore` per worker: the WATCH/MULTI migration transaction needs
//! an exclusive connection, so workers never share a store instance. Before
//! each operation group the connection is probed with PING and transparently
//! re-established if dead, mirroring the reconnect-and-resume contract —
//! callers see reconnect failures as retryable store errors.

use std::time::Duration;

use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use tokio::sync::Mutex;

use crate::error::Result;
use crate::model::ClientId;

use super::{
    QueueDepths, Store, WAITING_SET, dead_key, in_flight_key, inbound_key, lock_key, pending_key,
};

pub struct RedisStore {
    client: redis::Client,
    conn: Mutex<Option<MultiplexedConnection>>,
}

impl RedisStore {
    /// Create a store for the given Redis URL. No I/O happens until the
    /// first operation.
    pub fn connect(url: &str) -> Result<Self> {
        Ok(Self {
            client: redis::Client::open(url)?,
            conn: Mutex::new(None),
        })
    }

    /// Liveness-probe the cached connection, reconnecting if it is gone.
    async fn conn(&self) -> Result<MultiplexedConnection> {
        let mut slot = self.conn.lock().await;

        if let Some(conn) = slot.as_ref() {
            let mut probe = conn.clone();
            let alive: redis::RedisResult<String> =
                redis::cmd("PING").query_async(&mut probe).await;
            if alive.is_ok() {
                return Ok(probe);
            }
        }

        let fresh = self.client.get_multiplexed_async_connection().await?;
        *slot = Some(fresh.clone());
        Ok(fresh)
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn enqueue(&self, client: ClientId, payloads: Vec<String>) -> Result<()> {
        let mut conn = self.conn().await?;
        let inbound = inbound_key(client);

        let mut pipe = redis::pipe();
        for payload in &payloads {
            pipe.lpush(&inbound, payload).ignore();
        }
        pipe.sadd(WAITING_SET, client.get()).ignore();
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn random_waiting_client(&self) -> Result<Option<ClientId>> {
        let mut conn = self.conn().await?;
        let member: Option<u32> = conn.srandmember(WAITING_SET).await?;
        // Ids in the set came through the producer boundary, so zero cannot occur.
        Ok(member.and_then(|id| ClientId::new(id).ok()))
    }

    async fn try_lock(&self, client: ClientId, ttl: Duration) -> Result<bool> {
        let mut conn = self.conn().await?;
        let acquired: Option<String> = redis::cmd("SET")
            .arg(lock_key(client))
            .arg(1)
            .arg("NX")
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async(&mut conn)
            .await?;
        Ok(acquired.is_some())
    }

    async fn migrate_inbound(&self, client: ClientId, per_task_timeout: Duration) -> Result<u64> {
        let mut conn = self.conn().await?;
        let inbound = inbound_key(client);
        let pending = pending_key(client);
        let lock = lock_key(client);

        loop {
            // WATCH the inbound queue so a concurrent enqueue aborts the
            // transaction; the loop then retries with a fresh snapshot.
            redis::cmd("WATCH")
                .arg(&inbound)
                .query_async::<_, ()>(&mut conn)
                .await?;
            let discovered: u64 = conn.llen(&inbound).await?;

            let ttl = discovered * per_task_timeout.as_secs() + 1;
            let mut pipe = redis::pipe();
            pipe.atomic();
            pipe.expire(&lock, ttl as i64).ignore();
            for _ in 0..discovered {
                pipe.cmd("LMOVE")
                    .arg(&inbound)
                    .arg(&pending)
                    .arg("RIGHT")
                    .arg("LEFT")
                    .ignore();
            }

            // EXEC returns nil when the watched key changed.
            let committed: Option<()> = pipe.query_async(&mut conn).await?;
            if committed.is_some() {
                return Ok(discovered);
            }
        }
    }

    async fn peek_in_flight(&self, client: ClientId) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        let payload: Option<String> = conn.lindex(in_flight_key(client), 0).await?;
        Ok(payload)
    }

    async fn redeliver(&self, client: ClientId, payload: String) -> Result<()> {
        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        // RPUSH puts the task at pending's consuming end: redelivered next.
        pipe.rpush(pending_key(client), payload).ignore();
        pipe.lpop(in_flight_key(client), None).ignore();
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn dead_letter(&self, client: ClientId, payload: String) -> Result<()> {
        let mut conn = self.conn().await?;
        let mut pipe = redis::pipe();
        pipe.atomic();
        pipe.lpush(dead_key(client), payload).ignore();
        pipe.lpop(in_flight_key(client), None).ignore();
        pipe.query_async::<_, ()>(&mut conn).await?;
        Ok(())
    }

    async fn dequeue_to_in_flight(&self, client: ClientId) -> Result<Option<String>> {
        let mut conn = self.conn().await?;
        let payload: Option<String> = redis::cmd("LMOVE")
            .arg(pending_key(client))
            .arg(in_flight_key(client))
            .arg("RIGHT")
            .arg("LEFT")
            .query_async(&mut conn)
            .await?;
        Ok(payload)
    }

    async fn ack(&self, client: ClientId) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: Option<String> = conn.lpop(in_flight_key(client), None).await?;
        Ok(())
    }

    async fn release_lock(&self, client: ClientId) -> Result<()> {
        let mut conn = self.conn().await?;
        // DEL of a missing (already expired) key is a no-op, not an error.
        let _: u64 = conn.del(lock_key(client)).await?;
        Ok(())
    }

    async fn queue_depths(&self, client: ClientId) -> Result<QueueDepths> {
        let mut conn = self.conn().await?;
        let (inbound, pending, in_flight): (u64, u64, u64) = redis::pipe()
            .llen(inbound_key(client))
            .llen(pending_key(client))
            .llen(in_flight_key(client))
            .query_async(&mut conn)
            .await?;
        Ok(QueueDepths {
            inbound,
            pending,
            in_flight,
        })
    }

    async fn remove_waiting(&self, client: ClientId) -> Result<()> {
        let mut conn = self.conn().await?;
        let _: u64 = conn.srem(WAITING_SET, client.get()).await?;
        Ok(())
    }
}
