//! Producer boundary: validates and enqueues ordered task batches.

use tracing::debug;

use crate::error::{Error, Result};
use crate::model::{ClientId, TaskEnvelope};
use crate::store::Store;

/// Appends ordered tasks to a client's inbound queue and registers the
/// client as having pending work.
pub struct Producer<S: Store> {
    store: S,
}

impl<S: Store> Producer<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    /// Enqueue `messages` for `client_id`, preserving order.
    ///
    /// The whole batch goes out in one pipelined round trip. It is not
    /// atomic: a worker holding the client's lock may see part of the batch
    /// and will pick up the rest on the client's next lock cycle.
    pub async fn enqueue(&self, client_id: u32, messages: Vec<String>) -> Result<()> {
        let client = ClientId::new(client_id)?;
        if messages.is_empty() {
            return Err(Error::InvalidInput(
                "at least one task is required".to_string(),
            ));
        }

        let count = messages.len();
        let payloads = messages
            .into_iter()
            .map(|message| TaskEnvelope::new(client, message).encode())
            .collect::<Result<Vec<_>>>()?;

        self.store.enqueue(client, payloads).await?;
        debug!(client_id = %client, count, "enqueued tasks");
        Ok(())
    }
}
