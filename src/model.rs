//! Core data model.
//!
//! A task is a single message owned by exactly one client. Tasks are
//! immutable once created; ordering within a client's stream is FIFO.
//! On the wire a task travels as a small versioned JSON envelope so the
//! queue format is not coupled to any language's native serialization.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Current wire envelope version.
pub const WIRE_VERSION: u8 = 1;

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Newtype for client (tenant) identifiers. Always ≥ 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientId(u32);

impl ClientId {
    /// Construct a client id, rejecting zero at the boundary.
    pub fn new(id: u32) -> Result<Self> {
        if id < 1 {
            return Err(Error::InvalidInput(
                "client id must be a positive integer".to_string(),
            ));
        }
        Ok(Self(id))
    }

    pub fn get(&self) -> u32 {
        self.0
    }
}

impl std::fmt::Display for ClientId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Task
// ---------------------------------------------------------------------------

/// A unit of work for one client, as seen by handlers.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Task {
    pub client_id: ClientId,
    pub message: String,
}

/// Wire envelope for a queued task.
///
/// `redeliveries` counts crash-recovery redeliveries; it is bumped each time
/// a worker finds the task abandoned in the in-flight slot and is the basis
/// for the dead-letter cutoff.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskEnvelope {
    /// Wire format version; payloads with an unknown version are rejected.
    pub v: u8,
    pub client_id: ClientId,
    pub message: String,
    #[serde(default)]
    pub redeliveries: u32,
}

impl TaskEnvelope {
    pub fn new(client_id: ClientId, message: impl Into<String>) -> Self {
        Self {
            v: WIRE_VERSION,
            client_id,
            message: message.into(),
            redeliveries: 0,
        }
    }

    /// Serialize for the store.
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Deserialize from the store, rejecting unknown versions.
    pub fn decode(payload: &str) -> Result<Self> {
        let envelope: TaskEnvelope = serde_json::from_str(payload)?;
        if envelope.v != WIRE_VERSION {
            return Err(Error::Other(format!(
                "unsupported wire version {}",
                envelope.v
            )));
        }
        Ok(envelope)
    }

    /// The handler-facing view of this envelope.
    pub fn task(&self) -> Task {
        Task {
            client_id: self.client_id,
            message: self.message.clone(),
        }
    }
}
