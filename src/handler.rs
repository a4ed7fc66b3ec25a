//! Task handler seam.
//!
//! The queue delivers each task synchronously to a handler and interprets
//! the returned result: Ok acknowledges the task, Err leaves it in the
//! in-flight slot for crash-recovered redelivery.

use async_trait::async_trait;
use tracing::info;

use crate::model::Task;

#[async_trait]
pub trait TaskHandler: Send + Sync + 'static {
    async fn handle(&self, task: &Task) -> anyhow::Result<()>;
}

/// Reference handler: logs the task. Stand-in for a real business action.
pub struct LogHandler;

#[async_trait]
impl TaskHandler for LogHandler {
    async fn handle(&self, task: &Task) -> anyhow::Result<()> {
        info!(
            client_id = %task.client_id,
            message = %task.message,
            "processing task"
        );
        Ok(())
    }
}
