use async_trait::async_trait;
use uuid::Uuid;

use crate::error::Result;

/// Best-effort, at-most-once FIFO channel carrying task identifiers from
/// producers (the dispatcher, retrying workers, the poller) to consumers
/// (workers). Never durable, never ordered across producers, never deduped.
/// Receiving an id grants no right to the task; the consumer still has to
/// `claim` it through the `TaskStore`.
#[async_trait]
pub trait NotifyBus: Send + Sync {
    /// Non-blocking. Loss is acceptable and expected under load or when the
    /// underlying substrate is unavailable.
    async fn publish(&self, id: Uuid) -> Result<()>;

    /// Blocks until an id is available or the bus is shut down, in which
    /// case it returns `Ok(None)` so callers can fall back to polling
    /// instead of treating bus unavailability as fatal.
    async fn consume(&self) -> Result<Option<Uuid>>;
}
