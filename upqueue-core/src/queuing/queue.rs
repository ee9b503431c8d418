use std::error::Error;

use async_trait::async_trait;
use thiserror::Error;

use crate::QueueItem;

#[derive(Debug, Error)]
pub enum QueueError {
    /// The store behind the queue failed, and the operation may succeed if retried
    #[error("Queue store failed: {0}")]
    Store(Box<dyn Error + Send + Sync>),
}

/// The result of retiring an item from a queue
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetireOutcome {
    /// The item was removed by this call
    Retired,
    /// The item was already gone, for example because another advance removed it first
    AlreadyGone,
}

/// Represents a type that acts as a consumable, ranked queue.
#[async_trait]
pub trait Queue
where
    Self: Send + Sync + 'static,
{
    type Item: QueueItem;

    /// Returns a fresh snapshot of the queue in play order.
    async fn ranked(&self) -> Result<Vec<Self::Item>, QueueError>;

    /// Removes an item permanently, so it can't be played again.
    ///
    /// Implementors are expected to treat a missing item as [RetireOutcome::AlreadyGone].
    async fn retire(&self, id: <Self::Item as QueueItem>::Id) -> Result<RetireOutcome, QueueError>;
}
