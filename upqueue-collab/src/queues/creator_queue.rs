use std::sync::Arc;

use async_trait::async_trait;
use upqueue_core::{rank, Queue, QueueError, RetireOutcome};

use crate::{Database, DatabaseError, ItemFilter, PrimaryKey, QueueItemData};

/// The queue of items submitted to one creator, ordered by votes.
pub struct CreatorQueue {
    db: Arc<dyn Database>,
    creator_id: PrimaryKey,
}

impl CreatorQueue {
    pub fn new(db: Arc<dyn Database>, creator_id: PrimaryKey) -> Self {
        Self { db, creator_id }
    }

    pub fn creator_id(&self) -> PrimaryKey {
        self.creator_id
    }
}

#[async_trait]
impl Queue for CreatorQueue {
    type Item = QueueItemData;

    async fn ranked(&self) -> Result<Vec<QueueItemData>, QueueError> {
        let items = self
            .db
            .list_items(ItemFilter::creator(self.creator_id))
            .await
            .map_err(|e| QueueError::Store(Box::new(e)))?;

        Ok(rank(items))
    }

    async fn retire(&self, id: PrimaryKey) -> Result<RetireOutcome, QueueError> {
        // Retiring happens on behalf of the creator, who owns every item in the queue
        match self.db.delete_item(id, self.creator_id).await {
            Ok(()) => Ok(RetireOutcome::Retired),
            Err(DatabaseError::NotFound { .. }) => Ok(RetireOutcome::AlreadyGone),
            Err(e) => Err(QueueError::Store(Box::new(e))),
        }
    }
}
