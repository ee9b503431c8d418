use std::fmt::Debug;
use std::hash::Hash;

use crate::Rankable;

/// Represents an item in a queue.
pub trait QueueItem
where
    Self: Rankable + Clone + Debug + Send + Sync + 'static,
{
    /// The identifier used to retire the item.
    type Id: Copy + Eq + Hash + Debug + Send + Sync + 'static;

    /// Returns an id that is used to identify the item in the queue's store
    fn item_id(&self) -> Self::Id;
}
