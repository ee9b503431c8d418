mod queue;
mod queue_item;

pub use queue::*;
pub use queue_item::*;
