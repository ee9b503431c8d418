mod creator_queue;

pub use creator_queue::*;
