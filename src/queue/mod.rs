mod correspondent_queue;
mod manager;

pub use correspondent_queue::CorrespondentQueue;
pub use manager::{QueueCallback, QueueManager};
