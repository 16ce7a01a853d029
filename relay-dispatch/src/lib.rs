mod errors;
pub use errors::{DispatchError, Result};

pub mod dispatch_metrics;

mod retry_policy;
pub use retry_policy::RetryPolicy;

mod memory_queue;
pub use memory_queue::{MemoryQueue, QueueDepth, QueueOptions, RedrivePolicy};

mod topic;
pub use topic::Topic;

#[cfg(test)]
mod memory_queue_test;
