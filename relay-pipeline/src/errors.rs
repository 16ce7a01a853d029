use relay_core::{QueueError, StoreError};
use relay_dispatch::DispatchError;
use relay_metrics::MetricsError;
use std::time::Duration;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, WorkerError>;

/// Failure of one handler invocation. Any error leaves the message
/// unacknowledged so the queue redelivers it after the visibility timeout.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Dispatch error: {0}")]
    Dispatch(#[from] DispatchError),

    #[error("Log sink error: {0}")]
    Metrics(#[from] MetricsError),

    #[error("Malformed message: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("Handler exceeded its deadline of {0:?}")]
    Timeout(Duration),

    #[error("Cleanup incomplete: {failed} of {total} deletes failed")]
    CleanupIncomplete { failed: usize, total: usize },
}
