use relay_core::QueueError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, DispatchError>;

#[derive(Debug, Error)]
pub enum DispatchError {
    #[error("Queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Subscription already exists: {0}")]
    SubscriptionExists(String),

    #[error("Subscription not found: {0}")]
    SubscriptionNotFound(String),
}
