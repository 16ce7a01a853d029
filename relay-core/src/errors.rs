use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Object not found: {0}")]
    NotFound(String),

    #[error("Storage backend error: {0}")]
    Backend(String),

    #[error("Invalid store configuration: {0}")]
    InvalidConfig(String),
}

#[derive(Error, Debug)]
pub enum QueueError {
    /// The receipt does not match any message currently leased by this queue,
    /// either because it was already acknowledged or because its lease expired.
    #[error("Invalid or expired receipt: {0}")]
    InvalidReceipt(String),

    #[error("Queue {0} is unavailable")]
    Unavailable(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
