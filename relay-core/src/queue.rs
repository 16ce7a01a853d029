use async_trait::async_trait;
use std::time::Duration;

use crate::errors::QueueError;
use crate::message::{Message, ReceiptToken};

/// Durable at-least-once delivery channel.
///
/// A received message is leased to its receiver for `visibility_timeout`.
/// Unless acknowledged before the lease runs out it becomes receivable again;
/// redelivery after lease expiry is the only retry mechanism the pipeline has.
#[async_trait]
pub trait Queue: Send + Sync + 'static {
    fn name(&self) -> &str;

    fn visibility_timeout(&self) -> Duration;

    /// Append a message, returns its message id.
    async fn enqueue(&self, body: Vec<u8>) -> Result<String, QueueError>;

    /// Lease up to `max_batch` messages that are not currently leased.
    /// May wait for messages to arrive; an empty batch is not an error.
    async fn receive(&self, max_batch: usize) -> Result<Vec<Message>, QueueError>;

    /// Permanently remove a leased message.
    async fn acknowledge(&self, receipt: &ReceiptToken) -> Result<(), QueueError>;
}
