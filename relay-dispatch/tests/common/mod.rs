use async_trait::async_trait;
use relay_core::{Message, Queue, QueueError, ReceiptToken};
use relay_dispatch::{MemoryQueue, QueueOptions};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

/// Creates a queue with short lease and poll times
pub fn fast_queue(name: &str, visibility_ms: u64) -> MemoryQueue {
    MemoryQueue::new(
        name,
        QueueOptions {
            visibility_timeout: Duration::from_millis(visibility_ms),
            wait_time: Duration::from_millis(100),
            ..QueueOptions::default()
        },
    )
}

/// Queue wrapper that rejects the first `failures` enqueues
pub struct FlakyQueue {
    inner: MemoryQueue,
    failures: AtomicUsize,
}

impl FlakyQueue {
    pub fn new(inner: MemoryQueue, failures: usize) -> Self {
        FlakyQueue {
            inner,
            failures: AtomicUsize::new(failures),
        }
    }

    #[allow(dead_code)]
    pub fn remaining_failures(&self) -> usize {
        self.failures.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Queue for FlakyQueue {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn visibility_timeout(&self) -> Duration {
        self.inner.visibility_timeout()
    }

    async fn enqueue(&self, body: Vec<u8>) -> Result<String, QueueError> {
        let failed = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failed {
            return Err(QueueError::Unavailable(self.name().to_string()));
        }
        self.inner.enqueue(body).await
    }

    async fn receive(&self, max_batch: usize) -> Result<Vec<Message>, QueueError> {
        self.inner.receive(max_batch).await
    }

    async fn acknowledge(&self, receipt: &ReceiptToken) -> Result<(), QueueError> {
        self.inner.acknowledge(receipt).await
    }
}

/// Waits for a condition to be true with timeout
pub async fn wait_for_condition<F, Fut>(mut condition: F, timeout_ms: u64) -> bool
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = bool>,
{
    let start = std::time::Instant::now();
    let timeout = Duration::from_millis(timeout_ms);

    while start.elapsed() < timeout {
        if condition().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    false
}
