#[cfg(test)]
use crate::memory_queue::{MemoryQueue, QueueDepth, QueueOptions, RedrivePolicy};
#[cfg(test)]
use async_trait::async_trait;
#[cfg(test)]
use relay_core::{Message, Queue, QueueError, ReceiptToken};
#[cfg(test)]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(test)]
use std::sync::Arc;
#[cfg(test)]
use std::time::Duration;
#[cfg(test)]
use tokio::time::Instant;

/// Queue that returns immediately from an empty receive
#[cfg(test)]
fn short_poll_queue(name: &str, visibility_secs: u64) -> MemoryQueue {
    MemoryQueue::new(
        name,
        QueueOptions {
            visibility_timeout: Duration::from_secs(visibility_secs),
            wait_time: Duration::ZERO,
            ..QueueOptions::default()
        },
    )
}

/// Enqueue, receive and acknowledge a single message
/// Verifies the message body and delivery count on first receipt
/// and that an acknowledged message never comes back
#[tokio::test(start_paused = true)]
async fn test_receive_and_acknowledge() {
    let queue = short_poll_queue("copy", 50);
    let id = queue.enqueue(b"hello".to_vec()).await.unwrap();

    let batch = queue.receive(1).await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].message_id, id);
    assert_eq!(batch[0].body, b"hello");
    assert_eq!(batch[0].delivery_count, 1);

    queue.acknowledge(&batch[0].receipt).await.unwrap();
    assert_eq!(
        queue.depth().await,
        QueueDepth {
            visible: 0,
            in_flight: 0
        }
    );

    tokio::time::advance(Duration::from_secs(120)).await;
    assert!(queue.receive(1).await.unwrap().is_empty());
}

/// A leased message stays hidden until its visibility timeout elapses,
/// then it is redelivered exactly once per timeout with a higher delivery count
#[tokio::test(start_paused = true)]
async fn test_lease_expiry_redelivers_once() {
    let queue = short_poll_queue("copy", 50);
    let id = queue.enqueue(b"job".to_vec()).await.unwrap();

    let first = queue.receive(1).await.unwrap();
    assert_eq!(first.len(), 1);

    // still leased
    tokio::time::advance(Duration::from_secs(49)).await;
    assert!(queue.receive(1).await.unwrap().is_empty());

    tokio::time::advance(Duration::from_secs(1)).await;
    let second = queue.receive(10).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].message_id, id);
    assert_eq!(second[0].delivery_count, 2);
    assert_ne!(second[0].receipt, first[0].receipt);

    // only one copy is in flight
    assert!(queue.receive(10).await.unwrap().is_empty());
    assert_eq!(
        queue.depth().await,
        QueueDepth {
            visible: 0,
            in_flight: 1
        }
    );

    // the first lease was reclaimed so its receipt is stale
    let stale = queue.acknowledge(&first[0].receipt).await;
    assert!(matches!(stale, Err(QueueError::InvalidReceipt(_))));
    queue.acknowledge(&second[0].receipt).await.unwrap();
}

/// Acknowledging with an unknown receipt or acknowledging twice fails
#[tokio::test(start_paused = true)]
async fn test_invalid_receipt() {
    let queue = short_poll_queue("log", 50);
    queue.enqueue(b"a".to_vec()).await.unwrap();
    let batch = queue.receive(1).await.unwrap();

    let unknown = queue.acknowledge(&ReceiptToken::from("nope")).await;
    assert!(matches!(unknown, Err(QueueError::InvalidReceipt(_))));

    queue.acknowledge(&batch[0].receipt).await.unwrap();
    let twice = queue.acknowledge(&batch[0].receipt).await;
    assert!(matches!(twice, Err(QueueError::InvalidReceipt(_))));
}

/// A lease that ran out but has not been reclaimed by another receive can
/// still be acknowledged by its holder
#[tokio::test(start_paused = true)]
async fn test_late_ack_before_reclaim() {
    let queue = short_poll_queue("clean", 50);
    queue.enqueue(b"late".to_vec()).await.unwrap();
    let batch = queue.receive(1).await.unwrap();

    tokio::time::advance(Duration::from_secs(60)).await;
    queue.acknowledge(&batch[0].receipt).await.unwrap();
    assert!(queue.receive(1).await.unwrap().is_empty());
}

/// Receive never returns more than the requested batch and keeps FIFO order
#[tokio::test(start_paused = true)]
async fn test_batch_limit() {
    let queue = short_poll_queue("copy", 50);
    for body in ["1", "2", "3"] {
        queue.enqueue(body.as_bytes().to_vec()).await.unwrap();
    }

    let first = queue.receive(2).await.unwrap();
    assert_eq!(first.len(), 2);
    assert_eq!(first[0].body, b"1");
    assert_eq!(first[1].body, b"2");

    let second = queue.receive(2).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].body, b"3");

    // zero is treated as one
    queue.enqueue(b"4".to_vec()).await.unwrap();
    assert_eq!(queue.receive(0).await.unwrap().len(), 1);
}

/// A message received max_receive_count times without acknowledgment
/// is moved to the dead-letter queue instead of being leased again
#[tokio::test(start_paused = true)]
async fn test_redrive_to_dead_letter() {
    let dlq = Arc::new(short_poll_queue("copy-dlq", 50));
    let queue = MemoryQueue::new(
        "copy",
        QueueOptions {
            visibility_timeout: Duration::from_secs(50),
            wait_time: Duration::ZERO,
            redrive: Some(RedrivePolicy {
                max_receive_count: 2,
                dead_letter: dlq.clone(),
            }),
            ..QueueOptions::default()
        },
    );
    queue.enqueue(b"poison".to_vec()).await.unwrap();

    for expected_count in 1..=2 {
        let batch = queue.receive(1).await.unwrap();
        assert_eq!(batch.len(), 1);
        assert_eq!(batch[0].delivery_count, expected_count);
        tokio::time::advance(Duration::from_secs(50)).await;
    }

    assert!(queue.receive(1).await.unwrap().is_empty());
    assert_eq!(
        queue.depth().await,
        QueueDepth {
            visible: 0,
            in_flight: 0
        }
    );

    let dead = dlq.receive(1).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].body, b"poison");
    assert_eq!(dead[0].delivery_count, 1);
}

/// Dead-letter queue whose enqueue hangs while `stalled` is set
#[cfg(test)]
struct StalledQueue {
    inner: MemoryQueue,
    stalled: AtomicBool,
}

#[cfg(test)]
#[async_trait]
impl Queue for StalledQueue {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn visibility_timeout(&self) -> Duration {
        self.inner.visibility_timeout()
    }

    async fn enqueue(&self, body: Vec<u8>) -> Result<String, QueueError> {
        if self.stalled.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
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

/// A receive dropped while moving a message to the dead-letter queue
/// leaves the message in the source queue for the next receive
#[tokio::test(start_paused = true)]
async fn test_dropped_receive_keeps_exhausted_message() {
    let dlq = Arc::new(StalledQueue {
        inner: short_poll_queue("copy-dlq", 50),
        stalled: AtomicBool::new(true),
    });
    let queue = MemoryQueue::new(
        "copy",
        QueueOptions {
            visibility_timeout: Duration::from_secs(50),
            wait_time: Duration::ZERO,
            redrive: Some(RedrivePolicy {
                max_receive_count: 1,
                dead_letter: dlq.clone(),
            }),
            ..QueueOptions::default()
        },
    );
    queue.enqueue(b"poison".to_vec()).await.unwrap();
    assert_eq!(queue.receive(1).await.unwrap().len(), 1);
    tokio::time::advance(Duration::from_secs(50)).await;

    let dropped = tokio::time::timeout(Duration::from_secs(1), queue.receive(1)).await;
    assert!(dropped.is_err(), "receive should hang on the stalled dead-letter queue");
    assert_eq!(
        queue.depth().await,
        QueueDepth {
            visible: 1,
            in_flight: 0
        }
    );

    dlq.stalled.store(false, Ordering::SeqCst);
    assert!(queue.receive(1).await.unwrap().is_empty());
    assert_eq!(queue.depth().await.visible, 0);
    let dead = dlq.receive(1).await.unwrap();
    assert_eq!(dead.len(), 1);
    assert_eq!(dead[0].body, b"poison");
}

/// Messages that sit in the queue longer than the retention period are dropped
#[tokio::test(start_paused = true)]
async fn test_retention_discards_old_messages() {
    let queue = MemoryQueue::new(
        "copy",
        QueueOptions {
            wait_time: Duration::ZERO,
            retention: Duration::from_secs(10),
            ..QueueOptions::default()
        },
    );
    queue.enqueue(b"old".to_vec()).await.unwrap();
    tokio::time::advance(Duration::from_secs(11)).await;
    queue.enqueue(b"new".to_vec()).await.unwrap();

    let batch = queue.receive(10).await.unwrap();
    assert_eq!(batch.len(), 1);
    assert_eq!(batch[0].body, b"new");
}

/// A long-polling receive wakes up as soon as a message is enqueued
#[tokio::test(start_paused = true)]
async fn test_long_poll_wakes_on_enqueue() {
    let queue = Arc::new(MemoryQueue::new("copy", QueueOptions::default()));
    let started = Instant::now();

    let receiver = {
        let queue = queue.clone();
        tokio::spawn(async move { queue.receive(1).await })
    };
    tokio::task::yield_now().await;

    queue.enqueue(b"wake".to_vec()).await.unwrap();
    let batch = receiver.await.unwrap().unwrap();

    assert_eq!(batch.len(), 1);
    assert!(started.elapsed() < QueueOptions::default().wait_time);
}

/// A long-polling receive on an empty queue returns an empty batch after wait_time
#[tokio::test(start_paused = true)]
async fn test_long_poll_times_out_empty() {
    let queue = MemoryQueue::new(
        "copy",
        QueueOptions {
            wait_time: Duration::from_secs(5),
            ..QueueOptions::default()
        },
    );
    let started = Instant::now();
    let batch = queue.receive(1).await.unwrap();
    assert!(batch.is_empty());
    assert!(started.elapsed() >= Duration::from_secs(5));
}

/// A long-polling receive picks up a message whose lease expires while waiting
#[tokio::test(start_paused = true)]
async fn test_long_poll_sees_lease_expiry() {
    let queue = MemoryQueue::new(
        "copy",
        QueueOptions {
            visibility_timeout: Duration::from_secs(3),
            wait_time: Duration::from_secs(10),
            ..QueueOptions::default()
        },
    );
    queue.enqueue(b"retry".to_vec()).await.unwrap();
    let first = queue.receive(1).await.unwrap();
    assert_eq!(first.len(), 1);

    let started = Instant::now();
    let second = queue.receive(1).await.unwrap();
    assert_eq!(second.len(), 1);
    assert_eq!(second[0].delivery_count, 2);
    assert!(started.elapsed() >= Duration::from_secs(3));
    assert!(started.elapsed() < Duration::from_secs(10));
}
