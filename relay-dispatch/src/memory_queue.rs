use async_trait::async_trait;
use metrics::{counter, gauge};
use relay_core::{now_millis, Message, Queue, QueueError, ReceiptToken};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::dispatch_metrics::{
    QUEUE_IN_FLIGHT_MESSAGES, QUEUE_MESSAGES_ACKED_TOTAL, QUEUE_MESSAGES_DEAD_LETTERED_TOTAL,
    QUEUE_MESSAGES_ENQUEUED_TOTAL, QUEUE_MESSAGES_EXPIRED_TOTAL, QUEUE_MESSAGES_RECEIVED_TOTAL,
    QUEUE_MESSAGES_REDELIVERED_TOTAL, QUEUE_VISIBLE_MESSAGES,
};

/// Move a message to `dead_letter` once it has been received
/// `max_receive_count` times without acknowledgment. Zero disables redrive.
#[derive(Clone)]
pub struct RedrivePolicy {
    pub max_receive_count: u32,
    pub dead_letter: Arc<dyn Queue>,
}

impl fmt::Debug for RedrivePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedrivePolicy")
            .field("max_receive_count", &self.max_receive_count)
            .field("dead_letter", &self.dead_letter.name())
            .finish()
    }
}

#[derive(Debug, Clone)]
pub struct QueueOptions {
    /// How long a received message stays hidden from other receivers
    pub visibility_timeout: Duration,
    /// Long-poll: how long `receive` waits for a message before returning empty
    pub wait_time: Duration,
    /// Messages older than this are discarded
    pub retention: Duration,
    pub redrive: Option<RedrivePolicy>,
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self {
            visibility_timeout: Duration::from_secs(50),
            wait_time: Duration::from_secs(20),
            retention: Duration::from_secs(4 * 24 * 60 * 60),
            redrive: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueDepth {
    pub visible: usize,
    pub in_flight: usize,
}

#[derive(Debug)]
struct StoredMessage {
    message_id: String,
    body: Vec<u8>,
    delivery_count: u32,
    sent_at: u64,
    enqueued_at: Instant,
}

#[derive(Debug)]
struct Lease {
    message: StoredMessage,
    expires_at: Instant,
}

#[derive(Debug, Default)]
struct QueueState {
    ready: VecDeque<StoredMessage>,
    leased: HashMap<ReceiptToken, Lease>,
}

impl QueueState {
    /// Return every message whose lease ran out to the ready list.
    fn reclaim_expired(&mut self, now: Instant, queue_name: &str) {
        let expired: Vec<ReceiptToken> = self
            .leased
            .iter()
            .filter(|(_, lease)| lease.expires_at <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();
        for receipt in expired {
            if let Some(lease) = self.leased.remove(&receipt) {
                trace!(
                    queue = queue_name,
                    message_id = %lease.message.message_id,
                    delivery_count = lease.message.delivery_count,
                    "lease expired, message is receivable again"
                );
                counter!(QUEUE_MESSAGES_REDELIVERED_TOTAL.name, "queue" => queue_name.to_string())
                    .increment(1);
                self.ready.push_back(lease.message);
            }
        }
    }

    fn discard_retention_expired(&mut self, now: Instant, retention: Duration, queue_name: &str) {
        let before = self.ready.len();
        self.ready
            .retain(|m| now.duration_since(m.enqueued_at) <= retention);
        let dropped = before - self.ready.len();
        if dropped > 0 {
            warn!(
                queue = queue_name,
                dropped, "discarded messages past the retention period"
            );
            counter!(QUEUE_MESSAGES_EXPIRED_TOTAL.name, "queue" => queue_name.to_string())
                .increment(dropped as u64);
        }
    }

    fn next_expiry(&self) -> Option<Instant> {
        self.leased.values().map(|l| l.expires_at).min()
    }

    fn depth(&self) -> QueueDepth {
        QueueDepth {
            visible: self.ready.len(),
            in_flight: self.leased.len(),
        }
    }
}

/// In-process lease-based queue.
///
/// A message is leased to exactly one receiver at a time. If the receipt is
/// not acknowledged before `visibility_timeout` elapses the message returns to
/// the ready list and is handed to the next receiver with its delivery count
/// incremented.
pub struct MemoryQueue {
    name: String,
    options: QueueOptions,
    state: Mutex<QueueState>,
    // woken on enqueue
    available: Notify,
}

impl fmt::Debug for MemoryQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MemoryQueue")
            .field("name", &self.name)
            .field("options", &self.options)
            .finish()
    }
}

impl MemoryQueue {
    pub fn new(name: &str, options: QueueOptions) -> Self {
        MemoryQueue {
            name: name.to_string(),
            options,
            state: Mutex::new(QueueState::default()),
            available: Notify::new(),
        }
    }

    pub fn options(&self) -> &QueueOptions {
        &self.options
    }

    pub async fn depth(&self) -> QueueDepth {
        let mut state = self.state.lock().await;
        state.reclaim_expired(Instant::now(), &self.name);
        state.depth()
    }

    fn record_depth(&self, depth: QueueDepth) {
        gauge!(QUEUE_VISIBLE_MESSAGES.name, "queue" => self.name.clone()).set(depth.visible as f64);
        gauge!(QUEUE_IN_FLIGHT_MESSAGES.name, "queue" => self.name.clone())
            .set(depth.in_flight as f64);
    }

    /// The redrive policy when `message` has used up its receives.
    fn exhausted_policy(&self, message: &StoredMessage) -> Option<&RedrivePolicy> {
        self.options.redrive.as_ref().filter(|policy| {
            policy.max_receive_count > 0 && message.delivery_count >= policy.max_receive_count
        })
    }
}

#[async_trait]
impl Queue for MemoryQueue {
    fn name(&self) -> &str {
        &self.name
    }

    fn visibility_timeout(&self) -> Duration {
        self.options.visibility_timeout
    }

    async fn enqueue(&self, body: Vec<u8>) -> Result<String, QueueError> {
        let message_id = uuid::Uuid::new_v4().to_string();
        let depth = {
            let mut state = self.state.lock().await;
            state.ready.push_back(StoredMessage {
                message_id: message_id.clone(),
                body,
                delivery_count: 0,
                sent_at: now_millis(),
                enqueued_at: Instant::now(),
            });
            state.depth()
        };
        self.available.notify_waiters();
        counter!(QUEUE_MESSAGES_ENQUEUED_TOTAL.name, "queue" => self.name.clone()).increment(1);
        self.record_depth(depth);
        trace!(queue = %self.name, message_id = %message_id, "message enqueued");
        Ok(message_id)
    }

    async fn receive(&self, max_batch: usize) -> Result<Vec<Message>, QueueError> {
        let max_batch = max_batch.max(1);
        let deadline = Instant::now() + self.options.wait_time;

        loop {
            // Register interest before inspecting state so an enqueue racing
            // with this pass is not missed.
            let notified = self.available.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let (batch, next_expiry, depth) = {
                let mut state = self.state.lock().await;
                let now = Instant::now();
                state.reclaim_expired(now, &self.name);
                state.discard_retention_expired(now, self.options.retention, &self.name);

                let mut batch = Vec::new();
                let mut refused = Vec::new();
                while batch.len() < max_batch {
                    let Some(front) = state.ready.front() else {
                        break;
                    };
                    if let Some(policy) = self.exhausted_policy(front) {
                        // stays at the front of ready until the dead-letter queue holds a copy
                        let body = front.body.clone();
                        let outcome = policy.dead_letter.enqueue(body).await;
                        let Some(message) = state.ready.pop_front() else {
                            break;
                        };
                        match outcome {
                            Ok(dead_letter_id) => {
                                warn!(
                                    queue = %self.name,
                                    dead_letter = policy.dead_letter.name(),
                                    message_id = %message.message_id,
                                    dead_letter_id = %dead_letter_id,
                                    receive_count = message.delivery_count,
                                    "message exceeded max receive count, moved to dead-letter queue"
                                );
                                counter!(QUEUE_MESSAGES_DEAD_LETTERED_TOTAL.name, "queue" => self.name.clone())
                                    .increment(1);
                            }
                            Err(e) => {
                                warn!(
                                    queue = %self.name,
                                    message_id = %message.message_id,
                                    "dead-letter enqueue failed, keeping message: {}",
                                    e
                                );
                                refused.push(message);
                            }
                        }
                        continue;
                    }
                    let Some(mut stored) = state.ready.pop_front() else {
                        break;
                    };
                    stored.delivery_count += 1;
                    let receipt = ReceiptToken::generate();
                    batch.push(Message {
                        message_id: stored.message_id.clone(),
                        body: stored.body.clone(),
                        delivery_count: stored.delivery_count,
                        receipt: receipt.clone(),
                        sent_at: stored.sent_at,
                    });
                    state.leased.insert(
                        receipt,
                        Lease {
                            message: stored,
                            expires_at: now + self.options.visibility_timeout,
                        },
                    );
                }
                for message in refused.into_iter().rev() {
                    state.ready.push_front(message);
                }
                (batch, state.next_expiry(), state.depth())
            };

            if !batch.is_empty() {
                counter!(QUEUE_MESSAGES_RECEIVED_TOTAL.name, "queue" => self.name.clone())
                    .increment(batch.len() as u64);
                self.record_depth(depth);
                debug!(
                    queue = %self.name,
                    count = batch.len(),
                    "leased messages"
                );
                return Ok(batch);
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(Vec::new());
            }
            let wake_at = next_expiry.map_or(deadline, |expiry| expiry.min(deadline));
            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(wake_at) => {}
            }
        }
    }

    async fn acknowledge(&self, receipt: &ReceiptToken) -> Result<(), QueueError> {
        let (removed, depth) = {
            let mut state = self.state.lock().await;
            // An expired lease that no receive has reclaimed yet may still be
            // acknowledged: nobody else owns the message.
            let removed = state.leased.remove(receipt);
            (removed, state.depth())
        };
        match removed {
            Some(lease) => {
                counter!(QUEUE_MESSAGES_ACKED_TOTAL.name, "queue" => self.name.clone())
                    .increment(1);
                self.record_depth(depth);
                trace!(
                    queue = %self.name,
                    message_id = %lease.message.message_id,
                    "message acknowledged"
                );
                Ok(())
            }
            None => Err(QueueError::InvalidReceipt(receipt.to_string())),
        }
    }
}
