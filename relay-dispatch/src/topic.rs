use dashmap::{mapref::entry::Entry, DashMap};
use metrics::counter;
use relay_core::{Envelope, Queue};
use serde::Serialize;
use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

use crate::{
    dispatch_metrics::{TOPIC_DELIVERIES_TOTAL, TOPIC_DELIVERY_RETRIES_TOTAL, TOPIC_PUBLISHED_TOTAL},
    errors::{DispatchError, Result},
    retry_policy::RetryPolicy,
};

// Topic
//
// Broadcasts every published message to the queues subscribed at publish time.
// Each subscriber gets its own delivery task, so a slow or failing queue never
// holds back the others. A failed delivery is retried on the topic's retry
// policy until the queue accepts it.
//
pub struct Topic {
    name: String,
    // queue name -> subscribed queue
    subscriptions: DashMap<String, Arc<dyn Queue>>,
    retry: RetryPolicy,
    // deliveries started but not yet accepted by their queue
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
}

impl fmt::Debug for Topic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Topic")
            .field("name", &self.name)
            .field("subscribers", &self.subscribers())
            .field("retry", &self.retry)
            .finish()
    }
}

impl Topic {
    pub fn new(name: &str, retry: RetryPolicy) -> Self {
        Topic {
            name: name.to_string(),
            subscriptions: DashMap::new(),
            retry,
            pending: Arc::new(AtomicUsize::new(0)),
            idle: Arc::new(Notify::new()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn subscribe(&self, queue: Arc<dyn Queue>) -> Result<()> {
        match self.subscriptions.entry(queue.name().to_string()) {
            Entry::Occupied(entry) => Err(DispatchError::SubscriptionExists(entry.key().clone())),
            Entry::Vacant(entry) => {
                debug!(topic = %self.name, queue = %entry.key(), "queue subscribed");
                entry.insert(queue);
                Ok(())
            }
        }
    }

    pub fn unsubscribe(&self, queue_name: &str) -> Result<()> {
        self.subscriptions
            .remove(queue_name)
            .map(|_| ())
            .ok_or_else(|| DispatchError::SubscriptionNotFound(queue_name.to_string()))
    }

    pub fn subscribers(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .subscriptions
            .iter()
            .map(|e| e.key().clone())
            .collect();
        names.sort();
        names
    }

    /// Publish `payload` to every current subscriber, returns the envelope message id.
    ///
    /// Returns once a delivery task is running for each subscriber; use
    /// `flush` to wait until every queue has accepted the message.
    pub fn publish<T: Serialize>(&self, subject: Option<&str>, payload: &T) -> Result<String> {
        let envelope = Envelope::new(
            &self.name,
            subject.map(str::to_string),
            serde_json::to_string(payload)?,
        );
        let body = serde_json::to_vec(&envelope)?;

        counter!(TOPIC_PUBLISHED_TOTAL.name, "topic" => self.name.clone()).increment(1);

        for entry in self.subscriptions.iter() {
            let queue = Arc::clone(entry.value());
            self.pending.fetch_add(1, Ordering::SeqCst);
            tokio::spawn(deliver(
                self.name.clone(),
                queue,
                body.clone(),
                self.retry.clone(),
                Arc::clone(&self.pending),
                Arc::clone(&self.idle),
            ));
        }

        trace!(topic = %self.name, message_id = %envelope.message_id, "message published");
        Ok(envelope.message_id)
    }

    /// Deliveries still waiting to be accepted by a subscriber.
    pub fn pending_deliveries(&self) -> usize {
        self.pending.load(Ordering::SeqCst)
    }

    /// Wait until every delivery started so far has been accepted.
    pub async fn flush(&self) {
        loop {
            let notified = self.idle.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.pending.load(Ordering::SeqCst) == 0 {
                return;
            }
            notified.await;
        }
    }
}

async fn deliver(
    topic: String,
    queue: Arc<dyn Queue>,
    body: Vec<u8>,
    retry: RetryPolicy,
    pending: Arc<AtomicUsize>,
    idle: Arc<Notify>,
) {
    let mut attempt = 0usize;
    loop {
        match queue.enqueue(body.clone()).await {
            Ok(message_id) => {
                counter!(TOPIC_DELIVERIES_TOTAL.name, "topic" => topic.clone(), "queue" => queue.name().to_string())
                    .increment(1);
                trace!(topic = %topic, queue = queue.name(), message_id = %message_id, "delivered");
                break;
            }
            Err(e) => {
                attempt += 1;
                if !retry.should_retry(attempt) {
                    // bounded policies are a caller choice; topics built by the
                    // pipeline retry forever
                    warn!(
                        topic = %topic,
                        queue = queue.name(),
                        attempts = attempt,
                        "giving up delivery: {}",
                        e
                    );
                    break;
                }
                let backoff = retry.backoff(attempt);
                warn!(
                    topic = %topic,
                    queue = queue.name(),
                    attempt,
                    backoff_ms = backoff.as_millis() as u64,
                    "delivery failed, retrying: {}",
                    e
                );
                counter!(TOPIC_DELIVERY_RETRIES_TOTAL.name, "topic" => topic.clone(), "queue" => queue.name().to_string())
                    .increment(1);
                tokio::time::sleep(backoff).await;
            }
        }
    }

    if pending.fetch_sub(1, Ordering::SeqCst) == 1 {
        idle.notify_waiters();
    }
}
