use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use metrics::counter;
use relay_core::{BlobStore, Envelope, Message, StoreError};
use relay_dispatch::RetryPolicy;
use relay_metrics::AlarmNotification;
use std::sync::Arc;
use tracing::{info, warn};

use crate::errors::{Result, WorkerError};
use crate::pipeline_metrics::{CLEANUP_FAILURES_TOTAL, OBJECTS_PURGED_TOTAL};
use crate::worker::Handler;

/// Empties the destination store when a breach notification arrives.
///
/// Every key is deleted with its own bounded retry. If any key still fails
/// the whole job is left for redelivery; keys already deleted are simply
/// absent the next time.
pub struct CleanWorker {
    destination: Arc<dyn BlobStore>,
    retry: RetryPolicy,
    key_filter: Option<String>,
    parallelism: usize,
}

impl CleanWorker {
    pub fn new(destination: Arc<dyn BlobStore>, retry: RetryPolicy) -> Self {
        CleanWorker {
            destination,
            retry,
            key_filter: None,
            parallelism: 4,
        }
    }

    /// Only delete keys containing `filter`.
    pub fn with_key_filter(mut self, filter: Option<String>) -> Self {
        self.key_filter = filter;
        self
    }

    pub fn with_parallelism(mut self, parallelism: usize) -> Self {
        self.parallelism = parallelism.max(1);
        self
    }

    async fn delete_with_retry(&self, key: &str) -> std::result::Result<(), StoreError> {
        let mut attempt = 0;
        loop {
            match self.destination.delete(key).await {
                Ok(()) => return Ok(()),
                Err(e) => {
                    attempt += 1;
                    if !self.retry.should_retry(attempt) {
                        return Err(e);
                    }
                    let backoff = self.retry.backoff(attempt);
                    warn!(key = %key, attempt, "delete failed, retrying in {:?}: {}", backoff, e);
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[async_trait]
impl Handler for CleanWorker {
    fn name(&self) -> &str {
        "clean"
    }

    async fn handle(&self, message: &Message) -> Result<()> {
        let (_, notification): (Envelope, AlarmNotification) = message.decode_envelope()?;
        info!(
            alarm = %notification.alarm_name,
            state = %notification.new_state,
            destination = self.destination.id(),
            "cleanup triggered"
        );

        let keys: Vec<String> = self
            .destination
            .list()
            .await?
            .into_iter()
            .map(|o| o.key)
            .filter(|key| {
                self.key_filter
                    .as_deref()
                    .is_none_or(|filter| key.contains(filter))
            })
            .collect();
        let total = keys.len();

        let results: Vec<(String, std::result::Result<(), StoreError>)> = stream::iter(keys)
            .map(|key| async move {
                let result = self.delete_with_retry(&key).await;
                (key, result)
            })
            .buffer_unordered(self.parallelism)
            .collect()
            .await;

        let mut failed = 0;
        for (key, result) in &results {
            if let Err(e) = result {
                failed += 1;
                warn!(key = %key, "giving up on delete: {}", e);
            }
        }
        counter!(OBJECTS_PURGED_TOTAL.name).increment((total - failed) as u64);

        if failed > 0 {
            counter!(CLEANUP_FAILURES_TOTAL.name).increment(1);
            return Err(WorkerError::CleanupIncomplete { failed, total });
        }
        info!(deleted = total, destination = self.destination.id(), "destination emptied");
        Ok(())
    }
}
