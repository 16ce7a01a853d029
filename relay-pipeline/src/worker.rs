use async_trait::async_trait;
use metrics::{counter, histogram};
use relay_core::{Message, Queue};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::errors::{Result, WorkerError};
use crate::pipeline_metrics::{
    WORKER_HANDLE_DURATION_SECONDS, WORKER_MESSAGES_FAILED_TOTAL,
    WORKER_MESSAGES_PROCESSED_TOTAL, WORKER_TIMEOUTS_TOTAL,
};

// back off after the queue itself fails a receive
const RECEIVE_ERROR_BACKOFF: Duration = Duration::from_secs(1);

/// Processing logic for one kind of queue message.
///
/// Returning `Ok` acknowledges the message; any error leaves it leased until
/// the visibility timeout, after which the queue redelivers it. Handlers must
/// therefore be idempotent.
#[async_trait]
pub trait Handler: Send + Sync + 'static {
    fn name(&self) -> &str;
    async fn handle(&self, message: &Message) -> Result<()>;
}

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    /// Independent receive loops in the pool
    pub concurrency: usize,
    /// Messages leased per receive
    pub batch_size: usize,
    /// Subtracted from the queue visibility timeout to get the handler deadline
    pub deadline_margin: Duration,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        WorkerOptions {
            concurrency: 1,
            batch_size: 1,
            deadline_margin: Duration::from_secs(5),
        }
    }
}

/// A pool of receive loops binding one handler to one queue.
///
/// The loops share nothing but the handler and the queue handle.
pub struct WorkerPool {
    name: String,
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    pub fn spawn(
        handler: Arc<dyn Handler>,
        queue: Arc<dyn Queue>,
        options: WorkerOptions,
        cancel: CancellationToken,
    ) -> Self {
        let cancel = cancel.child_token();
        let deadline = handler_deadline(queue.visibility_timeout(), options.deadline_margin);
        let name = handler.name().to_string();
        info!(
            worker = %name,
            queue = queue.name(),
            concurrency = options.concurrency.max(1),
            deadline_ms = deadline.as_millis() as u64,
            "starting worker pool"
        );

        let handles = (0..options.concurrency.max(1))
            .map(|id| {
                tokio::spawn(receive_loop(
                    id,
                    Arc::clone(&handler),
                    Arc::clone(&queue),
                    options.batch_size.max(1),
                    deadline,
                    cancel.clone(),
                ))
            })
            .collect();

        WorkerPool {
            name,
            cancel,
            handles,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stop receiving and wait for in-flight messages to finish.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        for handle in self.handles {
            if let Err(e) = handle.await {
                warn!(worker = %self.name, "worker task ended abnormally: {}", e);
            }
        }
        info!(worker = %self.name, "worker pool stopped");
    }
}

pub(crate) fn handler_deadline(visibility_timeout: Duration, margin: Duration) -> Duration {
    match visibility_timeout.checked_sub(margin) {
        Some(deadline) if !deadline.is_zero() => deadline,
        _ => visibility_timeout,
    }
}

async fn receive_loop(
    id: usize,
    handler: Arc<dyn Handler>,
    queue: Arc<dyn Queue>,
    batch_size: usize,
    deadline: Duration,
    cancel: CancellationToken,
) {
    debug!(worker = handler.name(), id, "receive loop started");
    loop {
        let received = tokio::select! {
            _ = cancel.cancelled() => break,
            received = queue.receive(batch_size) => received,
        };
        let batch = match received {
            Ok(batch) => batch,
            Err(e) => {
                warn!(worker = handler.name(), queue = queue.name(), "receive failed: {}", e);
                tokio::time::sleep(RECEIVE_ERROR_BACKOFF).await;
                continue;
            }
        };
        for message in batch {
            process_message(handler.as_ref(), queue.as_ref(), &message, deadline).await;
        }
    }
    debug!(worker = handler.name(), id, "receive loop stopped");
}

/// Run the handler under its deadline and acknowledge on success.
/// Returns whether the message was acknowledged.
pub(crate) async fn process_message(
    handler: &dyn Handler,
    queue: &dyn Queue,
    message: &Message,
    deadline: Duration,
) -> bool {
    let worker = handler.name().to_string();
    let started = Instant::now();
    let outcome = match tokio::time::timeout(deadline, handler.handle(message)).await {
        Ok(result) => result,
        Err(_) => Err(WorkerError::Timeout(deadline)),
    };
    histogram!(WORKER_HANDLE_DURATION_SECONDS.name, "worker" => worker.clone())
        .record(started.elapsed().as_secs_f64());

    match outcome {
        Ok(()) => match queue.acknowledge(&message.receipt).await {
            Ok(()) => {
                counter!(WORKER_MESSAGES_PROCESSED_TOTAL.name, "worker" => worker.clone())
                    .increment(1);
                trace!(worker = %worker, message_id = %message.message_id, "message acknowledged");
                true
            }
            Err(e) => {
                // the lease ran out, another receiver owns the message now
                warn!(
                    worker = %worker,
                    message_id = %message.message_id,
                    "acknowledge failed, message will be processed again: {}",
                    e
                );
                false
            }
        },
        Err(e) => {
            if matches!(e, WorkerError::Timeout(_)) {
                counter!(WORKER_TIMEOUTS_TOTAL.name, "worker" => worker.clone()).increment(1);
            }
            counter!(WORKER_MESSAGES_FAILED_TOTAL.name, "worker" => worker.clone()).increment(1);
            warn!(
                worker = %worker,
                message_id = %message.message_id,
                delivery_count = message.delivery_count,
                "handler failed, message left for redelivery: {}",
                e
            );
            false
        }
    }
}
