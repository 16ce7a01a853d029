use anyhow::{Context, Result};
use relay_core::{BlobStore, Queue};
use relay_dispatch::{MemoryQueue, QueueOptions, RedrivePolicy, RetryPolicy, Topic};
use relay_metrics::{
    AlarmEvaluator, AlarmState, LogGroup, LogSink, MetricFilter, MetricStream,
    MetricTransformation, SIZE_LINE_PATTERN, SIZE_VALUE_FIELD,
};
use relay_store::BucketStore;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::clean_worker::CleanWorker;
use crate::copy_worker::CopyWorker;
use crate::ingress::NotifyingStore;
use crate::log_worker::LogWorker;
use crate::service_configuration::{QueueSettings, ServiceConfiguration};
use crate::worker::{WorkerOptions, WorkerPool};

pub const UPLOAD_TOPIC: &str = "uploads";
pub const ALARM_TOPIC: &str = "alarms";
pub const COPY_QUEUE: &str = "copy";
pub const LOG_QUEUE: &str = "log";
pub const CLEAN_QUEUE: &str = "clean";
pub const SIZE_LOG_GROUP: &str = "relay-size-reports";
pub const SIZE_FILTER: &str = "TotalSizeFilter";

const CLEAN_BASE_BACKOFF_MS: u64 = 200;
const CLEAN_MAX_BACKOFF_MS: u64 = 2_000;
const TOPIC_BASE_BACKOFF_MS: u64 = 200;
const TOPIC_MAX_BACKOFF_MS: u64 = 5_000;

/// A worker queue together with its dead-letter queue, if redrive is on.
struct QueuePair {
    queue: Arc<MemoryQueue>,
    dead_letter: Option<Arc<MemoryQueue>>,
}

fn build_queue(name: &str, settings: &QueueSettings) -> QueuePair {
    let options = QueueOptions {
        visibility_timeout: settings.visibility_timeout,
        wait_time: settings.wait_time,
        retention: settings.retention,
        redrive: None,
    };
    let dead_letter = (settings.max_receive_count > 0)
        .then(|| Arc::new(MemoryQueue::new(&format!("{}-dlq", name), options.clone())));
    let redrive = dead_letter.as_ref().map(|dlq| RedrivePolicy {
        max_receive_count: settings.max_receive_count,
        dead_letter: dlq.clone() as Arc<dyn Queue>,
    });
    let queue = Arc::new(MemoryQueue::new(name, QueueOptions { redrive, ..options }));
    QueuePair { queue, dead_letter }
}

/// The running system: stores, topics, queues, the size log, the alarm and
/// the three worker pools, all wired together.
///
/// ```text
/// put -> uploads -> copy -> CopyWorker -> log -> LogWorker -> log group
///                                                                 |
///        destination emptied <- CleanWorker <- clean <- alarms <- alarm
/// ```
pub struct Pipeline {
    source: Arc<NotifyingStore>,
    destination: Arc<dyn BlobStore>,
    upload_topic: Arc<Topic>,
    alarm_topic: Arc<Topic>,
    copy: QueuePair,
    log: QueuePair,
    clean: QueuePair,
    log_group: Arc<LogGroup>,
    metric_stream: Arc<MetricStream>,
    alarm_state: watch::Receiver<AlarmState>,
    pools: Vec<WorkerPool>,
    tasks: Vec<JoinHandle<()>>,
    cancel: CancellationToken,
}

impl Pipeline {
    /// Open the configured stores and start every component.
    pub fn start(config: &ServiceConfiguration) -> Result<Self> {
        let source = BucketStore::new(&config.source).context("failed to open source store")?;
        let destination =
            BucketStore::new(&config.destination).context("failed to open destination store")?;
        Self::start_with_stores(config, Arc::new(source), Arc::new(destination))
    }

    /// Start every component on top of the given stores.
    pub fn start_with_stores(
        config: &ServiceConfiguration,
        source: Arc<dyn BlobStore>,
        destination: Arc<dyn BlobStore>,
    ) -> Result<Self> {
        let cancel = CancellationToken::new();
        let topic_retry = RetryPolicy::new(
            config.workers.topic_max_retries,
            TOPIC_BASE_BACKOFF_MS,
            TOPIC_MAX_BACKOFF_MS,
        );

        let upload_topic = Arc::new(Topic::new(UPLOAD_TOPIC, topic_retry.clone()));
        let alarm_topic = Arc::new(Topic::new(ALARM_TOPIC, topic_retry));

        let copy = build_queue(COPY_QUEUE, &config.queues);
        let log = build_queue(LOG_QUEUE, &config.queues);
        let clean = build_queue(CLEAN_QUEUE, &config.queues);

        upload_topic.subscribe(copy.queue.clone())?;
        alarm_topic.subscribe(clean.queue.clone())?;

        let ingress = Arc::new(NotifyingStore::new(
            Arc::clone(&source),
            Arc::clone(&upload_topic),
        ));

        // size log -> metric stream -> alarm
        let log_group = Arc::new(LogGroup::new(SIZE_LOG_GROUP));
        let metric_stream = Arc::new(MetricStream::new(
            &config.alarm.namespace,
            &config.alarm.metric_name,
        ));
        let filter = MetricFilter::new(
            SIZE_FILTER,
            SIZE_LINE_PATTERN,
            MetricTransformation {
                namespace: config.alarm.namespace.clone(),
                name: config.alarm.metric_name.clone(),
                value: format!("${}", SIZE_VALUE_FIELD),
            },
        )
        .context("invalid size metric filter")?;
        let evaluator = AlarmEvaluator::new(
            config.alarm.clone(),
            Arc::clone(&metric_stream),
            Arc::clone(&alarm_topic),
        )
        .context("invalid alarm configuration")?;
        let alarm_state = evaluator.subscribe();

        let tasks = vec![
            tokio::spawn(filter.run(
                Arc::clone(&log_group),
                Arc::clone(&metric_stream),
                cancel.child_token(),
            )),
            tokio::spawn(evaluator.run(cancel.child_token())),
        ];

        let options = |concurrency: usize| WorkerOptions {
            concurrency,
            batch_size: config.queues.batch_size,
            deadline_margin: config.workers.deadline_margin,
        };

        let copy_worker = CopyWorker::new(
            Arc::clone(&source),
            Arc::clone(&destination),
            log.queue.clone(),
        );
        let log_worker = LogWorker::new(
            log_group.clone() as Arc<dyn LogSink>,
            Arc::clone(&destination),
        )
        .with_mode(config.report_mode, config.key_filter.clone());
        let clean_worker = CleanWorker::new(
            Arc::clone(&destination),
            RetryPolicy::new(
                Some(config.workers.clean_delete_retries),
                CLEAN_BASE_BACKOFF_MS,
                CLEAN_MAX_BACKOFF_MS,
            ),
        )
        .with_key_filter(config.key_filter.clone())
        .with_parallelism(config.workers.clean_parallelism);

        let pools = vec![
            WorkerPool::spawn(
                Arc::new(copy_worker),
                copy.queue.clone(),
                options(config.workers.copy_concurrency),
                cancel.clone(),
            ),
            WorkerPool::spawn(
                Arc::new(log_worker),
                log.queue.clone(),
                options(config.workers.log_concurrency),
                cancel.clone(),
            ),
            WorkerPool::spawn(
                Arc::new(clean_worker),
                clean.queue.clone(),
                options(config.workers.clean_concurrency),
                cancel.clone(),
            ),
        ];

        info!(
            source = source.id(),
            destination = destination.id(),
            alarm = %config.alarm.name,
            threshold = config.alarm.threshold,
            "pipeline started"
        );

        Ok(Pipeline {
            source: ingress,
            destination,
            upload_topic,
            alarm_topic,
            copy,
            log,
            clean,
            log_group,
            metric_stream,
            alarm_state,
            pools,
            tasks,
            cancel,
        })
    }

    /// The source store; every `put` through it enters the pipeline.
    pub fn source(&self) -> Arc<dyn BlobStore> {
        self.source.clone()
    }

    pub fn destination(&self) -> Arc<dyn BlobStore> {
        Arc::clone(&self.destination)
    }

    pub fn upload_topic(&self) -> &Arc<Topic> {
        &self.upload_topic
    }

    pub fn alarm_topic(&self) -> &Arc<Topic> {
        &self.alarm_topic
    }

    pub fn copy_queue(&self) -> &Arc<MemoryQueue> {
        &self.copy.queue
    }

    pub fn log_queue(&self) -> &Arc<MemoryQueue> {
        &self.log.queue
    }

    pub fn clean_queue(&self) -> &Arc<MemoryQueue> {
        &self.clean.queue
    }

    /// Dead-letter queue of the named worker queue, if redrive is enabled.
    pub fn dead_letter(&self, queue: &str) -> Option<&Arc<MemoryQueue>> {
        match queue {
            COPY_QUEUE => self.copy.dead_letter.as_ref(),
            LOG_QUEUE => self.log.dead_letter.as_ref(),
            CLEAN_QUEUE => self.clean.dead_letter.as_ref(),
            _ => None,
        }
    }

    pub fn log_group(&self) -> &Arc<LogGroup> {
        &self.log_group
    }

    pub fn metric_stream(&self) -> &Arc<MetricStream> {
        &self.metric_stream
    }

    /// Follow the alarm state; starts at the current state.
    pub fn alarm_state(&self) -> watch::Receiver<AlarmState> {
        self.alarm_state.clone()
    }

    /// Stop every worker and background task, waiting for in-flight handlers.
    pub async fn shutdown(self) {
        info!("shutting down pipeline");
        self.cancel.cancel();
        for pool in self.pools {
            pool.shutdown().await;
        }
        join_background(self.tasks).await;
        info!("pipeline stopped");
    }
}

/// Wait for background tasks, logging any that panicked or were aborted.
/// Returns how many ended abnormally.
async fn join_background(tasks: Vec<JoinHandle<()>>) -> usize {
    let mut abnormal = 0;
    for task in tasks {
        if let Err(e) = task.await {
            warn!("pipeline task ended abnormally: {}", e);
            abnormal += 1;
        }
    }
    abnormal
}
