use async_trait::async_trait;
use futures::stream::Stream;
use futures::StreamExt;
use metrics::counter;
use relay_core::now_millis;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::pin::Pin;
use std::task::{Context, Poll};
use tokio::sync::{broadcast, RwLock};
use tokio_stream::wrappers::{errors::BroadcastStreamRecvError, BroadcastStream};
use tracing::trace;

use crate::errors::{MetricsError, Result};
use crate::telemetry_metrics::LOG_RECORDS_WRITTEN_TOTAL;

const LIVE_BUFFER: usize = 1024;

/// Records kept by a log group before the oldest are dropped.
pub const DEFAULT_MAX_RECORDS: usize = 100_000;

/// One line written to a log group.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogRecord {
    // position in the group, starting at 0
    pub sequence: u64,
    // writer that produced the line, e.g. the log worker name
    pub stream: String,
    pub message: String,
    pub timestamp: u64,
}

/// Durable destination for structured log lines.
///
/// `write` returns only once the record is stored; a caller may treat a
/// successful return as the record being durable.
#[async_trait]
pub trait LogSink: Send + Sync + 'static {
    async fn write(&self, stream: &str, message: String) -> Result<LogRecord>;
}

/// Append-only, in-process log group.
///
/// Records are kept in write order and can be tailed from any sequence number:
/// a tail replays the stored records first and then follows live writes.
/// Only the newest `max_records` are retained; sequence numbers keep counting.
#[derive(Debug)]
pub struct LogGroup {
    name: String,
    records: RwLock<Retained>,
    live: broadcast::Sender<LogRecord>,
    max_records: usize,
}

#[derive(Debug, Default)]
struct Retained {
    // sequence of records[0]
    first_sequence: u64,
    records: VecDeque<LogRecord>,
}

impl Retained {
    fn next_sequence(&self) -> u64 {
        self.first_sequence + self.records.len() as u64
    }
}

impl LogGroup {
    pub fn new(name: &str) -> Self {
        let (live, _) = broadcast::channel(LIVE_BUFFER);
        LogGroup {
            name: name.to_string(),
            records: RwLock::new(Retained::default()),
            live,
            max_records: DEFAULT_MAX_RECORDS,
        }
    }

    /// Keep at most `max_records` records, at least one.
    pub fn with_max_records(mut self, max_records: usize) -> Self {
        self.max_records = max_records.max(1);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of retained records.
    pub async fn len(&self) -> usize {
        self.records.read().await.records.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.records.is_empty()
    }

    /// Snapshot of every retained record.
    pub async fn records(&self) -> Vec<LogRecord> {
        self.records.read().await.records.iter().cloned().collect()
    }

    /// Stream every retained record with `sequence >= from`, then live writes.
    pub async fn tail(&self, from: u64) -> LogStream {
        // Subscribe while holding the read lock so no write lands between
        // the snapshot and the live receiver.
        let (replay, rx) = {
            let retained = self.records.read().await;
            let rx = self.live.subscribe();
            let skip = from.saturating_sub(retained.first_sequence) as usize;
            let replay: Vec<LogRecord> = retained.records.iter().skip(skip).cloned().collect();
            (replay, rx)
        };
        let live_from = replay.last().map_or(from, |r| r.sequence + 1);

        let replay_stream = tokio_stream::iter(replay.into_iter().map(Ok));
        let live_stream = BroadcastStream::new(rx).filter_map(move |item| {
            futures::future::ready(match item {
                Ok(record) if record.sequence >= live_from => Some(Ok(record)),
                Ok(_) => None,
                Err(BroadcastStreamRecvError::Lagged(n)) => Some(Err(MetricsError::Lagged(n))),
            })
        });

        LogStream {
            inner: Box::pin(replay_stream.chain(live_stream)),
        }
    }
}

#[async_trait]
impl LogSink for LogGroup {
    async fn write(&self, stream: &str, message: String) -> Result<LogRecord> {
        let record = {
            let mut retained = self.records.write().await;
            let record = LogRecord {
                sequence: retained.next_sequence(),
                stream: stream.to_string(),
                message,
                timestamp: now_millis(),
            };
            retained.records.push_back(record.clone());
            while retained.records.len() > self.max_records {
                retained.records.pop_front();
                retained.first_sequence += 1;
            }
            // no live tail is not an error
            let _ = self.live.send(record.clone());
            record
        };
        counter!(LOG_RECORDS_WRITTEN_TOTAL.name, "log_group" => self.name.clone()).increment(1);
        trace!(log_group = %self.name, sequence = record.sequence, "log record written");
        Ok(record)
    }
}

/// Records of a log group in sequence order.
/// A tail that falls too far behind the writers yields `MetricsError::Lagged`.
pub struct LogStream {
    inner: Pin<Box<dyn Stream<Item = Result<LogRecord>> + Send>>,
}

impl Stream for LogStream {
    type Item = Result<LogRecord>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        self.inner.as_mut().poll_next(cx)
    }
}
