use async_trait::async_trait;
use metrics::counter;
use relay_core::{BlobStore, Message, SizeReport};
use relay_metrics::{format_size_line, LogSink};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::info;

use crate::errors::Result;
use crate::pipeline_metrics::SIZE_REPORTS_LOGGED_TOTAL;
use crate::worker::Handler;

/// What the size line of a report measures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReportMode {
    /// The reported object's own size.
    #[default]
    Object,
    /// The summed size of every destination key matching the key filter,
    /// listed when the report is handled. Reported under the store id.
    DestinationTotal,
}

/// Writes one size line per size report to the log sink.
pub struct LogWorker {
    sink: Arc<dyn LogSink>,
    destination: Arc<dyn BlobStore>,
    mode: ReportMode,
    key_filter: Option<String>,
}

impl LogWorker {
    pub fn new(sink: Arc<dyn LogSink>, destination: Arc<dyn BlobStore>) -> Self {
        LogWorker {
            sink,
            destination,
            mode: ReportMode::Object,
            key_filter: None,
        }
    }

    pub fn with_mode(mut self, mode: ReportMode, key_filter: Option<String>) -> Self {
        self.mode = mode;
        self.key_filter = key_filter;
        self
    }

    async fn destination_total(&self) -> Result<u64> {
        let objects = self.destination.list().await?;
        Ok(objects
            .iter()
            .filter(|o| {
                self.key_filter
                    .as_deref()
                    .is_none_or(|filter| o.key.contains(filter))
            })
            .map(|o| o.size)
            .sum())
    }
}

#[async_trait]
impl Handler for LogWorker {
    fn name(&self) -> &str {
        "log"
    }

    async fn handle(&self, message: &Message) -> Result<()> {
        let report: SizeReport = message.decode()?;
        let line = match self.mode {
            ReportMode::Object => format_size_line(&report.key, report.size),
            ReportMode::DestinationTotal => {
                format_size_line(self.destination.id(), self.destination_total().await?)
            }
        };

        let record = self.sink.write(self.name(), line).await?;
        counter!(SIZE_REPORTS_LOGGED_TOTAL.name).increment(1);
        info!(
            key = %report.key,
            bucket = %report.bucket,
            sequence = record.sequence,
            "{}",
            record.message
        );
        Ok(())
    }
}
