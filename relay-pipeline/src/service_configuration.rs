use anyhow::{anyhow, Context, Result};
use relay_core::StorageConfig;
use relay_metrics::{AlarmConfig, ComparisonOperator, Statistic, TreatMissingData};
use serde::{Deserialize, Serialize};
use std::fs::read_to_string;
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use crate::log_worker::ReportMode;

/// configuration settings loaded from the config file, durations in seconds
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoadConfiguration {
    /// Store the uploads land in
    pub source: StorageConfig,
    /// Store objects are replicated into and purged from
    pub destination: StorageConfig,
    /// Settings shared by the copy, log and clean queues
    pub queues: QueuesConfig,
    pub alarm: AlarmSection,
    pub workers: WorkersConfig,
    /// What the size line measures, `object` or `destination_total`
    pub report_mode: ReportMode,
    /// Restricts `destination_total` sums and cleanup to keys containing this
    pub key_filter: Option<String>,
    /// Prometheus exporter address, disabled if absent
    pub prom_exporter: Option<String>,
}

impl Default for LoadConfiguration {
    fn default() -> Self {
        LoadConfiguration {
            source: StorageConfig::memory("relay-source"),
            destination: StorageConfig::memory("relay-destination"),
            queues: QueuesConfig::default(),
            alarm: AlarmSection::default(),
            workers: WorkersConfig::default(),
            report_mode: ReportMode::Object,
            key_filter: None,
            prom_exporter: None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct QueuesConfig {
    pub visibility_timeout_secs: u64,
    pub wait_time_secs: u64,
    pub retention_secs: u64,
    /// Messages leased per receive
    pub batch_size: usize,
    /// Receives before a message moves to the dead-letter queue, 0 disables redrive
    pub max_receive_count: u32,
}

impl Default for QueuesConfig {
    fn default() -> Self {
        QueuesConfig {
            visibility_timeout_secs: 50,
            wait_time_secs: 20,
            retention_secs: 4 * 24 * 60 * 60,
            batch_size: 1,
            max_receive_count: 5,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AlarmSection {
    pub name: String,
    pub namespace: String,
    pub metric_name: String,
    pub statistic: Statistic,
    pub period_secs: u64,
    pub evaluation_periods: u32,
    pub threshold: f64,
    pub comparison: ComparisonOperator,
    pub treat_missing_data: TreatMissingData,
}

impl Default for AlarmSection {
    fn default() -> Self {
        let alarm = AlarmConfig::default();
        AlarmSection {
            name: alarm.name,
            namespace: alarm.namespace,
            metric_name: alarm.metric_name,
            statistic: alarm.statistic,
            period_secs: alarm.period.as_secs(),
            evaluation_periods: alarm.evaluation_periods,
            threshold: alarm.threshold,
            comparison: alarm.comparison,
            treat_missing_data: alarm.treat_missing_data,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkersConfig {
    pub copy_concurrency: usize,
    pub log_concurrency: usize,
    pub clean_concurrency: usize,
    /// Handler deadline is the visibility timeout minus this margin
    pub deadline_margin_secs: u64,
    /// Retries per key before a cleanup gives up and waits for redelivery
    pub clean_delete_retries: usize,
    /// Concurrent deletes within one cleanup
    pub clean_parallelism: usize,
    /// Delivery retries per topic subscriber, unbounded if absent
    pub topic_max_retries: Option<usize>,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        WorkersConfig {
            copy_concurrency: 1,
            log_concurrency: 1,
            clean_concurrency: 1,
            deadline_margin_secs: 5,
            clean_delete_retries: 3,
            clean_parallelism: 4,
            topic_max_retries: None,
        }
    }
}

/// Validated runtime configuration handed to every component at startup.
#[derive(Debug, Clone)]
pub struct ServiceConfiguration {
    pub source: StorageConfig,
    pub destination: StorageConfig,
    pub queues: QueueSettings,
    pub alarm: AlarmConfig,
    pub workers: WorkerSettings,
    pub report_mode: ReportMode,
    pub key_filter: Option<String>,
    pub prom_exporter: Option<SocketAddr>,
}

#[derive(Debug, Clone)]
pub struct QueueSettings {
    pub visibility_timeout: Duration,
    pub wait_time: Duration,
    pub retention: Duration,
    pub batch_size: usize,
    pub max_receive_count: u32,
}

#[derive(Debug, Clone)]
pub struct WorkerSettings {
    pub copy_concurrency: usize,
    pub log_concurrency: usize,
    pub clean_concurrency: usize,
    pub deadline_margin: Duration,
    pub clean_delete_retries: usize,
    pub clean_parallelism: usize,
    pub topic_max_retries: Option<usize>,
}

impl ServiceConfiguration {
    /// Read and validate a YAML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self> {
        let load_config: LoadConfiguration =
            serde_yaml::from_str(content).context("failed to parse YAML configuration")?;
        load_config.try_into()
    }
}

impl TryFrom<LoadConfiguration> for ServiceConfiguration {
    type Error = anyhow::Error;

    fn try_from(config: LoadConfiguration) -> Result<Self> {
        let queues = QueueSettings {
            visibility_timeout: Duration::from_secs(config.queues.visibility_timeout_secs),
            wait_time: Duration::from_secs(config.queues.wait_time_secs),
            retention: Duration::from_secs(config.queues.retention_secs),
            batch_size: config.queues.batch_size,
            max_receive_count: config.queues.max_receive_count,
        };
        let workers = WorkerSettings {
            copy_concurrency: config.workers.copy_concurrency,
            log_concurrency: config.workers.log_concurrency,
            clean_concurrency: config.workers.clean_concurrency,
            deadline_margin: Duration::from_secs(config.workers.deadline_margin_secs),
            clean_delete_retries: config.workers.clean_delete_retries,
            clean_parallelism: config.workers.clean_parallelism,
            topic_max_retries: config.workers.topic_max_retries,
        };

        // a handler must be able to finish before its lease runs out
        if queues.visibility_timeout <= workers.deadline_margin {
            return Err(anyhow!(
                "queues.visibility_timeout_secs ({}) must be greater than workers.deadline_margin_secs ({})",
                config.queues.visibility_timeout_secs,
                config.workers.deadline_margin_secs
            ));
        }
        if queues.batch_size == 0 {
            return Err(anyhow!("queues.batch_size must be at least 1"));
        }

        let alarm = AlarmConfig {
            name: config.alarm.name,
            namespace: config.alarm.namespace,
            metric_name: config.alarm.metric_name,
            statistic: config.alarm.statistic,
            period: Duration::from_secs(config.alarm.period_secs),
            evaluation_periods: config.alarm.evaluation_periods,
            threshold: config.alarm.threshold,
            comparison: config.alarm.comparison,
            treat_missing_data: config.alarm.treat_missing_data,
        };
        alarm.validate().context("invalid alarm section")?;

        let prom_exporter: Option<SocketAddr> = match config.prom_exporter {
            Some(addr) => Some(
                addr.parse()
                    .with_context(|| format!("failed to parse prom_exporter address {}", addr))?,
            ),
            None => None,
        };

        Ok(ServiceConfiguration {
            source: config.source,
            destination: config.destination,
            queues,
            alarm,
            workers,
            report_mode: config.report_mode,
            key_filter: config.key_filter.filter(|f| !f.is_empty()),
            prom_exporter,
        })
    }
}
