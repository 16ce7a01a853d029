mod errors;
pub use errors::{Result, WorkerError};

pub mod pipeline_metrics;
pub use pipeline_metrics::init_metrics;

mod worker;
pub use worker::{Handler, WorkerOptions, WorkerPool};

mod copy_worker;
pub use copy_worker::CopyWorker;

mod log_worker;
pub use log_worker::{LogWorker, ReportMode};

mod clean_worker;
pub use clean_worker::CleanWorker;

mod ingress;
pub use ingress::NotifyingStore;

mod service_configuration;
pub use service_configuration::{
    AlarmSection, LoadConfiguration, QueueSettings, QueuesConfig, ServiceConfiguration,
    WorkerSettings, WorkersConfig,
};

mod pipeline;
pub use pipeline::{
    Pipeline, ALARM_TOPIC, CLEAN_QUEUE, COPY_QUEUE, LOG_QUEUE, SIZE_FILTER, SIZE_LOG_GROUP,
    UPLOAD_TOPIC,
};

mod client;
pub use client::{run_uploads, UploadSpec};

#[cfg(test)]
mod test_util;
