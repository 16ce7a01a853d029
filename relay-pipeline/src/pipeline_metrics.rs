use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use relay_dispatch::dispatch_metrics::{self, Metric};
use relay_metrics::telemetry_metrics;
use std::net::SocketAddr;
use tracing::info;

pub const COUNTERS: [Metric; 9] = [
    OBJECTS_COPIED_TOTAL,
    BYTES_COPIED_TOTAL,
    SIZE_REPORTS_LOGGED_TOTAL,
    OBJECTS_PURGED_TOTAL,
    CLEANUP_FAILURES_TOTAL,
    UPLOADS_TOTAL,
    WORKER_MESSAGES_PROCESSED_TOTAL,
    WORKER_MESSAGES_FAILED_TOTAL,
    WORKER_TIMEOUTS_TOTAL,
];

pub const HISTOGRAMS: [Metric; 2] = [WORKER_HANDLE_DURATION_SECONDS, COPY_OBJECT_SIZE_BYTES];

// COPY Metrics --------------------------

pub const OBJECTS_COPIED_TOTAL: Metric = Metric {
    name: "relay_objects_copied_total",
    description: "Total objects written to the destination store",
};

pub const BYTES_COPIED_TOTAL: Metric = Metric {
    name: "relay_bytes_copied_total",
    description: "Total bytes written to the destination store",
};

pub const COPY_OBJECT_SIZE_BYTES: Metric = Metric {
    name: "relay_copy_object_size_bytes",
    description: "Size of copied objects",
};

// LOG Metrics --------------------------

pub const SIZE_REPORTS_LOGGED_TOTAL: Metric = Metric {
    name: "relay_size_reports_logged_total",
    description: "Total size records written to the log group",
};

// CLEAN Metrics --------------------------

pub const OBJECTS_PURGED_TOTAL: Metric = Metric {
    name: "relay_objects_purged_total",
    description: "Total objects deleted from the destination store by cleanup",
};

pub const CLEANUP_FAILURES_TOTAL: Metric = Metric {
    name: "relay_cleanup_failures_total",
    description: "Total cleanup jobs left for redelivery after a delete kept failing",
};

// INGRESS Metrics --------------------------

pub const UPLOADS_TOTAL: Metric = Metric {
    name: "relay_uploads_total",
    description: "Total objects written to the source store through the ingress",
};

// WORKER Metrics --------------------------

pub const WORKER_MESSAGES_PROCESSED_TOTAL: Metric = Metric {
    name: "relay_worker_messages_processed_total",
    description: "Total messages handled and acknowledged",
};

pub const WORKER_MESSAGES_FAILED_TOTAL: Metric = Metric {
    name: "relay_worker_messages_failed_total",
    description: "Total handler invocations that left their message for redelivery",
};

pub const WORKER_TIMEOUTS_TOTAL: Metric = Metric {
    name: "relay_worker_timeouts_total",
    description: "Total handler invocations cut off at the deadline",
};

pub const WORKER_HANDLE_DURATION_SECONDS: Metric = Metric {
    name: "relay_worker_handle_duration_seconds",
    description: "Handler processing time",
};

/// Install the Prometheus exporter when an address is given and describe
/// every metric the pipeline emits.
pub fn init_metrics(prom_addr: Option<SocketAddr>) -> Result<()> {
    info!("initializing metrics exporter");

    if let Some(addr) = prom_addr {
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .with_context(|| format!("failed to install Prometheus exporter on {}", addr))?;
        info!(%addr, "prometheus exporter listening");
    }

    for metric in dispatch_metrics::COUNTERS
        .into_iter()
        .chain(telemetry_metrics::COUNTERS)
        .chain(COUNTERS)
    {
        register_counter(metric);
    }

    for metric in dispatch_metrics::GAUGES
        .into_iter()
        .chain(telemetry_metrics::GAUGES)
    {
        register_gauge(metric);
    }

    for metric in HISTOGRAMS {
        register_histogram(metric);
    }
    Ok(())
}

fn register_counter(metric: Metric) {
    metrics::describe_counter!(metric.name, metric.description);
    let _counter = metrics::counter!(metric.name);
}

fn register_gauge(metric: Metric) {
    metrics::describe_gauge!(metric.name, metric.description);
    let _gauge = metrics::gauge!(metric.name);
}

fn register_histogram(metric: Metric) {
    metrics::describe_histogram!(metric.name, metric.description);
    let _histogram = metrics::histogram!(metric.name);
}
