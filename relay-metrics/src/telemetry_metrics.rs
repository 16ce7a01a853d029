// Centralized metric name constants for the log group, metric filters and alarms.

use relay_dispatch::dispatch_metrics::Metric;

pub const COUNTERS: [Metric; 5] = [
    LOG_RECORDS_WRITTEN_TOTAL,
    FILTER_SAMPLES_TOTAL,
    FILTER_UNMATCHED_RECORDS_TOTAL,
    ALARM_TRANSITIONS_TOTAL,
    ALARM_NOTIFICATIONS_TOTAL,
];

pub const GAUGES: [Metric; 2] = [ALARM_STATE, ALARM_EVALUATED_VALUE];

// LOG Metrics --------------------------

pub const LOG_RECORDS_WRITTEN_TOTAL: Metric = Metric {
    name: "relay_log_records_written_total",
    description: "Total records appended to a log group",
};

// FILTER Metrics --------------------------

pub const FILTER_SAMPLES_TOTAL: Metric = Metric {
    name: "relay_filter_samples_total",
    description: "Total metric samples extracted from log records",
};

pub const FILTER_UNMATCHED_RECORDS_TOTAL: Metric = Metric {
    name: "relay_filter_unmatched_records_total",
    description: "Total log records ignored by a metric filter",
};

// ALARM Metrics --------------------------

pub const ALARM_TRANSITIONS_TOTAL: Metric = Metric {
    name: "relay_alarm_transitions_total",
    description: "Total alarm state transitions",
};

pub const ALARM_NOTIFICATIONS_TOTAL: Metric = Metric {
    name: "relay_alarm_notifications_total",
    description: "Total breach notifications published by an alarm",
};

pub const ALARM_STATE: Metric = Metric {
    name: "relay_alarm_state",
    description: "Current alarm state (0 = OK, 1 = ALARM, 2 = INSUFFICIENT_DATA)",
};

pub const ALARM_EVALUATED_VALUE: Metric = Metric {
    name: "relay_alarm_evaluated_value",
    description: "Statistic computed for the last evaluated period",
};
