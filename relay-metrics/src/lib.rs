mod errors;
pub use errors::{MetricsError, Result};

pub mod telemetry_metrics;

mod log_group;
pub use log_group::{LogGroup, LogRecord, LogSink, LogStream};

mod size_line;
pub use size_line::{format_size_line, SIZE_LINE_PATTERN, SIZE_VALUE_FIELD};

mod metric_stream;
pub use metric_stream::MetricStream;

mod filter;
pub use filter::{FilterPattern, MetricFilter, MetricTransformation};

mod alarm;
pub use alarm::{
    AlarmConfig, AlarmNotification, AlarmState, AlarmStateMachine, ComparisonOperator, Statistic,
    Transition, TreatMissingData,
};

mod alarm_evaluator;
pub use alarm_evaluator::AlarmEvaluator;

#[cfg(test)]
mod filter_test;
