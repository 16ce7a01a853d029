use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

use crate::errors::{MetricsError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum AlarmState {
    #[serde(rename = "OK")]
    Ok,
    #[serde(rename = "ALARM")]
    Alarm,
    #[serde(rename = "INSUFFICIENT_DATA")]
    InsufficientData,
}

impl AlarmState {
    /// Numeric form exported as a gauge.
    pub fn as_gauge(&self) -> f64 {
        match self {
            AlarmState::Ok => 0.0,
            AlarmState::Alarm => 1.0,
            AlarmState::InsufficientData => 2.0,
        }
    }
}

impl fmt::Display for AlarmState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AlarmState::Ok => "OK",
            AlarmState::Alarm => "ALARM",
            AlarmState::InsufficientData => "INSUFFICIENT_DATA",
        };
        write!(f, "{}", s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ComparisonOperator {
    GreaterThanThreshold,
    GreaterThanOrEqualToThreshold,
    LessThanThreshold,
    LessThanOrEqualToThreshold,
}

impl ComparisonOperator {
    pub fn breaches(&self, value: f64, threshold: f64) -> bool {
        match self {
            ComparisonOperator::GreaterThanThreshold => value > threshold,
            ComparisonOperator::GreaterThanOrEqualToThreshold => value >= threshold,
            ComparisonOperator::LessThanThreshold => value < threshold,
            ComparisonOperator::LessThanOrEqualToThreshold => value <= threshold,
        }
    }

    fn symbol(&self) -> &'static str {
        match self {
            ComparisonOperator::GreaterThanThreshold => ">",
            ComparisonOperator::GreaterThanOrEqualToThreshold => ">=",
            ComparisonOperator::LessThanThreshold => "<",
            ComparisonOperator::LessThanOrEqualToThreshold => "<=",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Statistic {
    Maximum,
    Minimum,
    Sum,
    Average,
    SampleCount,
}

impl Statistic {
    /// Aggregate the values of one period; `None` for an empty period.
    pub fn aggregate(&self, values: &[f64]) -> Option<f64> {
        if values.is_empty() {
            return None;
        }
        let value = match self {
            Statistic::Maximum => values.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            Statistic::Minimum => values.iter().copied().fold(f64::INFINITY, f64::min),
            Statistic::Sum => values.iter().sum(),
            Statistic::Average => values.iter().sum::<f64>() / values.len() as f64,
            Statistic::SampleCount => values.len() as f64,
        };
        Some(value)
    }
}

/// What an evaluation period without samples means.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TreatMissingData {
    /// Keep the current state; the period does not count either way.
    Ignore,
    /// Enough empty periods in a row move the alarm to `INSUFFICIENT_DATA`,
    /// so the next breach is a new edge.
    #[default]
    Missing,
    Breaching,
    NotBreaching,
}

#[derive(Debug, Clone, PartialEq)]
pub struct AlarmConfig {
    pub name: String,
    pub namespace: String,
    pub metric_name: String,
    pub statistic: Statistic,
    pub period: Duration,
    pub evaluation_periods: u32,
    pub threshold: f64,
    pub comparison: ComparisonOperator,
    pub treat_missing_data: TreatMissingData,
}

impl Default for AlarmConfig {
    fn default() -> Self {
        AlarmConfig {
            name: "TotalSizeAlarm".to_string(),
            namespace: "ObjectsSNS".to_string(),
            metric_name: "TotalSizeSNS".to_string(),
            statistic: Statistic::Maximum,
            period: Duration::from_secs(60),
            evaluation_periods: 1,
            threshold: 3072.0,
            comparison: ComparisonOperator::GreaterThanThreshold,
            treat_missing_data: TreatMissingData::Missing,
        }
    }
}

impl AlarmConfig {
    pub fn validate(&self) -> Result<()> {
        if self.period.is_zero() {
            return Err(MetricsError::InvalidAlarm(format!(
                "alarm {}: period must be greater than zero",
                self.name
            )));
        }
        if self.evaluation_periods == 0 {
            return Err(MetricsError::InvalidAlarm(format!(
                "alarm {}: evaluation_periods must be at least 1",
                self.name
            )));
        }
        if !self.threshold.is_finite() {
            return Err(MetricsError::InvalidAlarm(format!(
                "alarm {}: threshold must be a finite number",
                self.name
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub from: AlarmState,
    pub to: AlarmState,
    pub reason: String,
    // statistic of the period that caused the transition
    pub value: Option<f64>,
}

impl Transition {
    /// The breach edge: the only transition that triggers a reaction.
    pub fn is_breach(&self) -> bool {
        self.to == AlarmState::Alarm && self.from != AlarmState::Alarm
    }
}

/// Alarm state and its transition rules, independent of any timer.
///
/// Feed it one datapoint per evaluation period with `evaluate`.
#[derive(Debug, Clone)]
pub struct AlarmStateMachine {
    config: AlarmConfig,
    state: AlarmState,
    consecutive_breaching: u32,
    consecutive_missing: u32,
}

impl AlarmStateMachine {
    pub fn new(config: AlarmConfig) -> Self {
        AlarmStateMachine {
            config,
            state: AlarmState::InsufficientData,
            consecutive_breaching: 0,
            consecutive_missing: 0,
        }
    }

    pub fn config(&self) -> &AlarmConfig {
        &self.config
    }

    pub fn state(&self) -> AlarmState {
        self.state
    }

    /// Evaluate one period. `datapoint` is the period's statistic, `None` if
    /// the period had no samples. Returns the transition, if any.
    pub fn evaluate(&mut self, datapoint: Option<f64>) -> Option<Transition> {
        let breaching = match datapoint {
            Some(value) => {
                self.consecutive_missing = 0;
                self.config.comparison.breaches(value, self.config.threshold)
            }
            None => match self.config.treat_missing_data {
                TreatMissingData::Ignore => return None,
                TreatMissingData::Breaching => true,
                TreatMissingData::NotBreaching => false,
                TreatMissingData::Missing => {
                    self.consecutive_breaching = 0;
                    self.consecutive_missing = self.consecutive_missing.saturating_add(1);
                    if self.consecutive_missing >= self.config.evaluation_periods {
                        return self.transition(
                            AlarmState::InsufficientData,
                            format!(
                                "no datapoints for {} consecutive periods",
                                self.consecutive_missing
                            ),
                            None,
                        );
                    }
                    return None;
                }
            },
        };

        if breaching {
            self.consecutive_breaching = self.consecutive_breaching.saturating_add(1);
            if self.consecutive_breaching >= self.config.evaluation_periods {
                let reason = self.reason(datapoint, "crossed");
                return self.transition(AlarmState::Alarm, reason, datapoint);
            }
            None
        } else {
            self.consecutive_breaching = 0;
            let reason = self.reason(datapoint, "within");
            self.transition(AlarmState::Ok, reason, datapoint)
        }
    }

    fn reason(&self, datapoint: Option<f64>, verdict: &str) -> String {
        let observed = match datapoint {
            Some(v) => format!("{}", v),
            None => "missing data".to_string(),
        };
        format!(
            "{} of {} over the last {} period(s) of {}s: [{}] {} threshold ({} {})",
            statistic_name(self.config.statistic),
            self.config.metric_name,
            self.config.evaluation_periods,
            self.config.period.as_secs(),
            observed,
            verdict,
            self.config.comparison.symbol(),
            self.config.threshold
        )
    }

    fn transition(
        &mut self,
        to: AlarmState,
        reason: String,
        value: Option<f64>,
    ) -> Option<Transition> {
        if self.state == to {
            return None;
        }
        let from = std::mem::replace(&mut self.state, to);
        Some(Transition {
            from,
            to,
            reason,
            value,
        })
    }
}

fn statistic_name(statistic: Statistic) -> &'static str {
    match statistic {
        Statistic::Maximum => "Maximum",
        Statistic::Minimum => "Minimum",
        Statistic::Sum => "Sum",
        Statistic::Average => "Average",
        Statistic::SampleCount => "SampleCount",
    }
}

/// Payload published to the alarm topic on the breach edge.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AlarmNotification {
    pub alarm_name: String,
    pub old_state: AlarmState,
    pub new_state: AlarmState,
    pub reason: String,
    pub threshold: f64,
    pub value: Option<f64>,
    pub state_change_time: u64,
}
