use metrics::{counter, gauge};
use relay_core::now_millis;
use relay_dispatch::Topic;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::alarm::{AlarmConfig, AlarmNotification, AlarmState, AlarmStateMachine, Transition};
use crate::errors::Result;
use crate::metric_stream::MetricStream;
use crate::telemetry_metrics::{
    ALARM_EVALUATED_VALUE, ALARM_NOTIFICATIONS_TOTAL, ALARM_STATE, ALARM_TRANSITIONS_TOTAL,
};

/// Drives an `AlarmStateMachine` from a metric stream, once per period.
///
/// Each period aggregates the samples appended since the previous
/// evaluation. Entering `ALARM` publishes one `AlarmNotification` to the
/// alarm topic; staying in `ALARM` publishes nothing.
pub struct AlarmEvaluator {
    machine: AlarmStateMachine,
    stream: Arc<MetricStream>,
    topic: Arc<Topic>,
    cursor: usize,
    state_tx: watch::Sender<AlarmState>,
}

impl AlarmEvaluator {
    pub fn new(config: AlarmConfig, stream: Arc<MetricStream>, topic: Arc<Topic>) -> Result<Self> {
        config.validate()?;
        let machine = AlarmStateMachine::new(config);
        let (state_tx, _) = watch::channel(machine.state());
        gauge!(ALARM_STATE.name, "alarm" => machine.config().name.clone())
            .set(machine.state().as_gauge());
        Ok(AlarmEvaluator {
            machine,
            stream,
            topic,
            cursor: 0,
            state_tx,
        })
    }

    pub fn config(&self) -> &AlarmConfig {
        self.machine.config()
    }

    pub fn state(&self) -> AlarmState {
        self.machine.state()
    }

    /// Follow state changes; the receiver starts at the current state.
    pub fn subscribe(&self) -> watch::Receiver<AlarmState> {
        self.state_tx.subscribe()
    }

    /// Close the current period: aggregate its samples, apply the
    /// transition rules and react to the transition, if any.
    pub async fn evaluate_period(&mut self) -> Option<Transition> {
        let (samples, next_cursor) = self.stream.read_from(self.cursor).await;
        self.cursor = next_cursor;

        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        let datapoint = self.machine.config().statistic.aggregate(&values);
        let alarm = self.machine.config().name.clone();

        debug!(
            alarm = %alarm,
            samples = values.len(),
            datapoint = ?datapoint,
            state = %self.machine.state(),
            "evaluating period"
        );
        if let Some(value) = datapoint {
            gauge!(ALARM_EVALUATED_VALUE.name, "alarm" => alarm.clone()).set(value);
        }

        let transition = self.machine.evaluate(datapoint)?;

        info!(
            alarm = %alarm,
            from = %transition.from,
            to = %transition.to,
            "alarm state changed: {}",
            transition.reason
        );
        counter!(
            ALARM_TRANSITIONS_TOTAL.name,
            "alarm" => alarm.clone(),
            "to" => transition.to.to_string()
        )
        .increment(1);
        gauge!(ALARM_STATE.name, "alarm" => alarm.clone()).set(transition.to.as_gauge());
        self.state_tx.send_replace(transition.to);

        if transition.is_breach() {
            self.notify(&transition);
        }
        Some(transition)
    }

    fn notify(&self, transition: &Transition) {
        let config = self.machine.config();
        let notification = AlarmNotification {
            alarm_name: config.name.clone(),
            old_state: transition.from,
            new_state: transition.to,
            reason: transition.reason.clone(),
            threshold: config.threshold,
            value: transition.value,
            state_change_time: now_millis(),
        };
        let subject = format!("ALARM: \"{}\"", config.name);
        match self.topic.publish(Some(&subject), &notification) {
            Ok(message_id) => {
                warn!(
                    alarm = %config.name,
                    topic = self.topic.name(),
                    message_id = %message_id,
                    "breach notification published"
                );
                counter!(ALARM_NOTIFICATIONS_TOTAL.name, "alarm" => config.name.clone())
                    .increment(1);
            }
            Err(e) => {
                error!(alarm = %config.name, "failed to publish breach notification: {}", e);
            }
        }
    }

    /// Evaluate at the end of every period until `cancel` fires.
    pub async fn run(mut self, cancel: CancellationToken) {
        let period = self.machine.config().period;
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        info!(
            alarm = %self.machine.config().name,
            period_secs = period.as_secs_f64(),
            threshold = self.machine.config().threshold,
            "alarm evaluator started"
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    self.evaluate_period().await;
                }
            }
        }
        info!(alarm = %self.machine.config().name, "alarm evaluator stopped");
    }
}
