use relay_core::MetricSample;
use std::collections::VecDeque;
use tokio::sync::RwLock;

/// Samples kept by a metric stream before the oldest are dropped.
pub const DEFAULT_MAX_SAMPLES: usize = 10_000;

/// Append-only time series of one metric, fed by metric filters and read by alarms.
///
/// Readers keep their own cursor, an absolute sample index. Only the newest
/// `max_samples` are retained; a cursor behind them resumes at the oldest one.
#[derive(Debug)]
pub struct MetricStream {
    namespace: String,
    name: String,
    samples: RwLock<Samples>,
    max_samples: usize,
}

#[derive(Debug, Default)]
struct Samples {
    // absolute index of window[0]
    offset: usize,
    window: VecDeque<MetricSample>,
}

impl MetricStream {
    pub fn new(namespace: &str, name: &str) -> Self {
        MetricStream {
            namespace: namespace.to_string(),
            name: name.to_string(),
            samples: RwLock::new(Samples::default()),
            max_samples: DEFAULT_MAX_SAMPLES,
        }
    }

    pub fn with_max_samples(mut self, max_samples: usize) -> Self {
        self.max_samples = max_samples.max(1);
        self
    }

    pub fn namespace(&self) -> &str {
        &self.namespace
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Append a sample. Samples for another metric are ignored.
    pub async fn append(&self, sample: MetricSample) -> bool {
        if sample.namespace != self.namespace || sample.name != self.name {
            return false;
        }
        let mut samples = self.samples.write().await;
        samples.window.push_back(sample);
        while samples.window.len() > self.max_samples {
            samples.window.pop_front();
            samples.offset += 1;
        }
        true
    }

    /// Retained samples at or after `cursor`, and the cursor to read from next.
    pub async fn read_from(&self, cursor: usize) -> (Vec<MetricSample>, usize) {
        let samples = self.samples.read().await;
        let end = samples.offset + samples.window.len();
        let start = cursor.clamp(samples.offset, end) - samples.offset;
        (samples.window.range(start..).cloned().collect(), end)
    }

    /// Number of retained samples.
    pub async fn len(&self) -> usize {
        self.samples.read().await.window.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.samples.read().await.window.is_empty()
    }
}
