use std::time::Instant;

use opentelemetry::{KeyValue, metrics::Histogram};

/// Wall-clock timer for one operation, reported in milliseconds.
///
/// ```rust
/// use telemetry::{KeyValue, metrics::{ADMISSION_DURATION, Recorder}};
///
/// let recorder = Recorder::start(ADMISSION_DURATION, [KeyValue::new("tier", "get:standard")]);
/// recorder.finish("allowed");
/// ```
pub struct Recorder {
    start: Instant,
    histogram: Histogram<f64>,
    attributes: Vec<KeyValue>,
}

impl Recorder {
    /// Start timing for the histogram `name`, tagged with `attributes`.
    pub fn start(name: &'static str, attributes: impl IntoIterator<Item = KeyValue>) -> Self {
        Self {
            start: Instant::now(),
            histogram: super::meter().f64_histogram(name).with_unit("ms").build(),
            attributes: attributes.into_iter().collect(),
        }
    }

    /// Records the elapsed time with an `outcome` attribute.
    pub fn finish(mut self, outcome: &'static str) {
        self.attributes.push(KeyValue::new("outcome", outcome));

        let elapsed = self.start.elapsed().as_secs_f64() * 1000.0;
        self.histogram.record(elapsed, &self.attributes);
    }
}
