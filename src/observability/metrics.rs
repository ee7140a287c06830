//! OpenTelemetry metrics for the pacing operator.
//!
//! Key metrics:
//! - cadence_values_received_total: Counter for values pushed upstream
//! - cadence_values_emitted_total: Counter for values delivered downstream
//! - cadence_values_buffered: Gauge for the current queue depth, per instance
//! - cadence_emission_delay_seconds: Histogram for time spent buffered
//!
//! Recording is a no-op until [`init_metrics`] has been called.

use opentelemetry::metrics::{Counter, Gauge, Histogram, Meter};
use opentelemetry::{global, KeyValue};
use opentelemetry_sdk::metrics::{ManualReader, SdkMeterProvider};
use std::sync::OnceLock;
use std::time::Duration;

/// Global metrics instance.
static METRICS: OnceLock<Metrics> = OnceLock::new();

/// Cadence metrics registry.
#[derive(Debug)]
pub struct Metrics {
    /// Values accepted from upstream.
    pub values_received: Counter<u64>,
    /// Values delivered downstream.
    pub values_emitted: Counter<u64>,
    /// Values currently waiting in a normalizer queue.
    pub values_buffered: Gauge<i64>,
    /// Time between a value arriving and its delivery.
    pub emission_delay: Histogram<f64>,
}

impl Metrics {
    fn new(meter: &Meter) -> Self {
        Self {
            values_received: meter
                .u64_counter("cadence_values_received_total")
                .with_description("Values pushed into a normalizer")
                .with_unit("1")
                .init(),
            values_emitted: meter
                .u64_counter("cadence_values_emitted_total")
                .with_description("Values delivered downstream by a normalizer")
                .with_unit("1")
                .init(),
            values_buffered: meter
                .i64_gauge("cadence_values_buffered")
                .with_description("Values queued awaiting their pacing slot")
                .with_unit("1")
                .init(),
            emission_delay: meter
                .f64_histogram("cadence_emission_delay_seconds")
                .with_description("Time a value spent buffered before delivery")
                .with_unit("s")
                .init(),
        }
    }
}

/// Initialize the metrics system.
///
/// Metrics are recorded into a manual reader and not exported. Subsequent
/// calls are ignored.
pub fn init_metrics() {
    METRICS.get_or_init(|| {
        let reader = ManualReader::builder().build();
        let provider = SdkMeterProvider::builder().with_reader(reader).build();
        global::set_meter_provider(provider);

        let meter = global::meter("cadence");
        Metrics::new(&meter)
    });
}

/// Get the global metrics instance, if initialized.
pub fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

fn attrs(normalizer: &str) -> [KeyValue; 1] {
    [KeyValue::new("normalizer", normalizer.to_string())]
}

/// Record a value accepted from upstream.
pub fn record_received(normalizer: &str) {
    if let Some(m) = METRICS.get() {
        m.values_received.add(1, &attrs(normalizer));
    }
}

/// Record a value delivered downstream after `delay` in the queue.
pub fn record_emitted(normalizer: &str, delay: Duration) {
    if let Some(m) = METRICS.get() {
        let attrs = attrs(normalizer);
        m.values_emitted.add(1, &attrs);
        m.emission_delay.record(delay.as_secs_f64(), &attrs);
    }
}

fn instance_attrs(normalizer: &str, instance: u64) -> [KeyValue; 2] {
    let instance = i64::try_from(instance).unwrap_or(i64::MAX);
    [
        KeyValue::new("normalizer", normalizer.to_string()),
        KeyValue::new("instance", instance),
    ]
}

/// Record the current queue depth of one operator instance.
pub fn record_buffered(normalizer: &str, instance: u64, depth: usize) {
    if let Some(m) = METRICS.get() {
        let depth = i64::try_from(depth).unwrap_or(i64::MAX);
        m.values_buffered
            .record(depth, &instance_attrs(normalizer, instance));
    }
}
