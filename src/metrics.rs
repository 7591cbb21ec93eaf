//! Prometheus metrics for the sentiment router.
//!
//! ## Usage
//!
//! Call [`init_metrics`] once at process startup. The helper functions
//! (`record_stage_latency`, `inc_request`, …) are no-ops if `init_metrics`
//! was never called, so analysis is always safe to run and observability
//! simply degrades gracefully.
//!
//! ## Metrics Exposed
//!
//! | Name | Type | Labels |
//! |------|------|--------|
//! | `sentiment_requests_total` | Counter | `model` |
//! | `sentiment_escalations_total` | Counter | `reason` |
//! | `sentiment_errors_total` | Counter | `stage`, `err_type` |
//! | `sentiment_stage_duration_seconds` | Histogram | `stage` |
//! | `sentiment_batch_size` | Histogram | |

use crate::SentimentError;
use prometheus::{
    core::Collector, CounterVec, Encoder, Histogram, HistogramOpts, HistogramVec, Opts, Registry,
    TextEncoder,
};
use std::collections::HashMap;
use std::sync::OnceLock;
use std::time::Duration;

/// Bucket bounds for the batch size histogram.
const BATCH_SIZE_BUCKETS: [f64; 7] = [1.0, 5.0, 10.0, 25.0, 50.0, 75.0, 100.0];

// ── Internal metrics bundle ────────────────────────────────────────────────

/// All Prometheus metrics for the router, bundled together so they can be
/// stored in a single [`OnceLock`] and initialised atomically.
pub struct Metrics {
    /// Prometheus registry that owns all metric descriptors.
    pub registry: Registry,
    /// Completed analyses per model used (`fast` / `accurate`).
    pub requests_total: CounterVec,
    /// Escalations per reason code prefix.
    pub escalations_total: CounterVec,
    /// Errors by stage and error type.
    pub errors_total: CounterVec,
    /// Stage processing latency histogram.
    pub stage_duration: HistogramVec,
    /// Accepted batch sizes.
    pub batch_size: Histogram,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

impl Metrics {
    /// Build a metrics bundle whose metric names start with `prefix`.
    fn build(prefix: &str) -> Result<Self, prometheus::Error> {
        let registry = Registry::new();

        let requests_total = CounterVec::new(
            Opts::new(
                format!("{prefix}_requests_total"),
                "Completed analyses by model used",
            ),
            &["model"],
        )?;
        registry.register(Box::new(requests_total.clone()))?;

        let escalations_total = CounterVec::new(
            Opts::new(
                format!("{prefix}_escalations_total"),
                "Requests escalated to the accurate model, by reason",
            ),
            &["reason"],
        )?;
        registry.register(Box::new(escalations_total.clone()))?;

        let errors_total = CounterVec::new(
            Opts::new(format!("{prefix}_errors_total"), "Errors by stage and type"),
            &["stage", "err_type"],
        )?;
        registry.register(Box::new(errors_total.clone()))?;

        let stage_duration = HistogramVec::new(
            HistogramOpts::new(
                format!("{prefix}_stage_duration_seconds"),
                "Processing duration per stage",
            ),
            &["stage"],
        )?;
        registry.register(Box::new(stage_duration.clone()))?;

        let batch_size = Histogram::with_opts(
            HistogramOpts::new(format!("{prefix}_batch_size"), "Texts per accepted batch")
                .buckets(BATCH_SIZE_BUCKETS.to_vec()),
        )?;
        registry.register(Box::new(batch_size.clone()))?;

        Ok(Self {
            registry,
            requests_total,
            escalations_total,
            errors_total,
            stage_duration,
            batch_size,
        })
    }
}

// ── Initialisation ─────────────────────────────────────────────────────────

/// Initialise all Prometheus metrics and register them with a private registry.
///
/// Calling it a second time is a no-op (returns `Ok(())`).
///
/// # Errors
///
/// Returns [`SentimentError::Other`] if metric construction or registry
/// registration fails.
///
/// # Panics
///
/// This function never panics.
pub fn init_metrics() -> Result<(), SentimentError> {
    if METRICS.get().is_some() {
        return Ok(());
    }

    let metrics = Metrics::build("sentiment")
        .map_err(|e| SentimentError::Other(format!("metrics init failed: {e}")))?;

    // If another thread raced us, the first one wins; both bundles carry
    // identical descriptors.
    let _ = METRICS.set(metrics);

    Ok(())
}

/// Return a reference to the initialised [`Metrics`], or `None` if
/// [`init_metrics`] has not been called yet.
fn metrics() -> Option<&'static Metrics> {
    METRICS.get()
}

// ── Public helper functions ────────────────────────────────────────────────

/// Record the processing latency for a stage (`fast_model`, `routing`, …).
///
/// No-op if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn record_stage_latency(stage: &str, d: Duration) {
    if let Some(m) = metrics() {
        if let Ok(h) = m.stage_duration.get_metric_with_label_values(&[stage]) {
            h.observe(d.as_secs_f64());
        }
    }
}

/// Increment the completed-request counter for the model used.
///
/// No-op if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn inc_request(model: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.requests_total.get_metric_with_label_values(&[model]) {
            c.inc();
        }
    }
}

/// Increment the escalation counter for a reason code prefix
/// (e.g. `PATTERN_MATCH`).
///
/// No-op if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn inc_escalation(reason: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m.escalations_total.get_metric_with_label_values(&[reason]) {
            c.inc();
        }
    }
}

/// Increment the error counter for a stage and error type.
///
/// No-op if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn inc_error(stage: &str, err_type: &str) {
    if let Some(m) = metrics() {
        if let Ok(c) = m
            .errors_total
            .get_metric_with_label_values(&[stage, err_type])
        {
            c.inc();
        }
    }
}

/// Record the size of an accepted batch.
///
/// No-op if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn observe_batch_size(size: usize) {
    if let Some(m) = metrics() {
        m.batch_size.observe(size as f64);
    }
}

/// Gather all registered metrics as a raw list of metric families.
///
/// Returns an empty `Vec` if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn gather() -> Vec<prometheus::proto::MetricFamily> {
    metrics().map_or_else(Vec::new, |m| m.registry.gather())
}

/// Gather and encode all metrics in the Prometheus text exposition format.
///
/// Returns an empty string if metrics have not been initialised or if
/// encoding fails.
///
/// # Panics
///
/// This function never panics.
pub fn gather_metrics() -> String {
    let families = gather();
    if families.is_empty() {
        return String::new();
    }
    let encoder = TextEncoder::new();
    let mut buffer = Vec::new();
    if encoder.encode(&families, &mut buffer).is_err() {
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// A structured snapshot of key metric counters, used by the health endpoint.
#[derive(Debug, Default, Clone, serde::Serialize)]
pub struct MetricsSummary {
    /// Completed analyses keyed by model label.
    pub requests_total: HashMap<String, u64>,
    /// Escalations keyed by reason label.
    pub escalations_total: HashMap<String, u64>,
    /// Error counts keyed by `"stage:err_type"`.
    pub errors_total: HashMap<String, u64>,
}

/// Sum counter values of `vec`, keyed by the joined values of `labels`.
fn counter_values(vec: &CounterVec, labels: &[&str]) -> HashMap<String, u64> {
    let mut out = HashMap::new();
    for family in vec.collect() {
        for metric in family.get_metric() {
            let key = labels
                .iter()
                .map(|name| {
                    metric
                        .get_label()
                        .iter()
                        .find(|l| l.get_name() == *name)
                        .map_or("unknown", |l| l.get_value())
                })
                .collect::<Vec<_>>()
                .join(":");
            let value = metric.get_counter().get_value() as u64;
            out.insert(key, value);
        }
    }
    out
}

/// Return a structured summary of current metric counter values.
///
/// Returns a zeroed [`MetricsSummary`] if metrics have not been initialised.
///
/// # Panics
///
/// This function never panics.
pub fn get_metrics_summary() -> MetricsSummary {
    let Some(m) = metrics() else {
        return MetricsSummary::default();
    };

    MetricsSummary {
        requests_total: counter_values(&m.requests_total, &["model"]),
        escalations_total: counter_values(&m.escalations_total, &["reason"]),
        errors_total: counter_values(&m.errors_total, &["stage", "err_type"]),
    }
}
