//! Exporter self-metrics.
//!
//! Counters, the per-target scrape-failure gauge, and the query duration
//! histogram. Built once at construction (the histogram buckets and the
//! redact list come from the configuration) and registered on the
//! exporter's registry; all handles are atomic and cheap to clone.

use std::sync::OnceLock;

use prometheus::{
    GaugeVec, HistogramOpts, HistogramVec, IntCounterVec, Opts, Registry,
};
use regex::Regex;

use crate::connection::ConnectionSpec;
use crate::labels::{self, RedactList};

/// Prefix of every self-metric family.
pub const METRICS_PREFIX: &str = "sql_exporter";

/// Strip every character Prometheus rejects in a metric name.
pub fn sanitize_metric_name(raw: &str) -> String {
    static INVALID: OnceLock<Regex> = OnceLock::new();
    let re = INVALID.get_or_init(|| {
        Regex::new("[^a-zA-Z0-9_:]+").expect("failed to compile metric name regex")
    });
    re.replace_all(raw, "").into_owned()
}

/// Shared self-metric handles.
pub struct ExporterMetrics {
    redact: RedactList,
    queries_total: IntCounterVec,
    query_failures_total: IntCounterVec,
    last_scrape_failed: GaugeVec,
    query_duration_seconds: HistogramVec,
}

impl std::fmt::Debug for ExporterMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExporterMetrics")
            .field("redact", &self.redact)
            .finish_non_exhaustive()
    }
}

impl ExporterMetrics {
    /// Create and register the self-metric families.
    pub fn new(
        registry: &Registry,
        histogram_buckets: Vec<f64>,
        redact: RedactList,
    ) -> Result<Self, prometheus::Error> {
        let queries_total = IntCounterVec::new(
            Opts::new(
                format!("{METRICS_PREFIX}_queries_total"),
                "Total query executions attempted.",
            ),
            &["sql_job", "query"],
        )?;
        let query_failures_total = IntCounterVec::new(
            Opts::new(
                format!("{METRICS_PREFIX}_query_failures_total"),
                "Total failed query executions.",
            ),
            &["sql_job", "query"],
        )?;
        let last_scrape_failed = GaugeVec::new(
            Opts::new(
                format!("{METRICS_PREFIX}_last_scrape_failed"),
                "Failed scrapes",
            ),
            &labels::failed_scrape_label_names(&redact),
        )?;
        let query_duration_seconds = HistogramVec::new(
            HistogramOpts::new(
                format!("{METRICS_PREFIX}_query_duration_seconds"),
                "Time spent by querying the database.",
            )
            .buckets(histogram_buckets),
            &["sql_job", "query"],
        )?;

        registry.register(Box::new(queries_total.clone()))?;
        registry.register(Box::new(query_failures_total.clone()))?;
        registry.register(Box::new(last_scrape_failed.clone()))?;
        registry.register(Box::new(query_duration_seconds.clone()))?;

        Ok(Self {
            redact,
            queries_total,
            query_failures_total,
            last_scrape_failed,
            query_duration_seconds,
        })
    }

    pub fn redact(&self) -> &RedactList {
        &self.redact
    }

    pub fn inc_query(&self, job: &str, query: &str) {
        self.queries_total.with_label_values(&[job, query]).inc();
    }

    pub fn inc_failure(&self, job: &str, query: &str) {
        self.query_failures_total
            .with_label_values(&[job, query])
            .inc();
    }

    pub fn observe_duration(&self, job: &str, query: &str, seconds: f64) {
        self.query_duration_seconds
            .with_label_values(&[job, query])
            .observe(seconds);
    }

    /// Set the scrape-failure gauge for one (connection, query) pair.
    pub fn mark_scrape_failed(&self, spec: &ConnectionSpec, job: &str, query: &str) {
        self.set_scrape_failed(spec, job, query, 1.0);
    }

    /// Clear the scrape-failure gauge for one (connection, query) pair.
    pub fn clear_scrape_failed(&self, spec: &ConnectionSpec, job: &str, query: &str) {
        self.set_scrape_failed(spec, job, query, 0.0);
    }

    fn set_scrape_failed(&self, spec: &ConnectionSpec, job: &str, query: &str, value: f64) {
        let values = labels::failed_scrape_label_values(spec, job, query, &self.redact);
        let refs: Vec<&str> = values.iter().map(String::as_str).collect();
        self.last_scrape_failed.with_label_values(&refs).set(value);
    }

    /// Current value of the scrape-failure gauge, for tests and probes.
    pub fn scrape_failed_value(&self, spec: &ConnectionSpec, job: &str, query: &str) -> f64 {
        let values = labels::failed_scrape_label_values(spec, job, query, &self.redact);
        let refs: Vec<&str> = values.iter().map(String::as_str).collect();
        self.last_scrape_failed.with_label_values(&refs).get()
    }

    /// Current counter readings for one (job, query) pair.
    pub fn query_counts(&self, job: &str, query: &str) -> (u64, u64) {
        (
            self.queries_total.with_label_values(&[job, query]).get(),
            self.query_failures_total
                .with_label_values(&[job, query])
                .get(),
        )
    }
}
