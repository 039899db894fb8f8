//! Scrape collector over the sample cache.
//!
//! Implements the prometheus collector interface for every user query:
//! `describe` emits each query's descriptor exactly once, `collect`
//! serializes the cached samples. Neither ever touches SQL; a scrape's
//! cost is bounded by the snapshot copy.

use std::sync::Arc;

use prometheus::proto;

use crate::job::Job;
use crate::query::{Query, Sample};

/// Exposes the cached samples of every job to the scrape registry.
pub struct QueryCollector {
    jobs: Vec<Arc<Job>>,
}

impl QueryCollector {
    pub fn new(jobs: Vec<Arc<Job>>) -> Self {
        Self { jobs }
    }

    fn family_for(query: &Query, samples: &[Sample]) -> proto::MetricFamily {
        let desc = query.desc();
        let mut family = proto::MetricFamily::default();
        family.set_name(desc.name().to_string());
        family.set_help(desc.help().to_string());
        family.set_field_type(proto::MetricType::GAUGE);

        for sample in samples {
            // Skip anything that would not line up with the descriptor.
            if sample.labels.len() != desc.variable_labels().len() {
                continue;
            }

            let mut metric = proto::Metric::default();
            for (name, value) in desc.variable_labels().iter().zip(&sample.labels) {
                let mut pair = proto::LabelPair::default();
                pair.set_name(name.clone());
                pair.set_value(value.clone());
                metric.mut_label().push(pair);
            }
            let mut job_pair = proto::LabelPair::default();
            job_pair.set_name("sql_job".to_string());
            job_pair.set_value(desc.job().to_string());
            metric.mut_label().push(job_pair);

            let mut gauge = proto::Gauge::default();
            gauge.set_value(sample.value);
            metric.set_gauge(gauge);

            if let Some(ts) = sample.timestamp {
                metric.set_timestamp_ms(ts.timestamp_millis());
            }
            family.mut_metric().push(metric);
        }
        family
    }
}

impl prometheus::core::Collector for QueryCollector {
    fn desc(&self) -> Vec<&prometheus::core::Desc> {
        self.jobs
            .iter()
            .flat_map(|job| job.queries())
            .map(|query| query.desc().prom())
            .collect()
    }

    fn collect(&self) -> Vec<proto::MetricFamily> {
        let mut families = Vec::new();
        for job in &self.jobs {
            for query in job.queries() {
                let samples = query.samples_snapshot();
                if samples.is_empty() {
                    continue;
                }
                families.push(Self::family_for(query, &samples));
            }
        }
        families
    }
}
