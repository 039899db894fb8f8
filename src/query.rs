//! Query execution and sample materialization.
//!
//! One [`Query`] owns the metric descriptor built at job init and the
//! cache of the most recent sample vector per connection. Executing a
//! query streams rows into immutable [`Sample`]s and replaces the cache
//! entry for that connection atomically; scrapes only ever read the cache.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Instant;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::config::QueryConfig;
use crate::connection::{Connection, ConnectionSpec};
use crate::driver::{DriverError, Row};
use crate::labels::{self, RedactList};
use crate::metrics::{sanitize_metric_name, ExporterMetrics};

/// Errors from executing one query on one connection.
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("query is empty")]
    EmptySql,

    #[error(transparent)]
    Driver(#[from] DriverError),

    #[error("zero rows returned")]
    ZeroRows,
}

/// Immutable identity of a query's metric family.
pub struct MetricDesc {
    name: String,
    help: String,
    variable_labels: Vec<String>,
    job: String,
    prom: prometheus::core::Desc,
}

impl MetricDesc {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn help(&self) -> &str {
        &self.help
    }

    pub fn variable_labels(&self) -> &[String] {
        &self.variable_labels
    }

    pub fn job(&self) -> &str {
        &self.job
    }

    pub fn prom(&self) -> &prometheus::core::Desc {
        &self.prom
    }
}

/// One immutable observation: a gauge value with its complete label
/// vector and an optional explicit timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub value: f64,
    /// Label values, in descriptor order.
    pub labels: Vec<String>,
    pub timestamp: Option<DateTime<Utc>>,
}

/// A user query bound to its descriptor and sample cache.
pub struct Query {
    name: String,
    job_name: String,
    sql: String,
    labels: Vec<String>,
    values: Vec<String>,
    timestamp: Option<String>,
    allow_zero_rows: bool,
    desc: MetricDesc,
    /// Most recent sample vector per connection identity.
    samples: Mutex<HashMap<String, Vec<Sample>>>,
}

impl std::fmt::Debug for Query {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Query")
            .field("name", &self.name)
            .field("job", &self.job_name)
            .finish_non_exhaustive()
    }
}

impl Query {
    /// Build a runtime query from its configuration.
    ///
    /// Returns `None` (with a warning) for queries with no resolvable SQL
    /// or an invalid descriptor; the job continues without them.
    pub fn from_config(
        cfg: &QueryConfig,
        job_name: &str,
        iterator_label: Option<&str>,
        shared_queries: &HashMap<String, String>,
        redact: &RedactList,
    ) -> Option<Self> {
        let mut sql = cfg.query.clone().unwrap_or_default();
        if sql.is_empty() {
            if let Some(query_ref) = &cfg.query_ref {
                if let Some(shared) = shared_queries.get(query_ref) {
                    sql = shared.clone();
                }
            }
        }
        if sql.is_empty() {
            tracing::warn!(job = %job_name, query = %cfg.name, "Skipping empty query");
            return None;
        }

        let mut declared = cfg.labels.clone();
        if let Some(label) = iterator_label {
            if !label.is_empty() {
                declared.push(label.to_string());
            }
        }

        let name = sanitize_metric_name(&format!("sql_{}", cfg.name));
        let help = if cfg.help.is_empty() {
            format!("Values of query {}", cfg.name)
        } else {
            cfg.help.clone()
        };

        // The descriptor's variable label order is the contract: declared
        // labels in listing order, then the fixed tail. Sample label
        // vectors are built in exactly the same order.
        let mut variable_labels = declared.clone();
        variable_labels.extend(
            labels::gauge_fixed_label_names(redact)
                .iter()
                .map(|l| l.to_string()),
        );

        let mut const_labels = HashMap::new();
        const_labels.insert("sql_job".to_string(), job_name.to_string());

        let prom = match prometheus::core::Desc::new(
            name.clone(),
            help.clone(),
            variable_labels.clone(),
            const_labels,
        ) {
            Ok(desc) => desc,
            Err(e) => {
                tracing::warn!(job = %job_name, query = %cfg.name, error = %e,
                    "Skipping query with invalid metric descriptor");
                return None;
            }
        };

        Some(Self {
            name: cfg.name.clone(),
            job_name: job_name.to_string(),
            sql,
            labels: declared,
            values: cfg.values.clone(),
            timestamp: cfg.timestamp.clone(),
            allow_zero_rows: cfg.allow_zero_rows,
            desc: MetricDesc {
                name,
                help,
                variable_labels,
                job: job_name.to_string(),
                prom,
            },
            samples: Mutex::new(HashMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn desc(&self) -> &MetricDesc {
        &self.desc
    }

    /// Whether the SQL text contains `{{placeholder}}`.
    pub fn has_placeholder(&self, placeholder: &str) -> bool {
        !placeholder.is_empty() && self.sql.contains(&format!("{{{{{placeholder}}}}}"))
    }

    /// Execute on one connection and replace its cached samples.
    pub async fn run(
        &self,
        conn: &Connection,
        metrics: &ExporterMetrics,
    ) -> Result<(), QueryError> {
        metrics.inc_query(&self.job_name, &self.name);
        if self.sql.is_empty() {
            metrics.inc_failure(&self.job_name, &self.name);
            return Err(QueryError::EmptySql);
        }

        let started = Instant::now();
        let rows = match conn.query(&self.sql).await {
            Ok(rows) => rows,
            Err(e) => {
                metrics.mark_scrape_failed(conn.spec(), &self.job_name, &self.name);
                metrics.inc_failure(&self.job_name, &self.name);
                return Err(e.into());
            }
        };
        metrics.observe_duration(&self.job_name, &self.name, started.elapsed().as_secs_f64());

        let mut samples = Vec::with_capacity(rows.len());
        let mut updated = 0usize;
        for row in &rows {
            match self.row_samples(conn.spec(), row, None, metrics.redact()) {
                Ok(mut row_samples) => {
                    samples.append(&mut row_samples);
                    updated += 1;
                    metrics.clear_scrape_failed(conn.spec(), &self.job_name, &self.name);
                }
                Err(e) => {
                    tracing::error!(job = %self.job_name, query = %self.name,
                        host = %conn.spec().host, db = %conn.spec().database, error = %e,
                        "Failed to update metrics");
                    metrics.mark_scrape_failed(conn.spec(), &self.job_name, &self.name);
                }
            }
        }

        self.finish_run(conn, samples, updated, metrics)
    }

    /// Execute once per iterator value, with the placeholder substituted
    /// and the iterator value bound to its label slot.
    pub async fn run_iterator(
        &self,
        conn: &Connection,
        placeholder: &str,
        iterator_values: &[String],
        iterator_label: &str,
        metrics: &ExporterMetrics,
    ) -> Result<(), QueryError> {
        metrics.inc_query(&self.job_name, &self.name);
        if self.sql.is_empty() {
            metrics.inc_failure(&self.job_name, &self.name);
            return Err(QueryError::EmptySql);
        }

        let started = Instant::now();
        let mut samples = Vec::new();
        let mut updated = 0usize;

        for value in iterator_values {
            let sql = self.substituted(placeholder, value);
            let rows = match conn.query(&sql).await {
                Ok(rows) => rows,
                Err(e) => {
                    metrics.mark_scrape_failed(conn.spec(), &self.job_name, &self.name);
                    metrics.inc_failure(&self.job_name, &self.name);
                    return Err(e.into());
                }
            };

            for row in &rows {
                match self.row_samples(
                    conn.spec(),
                    row,
                    Some((value.as_str(), iterator_label)),
                    metrics.redact(),
                ) {
                    Ok(mut row_samples) => {
                        samples.append(&mut row_samples);
                        updated += 1;
                        metrics.clear_scrape_failed(conn.spec(), &self.job_name, &self.name);
                    }
                    Err(e) => {
                        tracing::error!(job = %self.job_name, query = %self.name,
                            host = %conn.spec().host, db = %conn.spec().database, error = %e,
                            "Failed to update metrics");
                        metrics.mark_scrape_failed(conn.spec(), &self.job_name, &self.name);
                    }
                }
            }
        }
        metrics.observe_duration(&self.job_name, &self.name, started.elapsed().as_secs_f64());

        self.finish_run(conn, samples, updated, metrics)
    }

    fn finish_run(
        &self,
        conn: &Connection,
        samples: Vec<Sample>,
        updated: usize,
        metrics: &ExporterMetrics,
    ) -> Result<(), QueryError> {
        if updated < 1 {
            if self.allow_zero_rows {
                metrics.clear_scrape_failed(conn.spec(), &self.job_name, &self.name);
            } else {
                metrics.mark_scrape_failed(conn.spec(), &self.job_name, &self.name);
                metrics.inc_failure(&self.job_name, &self.name);
                return Err(QueryError::ZeroRows);
            }
        }

        self.samples
            .lock()
            .expect("sample cache lock poisoned")
            .insert(conn.key(), samples);
        Ok(())
    }

    fn substituted(&self, placeholder: &str, value: &str) -> String {
        self.sql.replace(&format!("{{{{{placeholder}}}}}"), value)
    }

    /// Materialize the samples of one row, one per value column.
    fn row_samples(
        &self,
        spec: &ConnectionSpec,
        row: &Row,
        iterator: Option<(&str, &str)>,
        redact: &RedactList,
    ) -> Result<Vec<Sample>, String> {
        if self.values.is_empty() {
            tracing::debug!(query = %self.name, "No values defined in configuration");
            return Ok(Vec::new());
        }

        // Every label slot must be filled, in declared order, or the
        // value vector will not line up with the descriptor.
        let mut base_labels = Vec::with_capacity(self.labels.len() + 5);
        for label in &self.labels {
            if let Some((value, name)) = iterator {
                if label == name && !value.is_empty() {
                    base_labels.push(value.to_string());
                    continue;
                }
            }
            match row.get(label) {
                Some(cell) => match cell.as_label() {
                    Some(text) => base_labels.push(text),
                    None => {
                        return Err(format!("column '{label}' must be type text (string)"));
                    }
                },
                None => base_labels.push(String::new()),
            }
        }

        let timestamp = self.timestamp.as_ref().and_then(|column| {
            let cell = row.get(column)?;
            let time = cell.as_time();
            if time.is_none() {
                tracing::warn!(query = %self.name, column = %column,
                    "timestamp column is not a time value");
            }
            time
        });

        let mut samples = Vec::with_capacity(self.values.len());
        for value_name in &self.values {
            let value = match row.get(value_name) {
                Some(cell) => match cell.to_float() {
                    Some(v) => v,
                    None => {
                        tracing::error!(query = %self.name, value = %value_name,
                            host = %spec.host, db = %spec.database,
                            "Failed to update metric: column must be type float");
                        continue;
                    }
                },
                None => {
                    tracing::warn!(query = %self.name, column = %value_name,
                        "Column not found in query result");
                    0.0
                }
            };

            let mut labels = base_labels.clone();
            labels::append_gauge_label_values(&mut labels, spec, value_name, redact);
            samples.push(Sample {
                value,
                labels,
                timestamp,
            });
        }

        if samples.is_empty() {
            return Err("zero values found".to_string());
        }
        Ok(samples)
    }

    /// Snapshot every cached sample, across all connections.
    pub fn samples_snapshot(&self) -> Vec<Sample> {
        self.samples
            .lock()
            .expect("sample cache lock poisoned")
            .values()
            .flatten()
            .cloned()
            .collect()
    }

    /// Cached samples for one connection, for tests.
    pub fn samples_for(&self, conn: &Connection) -> Option<Vec<Sample>> {
        self.samples
            .lock()
            .expect("sample cache lock poisoned")
            .get(&conn.key())
            .cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::QueryConfig;
    use crate::connection::{ConnectContext, Driver};
    use crate::driver::Value;
    use crate::testutil::{row, FakeConnector};
    use chrono::TimeZone;
    use prometheus::Registry;

    fn pg_spec() -> ConnectionSpec {
        ConnectionSpec {
            driver: Driver::Postgres { iam: false },
            url: "postgres://u@h/d".to_string(),
            host: "h".to_string(),
            database: "d".to_string(),
            user: "u".to_string(),
            tls: None,
            snowflake: None,
        }
    }

    async fn open_connection(connector: &FakeConnector) -> Connection {
        let conn = Connection::new(pg_spec());
        let cx = ConnectContext {
            connector,
            tokens: None,
            startup_sql: &[],
            pool_lifetime: None,
        };
        conn.ensure_open(&cx).await.unwrap();
        conn
    }

    fn metrics() -> ExporterMetrics {
        ExporterMetrics::new(
            &Registry::new(),
            prometheus::DEFAULT_BUCKETS.to_vec(),
            RedactList::default(),
        )
        .unwrap()
    }

    fn query_config(name: &str, sql: &str, values: &[&str]) -> QueryConfig {
        QueryConfig {
            name: name.to_string(),
            help: String::new(),
            labels: Vec::new(),
            values: values.iter().map(|v| v.to_string()).collect(),
            timestamp: None,
            allow_zero_rows: false,
            query: Some(sql.to_string()),
            query_ref: None,
        }
    }

    fn build(cfg: &QueryConfig) -> Query {
        Query::from_config(cfg, "j", None, &HashMap::new(), &RedactList::default()).unwrap()
    }

    #[tokio::test]
    async fn test_minimal_run_produces_expected_sample() {
        let connector = FakeConnector::new();
        connector.stub(
            "SELECT 1.0 AS count",
            vec![row(&[("count", Value::Float(1.0))])],
        );
        let conn = open_connection(&connector).await;
        let m = metrics();

        let q = build(&query_config("q", "SELECT 1.0 AS count", &["count"]));
        q.run(&conn, &m).await.unwrap();

        let samples = q.samples_for(&conn).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value, 1.0);
        assert_eq!(
            samples[0].labels,
            vec!["postgres", "h", "d", "u", "count"]
        );
        assert_eq!(q.desc().name(), "sql_q");
        assert_eq!(m.scrape_failed_value(&pg_spec(), "j", "q"), 0.0);
        assert_eq!(m.query_counts("j", "q"), (1, 0));
    }

    #[tokio::test]
    async fn test_declared_labels_precede_fixed_labels() {
        let connector = FakeConnector::new();
        connector.stub(
            "SELECT * FROM t",
            vec![row(&[
                ("tenant", Value::Text("acme".into())),
                ("rows", Value::Int(7)),
            ])],
        );
        let conn = open_connection(&connector).await;
        let m = metrics();

        let mut cfg = query_config("q", "SELECT * FROM t", &["rows"]);
        cfg.labels = vec!["tenant".to_string()];
        let q = build(&cfg);
        q.run(&conn, &m).await.unwrap();

        let samples = q.samples_for(&conn).unwrap();
        assert_eq!(
            samples[0].labels,
            vec!["acme", "postgres", "h", "d", "u", "rows"]
        );
        assert_eq!(
            q.desc().variable_labels(),
            &["tenant", "driver", "host", "database", "user", "col"]
        );
        // Value vector length always equals the descriptor length.
        assert_eq!(samples[0].labels.len(), q.desc().variable_labels().len());
    }

    #[tokio::test]
    async fn test_one_sample_per_value_column() {
        let connector = FakeConnector::new();
        connector.stub(
            "SELECT * FROM t",
            vec![row(&[
                ("reads", Value::Int(3)),
                ("writes", Value::Int(9)),
            ])],
        );
        let conn = open_connection(&connector).await;
        let m = metrics();

        let q = build(&query_config("q", "SELECT * FROM t", &["reads", "writes"]));
        q.run(&conn, &m).await.unwrap();

        let samples = q.samples_for(&conn).unwrap();
        assert_eq!(samples.len(), 2);
        assert_eq!(samples[0].labels.last().unwrap(), "reads");
        assert_eq!(samples[1].labels.last().unwrap(), "writes");
    }

    #[tokio::test]
    async fn test_missing_value_column_yields_zero_sample() {
        let connector = FakeConnector::new();
        connector.stub(
            "SELECT * FROM t",
            vec![row(&[("other", Value::Int(5))])],
        );
        let conn = open_connection(&connector).await;
        let m = metrics();

        let q = build(&query_config("q", "SELECT * FROM t", &["count"]));
        q.run(&conn, &m).await.unwrap();

        let samples = q.samples_for(&conn).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value, 0.0);
    }

    #[tokio::test]
    async fn test_uncoercible_value_is_skipped() {
        let connector = FakeConnector::new();
        connector.stub(
            "SELECT * FROM t",
            vec![row(&[
                ("good", Value::Text("2.5".into())),
                ("bad", Value::Text("not a number".into())),
            ])],
        );
        let conn = open_connection(&connector).await;
        let m = metrics();

        let q = build(&query_config("q", "SELECT * FROM t", &["good", "bad"]));
        q.run(&conn, &m).await.unwrap();

        let samples = q.samples_for(&conn).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].value, 2.5);
    }

    #[tokio::test]
    async fn test_non_string_label_rejects_row() {
        let connector = FakeConnector::new();
        connector.stub(
            "SELECT * FROM t",
            vec![
                row(&[("tenant", Value::Int(1)), ("count", Value::Int(1))]),
                row(&[
                    ("tenant", Value::Text("acme".into())),
                    ("count", Value::Int(2)),
                ]),
            ],
        );
        let conn = open_connection(&connector).await;
        let m = metrics();

        let mut cfg = query_config("q", "SELECT * FROM t", &["count"]);
        cfg.labels = vec!["tenant".to_string()];
        let q = build(&cfg);
        q.run(&conn, &m).await.unwrap();

        // Only the well-typed row survives.
        let samples = q.samples_for(&conn).unwrap();
        assert_eq!(samples.len(), 1);
        assert_eq!(samples[0].labels[0], "acme");
    }

    #[tokio::test]
    async fn test_absent_label_column_is_empty_string() {
        let connector = FakeConnector::new();
        connector.stub(
            "SELECT * FROM t",
            vec![row(&[("count", Value::Int(4))])],
        );
        let conn = open_connection(&connector).await;
        let m = metrics();

        let mut cfg = query_config("q", "SELECT * FROM t", &["count"]);
        cfg.labels = vec!["tenant".to_string()];
        let q = build(&cfg);
        q.run(&conn, &m).await.unwrap();

        let samples = q.samples_for(&conn).unwrap();
        assert_eq!(samples[0].labels[0], "");
    }

    #[tokio::test]
    async fn test_zero_rows_not_allowed_is_failure() {
        let connector = FakeConnector::new();
        let conn = open_connection(&connector).await;
        let m = metrics();

        let q = build(&query_config("q", "SELECT * FROM empty", &["count"]));
        let err = q.run(&conn, &m).await.unwrap_err();
        assert!(matches!(err, QueryError::ZeroRows));
        assert_eq!(m.scrape_failed_value(&pg_spec(), "j", "q"), 1.0);
        assert_eq!(m.query_counts("j", "q"), (1, 1));
    }

    #[tokio::test]
    async fn test_zero_rows_allowed_clears_gauge_and_cache() {
        let connector = FakeConnector::new();
        connector.stub(
            "SELECT * FROM t",
            vec![row(&[("count", Value::Int(1))])],
        );
        let conn = open_connection(&connector).await;
        let m = metrics();

        let mut cfg = query_config("q", "SELECT * FROM t", &["count"]);
        cfg.allow_zero_rows = true;
        let q = build(&cfg);

        q.run(&conn, &m).await.unwrap();
        assert_eq!(q.samples_for(&conn).unwrap().len(), 1);

        // Second run returns nothing: the cache entry empties out.
        connector.stub("SELECT * FROM t", vec![]);
        q.run(&conn, &m).await.unwrap();
        assert!(q.samples_for(&conn).unwrap().is_empty());
        assert_eq!(m.scrape_failed_value(&pg_spec(), "j", "q"), 0.0);
        assert_eq!(m.query_counts("j", "q"), (2, 0));
    }

    #[tokio::test]
    async fn test_sql_error_marks_failure_and_keeps_last_good() {
        let connector = FakeConnector::new();
        connector.stub(
            "SELECT * FROM t",
            vec![row(&[("count", Value::Int(1))])],
        );
        let conn = open_connection(&connector).await;
        let m = metrics();

        let q = build(&query_config("q", "SELECT * FROM t", &["count"]));
        q.run(&conn, &m).await.unwrap();

        connector.stub_error("SELECT * FROM t", "relation dropped");
        let err = q.run(&conn, &m).await.unwrap_err();
        assert!(matches!(err, QueryError::Driver(_)));
        assert_eq!(m.scrape_failed_value(&pg_spec(), "j", "q"), 1.0);

        // Last-known-good samples keep being served.
        assert_eq!(q.samples_for(&conn).unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_timestamp_column_attached() {
        let ts = chrono::Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let connector = FakeConnector::new();
        connector.stub(
            "SELECT * FROM t",
            vec![row(&[
                ("count", Value::Int(1)),
                ("at", Value::Time(ts)),
            ])],
        );
        let conn = open_connection(&connector).await;
        let m = metrics();

        let mut cfg = query_config("q", "SELECT * FROM t", &["count"]);
        cfg.timestamp = Some("at".to_string());
        let q = build(&cfg);
        q.run(&conn, &m).await.unwrap();

        let samples = q.samples_for(&conn).unwrap();
        assert_eq!(samples[0].timestamp, Some(ts));
    }

    #[tokio::test]
    async fn test_iterator_expansion_binds_label_slot() {
        let connector = FakeConnector::new();
        connector.stub(
            "SELECT 'a'::text AS ignored, 1.5 AS v",
            vec![row(&[("v", Value::Float(1.5))])],
        );
        connector.stub(
            "SELECT 'b'::text AS ignored, 1.5 AS v",
            vec![row(&[("v", Value::Float(2.5))])],
        );
        let conn = open_connection(&connector).await;
        let m = metrics();

        let mut cfg = query_config("q", "SELECT '{{K}}'::text AS ignored, 1.5 AS v", &["v"]);
        cfg.labels = Vec::new();
        let q = Query::from_config(
            &cfg,
            "j",
            Some("k"),
            &HashMap::new(),
            &RedactList::default(),
        )
        .unwrap();
        assert!(q.has_placeholder("K"));

        q.run_iterator(
            &conn,
            "K",
            &["a".to_string(), "b".to_string()],
            "k",
            &m,
        )
        .await
        .unwrap();

        let samples = q.samples_for(&conn).unwrap();
        assert_eq!(samples.len(), 2);
        // The iterator label occupies the declared slot, ahead of the fixed tail.
        assert_eq!(samples[0].labels[0], "a");
        assert_eq!(samples[1].labels[0], "b");
        assert_eq!(samples[0].value, 1.5);
        assert_eq!(samples[1].value, 2.5);
        assert_eq!(
            q.desc().variable_labels(),
            &["k", "driver", "host", "database", "user", "col"]
        );
    }

    #[tokio::test]
    async fn test_redaction_shrinks_sample_labels() {
        let connector = FakeConnector::new();
        connector.stub(
            "SELECT 1.0 AS count",
            vec![row(&[("count", Value::Float(1.0))])],
        );
        let conn = open_connection(&connector).await;

        let redact = RedactList::new(&["host".to_string(), "user".to_string()]);
        let m = ExporterMetrics::new(
            &Registry::new(),
            prometheus::DEFAULT_BUCKETS.to_vec(),
            redact.clone(),
        )
        .unwrap();

        let cfg = query_config("q", "SELECT 1.0 AS count", &["count"]);
        let q = Query::from_config(&cfg, "j", None, &HashMap::new(), &redact).unwrap();
        q.run(&conn, &m).await.unwrap();

        let samples = q.samples_for(&conn).unwrap();
        assert_eq!(samples[0].labels, vec!["postgres", "d", "count"]);
        assert_eq!(
            q.desc().variable_labels(),
            &["driver", "database", "col"]
        );
    }

    #[test]
    fn test_query_ref_resolution() {
        let mut shared = HashMap::new();
        shared.insert("uptime".to_string(), "SELECT uptime FROM status".to_string());

        let mut cfg = query_config("q", "", &["uptime"]);
        cfg.query = None;
        cfg.query_ref = Some("uptime".to_string());
        let q = Query::from_config(&cfg, "j", None, &shared, &RedactList::default()).unwrap();
        assert!(q.has_placeholder("nope") == false);

        // Undefined reference: the query is dropped.
        cfg.query_ref = Some("missing".to_string());
        assert!(Query::from_config(&cfg, "j", None, &HashMap::new(), &RedactList::default()).is_none());
    }
}
