//! Job runner: fans the queries of one job out across its connections.
//!
//! One tick runs every connection concurrently under a shared deadline;
//! within a connection, the iterator query (if any) runs first and the
//! queries run serially on the single pool slot. A tick where nothing
//! succeeded retries with exponential backoff until the job's interval
//! window closes.

use std::sync::Arc;
use std::time::Duration;

use backoff::ExponentialBackoffBuilder;
use thiserror::Error;

use crate::cloud::IamTokenSource;
use crate::connection::{ConnectContext, ConnectError, Connection, ConnectionSpec};
use crate::driver::DriverConnector;
use crate::metrics::ExporterMetrics;
use crate::query::Query;

/// Deadline applied to one run when the job has no explicit timeout.
pub const DEFAULT_JOB_TIMEOUT: Duration = Duration::from_secs(30);

/// Backoff window for cron and on-demand jobs, which have no interval.
const FALLBACK_BACKOFF_WINDOW: Duration = Duration::from_secs(60);

/// Errors from one run of a job.
#[derive(Debug, Error)]
pub enum JobError {
    /// Not a single query succeeded on any connection.
    #[error("zero queries ran")]
    ZeroQueriesRan,
}

/// When and how a job is dispatched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleKind {
    /// Fixed interval between runs.
    Interval(Duration),
    /// Cron expression, fired by the shared cron scheduler.
    Cron(String),
    /// Interval zero and no cron: run synchronously during a scrape.
    OnDemand,
}

/// Iterator configuration resolved for runtime use.
#[derive(Debug, Clone, Default)]
pub struct IteratorSpec {
    pub sql: String,
    pub placeholder: String,
    pub label: String,
}

/// A named bundle of connections, queries, and a schedule.
pub struct Job {
    name: String,
    schedule: ScheduleKind,
    keepalive: bool,
    timeout: Duration,
    startup_sql: Vec<String>,
    iterator: Option<IteratorSpec>,
    queries: Vec<Arc<Query>>,
    connections: Vec<Arc<Connection>>,
    metrics: Arc<ExporterMetrics>,
    connector: Arc<dyn DriverConnector>,
    tokens: Option<Arc<dyn IamTokenSource>>,
}

impl std::fmt::Debug for Job {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Job")
            .field("name", &self.name)
            .field("schedule", &self.schedule)
            .field("queries", &self.queries.len())
            .field("connections", &self.connections.len())
            .finish_non_exhaustive()
    }
}

#[allow(clippy::too_many_arguments)]
impl Job {
    pub fn new(
        name: String,
        schedule: ScheduleKind,
        keepalive: bool,
        timeout: Option<Duration>,
        startup_sql: Vec<String>,
        iterator: Option<IteratorSpec>,
        queries: Vec<Arc<Query>>,
        connections: Vec<Arc<Connection>>,
        metrics: Arc<ExporterMetrics>,
        connector: Arc<dyn DriverConnector>,
        tokens: Option<Arc<dyn IamTokenSource>>,
    ) -> Self {
        Self {
            name,
            schedule,
            keepalive,
            timeout: timeout.unwrap_or(DEFAULT_JOB_TIMEOUT),
            startup_sql,
            iterator,
            queries,
            connections,
            metrics,
            connector,
            tokens,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn schedule(&self) -> &ScheduleKind {
        &self.schedule
    }

    pub fn is_on_demand(&self) -> bool {
        self.schedule == ScheduleKind::OnDemand
    }

    pub fn queries(&self) -> &[Arc<Query>] {
        &self.queries
    }

    pub fn connections(&self) -> &[Arc<Connection>] {
        &self.connections
    }

    /// One tick: retry `run_once` with exponential backoff until it
    /// succeeds or the job's window closes.
    pub async fn run(&self) {
        let window = match self.schedule {
            ScheduleKind::Interval(interval) if !interval.is_zero() => interval,
            _ => FALLBACK_BACKOFF_WINDOW,
        };
        let backoff = ExponentialBackoffBuilder::new()
            .with_max_elapsed_time(Some(window))
            .build();

        let result = backoff::future::retry(backoff, || async {
            self.run_once().await.map_err(backoff::Error::transient)
        })
        .await;

        if let Err(e) = result {
            tracing::error!(job = %self.name, error = %e, "Failed to run");
        }
    }

    /// Execute every query on every connection, one concurrent activity
    /// per connection, bounded by the job deadline. One tick, no backoff.
    pub async fn run_once(&self) -> Result<(), JobError> {
        let deadline = self.timeout;
        let activities = self.connections.iter().map(|conn| async move {
            match tokio::time::timeout(deadline, self.run_connection(conn)).await {
                Ok(updated) => updated,
                Err(_) => {
                    tracing::warn!(job = %self.name, host = %conn.spec().host,
                        "Deadline elapsed, cancelling in-flight queries");
                    self.mark_failed(conn.spec());
                    self.metrics.inc_failure(&self.name, "");
                    0
                }
            }
        });

        let updated: usize = futures::future::join_all(activities).await.iter().sum();
        if updated < 1 {
            return Err(JobError::ZeroQueriesRan);
        }
        Ok(())
    }

    /// Run the iterator and all queries on one connection, serially.
    /// Returns the number of successful query executions.
    async fn run_connection(&self, conn: &Arc<Connection>) -> usize {
        let cx = self.connect_context();

        if let Err(e) = conn.ensure_open(&cx).await {
            tracing::warn!(job = %self.name, host = %conn.spec().host, error = %e,
                "Failed to connect");
            self.mark_failed(conn.spec());
            // No query name yet at this point.
            self.metrics.inc_failure(&self.name, "");
            return 0;
        }

        let mut iterator_values = Vec::new();
        if let Some(iterator) = &self.iterator {
            if !iterator.sql.is_empty() {
                tracing::debug!(job = %self.name, sql = %iterator.sql, "Running iterator query");
                match self.fetch_iterator_values(conn, &iterator.sql).await {
                    Ok(values) => iterator_values = values,
                    Err(e) => {
                        tracing::warn!(job = %self.name, host = %conn.spec().host, error = %e,
                            "Failed to run iterator query");
                        self.mark_failed(conn.spec());
                        self.metrics.inc_failure(&self.name, "");
                        return 0;
                    }
                }
            }
        }

        let mut updated = 0usize;
        for query in &self.queries {
            let result = match &self.iterator {
                Some(iterator)
                    if !iterator_values.is_empty()
                        && query.has_placeholder(&iterator.placeholder) =>
                {
                    query
                        .run_iterator(
                            conn,
                            &iterator.placeholder,
                            &iterator_values,
                            &iterator.label,
                            &self.metrics,
                        )
                        .await
                }
                _ => query.run(conn, &self.metrics).await,
            };

            match result {
                Ok(()) => {
                    tracing::debug!(job = %self.name, query = %query.name(), "Query finished");
                    updated += 1;
                }
                Err(e) => {
                    tracing::warn!(job = %self.name, query = %query.name(), error = %e,
                        "Failed to run query");
                }
            }
        }

        if !self.keepalive && updated > 0 {
            conn.close().await;
        }
        updated
    }

    async fn fetch_iterator_values(
        &self,
        conn: &Connection,
        sql: &str,
    ) -> Result<Vec<String>, String> {
        let rows = conn.query(sql).await.map_err(|e| e.to_string())?;
        let mut values = Vec::with_capacity(rows.len());
        for row in &rows {
            if row.len() != 1 {
                return Err(format!(
                    "iterator query must return a single column, got {}",
                    row.len()
                ));
            }
            let cell = row.values().next().expect("row has one column");
            match cell.as_label() {
                Some(value) => values.push(value),
                None => return Err("iterator value must be a string".to_string()),
            }
        }
        Ok(values)
    }

    /// Set the scrape-failure gauge for every query on this connection.
    fn mark_failed(&self, spec: &ConnectionSpec) {
        for query in &self.queries {
            self.metrics.mark_scrape_failed(spec, &self.name, query.name());
        }
    }

    /// Ping every connection, establishing missing handles.
    pub async fn check_connections(&self) -> Result<(), ConnectError> {
        let cx = self.connect_context();
        for conn in &self.connections {
            conn.check(&cx).await?;
        }
        Ok(())
    }

    /// Close every handle; records stay registered.
    pub async fn close_connections(&self) {
        for conn in &self.connections {
            conn.close().await;
        }
    }

    fn connect_context(&self) -> ConnectContext<'_> {
        let pool_lifetime = match self.schedule {
            ScheduleKind::Interval(interval) if !interval.is_zero() => Some(interval * 2),
            _ => None,
        };
        ConnectContext {
            connector: self.connector.as_ref(),
            tokens: self.tokens.as_deref(),
            startup_sql: &self.startup_sql,
            pool_lifetime,
        }
    }
}
