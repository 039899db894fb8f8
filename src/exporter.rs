//! Exporter construction: configuration in, scheduled jobs and a scrape
//! registry out.
//!
//! Construction is the only place global state is set up: the prometheus
//! registry, the self-metric handles, the per-job connection records, and
//! the dispatcher. Everything after startup mutates state only behind
//! the cache and metric locks.

use std::path::Path;
use std::sync::Arc;

use prometheus::Registry;
use thiserror::Error;

use crate::cloud::{CloudSqlInventory, IamTokenSource};
use crate::collector::QueryCollector;
use crate::config::{ConfigError, ConfigFile};
use crate::connection::{FsIdentityWatcher, IdentitySource, Registrar};
use crate::driver::{DriverConnector, SqlxConnector};
use crate::job::{IteratorSpec, Job, ScheduleKind};
use crate::labels::RedactList;
use crate::metrics::ExporterMetrics;
use crate::query::Query;
use crate::scheduler::{JobDispatcher, SchedulerError};

/// External collaborators injected at construction.
///
/// The defaults wire the sqlx connector and no cloud providers; tests and
/// cloud deployments swap in their own implementations.
#[derive(Clone)]
pub struct Collaborators {
    pub connector: Arc<dyn DriverConnector>,
    pub tokens: Option<Arc<dyn IamTokenSource>>,
    pub inventory: Option<Arc<dyn CloudSqlInventory>>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            connector: Arc::new(SqlxConnector),
            tokens: None,
            inventory: None,
        }
    }
}

/// Errors that abort exporter construction.
#[derive(Debug, Error)]
pub enum ExporterError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("metrics registration failed: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error(transparent)]
    Scheduler(#[from] SchedulerError),

    #[error("cloudsql key file `{0}` does not exist")]
    CloudSqlKeyFile(String),
}

/// The assembled exporter: jobs, registry, and dispatcher.
pub struct Exporter {
    jobs: Vec<Arc<Job>>,
    registry: Registry,
    metrics: Arc<ExporterMetrics>,
    dispatcher: tokio::sync::Mutex<Option<JobDispatcher>>,
}

impl std::fmt::Debug for Exporter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Exporter")
            .field("jobs", &self.jobs.len())
            .finish_non_exhaustive()
    }
}

impl Exporter {
    /// Load configuration from a file and build with default collaborators.
    pub async fn from_file(path: impl AsRef<Path>) -> Result<Self, ExporterError> {
        let config = ConfigFile::load(path)?;
        Self::new(config, Collaborators::default()).await
    }

    /// Build the exporter from parsed configuration.
    pub async fn new(
        config: ConfigFile,
        collaborators: Collaborators,
    ) -> Result<Self, ExporterError> {
        let uses_cloudsql = config
            .jobs
            .iter()
            .flat_map(|job| &job.connections)
            .any(|conn| conn.starts_with("cloudsql-"));
        if uses_cloudsql {
            match &config.cloudsql_config {
                Some(cloudsql) if !cloudsql.key_file.is_empty() => {
                    if !Path::new(&cloudsql.key_file).exists() {
                        return Err(ExporterError::CloudSqlKeyFile(cloudsql.key_file.clone()));
                    }
                }
                _ => {
                    return Err(ConfigError::Validation(
                        "cloudsql connections require cloudsql_config.key_file".to_string(),
                    )
                    .into());
                }
            }
        }

        let buckets = config
            .configuration
            .histogram_buckets
            .clone()
            .unwrap_or_else(|| prometheus::DEFAULT_BUCKETS.to_vec());
        let redact = RedactList::new(&config.configuration.redact_labels);

        let registry = Registry::new();
        let metrics = Arc::new(ExporterMetrics::new(&registry, buckets, redact.clone())?);

        let mut jobs = Vec::with_capacity(config.jobs.len());
        for job_config in &config.jobs {
            let identity: Option<Arc<dyn IdentitySource>> = match &job_config.mtls_identity {
                Some(mtls) => match FsIdentityWatcher::spawn(&mtls.cert_path, &mtls.key_path) {
                    Ok(watcher) => Some(watcher as Arc<dyn IdentitySource>),
                    Err(e) => {
                        tracing::error!(job = %job_config.name, error = %e,
                            "Failed to watch mTLS identity, spiffe connections will be skipped");
                        None
                    }
                },
                None => None,
            };

            let iterator_label = job_config
                .iterator
                .as_ref()
                .map(|iterator| iterator.label.as_str())
                .filter(|label| !label.is_empty());

            let queries: Vec<Arc<Query>> = job_config
                .queries
                .iter()
                .filter_map(|query_config| {
                    Query::from_config(
                        query_config,
                        &job_config.name,
                        iterator_label,
                        &config.queries,
                        &redact,
                    )
                })
                .map(Arc::new)
                .collect();

            let registrar = Registrar {
                job: &job_config.name,
                connector: collaborators.connector.as_ref(),
                tokens: collaborators.tokens.as_deref(),
                inventory: collaborators.inventory.as_deref(),
                identity,
            };
            let connections = registrar.resolve(&job_config.connections).await;

            // Cron wins when both clocks are configured; an invalid cron
            // expression already failed configuration parsing.
            let schedule = if let Some(cron) = &job_config.cron_schedule {
                ScheduleKind::Cron(cron.as_str().to_string())
            } else if !job_config.interval.is_zero() {
                ScheduleKind::Interval(job_config.interval)
            } else {
                ScheduleKind::OnDemand
            };

            let iterator = job_config.iterator.as_ref().map(|iterator| IteratorSpec {
                sql: iterator.sql.clone(),
                placeholder: iterator.placeholder.clone(),
                label: iterator.label.clone(),
            });

            jobs.push(Arc::new(Job::new(
                job_config.name.clone(),
                schedule,
                job_config.keepalive,
                job_config.timeout,
                job_config.startup_sql.clone(),
                iterator,
                queries,
                connections,
                Arc::clone(&metrics),
                Arc::clone(&collaborators.connector),
                collaborators.tokens.clone(),
            )));
        }

        registry.register(Box::new(QueryCollector::new(jobs.clone())))?;

        let dispatcher = JobDispatcher::new().await?;
        for job in &jobs {
            dispatcher.attach(Arc::clone(job)).await?;
        }

        Ok(Self {
            jobs,
            registry,
            metrics,
            dispatcher: tokio::sync::Mutex::new(Some(dispatcher)),
        })
    }

    /// Start autonomous scheduling.
    pub async fn start(&self) -> Result<(), SchedulerError> {
        match self.dispatcher.lock().await.as_ref() {
            Some(dispatcher) => dispatcher.start().await,
            None => Ok(()),
        }
    }

    pub fn jobs(&self) -> &[Arc<Job>] {
        &self.jobs
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn metrics(&self) -> &Arc<ExporterMetrics> {
        &self.metrics
    }

    /// Run every on-demand job and wait for completion.
    pub async fn run_on_demand(&self) {
        let mut runs = tokio::task::JoinSet::new();
        for job in self.jobs.iter().filter(|job| job.is_on_demand()).cloned() {
            runs.spawn(async move { job.run().await });
        }
        while runs.join_next().await.is_some() {}
    }

    /// Stop scheduling and close every connection. Idempotent.
    pub async fn shutdown(&self) {
        if let Some(dispatcher) = self.dispatcher.lock().await.take() {
            if let Err(e) = dispatcher.shutdown().await {
                tracing::error!(error = %e, "Scheduler shutdown failed");
            }
        }
        for job in &self.jobs {
            job.close_connections().await;
        }
    }
}
