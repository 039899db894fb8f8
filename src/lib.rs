//! sqlgauge - SQL query metrics exporter
//!
//! Turns user-declared SQL queries into labeled prometheus gauge series.
//! Jobs run their queries on declared schedules across one or more
//! database connections; every returned row becomes one sample per value
//! column, cached until the next successful run and served to scrapers
//! over HTTP.
//!
//! # Architecture
//!
//! - **Config**: YAML jobs, shared query dictionary, environment placeholders
//! - **Connections**: driver-tagged normalization, IAM/key-pair credential
//!   refresh, CloudSQL and Postgres fanout
//! - **Jobs**: per-connection fan-out under a deadline, with backoff retry
//! - **Cache + collector**: immutable samples behind per-query locks,
//!   exposed through a prometheus collector
//! - **Server**: `/metrics`, `/healthz`, and a landing page

pub mod cloud;
pub mod collector;
pub mod config;
pub mod connection;
pub mod driver;
pub mod exporter;
pub mod job;
pub mod labels;
pub mod metrics;
pub mod query;
pub mod scheduler;
pub mod server;
pub mod testutil;

pub use config::{ConfigError, ConfigFile};
pub use exporter::{Collaborators, Exporter, ExporterError};
pub use job::{Job, ScheduleKind};
pub use query::{Query, Sample};
pub use server::{create_router, AppState};
