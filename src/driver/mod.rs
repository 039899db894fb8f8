//! Driver seam: the interface between the exporter core and concrete
//! database client libraries.
//!
//! The core never talks to a database crate directly. It hands a
//! [`ConnectTarget`] to a [`DriverConnector`] and gets back an opaque
//! [`DriverConnection`] with row-map query semantics. The production
//! connector backed by sqlx lives in [`sqlx_driver`]; tests plug in fakes.

mod sqlx_driver;

pub use sqlx_driver::SqlxConnector;

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::connection::TlsSettings;

/// Errors surfaced by a driver connector or an open handle.
#[derive(Debug, Error)]
pub enum DriverError {
    /// No connector is wired for this driver tag.
    #[error("unsupported driver `{0}`")]
    Unsupported(String),

    /// The handle could not be established.
    #[error("connect failed: {0}")]
    Connect(String),

    /// A statement failed to execute.
    #[error("query failed: {0}")]
    Query(String),

    /// Underlying sqlx error.
    #[error(transparent)]
    Sql(#[from] sqlx::Error),
}

/// A single cell value as produced by a driver.
///
/// Scanners populate this from the driver's per-column type information;
/// `to_float` is total on the first four variants.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int(i64),
    Float(f64),
    Bytes(Vec<u8>),
    Text(String),
    Time(DateTime<Utc>),
    Null,
}

impl Value {
    /// Coerce this value to a 64-bit float.
    ///
    /// Integers and floats pass through; byte strings and text are parsed.
    /// Returns `None` for `Time`, `Null`, and unparseable text.
    pub fn to_float(&self) -> Option<f64> {
        match self {
            Self::Int(i) => Some(*i as f64),
            Self::Float(f) => Some(*f),
            Self::Bytes(b) => std::str::from_utf8(b).ok()?.trim().parse().ok(),
            Self::Text(s) => s.trim().parse().ok(),
            Self::Time(_) | Self::Null => None,
        }
    }

    /// Render this value as a label string.
    ///
    /// Only text and byte-string kinds are acceptable label material.
    pub fn as_label(&self) -> Option<String> {
        match self {
            Self::Text(s) => Some(s.clone()),
            Self::Bytes(b) => Some(String::from_utf8_lossy(b).into_owned()),
            _ => None,
        }
    }

    /// Extract a timestamp, if this value carries one.
    pub fn as_time(&self) -> Option<DateTime<Utc>> {
        match self {
            Self::Time(t) => Some(*t),
            _ => None,
        }
    }
}

/// One result row: column name to raw value.
pub type Row = HashMap<String, Value>;

/// Pool limits applied to a freshly opened handle.
///
/// The exporter keeps at most one open and one idle handle per connection,
/// so queries on the same connection serialize on the single pool slot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PoolSettings {
    pub max_open: u32,
    pub max_idle: u32,
    /// Maximum handle lifetime. `None` leaves the lifetime unbounded.
    pub max_lifetime: Option<Duration>,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_open: 1,
            max_idle: 1,
            max_lifetime: None,
        }
    }
}

/// Snowflake key-pair credential material handed through to the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct SnowflakeKeyPair {
    pub format: KeyFormat,
    pub der: Vec<u8>,
}

/// Encoding of a parsed private key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyFormat {
    Pkcs8,
    Pkcs1,
}

/// Everything a connector needs to open one handle.
#[derive(Clone)]
pub struct ConnectTarget {
    /// Connector dispatch tag, e.g. `postgres`, `mysql`, `clickhouse`.
    pub driver: String,
    /// Effective DSN after normalization and credential substitution.
    pub dsn: String,
    pub pool: PoolSettings,
    pub tls: Option<TlsSettings>,
    pub snowflake_key: Option<SnowflakeKeyPair>,
}

impl std::fmt::Debug for ConnectTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectTarget")
            .field("driver", &self.driver)
            .field("pool", &self.pool)
            .finish_non_exhaustive()
    }
}

/// An open database handle.
#[async_trait::async_trait]
pub trait DriverConnection: Send + Sync {
    /// Execute a statement, discarding any result set.
    async fn execute(&self, sql: &str) -> Result<(), DriverError>;

    /// Execute a query and scan every row into a column map.
    async fn query(&self, sql: &str) -> Result<Vec<Row>, DriverError>;

    /// Verify the handle is still usable.
    async fn ping(&self) -> Result<(), DriverError>;

    /// Release the handle and its pool.
    async fn close(&self);
}

impl std::fmt::Debug for dyn DriverConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DriverConnection")
    }
}

/// Opens handles for connect targets.
#[async_trait::async_trait]
pub trait DriverConnector: Send + Sync {
    async fn connect(
        &self,
        target: &ConnectTarget,
    ) -> Result<Box<dyn DriverConnection>, DriverError>;
}
