//! Normalized connection records.
//!
//! A connection string is parsed exactly once, at registration, into a
//! [`ConnectionSpec`]: a driver tag plus the stored URL and the fields that
//! surface as metric labels. The record is immutable afterwards; the DSN
//! handed to the driver is derived from it by [`ConnectionSpec::effective_dsn`],
//! a pure function, so retrying a failed connect can never mutate the record
//! into a malformed DSN.

use crate::driver::SnowflakeKeyPair;

use super::TlsSettings;

/// CloudSQL engine behind the broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CloudSqlEngine {
    Postgres,
    MySql,
}

/// ClickHouse scheme variant as written by the user.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClickHouseScheme {
    /// Legacy `clickhouse://` alias, connected over the native protocol.
    Bare,
    Tcp,
    Http,
    Https,
}

/// Driver tag of a normalized connection record.
///
/// Each variant carries its own normalization and credential-refresh rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Driver {
    Postgres { iam: bool },
    MySql { iam: bool },
    SqlServer,
    ClickHouse { scheme: ClickHouseScheme },
    Snowflake,
    Athena,
    Vertica,
    CloudSql { engine: CloudSqlEngine },
}

impl Driver {
    /// The label value exported as the fixed `driver` label.
    ///
    /// Stable across runs: ClickHouse variants keep the scheme the user
    /// wrote, IAM variants report the underlying engine.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Postgres { .. } => "postgres",
            Self::MySql { .. } => "mysql",
            Self::SqlServer => "sqlserver",
            Self::ClickHouse { scheme } => match scheme {
                ClickHouseScheme::Bare => "clickhouse",
                ClickHouseScheme::Tcp => "clickhouse+tcp",
                ClickHouseScheme::Http => "clickhouse+http",
                ClickHouseScheme::Https => "clickhouse+https",
            },
            Self::Snowflake => "snowflake",
            Self::Athena => "athena",
            Self::Vertica => "vertica",
            Self::CloudSql { engine } => match engine {
                CloudSqlEngine::Postgres => "cloudsql-postgres",
                CloudSqlEngine::MySql => "cloudsql-mysql",
            },
        }
    }

    /// Dispatch tag for the driver connector.
    pub fn connector_tag(&self) -> &'static str {
        match self {
            Self::Postgres { .. } => "postgres",
            Self::MySql { .. } => "mysql",
            Self::SqlServer => "sqlserver",
            Self::ClickHouse { .. } => "clickhouse",
            Self::Snowflake => "snowflake",
            Self::Athena => "athena",
            Self::Vertica => "vertica",
            Self::CloudSql { engine } => match engine {
                CloudSqlEngine::Postgres => "cloudsql-postgres",
                CloudSqlEngine::MySql => "cloudsql-mysql",
            },
        }
    }

    /// Whether this driver authenticates with short-lived IAM tokens.
    pub fn uses_iam(&self) -> bool {
        matches!(
            self,
            Self::Postgres { iam: true } | Self::MySql { iam: true }
        )
    }
}

/// Snowflake session parameters extracted from the connection URL.
#[derive(Debug, Clone, Default)]
pub struct SnowflakeAuth {
    pub account: String,
    pub role: Option<String>,
    pub database: Option<String>,
    pub schema: Option<String>,
    /// Present when key-pair authentication is configured; the credential
    /// window is one hour and renewal reopens the handle.
    pub keypair: Option<SnowflakeKeyPair>,
}

/// An immutable, normalized connection record.
#[derive(Clone)]
pub struct ConnectionSpec {
    pub driver: Driver,
    /// Stored connection URL after registration-time normalization
    /// (TLS parameters stripped, IAM schemes rewritten). Never mutated.
    pub url: String,
    pub host: String,
    pub database: String,
    pub user: String,
    pub tls: Option<TlsSettings>,
    pub snowflake: Option<SnowflakeAuth>,
}

impl std::fmt::Debug for ConnectionSpec {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionSpec")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("database", &self.database)
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

impl ConnectionSpec {
    /// Derive the DSN handed to the driver connector.
    ///
    /// Pure: two consecutive derivations always yield the same string,
    /// regardless of how many connect attempts happened in between.
    pub fn effective_dsn(&self) -> String {
        match &self.driver {
            Driver::ClickHouse { .. } => clickhouse_effective_dsn(&self.url),
            _ => self.url.clone(),
        }
    }

    /// Cache identity of this connection.
    pub fn key(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}",
            self.driver.label(),
            self.host,
            self.database,
            self.user,
            self.url
        )
    }
}

/// Rewrite a stored ClickHouse URL into the wire DSN.
///
/// `clickhouse+<proto>://` drops the prefix and keeps `<proto>`; the legacy
/// bare `clickhouse://` alias gains a `tcp://` prefix. The input is the
/// stored record, which already had `tls_config` parameters stripped.
fn clickhouse_effective_dsn(url: &str) -> String {
    if let Some(rest) = url.strip_prefix("clickhouse+") {
        return rest.to_string();
    }
    if let Some(rest) = url.strip_prefix("clickhouse://") {
        return format!("tcp://{rest}");
    }
    url.to_string()
}
