//! Job, query, and iterator configuration structures.

use std::str::FromStr;
use std::time::Duration;

use serde::{Deserialize, Deserializer, Serialize};

fn default_keepalive() -> bool {
    true
}

/// A cron expression validated at parse time.
///
/// An invalid expression fails configuration loading outright, even when
/// an interval is also set: misconfiguration is loud.
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
#[serde(transparent)]
pub struct CronExpr(String);

impl CronExpr {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl<'de> Deserialize<'de> for CronExpr {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let expr = String::deserialize(deserializer)?;
        cron::Schedule::from_str(&expr).map_err(|e| {
            serde::de::Error::custom(format!("invalid cron_schedule syntax for `{expr}`: {e}"))
        })?;
        Ok(Self(expr))
    }
}

/// One job: a named bundle of connections, queries, and a schedule.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,

    /// Interval between runs; `0s` (the default) means on-demand.
    #[serde(default, with = "humantime_serde")]
    pub interval: Duration,

    /// Cron schedule; overrides the interval when present.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron_schedule: Option<CronExpr>,

    /// Keep the driver handle open between runs (default: true).
    #[serde(default = "default_keepalive")]
    pub keepalive: bool,

    /// Deadline for one run (default: 30s).
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,

    #[serde(default)]
    pub connections: Vec<String>,

    /// SQL executed once per connection right after connecting.
    #[serde(default)]
    pub startup_sql: Vec<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iterator: Option<IteratorConfig>,

    /// Client certificate identity for mTLS connections.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mtls_identity: Option<MtlsIdentityConfig>,

    #[serde(default)]
    pub queries: Vec<QueryConfig>,
}

/// One user query, exported as the gauge family `sql_<name>`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueryConfig {
    pub name: String,

    #[serde(default)]
    pub help: String,

    /// Columns exposed as labels, in listing order.
    #[serde(default)]
    pub labels: Vec<String>,

    /// Columns exposed as gauge values, one series per column.
    #[serde(default)]
    pub values: Vec<String>,

    /// Column carrying an explicit sample timestamp.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,

    /// Treat an empty result set as success (default: false).
    #[serde(default)]
    pub allow_zero_rows: bool,

    /// Literal SQL text.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,

    /// Reference into the shared query dictionary.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query_ref: Option<String>,
}

/// Fan a job's queries out over the values of an auxiliary query.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IteratorConfig {
    /// SQL returning one string column of iterator values.
    #[serde(default)]
    pub sql: String,

    /// Placeholder token replaced in each query, written `{{<token>}}`.
    #[serde(default)]
    pub placeholder: String,

    /// Label under which the iterator value is exposed.
    #[serde(default)]
    pub label: String,
}

/// Paths of the client certificate pair watched for mTLS connections.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MtlsIdentityConfig {
    pub cert_path: String,
    pub key_path: String,
}
