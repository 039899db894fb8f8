//! sqlx-backed production connector for PostgreSQL and MySQL targets.
//!
//! Drivers without an in-tree client (ClickHouse, Snowflake, Athena,
//! Vertica, SQL Server, CloudSQL brokers) are reached through an injected
//! [`DriverConnector`](super::DriverConnector) instead; asking this
//! connector for them yields [`DriverError::Unsupported`].

use chrono::{DateTime, TimeZone, Utc};
use sqlx::mysql::{MySqlPool, MySqlPoolOptions, MySqlRow};
use sqlx::postgres::{PgPool, PgPoolOptions, PgRow};
use sqlx::{Column, Row as _};

use super::{ConnectTarget, DriverConnection, DriverConnector, DriverError, Row, Value};

/// Decode one column with a typed fallback chain.
///
/// `try_get` fails on a type mismatch but yields `Ok(None)` for SQL NULL,
/// so the first kind the driver agrees with wins.
macro_rules! try_decode {
    ($row:expr, $idx:expr, $ty:ty, $conv:expr) => {
        if let Ok(opt) = $row.try_get::<Option<$ty>, _>($idx) {
            return match opt {
                Some(v) => $conv(v),
                None => Value::Null,
            };
        }
    };
}

fn pg_cell(row: &PgRow, idx: usize) -> Value {
    try_decode!(row, idx, i64, Value::Int);
    try_decode!(row, idx, i32, |v: i32| Value::Int(v.into()));
    try_decode!(row, idx, i16, |v: i16| Value::Int(v.into()));
    try_decode!(row, idx, f64, Value::Float);
    try_decode!(row, idx, f32, |v: f32| Value::Float(v.into()));
    try_decode!(row, idx, sqlx::types::BigDecimal, |v: sqlx::types::BigDecimal| {
        v.to_string().parse().map(Value::Float).unwrap_or(Value::Null)
    });
    try_decode!(row, idx, String, Value::Text);
    try_decode!(row, idx, Vec<u8>, Value::Bytes);
    try_decode!(row, idx, DateTime<Utc>, Value::Time);
    try_decode!(row, idx, chrono::NaiveDateTime, |v| Value::Time(
        Utc.from_utc_datetime(&v)
    ));
    Value::Null
}

fn mysql_cell(row: &MySqlRow, idx: usize) -> Value {
    try_decode!(row, idx, i64, Value::Int);
    try_decode!(row, idx, u64, |v: u64| Value::Int(
        i64::try_from(v).unwrap_or(i64::MAX)
    ));
    try_decode!(row, idx, i32, |v: i32| Value::Int(v.into()));
    try_decode!(row, idx, u32, |v: u32| Value::Int(v.into()));
    try_decode!(row, idx, i16, |v: i16| Value::Int(v.into()));
    try_decode!(row, idx, i8, |v: i8| Value::Int(v.into()));
    try_decode!(row, idx, f64, Value::Float);
    try_decode!(row, idx, f32, |v: f32| Value::Float(v.into()));
    try_decode!(row, idx, sqlx::types::BigDecimal, |v: sqlx::types::BigDecimal| {
        v.to_string().parse().map(Value::Float).unwrap_or(Value::Null)
    });
    try_decode!(row, idx, String, Value::Text);
    try_decode!(row, idx, Vec<u8>, Value::Bytes);
    try_decode!(row, idx, DateTime<Utc>, Value::Time);
    try_decode!(row, idx, chrono::NaiveDateTime, |v| Value::Time(
        Utc.from_utc_datetime(&v)
    ));
    Value::Null
}

struct PgHandle {
    pool: PgPool,
}

#[async_trait::async_trait]
impl DriverConnection for PgHandle {
    async fn execute(&self, sql: &str) -> Result<(), DriverError> {
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>, DriverError> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| {
                row.columns()
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (c.name().to_string(), pg_cell(row, i)))
                    .collect()
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), DriverError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

struct MySqlHandle {
    pool: MySqlPool,
}

#[async_trait::async_trait]
impl DriverConnection for MySqlHandle {
    async fn execute(&self, sql: &str) -> Result<(), DriverError> {
        sqlx::query(sql).execute(&self.pool).await?;
        Ok(())
    }

    async fn query(&self, sql: &str) -> Result<Vec<Row>, DriverError> {
        let rows = sqlx::query(sql).fetch_all(&self.pool).await?;
        Ok(rows
            .iter()
            .map(|row| {
                row.columns()
                    .iter()
                    .enumerate()
                    .map(|(i, c)| (c.name().to_string(), mysql_cell(row, i)))
                    .collect()
            })
            .collect())
    }

    async fn ping(&self) -> Result<(), DriverError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

/// Production connector for the drivers sqlx speaks natively.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlxConnector;

#[async_trait::async_trait]
impl DriverConnector for SqlxConnector {
    async fn connect(
        &self,
        target: &ConnectTarget,
    ) -> Result<Box<dyn DriverConnection>, DriverError> {
        match target.driver.as_str() {
            "postgres" => {
                let pool = PgPoolOptions::new()
                    .max_connections(target.pool.max_open)
                    .max_lifetime(target.pool.max_lifetime)
                    .connect(&target.dsn)
                    .await
                    .map_err(|e| DriverError::Connect(e.to_string()))?;
                Ok(Box::new(PgHandle { pool }))
            }
            "mysql" => {
                let pool = MySqlPoolOptions::new()
                    .max_connections(target.pool.max_open)
                    .max_lifetime(target.pool.max_lifetime)
                    .connect(&target.dsn)
                    .await
                    .map_err(|e| DriverError::Connect(e.to_string()))?;
                Ok(Box::new(MySqlHandle { pool }))
            }
            other => Err(DriverError::Unsupported(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::driver::PoolSettings;

    #[tokio::test]
    async fn test_unsupported_driver() {
        let target = ConnectTarget {
            driver: "clickhouse".to_string(),
            dsn: "tcp://localhost:9000/db".to_string(),
            pool: PoolSettings::default(),
            tls: None,
            snowflake_key: None,
        };
        let err = SqlxConnector.connect(&target).await.unwrap_err();
        assert!(matches!(err, DriverError::Unsupported(d) if d == "clickhouse"));
    }
}
