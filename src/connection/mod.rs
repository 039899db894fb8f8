//! Connection registry: normalized records, lazy handles, credential
//! refresh, and mTLS identity plumbing.

mod conn;
mod registry;
mod spec;
mod tls;

pub use conn::{ConnectContext, ConnectError, Connection, RDS_TOKEN_TTL, SNOWFLAKE_SESSION_TTL};
pub use registry::{RegisterError, Registrar};
pub use spec::{ClickHouseScheme, CloudSqlEngine, ConnectionSpec, Driver, SnowflakeAuth};
pub use tls::{ClientIdentity, FsIdentityWatcher, IdentitySource, TlsSettings, TlsVersion};
