//! Cloud provider collaborators.
//!
//! IAM token minting and CloudSQL inventory enumeration are provided by
//! the deployment, not by this crate: the exporter core only depends on
//! these traits and is handed implementations at construction time.

use thiserror::Error;

/// Errors from a cloud collaborator.
#[derive(Debug, Error)]
pub enum CloudError {
    /// The exporter was asked to use a collaborator that was never wired.
    #[error("no {0} provider configured")]
    NoProvider(&'static str),

    /// `AWS_REGION` must be set whenever an IAM-authenticated driver is used.
    #[error("AWS_REGION must be set for IAM-authenticated drivers")]
    MissingRegion,

    /// Provider-side failure.
    #[error("cloud api error: {0}")]
    Api(String),
}

/// Mints short-lived database auth tokens for IAM-authenticated drivers.
#[async_trait::async_trait]
pub trait IamTokenSource: Send + Sync {
    /// Build an auth token for `user` against `endpoint` (host:port) in `region`.
    async fn auth_token(
        &self,
        endpoint: &str,
        region: &str,
        user: &str,
    ) -> Result<String, CloudError>;
}

/// One CloudSQL instance as reported by the inventory service.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloudSqlInstance {
    pub name: String,
    pub region: String,
    /// Fully qualified `project:region:instance` connection name.
    pub connection_name: String,
}

/// Enumerates CloudSQL instances and their databases for glob expansion.
#[async_trait::async_trait]
pub trait CloudSqlInventory: Send + Sync {
    async fn list_instances(&self, project: &str) -> Result<Vec<CloudSqlInstance>, CloudError>;

    async fn list_databases(
        &self,
        project: &str,
        instance: &str,
    ) -> Result<Vec<String>, CloudError>;
}
