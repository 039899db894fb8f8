//! Top-level configuration file model.

use std::collections::HashMap;
use std::path::Path;

use serde::{Deserialize, Serialize};

use super::job::JobConfig;
use super::validation::{expand_placeholders, ConfigError};

/// Tuning knobs under the top-level `configuration:` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Settings {
    /// Bucket boundaries for the query duration histogram; the standard
    /// exponential schedule when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub histogram_buckets: Option<Vec<f64>>,

    /// Connection-identifying labels suppressed from every exported
    /// series. Only `host`, `database`, and `user` are redactable.
    #[serde(default)]
    pub redact_labels: Vec<String>,
}

/// CloudSQL broker configuration; required when any `cloudsql-*`
/// connection is declared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CloudSqlSettings {
    /// Service account key used by the inventory and broker collaborators.
    #[serde(default)]
    pub key_file: String,
}

/// The whole configuration file: shared dictionary plus jobs.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    #[serde(default)]
    pub configuration: Settings,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloudsql_config: Option<CloudSqlSettings>,

    /// Shared query dictionary, referenced by `query_ref`.
    #[serde(default)]
    pub queries: HashMap<String, String>,

    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

impl ConfigFile {
    /// Load a configuration file, expanding environment placeholders
    /// before parsing.
    ///
    /// # Errors
    /// Returns `ConfigError` if the file cannot be read, parsed, or
    /// validated; the process must not start with a broken configuration.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_yaml(&raw)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(raw: &str) -> Result<Self, ConfigError> {
        let expanded = expand_placeholders(raw);
        let config: Self = serde_yaml::from_str(&expanded)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = std::collections::HashSet::new();
        for job in &self.jobs {
            if job.name.is_empty() {
                return Err(ConfigError::Validation(
                    "job name cannot be empty".to_string(),
                ));
            }
            if !seen.insert(&job.name) {
                return Err(ConfigError::Validation(format!(
                    "duplicate job name: '{}'",
                    job.name
                )));
            }
            if let Some(iterator) = &job.iterator {
                if !iterator.sql.is_empty() && iterator.placeholder.is_empty() {
                    return Err(ConfigError::Validation(format!(
                        "job '{}': iterator requires a placeholder",
                        job.name
                    )));
                }
            }
        }

        if let Some(cloudsql) = &self.cloudsql_config {
            if cloudsql.key_file.is_empty() {
                return Err(ConfigError::Validation(
                    "cloudsql_config.key_file must be set when cloudsql_config is present"
                        .to_string(),
                ));
            }
        }
        Ok(())
    }
}
