//! Redaction-aware label plumbing.
//!
//! A process-wide redact list suppresses connection-identifying labels
//! (`host`, `database`, `user`) from every exported series. `driver` and
//! `col` are never redacted. Redaction removes the position from the
//! descriptor as well, so label-name and label-value vectors stay the
//! same length.

use std::collections::HashSet;

use crate::connection::ConnectionSpec;

/// Labels eligible for redaction.
const REDACTABLE: [&str; 3] = ["host", "database", "user"];

/// The configured set of redacted label names.
#[derive(Debug, Clone, Default)]
pub struct RedactList {
    names: HashSet<String>,
}

impl RedactList {
    /// Build from configuration, keeping only redactable names.
    pub fn new(names: &[String]) -> Self {
        let mut kept = HashSet::new();
        for name in names {
            if REDACTABLE.contains(&name.as_str()) {
                kept.insert(name.clone());
            } else {
                tracing::warn!(label = %name, "Ignoring non-redactable label in redact list");
            }
        }
        Self { names: kept }
    }

    pub fn contains(&self, label: &str) -> bool {
        self.names.contains(label)
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }
}

/// Label names of the scrape-failure gauge, redactions elided.
pub fn failed_scrape_label_names(redact: &RedactList) -> Vec<&'static str> {
    let mut names = vec!["driver"];
    for name in ["host", "database", "user"] {
        if !redact.contains(name) {
            names.push(name);
        }
    }
    names.push("sql_job");
    names.push("query");
    names
}

/// Fixed label names appended to every query gauge, redactions elided.
pub fn gauge_fixed_label_names(redact: &RedactList) -> Vec<&'static str> {
    let mut names = vec!["driver"];
    for name in ["host", "database", "user"] {
        if !redact.contains(name) {
            names.push(name);
        }
    }
    names.push("col");
    names
}

/// Append the fixed label values for one sample.
///
/// The order must match [`gauge_fixed_label_names`] exactly.
pub fn append_gauge_label_values(
    labels: &mut Vec<String>,
    spec: &ConnectionSpec,
    value_column: &str,
    redact: &RedactList,
) {
    labels.push(spec.driver.label().to_string());
    if !redact.contains("host") {
        labels.push(spec.host.clone());
    }
    if !redact.contains("database") {
        labels.push(spec.database.clone());
    }
    if !redact.contains("user") {
        labels.push(spec.user.clone());
    }
    labels.push(value_column.to_string());
}

/// Label values for the scrape-failure gauge, redactions elided.
pub fn failed_scrape_label_values(
    spec: &ConnectionSpec,
    job: &str,
    query: &str,
    redact: &RedactList,
) -> Vec<String> {
    let mut labels = vec![spec.driver.label().to_string()];
    if !redact.contains("host") {
        labels.push(spec.host.clone());
    }
    if !redact.contains("database") {
        labels.push(spec.database.clone());
    }
    if !redact.contains("user") {
        labels.push(spec.user.clone());
    }
    labels.push(job.to_string());
    labels.push(query.to_string());
    labels
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connection::Driver;

    fn spec() -> ConnectionSpec {
        ConnectionSpec {
            driver: Driver::Postgres { iam: false },
            url: "postgres://u@h/d".to_string(),
            host: "h".to_string(),
            database: "d".to_string(),
            user: "u".to_string(),
            tls: None,
            snowflake: None,
        }
    }

    #[test]
    fn test_empty_redact_list_keeps_everything() {
        let redact = RedactList::default();
        assert_eq!(
            failed_scrape_label_names(&redact),
            vec!["driver", "host", "database", "user", "sql_job", "query"]
        );
        assert_eq!(
            gauge_fixed_label_names(&redact),
            vec!["driver", "host", "database", "user", "col"]
        );
    }

    #[test]
    fn test_redacted_labels_elided_from_names_and_values() {
        let redact = RedactList::new(&["host".to_string(), "user".to_string()]);

        assert_eq!(
            gauge_fixed_label_names(&redact),
            vec!["driver", "database", "col"]
        );

        let mut values = Vec::new();
        append_gauge_label_values(&mut values, &spec(), "count", &redact);
        assert_eq!(values, vec!["postgres", "d", "count"]);

        assert_eq!(
            failed_scrape_label_values(&spec(), "j", "q", &redact),
            vec!["postgres", "d", "j", "q"]
        );
    }

    #[test]
    fn test_driver_and_col_never_redacted() {
        let redact = RedactList::new(&[
            "driver".to_string(),
            "col".to_string(),
            "database".to_string(),
        ]);
        assert!(!redact.contains("driver"));
        assert!(!redact.contains("col"));
        assert!(redact.contains("database"));
    }

    #[test]
    fn test_name_value_vectors_stay_aligned() {
        let cases: Vec<Vec<String>> = vec![
            vec![],
            vec!["host".into()],
            vec!["database".into(), "user".into()],
        ];
        for redacted in cases {
            let redact = RedactList::new(&redacted);
            let names = gauge_fixed_label_names(&redact);
            let mut values = Vec::new();
            append_gauge_label_values(&mut values, &spec(), "count", &redact);
            assert_eq!(names.len(), values.len());
        }
    }
}
