//! Configuration errors and environment placeholder expansion.

use regex::Regex;

use thiserror::Error;

/// Configuration error types.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file.
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to parse the YAML configuration.
    #[error("failed to parse YAML config: {0}")]
    Parse(#[from] serde_yaml::Error),

    /// Configuration validation failed.
    #[error("config validation error: {0}")]
    Validation(String),
}

fn template_delimiters() -> (String, String) {
    let start = std::env::var("TEMPLATE_START").unwrap_or_else(|_| "{{".to_string());
    let end = std::env::var("TEMPLATE_END").unwrap_or_else(|_| "}}".to_string());
    (start, end)
}

/// Expand environment placeholders in the raw configuration text.
///
/// Every `<start>NAME<end>` substring (delimiters from `TEMPLATE_START`
/// and `TEMPLATE_END`, defaults `{{` and `}}`) is replaced with the value
/// of the environment variable `NAME`, trimmed and uppercased. Unset or
/// empty variables leave the placeholder in place, so a placeholder-free
/// file passes through byte-identical.
pub fn expand_placeholders(input: &str) -> String {
    let (start, end) = template_delimiters();
    let pattern = format!("{}.+?{}", regex::escape(&start), regex::escape(&end));
    let re = Regex::new(&pattern).expect("failed to compile placeholder regex");

    let mut replacements: Vec<(String, String)> = Vec::new();
    for found in re.find_iter(input) {
        let placeholder = found.as_str();
        let name = placeholder
            .replace(&start, "")
            .replace(&end, "")
            .trim()
            .to_uppercase();
        if name.is_empty() {
            continue;
        }
        match std::env::var(&name) {
            Ok(value) if !value.is_empty() => {
                replacements.push((placeholder.to_string(), value));
            }
            _ => {}
        }
    }

    replacements
        .iter()
        .fold(input.to_string(), |text, (placeholder, value)| {
            text.replace(placeholder, value)
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placeholder_free_text_is_untouched() {
        let text = "jobs:\n  - name: plain\n";
        assert_eq!(expand_placeholders(text), text);
    }

    #[test]
    fn test_set_variable_is_substituted() {
        std::env::set_var("SQLGAUGE_TEST_PASS", "s3cret");
        let text = "connections: [\"postgres://u:{{sqlgauge_test_pass}}@h/d\"]";
        assert_eq!(
            expand_placeholders(text),
            "connections: [\"postgres://u:s3cret@h/d\"]"
        );
        std::env::remove_var("SQLGAUGE_TEST_PASS");
    }

    #[test]
    fn test_unset_variable_leaves_placeholder() {
        let text = "password: {{SQLGAUGE_TEST_UNSET_VAR}}";
        assert_eq!(expand_placeholders(text), text);
    }

    #[test]
    fn test_same_placeholder_replaced_everywhere() {
        std::env::set_var("SQLGAUGE_TEST_REPEAT", "x");
        let text = "a: {{SQLGAUGE_TEST_REPEAT}}\nb: {{SQLGAUGE_TEST_REPEAT}}";
        assert_eq!(expand_placeholders(text), "a: x\nb: x");
        std::env::remove_var("SQLGAUGE_TEST_REPEAT");
    }
}
