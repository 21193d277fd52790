//! Mapping configuration and its YAML loader.

use crate::model::wire::is_uri_shaped;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::env;
use std::path::Path;
use thiserror::Error;

/// JSON-LD context attached to every produced entity unless configured otherwise.
pub const DEFAULT_CONTEXT: &str = "https://uri.etsi.org/ngsi-ld/v1/ngsi-ld-core-context.jsonld";

/// Errors that can occur during configuration loading.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read configuration file: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Failed to parse YAML configuration: {0}")]
    ParseError(#[from] serde_yaml::Error),

    #[error("Invalid configuration value: {0}")]
    InvalidValue(String),

    #[error("Environment variable not found: {0}")]
    EnvVarNotFound(String),
}

/// Settings shared by the outbound and inbound mappers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MappingConfig {
    /// Value of `@context` on produced entities and subscriptions.
    #[serde(default = "default_context_url")]
    pub context_url: String,
    /// Fail inbound mapping when a relationship target cannot be fetched,
    /// instead of constructing it from its id alone.
    #[serde(default)]
    pub strict_relationships: bool,
}

fn default_context_url() -> String {
    DEFAULT_CONTEXT.to_string()
}

impl Default for MappingConfig {
    fn default() -> Self {
        Self {
            context_url: default_context_url(),
            strict_relationships: false,
        }
    }
}

impl MappingConfig {
    /// Default configuration with strict relationship resolution.
    pub fn strict() -> Self {
        Self {
            strict_relationships: true,
            ..Default::default()
        }
    }

    /// Checks the values that serde cannot.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_uri_shaped(&self.context_url) {
            return Err(ConfigError::InvalidValue(format!(
                "context_url '{}' is not a URI",
                self.context_url
            )));
        }
        Ok(())
    }
}

/// Replaces `${VAR}` references with the values of the environment variables.
fn substitute_env_vars(input: &str) -> Result<String, ConfigError> {
    let re = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}")
        .map_err(|e| ConfigError::InvalidValue(e.to_string()))?;
    let mut result = input.to_string();
    let mut missing = Vec::new();

    for cap in re.captures_iter(input) {
        let (full_match, [var_name]) = cap.extract();
        match env::var(var_name) {
            Ok(value) => result = result.replace(full_match, &value),
            Err(_) => missing.push(var_name.to_string()),
        }
    }

    if !missing.is_empty() {
        return Err(ConfigError::EnvVarNotFound(missing.join(", ")));
    }

    Ok(result)
}

/// Loads a [`MappingConfig`] from a YAML file.
///
/// `${VAR}` references are substituted before parsing, and the result is validated.
///
/// # Example
/// ```no_run
/// use std::path::Path;
/// use ngsi_core::config::load_mapping_config;
///
/// let config = load_mapping_config(Path::new("config/mapping.yaml")).unwrap();
/// ```
pub fn load_mapping_config(path: &Path) -> Result<MappingConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let content = substitute_env_vars(&content)?;
    let config: MappingConfig = serde_yaml::from_str(&content)?;
    config.validate()?;
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn write_yaml(yaml: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(yaml.as_bytes()).unwrap();
        file
    }

    #[test]
    fn test_defaults() {
        let config = MappingConfig::default();
        assert_eq!(config.context_url, DEFAULT_CONTEXT);
        assert!(!config.strict_relationships);
        assert!(MappingConfig::strict().strict_relationships);
    }

    #[test]
    fn test_load_valid_config() {
        let file = write_yaml(
            r#"
context_url: "https://example.org/context.jsonld"
strict_relationships: true
"#,
        );

        let config = load_mapping_config(file.path()).unwrap();
        assert_eq!(config.context_url, "https://example.org/context.jsonld");
        assert!(config.strict_relationships);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let file = write_yaml("strict_relationships: false\n");
        let config = load_mapping_config(file.path()).unwrap();
        assert_eq!(config, MappingConfig::default());
    }

    #[test]
    fn test_missing_file() {
        let result = load_mapping_config(Path::new("/nonexistent/mapping.yaml"));
        assert!(matches!(result, Err(ConfigError::IoError(_))));
    }

    #[test]
    fn test_invalid_yaml() {
        let file = write_yaml("strict_relationships: [not, a, bool]\n");
        let result = load_mapping_config(file.path());
        assert!(matches!(result, Err(ConfigError::ParseError(_))));
    }

    #[test]
    fn test_invalid_context_url() {
        let file = write_yaml("context_url: not a uri\n");
        let result = load_mapping_config(file.path());
        assert!(matches!(result, Err(ConfigError::InvalidValue(_))));
    }

    #[test]
    fn test_env_var_substitution() {
        env::set_var("NGSI_TEST_BROKER_HOST", "broker.example.org");
        let file = write_yaml(r#"context_url: "https://${NGSI_TEST_BROKER_HOST}/context.jsonld""#);

        let config = load_mapping_config(file.path()).unwrap();
        assert_eq!(config.context_url, "https://broker.example.org/context.jsonld");

        env::remove_var("NGSI_TEST_BROKER_HOST");
    }

    #[test]
    fn test_missing_env_var() {
        let file = write_yaml(r#"context_url: "${NGSI_TEST_NONEXISTENT_VAR}""#);
        let result = load_mapping_config(file.path());
        assert!(matches!(result, Err(ConfigError::EnvVarNotFound(_))));
    }

    #[test]
    fn test_substitute_env_vars() {
        env::set_var("NGSI_TEST_VAR1", "value1");
        env::set_var("NGSI_TEST_VAR2", "value2");

        let result = substitute_env_vars("prefix_${NGSI_TEST_VAR1}_middle_${NGSI_TEST_VAR2}").unwrap();
        assert_eq!(result, "prefix_value1_middle_value2");

        env::remove_var("NGSI_TEST_VAR1");
        env::remove_var("NGSI_TEST_VAR2");
    }
}
