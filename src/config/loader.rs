//! Configuration loading from disk.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::config::schema::SidecarConfig;
use crate::config::validation::{validate_config, ValidationError};

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join(.0))]
    Validation(Vec<ValidationError>),

    #[error("Invalid resource name: {0}")]
    ResourceName(String),
}

fn join(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Read a TOML file into a configuration without validating it.
///
/// CLI overrides are usually applied on top before [`finalize`] runs.
pub fn read_config(path: &Path) -> Result<SidecarConfig, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.display().to_string(),
        source,
    })?;
    Ok(toml::from_str(&content)?)
}

/// Validate a fully assembled configuration, handing it back when accepted.
pub fn finalize(config: SidecarConfig) -> Result<SidecarConfig, ConfigError> {
    validate_config(&config).map_err(ConfigError::Validation)?;
    Ok(config)
}

/// Load and validate configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<SidecarConfig, ConfigError> {
    finalize(read_config(path)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_load_valid_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
root_dir = "/etc/prometheus"

[resource]
namespace = "monitoring"
name = "prometheus-config"

[trigger]
kind = "http"
url = "http://localhost:9090/-/reload"
"#
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.resource.to_string(), "monitoring/prometheus-config");
    }

    #[test]
    fn test_load_reports_validation_errors() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[rate_limit]\nburst = 0").unwrap();

        match load_config(file.path()) {
            Err(ConfigError::Validation(errors)) => {
                assert!(errors.contains(&ValidationError::ZeroBurst));
                assert!(errors.contains(&ValidationError::MissingResourceName));
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_missing_file_is_io_error() {
        let err = load_config(Path::new("/nonexistent/reloader.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
        assert!(err.to_string().contains("/nonexistent/reloader.toml"));
    }
}
