//! Configuration loading and validation.

use std::fs;
use std::path::Path;

use thiserror::Error;

use crate::EnsembleConfig;

/// Configuration loading errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("YAML parse error: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Load full Ensemble configuration from a YAML file.
pub fn load_config(path: &Path) -> Result<EnsembleConfig, ConfigError> {
    let content = fs::read_to_string(path)?;
    let config: EnsembleConfig = serde_yaml::from_str(&content)?;
    validate_config(&config)?;
    Ok(config)
}

fn validate_config(config: &EnsembleConfig) -> Result<(), ConfigError> {
    if config.version == 0 {
        return Err(ConfigError::Invalid(
            "version must be greater than 0".to_string(),
        ));
    }

    if config.app.name.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "app.name must not be empty".to_string(),
        ));
    }

    if config.session.max_cycles == 0 {
        return Err(ConfigError::Invalid(
            "session.max_cycles must be > 0".to_string(),
        ));
    }

    for id in &config.session.required_agents {
        if id.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "session.required_agents[] must not contain empty ids".to_string(),
            ));
        }
    }

    if let Some(path) = &config.agents.profile_path {
        if path.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "agents.profile_path must not be empty when set".to_string(),
            ));
        }
    }

    if config.observability.log_level.trim().is_empty() {
        return Err(ConfigError::Invalid(
            "observability.log_level must not be empty".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_validate() {
        let config = EnsembleConfig::default();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.version, 1);
        assert_eq!(config.app.name, "ensemble");
        assert_eq!(config.executor.latency_floor_ms, 500);
        assert_eq!(config.executor.latency_jitter_ms, 1000);
        assert_eq!(config.session.max_cycles, 8);
        assert!(config.session.required_agents.is_empty());
        assert_eq!(config.observability.log_level, "info");
    }

    #[test]
    fn test_load_partial_yaml_fills_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "app:\n  name: contract-desk\nsession:\n  max_cycles: 3\n  required_agents:\n    - talk_to_corpus\nexecutor:\n  latency_jitter_ms: 0\n"
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.app.name, "contract-desk");
        assert_eq!(config.app.environment, "development");
        assert_eq!(config.session.max_cycles, 3);
        assert_eq!(config.session.required_agents, vec!["talk_to_corpus"]);
        assert_eq!(config.executor.latency_floor_ms, 500);
        assert_eq!(config.executor.latency_jitter_ms, 0);
    }

    #[test]
    fn test_load_full_yaml_covers_every_section() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "version: 1\n\
             app:\n  name: contract-desk\n  environment: production\n\
             executor:\n  latency_floor_ms: 250\n  latency_jitter_ms: 750\n\
             session:\n  max_cycles: 4\n  required_agents:\n    - talk_to_document\n    - numbering_check\n\
             agents:\n  profile_path: profiles/contract.json\n\
             observability:\n  log_level: debug\n  log_file: logs/ensemble.log\n"
        )
        .unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.app.environment, "production");
        assert_eq!(config.executor.latency_floor_ms, 250);
        assert_eq!(config.executor.latency_jitter_ms, 750);
        assert_eq!(config.session.max_cycles, 4);
        assert_eq!(
            config.session.required_agents,
            vec!["talk_to_document", "numbering_check"]
        );
        assert_eq!(
            config.agents.profile_path.as_deref(),
            Some("profiles/contract.json")
        );
        assert_eq!(config.observability.log_level, "debug");
        assert_eq!(
            config.observability.log_file.as_deref(),
            Some("logs/ensemble.log")
        );
    }

    #[test]
    fn test_zero_max_cycles_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "session:\n  max_cycles: 0\n").unwrap();

        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::Invalid(_))
        ));
    }

    #[test]
    fn test_malformed_yaml_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "app: [not-a-map").unwrap();

        assert!(matches!(
            load_config(file.path()),
            Err(ConfigError::Parse(_))
        ));
    }
}
