use anyhow::{Context, Result};
use figment::providers::{Env, Format, Serialized, Yaml};
use figment::Figment;
use std::path::Path;
use thiserror::Error;

use crate::domain::models::config::Config;

/// Project-local directory holding config, database and logs.
pub const CONFIG_DIR: &str = ".stratagem";

/// Configuration error types
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid log level: {0}. Must be one of: trace, debug, info, warn, error")]
    InvalidLogLevel(String),

    #[error("Invalid log format: {0}. Must be one of: json, pretty")]
    InvalidLogFormat(String),

    #[error("Invalid log rotation: {0}. Must be one of: daily, hourly, never")]
    InvalidRotation(String),

    #[error("Database path cannot be empty")]
    EmptyDatabasePath,

    #[error("Invalid max_connections: {0}. Must be at least 1")]
    InvalidMaxConnections(u32),

    #[error("Invalid drift.min_samples: must be at least 1")]
    InvalidMinSamples,

    #[error("Invalid {name}: {value}. Must be positive")]
    NonPositiveThreshold { name: &'static str, value: f64 },

    #[error("Invalid dependency {source_domain} -> {target_domain}: strength {strength} outside [-1, 1]")]
    InvalidDependencyStrength {
        source_domain: &'static str,
        target_domain: &'static str,
        strength: f64,
    },

    #[error("Dependency entry for {0} references itself")]
    SelfDependency(&'static str),
}

/// Configuration loader with hierarchical merging
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration with hierarchical merging
    ///
    /// Precedence (lowest to highest):
    /// 1. Programmatic defaults (Serialized)
    /// 2. .stratagem/config.yaml (project config, created by init)
    /// 3. .stratagem/local.yaml (project local overrides, optional)
    /// 4. Environment variables (STRATAGEM_* prefix, highest priority)
    pub fn load() -> Result<Config> {
        Self::load_from_dir(Path::new("."))
    }

    /// Same as [`ConfigLoader::load`], rooted at `project_root` instead of the
    /// working directory.
    pub fn load_from_dir(project_root: &Path) -> Result<Config> {
        let dir = project_root.join(CONFIG_DIR);
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(dir.join("config.yaml")))
            .merge(Yaml::file(dir.join("local.yaml")))
            .merge(Env::prefixed("STRATAGEM_").split("__"))
            .extract()
            .context("Failed to extract configuration from figment")?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Load configuration from a specific file
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Config> {
        let config: Config = Figment::new()
            .merge(Serialized::defaults(Config::default()))
            .merge(Yaml::file(path.as_ref()))
            .extract()
            .with_context(|| format!("Failed to load config from {}", path.as_ref().display()))?;

        Self::validate(&config)?;
        Ok(config)
    }

    /// Validate configuration after loading
    pub fn validate(config: &Config) -> Result<(), ConfigError> {
        if config.database.path.is_empty() {
            return Err(ConfigError::EmptyDatabasePath);
        }

        if config.database.max_connections == 0 {
            return Err(ConfigError::InvalidMaxConnections(config.database.max_connections));
        }

        let valid_log_levels = ["trace", "debug", "info", "warn", "error"];
        if !valid_log_levels.contains(&config.logging.level.as_str()) {
            return Err(ConfigError::InvalidLogLevel(config.logging.level.clone()));
        }

        let valid_log_formats = ["json", "pretty"];
        if !valid_log_formats.contains(&config.logging.format.as_str()) {
            return Err(ConfigError::InvalidLogFormat(config.logging.format.clone()));
        }

        let valid_rotations = ["daily", "hourly", "never"];
        if !valid_rotations.contains(&config.logging.rotation.as_str()) {
            return Err(ConfigError::InvalidRotation(config.logging.rotation.clone()));
        }

        if config.drift.min_samples == 0 {
            return Err(ConfigError::InvalidMinSamples);
        }

        let thresholds = [
            ("drift.threshold_percent", config.drift.threshold_percent),
            ("drift.acceleration_margin_percent", config.drift.acceleration_margin_percent),
            ("balance.rebalance_shift_threshold", config.balance.rebalance_shift_threshold),
            ("adjustment.trend_threshold_percent", config.adjustment.trend_threshold_percent),
            ("adjustment.success_threshold_percent", config.adjustment.success_threshold_percent),
        ];
        for (name, value) in thresholds {
            if value.is_nan() || value <= 0.0 {
                return Err(ConfigError::NonPositiveThreshold { name, value });
            }
        }

        for dep in config.balance.dependencies.dependencies() {
            if dep.source == dep.target {
                return Err(ConfigError::SelfDependency(dep.source.as_str()));
            }
            if !(-1.0..=1.0).contains(&dep.strength) {
                return Err(ConfigError::InvalidDependencyStrength {
                    source_domain: dep.source.as_str(),
                    target_domain: dep.target.as_str(),
                    strength: dep.strength,
                });
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::models::{DomainDependency, DomainDependencyMatrix, StrategyDomain};
    use std::fs;

    fn write_config(root: &Path, file: &str, contents: &str) {
        let dir = root.join(CONFIG_DIR);
        fs::create_dir_all(&dir).unwrap();
        fs::write(dir.join(file), contents).unwrap();
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database.path, ".stratagem/stratagem.db");
        assert_eq!(config.logging.level, "info");
        assert_eq!(config.drift.min_samples, 3);
        assert!((config.drift.threshold_percent - 10.0).abs() < f64::EPSILON);
        assert!(!config.refinement.auto_apply_low_severity);
        ConfigLoader::validate(&config).expect("Default config should be valid");
    }

    #[test]
    fn test_yaml_parsing() {
        let yaml = r"
database:
  path: /custom/path.db
  max_connections: 8
logging:
  level: debug
  format: pretty
drift:
  threshold_percent: 12.5
  detect_acceleration: true
balance:
  dependencies:
    - source: CONTENT
      target: SEO
      strength: 0.9
refinement:
  auto_apply_low_severity: true
";

        let config: Config = serde_yaml::from_str(yaml).expect("YAML should parse");

        assert_eq!(config.database.path, "/custom/path.db");
        assert_eq!(config.database.max_connections, 8);
        assert_eq!(config.logging.format, "pretty");
        assert!((config.drift.threshold_percent - 12.5).abs() < f64::EPSILON);
        assert!(config.drift.detect_acceleration);
        assert_eq!(config.drift.min_samples, 3, "Unset fields keep their defaults");
        assert_eq!(config.balance.dependencies.dependencies().len(), 1);
        assert!(config.refinement.auto_apply_low_severity);

        ConfigLoader::validate(&config).expect("Parsed config should be valid");
    }

    #[test]
    fn test_validate_invalid_log_level() {
        let mut config = Config::default();
        config.logging.level = "invalid".to_string();

        match ConfigLoader::validate(&config).unwrap_err() {
            ConfigError::InvalidLogLevel(level) => assert_eq!(level, "invalid"),
            other => panic!("Expected InvalidLogLevel error, got {other}"),
        }
    }

    #[test]
    fn test_validate_invalid_log_format_and_rotation() {
        let mut config = Config::default();
        config.logging.format = "xml".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidLogFormat(_)
        ));

        let mut config = Config::default();
        config.logging.rotation = "weekly".to_string();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidRotation(_)
        ));
    }

    #[test]
    fn test_validate_database() {
        let mut config = Config::default();
        config.database.path = String::new();
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::EmptyDatabasePath
        ));

        let mut config = Config::default();
        config.database.max_connections = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidMaxConnections(0)
        ));
    }

    #[test]
    fn test_validate_min_samples_and_thresholds() {
        let mut config = Config::default();
        config.drift.min_samples = 0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidMinSamples
        ));

        let mut config = Config::default();
        config.drift.threshold_percent = 0.0;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::NonPositiveThreshold { name: "drift.threshold_percent", .. }
        ));

        let mut config = Config::default();
        config.adjustment.success_threshold_percent = f64::NAN;
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::NonPositiveThreshold { name: "adjustment.success_threshold_percent", .. }
        ));
    }

    #[test]
    fn test_validate_dependency_matrix() {
        let mut config = Config::default();
        config.balance.dependencies = DomainDependencyMatrix::new(vec![DomainDependency::new(
            StrategyDomain::Ads,
            StrategyDomain::Seo,
            1.5,
        )]);
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::InvalidDependencyStrength { strength, .. } if (strength - 1.5).abs() < f64::EPSILON
        ));

        config.balance.dependencies = DomainDependencyMatrix::new(vec![DomainDependency::new(
            StrategyDomain::Seo,
            StrategyDomain::Seo,
            0.5,
        )]);
        assert!(matches!(
            ConfigLoader::validate(&config).unwrap_err(),
            ConfigError::SelfDependency("SEO")
        ));
    }

    #[test]
    fn test_local_overrides_project_config() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "config.yaml", "logging:\n  level: info\n  format: pretty\ndrift:\n  min_samples: 4\n");
        write_config(dir.path(), "local.yaml", "logging:\n  level: debug\n");

        let config = temp_env::with_vars_unset(["STRATAGEM_LOGGING__LEVEL", "STRATAGEM_DRIFT__MIN_SAMPLES"], || {
            ConfigLoader::load_from_dir(dir.path()).unwrap()
        });

        assert_eq!(config.logging.level, "debug", "Local override should win");
        assert_eq!(config.logging.format, "pretty", "Project value should persist when not overridden");
        assert_eq!(config.drift.min_samples, 4);
    }

    #[test]
    fn test_env_override_wins() {
        let dir = tempfile::tempdir().unwrap();
        write_config(dir.path(), "config.yaml", "drift:\n  threshold_percent: 12.5\n");

        let config = temp_env::with_vars(
            [
                ("STRATAGEM_DRIFT__THRESHOLD_PERCENT", Some("15.5")),
                ("STRATAGEM_REFINEMENT__AUTO_APPLY_LOW_SEVERITY", Some("true")),
            ],
            || ConfigLoader::load_from_dir(dir.path()).unwrap(),
        );

        assert!((config.drift.threshold_percent - 15.5).abs() < f64::EPSILON);
        assert!(config.refinement.auto_apply_low_severity);
    }

    #[test]
    fn test_invalid_file_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("broken.yaml");
        fs::write(&path, "logging:\n  level: loud\n").unwrap();

        let err = ConfigLoader::load_from_file(&path).unwrap_err();
        assert!(err.to_string().contains("Invalid log level"));
    }
}
