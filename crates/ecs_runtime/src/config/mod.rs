//! Configuration system
//!
//! Runtime settings load from TOML or RON, chosen by file extension.

use std::path::Path;

pub use serde::{Deserialize, Serialize};

/// Configuration trait
pub trait Config: Serialize + for<'de> Deserialize<'de> + Default {
    /// Load configuration from file
    fn load_from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;

        match ConfigFormat::from_path(path)? {
            ConfigFormat::Toml => Self::from_toml_str(&contents),
            ConfigFormat::Ron => Self::from_ron_str(&contents),
        }
    }

    /// Save configuration to file
    fn save_to_file(&self, path: impl AsRef<Path>) -> Result<(), ConfigError> {
        let path = path.as_ref();
        let contents = match ConfigFormat::from_path(path)? {
            ConfigFormat::Toml => {
                toml::to_string_pretty(self).map_err(|e| ConfigError::Serialize(e.to_string()))?
            }
            ConfigFormat::Ron => ron::ser::to_string_pretty(self, ron::ser::PrettyConfig::default())
                .map_err(|e| ConfigError::Serialize(e.to_string()))?,
        };

        std::fs::write(path, contents).map_err(ConfigError::Io)
    }

    /// Parse configuration from a TOML document
    fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        toml::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Parse configuration from a RON document
    fn from_ron_str(contents: &str) -> Result<Self, ConfigError> {
        ron::from_str(contents).map_err(|e| ConfigError::Parse(e.to_string()))
    }
}

#[derive(Debug, Clone, Copy)]
enum ConfigFormat {
    Toml,
    Ron,
}

impl ConfigFormat {
    fn from_path(path: &Path) -> Result<Self, ConfigError> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Ok(Self::Toml),
            Some("ron") => Ok(Self::Ron),
            _ => Err(ConfigError::UnsupportedFormat(path.display().to_string())),
        }
    }
}

/// Configuration errors
#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Parse error
    #[error("Parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialize(String),

    /// Unsupported format
    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),

    /// Values parsed but out of range
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Runtime settings shared by the world and the frame driver
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Length of one fixed update step in seconds
    pub fixed_time_step: f32,

    /// Upper bound on fixed steps run in a single frame
    pub max_fixed_steps_per_frame: u32,

    /// Entity slots to reserve up front
    pub initial_entity_capacity: usize,

    /// Default `env_logger` filter, overridden by `RUST_LOG`
    pub log_filter: Option<String>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            fixed_time_step: 1.0 / 60.0,
            max_fixed_steps_per_frame: 8,
            initial_entity_capacity: 0,
            log_filter: None,
        }
    }
}

impl Config for RuntimeConfig {}

impl RuntimeConfig {
    /// Check that the values can drive a frame loop
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.fixed_time_step.is_finite() || self.fixed_time_step <= 0.0 {
            return Err(ConfigError::Invalid(format!(
                "fixed_time_step must be a positive number of seconds, got {}",
                self.fixed_time_step
            )));
        }

        if self.max_fixed_steps_per_frame == 0 {
            return Err(ConfigError::Invalid(
                "max_fixed_steps_per_frame must be at least 1".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_partial_toml_falls_back_to_defaults() {
        let config = RuntimeConfig::from_toml_str("fixed_time_step = 0.02\n").unwrap();

        assert_relative_eq!(config.fixed_time_step, 0.02, epsilon = 1e-6);
        assert_eq!(config.max_fixed_steps_per_frame, 8);
        assert!(config.log_filter.is_none());
    }

    #[test]
    fn test_ron_document_parses() {
        let config = RuntimeConfig::from_ron_str(
            "(fixed_time_step: 0.05, max_fixed_steps_per_frame: 3, log_filter: Some(\"debug\"))",
        )
        .unwrap();

        assert_eq!(config.max_fixed_steps_per_frame, 3);
        assert_eq!(config.log_filter.as_deref(), Some("debug"));
    }

    #[test]
    fn test_save_and_load_round_trip_through_file() {
        let path = std::env::temp_dir().join(format!("ecs_runtime_config_{}.toml", std::process::id()));
        let config = RuntimeConfig {
            initial_entity_capacity: 128,
            ..RuntimeConfig::default()
        };

        config.save_to_file(&path).unwrap();
        let loaded = RuntimeConfig::load_from_file(&path).unwrap();
        let _ = std::fs::remove_file(&path);

        assert_eq!(loaded, config);
    }

    #[test]
    fn test_unknown_extension_is_rejected() {
        let result = RuntimeConfig::default().save_to_file("settings.json");
        assert!(matches!(result, Err(ConfigError::UnsupportedFormat(_))));
    }

    #[test]
    fn test_validate_rejects_bad_timing() {
        let zero_step = RuntimeConfig {
            fixed_time_step: 0.0,
            ..RuntimeConfig::default()
        };
        assert!(matches!(zero_step.validate(), Err(ConfigError::Invalid(_))));

        let no_steps = RuntimeConfig {
            max_fixed_steps_per_frame: 0,
            ..RuntimeConfig::default()
        };
        assert!(no_steps.validate().is_err());
        assert!(RuntimeConfig::default().validate().is_ok());
    }
}
