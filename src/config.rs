//! Application configuration
//!
//! One TOML file at `<config dir>/rasptank-control/config.toml`. Every section
//! and field has a default, so a partial file is valid. A missing file is
//! created with the defaults on first start.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::controller::controller_handle::ControllerSettings;
use crate::feedback::scheduler::FeedbackSettings;
use crate::mapping::translator::TranslatorSettings;
use crate::movement::actuator::ActuatorSettings;
use crate::movement::kinematics::KickstartSettings;
use crate::mqtt::config::MqttConfig;

const CONFIG_DIR: &str = "rasptank-control";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to write config file {path}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}

/// Operator loop timing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OperatorSettings {
    /// Input loop period, 10 ms gives the 100 Hz control rate
    pub tick_ms: u64,
    /// Capacity of the inbound MQTT message queue
    pub inbound_capacity: usize,
}

impl Default for OperatorSettings {
    fn default() -> Self {
        Self {
            tick_ms: 10,
            inbound_capacity: 100,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub mqtt: MqttConfig,
    pub operator: OperatorSettings,
    pub controller: ControllerSettings,
    pub translator: TranslatorSettings,
    pub feedback: FeedbackSettings,
    pub kickstart: KickstartSettings,
    pub actuator: ActuatorSettings,
}

impl AppConfig {
    /// `<config dir>/rasptank-control/config.toml`, falling back to the
    /// current directory when the platform has no config dir
    pub fn default_path() -> PathBuf {
        let mut path = dirs::config_dir().unwrap_or_else(|| {
            warn!("Could not determine config directory, using current directory");
            PathBuf::from(".")
        });
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        path
    }

    /// Loads the file at `path`, writing the defaults there if it does not exist
    pub async fn load_or_create(path: &Path) -> Result<Self, ConfigError> {
        let exists = tokio::fs::try_exists(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;

        if !exists {
            info!("No config at {}, writing defaults", path.display());
            let config = Self::default();
            config.save(path).await?;
            return Ok(config);
        }

        let content = tokio::fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub async fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|source| ConfigError::Write {
                    path: parent.to_path_buf(),
                    source,
                })?;
        }
        tokio::fs::write(path, content)
            .await
            .map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::movement::actuator::ActuatorKind;

    fn scratch_path(name: &str) -> PathBuf {
        let mut path = std::env::temp_dir();
        path.push(format!("rasptank-control-{}-{}", name, std::process::id()));
        path.push(CONFIG_FILE);
        path
    }

    #[test]
    fn partial_file_keeps_defaults() {
        let config = AppConfig::parse(
            "[translator]\ndead_zone = 0.2\n\n[actuator]\nkind = \"gpio\"\n",
        )
        .unwrap();
        assert_eq!(config.translator.dead_zone, 0.2);
        assert_eq!(config.translator.turn_threshold, 0.3);
        assert_eq!(config.actuator.kind, ActuatorKind::Gpio);
        assert_eq!(config.mqtt, MqttConfig::default());
        assert_eq!(config.operator.tick_ms, 10);
    }

    #[tokio::test]
    async fn missing_file_is_created_with_defaults() {
        let path = scratch_path("create");
        let _ = tokio::fs::remove_file(&path).await;

        let created = AppConfig::load_or_create(&path).await.unwrap();
        assert_eq!(created, AppConfig::default());
        assert!(tokio::fs::try_exists(&path).await.unwrap());

        let reloaded = AppConfig::load_or_create(&path).await.unwrap();
        assert_eq!(reloaded, created);
        let _ = tokio::fs::remove_dir_all(path.parent().unwrap()).await;
    }

    #[tokio::test]
    async fn malformed_file_reports_path() {
        let path = scratch_path("malformed");
        tokio::fs::create_dir_all(path.parent().unwrap()).await.unwrap();
        tokio::fs::write(&path, "[mqtt\nport = ").await.unwrap();

        let err = AppConfig::load_or_create(&path).await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
        let _ = tokio::fs::remove_dir_all(path.parent().unwrap()).await;
    }
}
