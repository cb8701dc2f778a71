use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, Level};

use crate::announce::AnnounceConfig;
use crate::gpio::GpioConfig;
use crate::mirror::MirrorConfig;
use crate::mqtt::MqttConfig;
use crate::speech::SpeechConfig;

const CONFIG_DIR: &str = "voicecube";
const CONFIG_FILE: &str = "config.toml";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("No config directory found, pass --config")]
    NoConfigDir,

    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid config in {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Unknown log level {0:?}")]
    LogLevel(String),
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq)]
#[serde(default)]
pub struct Config {
    pub log_level: String,
    pub mqtt: MqttConfig,
    pub mirror: MirrorConfig,
    pub announce: AnnounceConfig,
    pub speech: SpeechConfig,
    pub gpio: GpioConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            mqtt: MqttConfig::default(),
            mirror: MirrorConfig::default(),
            announce: AnnounceConfig::default(),
            speech: SpeechConfig::default(),
            gpio: GpioConfig::default(),
        }
    }
}

impl Config {
    /// `<config dir>/voicecube/config.toml`
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        let mut path = dirs::config_dir().ok_or(ConfigError::NoConfigDir)?;
        path.push(CONFIG_DIR);
        path.push(CONFIG_FILE);
        Ok(path)
    }

    /// Writes the default config to `path` unless something is already there.
    pub async fn ensure_default_config(path: &Path) -> Result<(), ConfigError> {
        let exists = fs::try_exists(path).await.map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        if exists {
            return Ok(());
        }

        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .await
                .map_err(|source| ConfigError::Write {
                    path: dir.to_path_buf(),
                    source,
                })?;
        }
        let content = toml::to_string_pretty(&Config::default())?;
        fs::write(path, content)
            .await
            .map_err(|source| ConfigError::Write {
                path: path.to_path_buf(),
                source,
            })?;
        info!("Wrote default config to {}", path.display());
        Ok(())
    }

    pub async fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path)
            .await
            .map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
        let config = Self::parse(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn parse(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    pub fn log_level(&self) -> Result<Level, ConfigError> {
        self.log_level
            .trim()
            .parse()
            .map_err(|_| ConfigError::LogLevel(self.log_level.clone()))
    }
}
