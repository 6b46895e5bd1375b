use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::{ClientError, ClientResult};

pub const CONFIG_VERSION: u64 = 1;

/// Overrides `api_base_url` when set.
pub const API_URL_ENV: &str = "TASKDECK_API_URL";

const DEFAULT_API_BASE_URL: &str = "https://webapitodolist20250728153145.azurewebsites.net";

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

/// `base` when the platform has one, else a directory relative to the
/// working directory. A literal `~` would never be expanded.
fn app_dir(base: Option<PathBuf>) -> PathBuf {
    match base {
        Some(dir) => dir.join("taskdeck"),
        None => {
            log::warn!("No platform config directory, using ./.taskdeck");
            PathBuf::from(".taskdeck")
        }
    }
}

fn default_config_dir() -> PathBuf {
    app_dir(dirs::config_dir())
}

fn default_storage_path() -> PathBuf {
    app_dir(dirs::data_local_dir()).join("storage.json")
}

fn default_notification_timeout_secs() -> u64 {
    5
}

fn default_version() -> u64 {
    CONFIG_VERSION
}

/// Where the session token is persisted.
#[derive(Clone, Copy, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    File,
    Keyring,
    Memory,
}

#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(default)]
pub struct ClientConfig {
    #[serde(default = "default_version")]
    pub version: u64,
    pub api_base_url: String,
    pub storage: StorageBackend,
    pub storage_path: PathBuf,
    pub notification_timeout_secs: u64,
    pub debug_logging: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            version: CONFIG_VERSION,
            api_base_url: default_api_base_url(),
            storage: StorageBackend::default(),
            storage_path: default_storage_path(),
            notification_timeout_secs: default_notification_timeout_secs(),
            debug_logging: false,
        }
    }
}

impl ClientConfig {
    pub fn default_path() -> PathBuf {
        default_config_dir().join("config.json")
    }

    /// Reads `path`, falling back to defaults when it does not exist.
    pub fn load(path: &Path) -> ClientResult<Self> {
        let mut config = match std::fs::read_to_string(path) {
            Ok(content) => serde_json::from_str::<Self>(&content).map_err(|e| {
                ClientError::Config(format!("{}: {}", path.display(), e))
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                log::debug!("No config at {}, using defaults", path.display());
                Self::default()
            }
            Err(e) => {
                return Err(ClientError::Config(format!(
                    "failed to read {}: {}",
                    path.display(),
                    e
                )));
            }
        };

        if config.version > CONFIG_VERSION {
            return Err(ClientError::Config(format!(
                "config version {} is newer than supported ({})",
                config.version, CONFIG_VERSION
            )));
        }

        if let Ok(url) = std::env::var(API_URL_ENV) {
            if !url.trim().is_empty() {
                config.api_base_url = url.trim().to_string();
            }
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ClientResult<()> {
        let url = self.api_base_url.trim();
        if !(url.starts_with("http://") || url.starts_with("https://")) {
            return Err(ClientError::Config(format!(
                "api_base_url must be an http(s) URL, got `{}`",
                self.api_base_url
            )));
        }
        Ok(())
    }

    pub fn notification_timeout(&self) -> Duration {
        Duration::from_secs(self.notification_timeout_secs)
    }

    pub fn save(&self, path: &Path) -> ClientResult<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ClientError::Config(format!("{}: {}", parent.display(), e)))?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ClientError::Config(e.to_string()))?;
        std::fs::write(path, json)
            .map_err(|e| ClientError::Config(format!("{}: {}", path.display(), e)))
    }
}
