use crate::error::{Error, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const CONFIG_ENV: &str = "TAGIFY_CONFIG";
pub const DATA_DIR_ENV: &str = "TAGIFY_DATA_DIR";

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct LoggingConfig {
    /// Directory for `tagify.log` and its rotations. `None` disables file logging.
    pub log_dir: Option<PathBuf>,
    pub debug: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: default_data_dir().map(|d| d.join("logs")),
            debug: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub data_dir: Option<PathBuf>,
    pub storage_key: String,
    pub save_debounce_ms: u64,
    pub playlist_sync_delay_ms: u64,
    pub tagged_playlist_name: String,
    pub playlist_cache_ttl_secs: u64,
    pub logging: LoggingConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: None,
            storage_key: "tagify:tagData".to_string(),
            save_debounce_ms: 1000,
            playlist_sync_delay_ms: 2000,
            tagged_playlist_name: "Tagged Tracks".to_string(),
            playlist_cache_ttl_secs: 3600,
            logging: LoggingConfig::default(),
        }
    }
}

impl Config {
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    /// Loads `explicit` if given, else `$TAGIFY_CONFIG`, else the per-user
    /// config file if it exists, else defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(p) => Some(p.to_path_buf()),
            None => std::env::var_os(CONFIG_ENV)
                .map(PathBuf::from)
                .or_else(|| user_config_file().filter(|p| p.exists())),
        };

        match path {
            Some(path) => {
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    Error::Config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                Self::from_toml(&content)
            }
            None => Ok(Self::default()),
        }
    }

    /// Data folder priority:
    /// 1. Command-line argument
    /// 2. Environment variable
    /// 3. Config file `data_dir`
    /// 4. Platform default
    pub fn resolve_data_dir(&self, cli_arg: Option<&Path>) -> Result<PathBuf> {
        if let Some(path) = cli_arg {
            return Ok(path.to_path_buf());
        }
        if let Some(path) = std::env::var_os(DATA_DIR_ENV) {
            return Ok(PathBuf::from(path));
        }
        if let Some(path) = &self.data_dir {
            return Ok(path.clone());
        }
        default_data_dir()
            .ok_or_else(|| Error::Config("Could not determine data directory".to_string()))
    }

    pub fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    pub fn playlist_sync_delay(&self) -> Duration {
        Duration::from_millis(self.playlist_sync_delay_ms)
    }

    pub fn playlist_cache_ttl(&self) -> Duration {
        Duration::from_secs(self.playlist_cache_ttl_secs)
    }

    pub fn playlist_cache_key(&self) -> String {
        format!("{}:playlistCache", self.storage_key)
    }
}

fn user_config_file() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tagify").join("config.toml"))
}

fn default_data_dir() -> Option<PathBuf> {
    dirs::data_local_dir().map(|d| d.join("tagify"))
}
