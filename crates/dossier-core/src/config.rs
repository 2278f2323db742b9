//! Configuration management for the sync layer.

use crate::{CoreResult, Paths};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Default API gateway URL (can be overridden at compile time via DOSSIER_GATEWAY_URL).
pub const DEFAULT_GATEWAY_URL: &str = match option_env!("DOSSIER_GATEWAY_URL") {
    Some(url) => url,
    None => "https://api.dossier-sync.dev",
};

/// Default realtime endpoint URL (can be overridden at compile time via DOSSIER_REALTIME_URL).
pub const DEFAULT_REALTIME_URL: &str = match option_env!("DOSSIER_REALTIME_URL") {
    Some(url) => url,
    None => "wss://realtime.dossier-sync.dev",
};

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Main configuration for the sync layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// API gateway base URL.
    #[serde(default = "default_gateway_url")]
    pub gateway_url: String,
    /// Realtime (push transport) endpoint URL.
    #[serde(default = "default_realtime_url")]
    pub realtime_url: String,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_gateway_url() -> String {
    DEFAULT_GATEWAY_URL.to_string()
}

fn default_realtime_url() -> String {
    DEFAULT_REALTIME_URL.to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            gateway_url: default_gateway_url(),
            realtime_url: default_realtime_url(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file, falling back to defaults.
    /// Environment variables override values from the file.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path)?;
            serde_json::from_str(&contents)?
        } else {
            debug!(path = %config_path.display(), "No config file, using defaults");
            Self::default()
        };

        config.load_from_env();
        Ok(config)
    }

    /// Apply environment variable overrides.
    fn load_from_env(&mut self) {
        if let Ok(level) = std::env::var("DOSSIER_LOG_LEVEL") {
            if !level.is_empty() {
                self.log_level = level;
            }
        }
        if let Ok(url) = std::env::var("DOSSIER_GATEWAY_URL") {
            if !url.is_empty() {
                self.gateway_url = url;
            }
        }
        if let Ok(url) = std::env::var("DOSSIER_REALTIME_URL") {
            if !url.is_empty() {
                self.realtime_url = url;
            }
        }
    }

    /// Persist the configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let contents = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), contents)?;
        Ok(())
    }
}
