//! Configuration for the command driver

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Driver configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Answer `?` with help text from the command loop
    pub help_enabled: bool,
    /// Abandon a half-received command after this much silence (0 = never)
    pub idle_timeout_ms: u64,
    /// `tracing` filter used when `RUST_LOG` is not set
    pub log_filter: String,
    /// Print rejection diagnostics to the console output
    pub echo_diagnostics: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            help_enabled: true,
            idle_timeout_ms: 0,
            log_filter: "warn".to_string(),
            echo_diagnostics: true,
        }
    }
}

impl Config {
    /// Idle timeout, if enabled
    pub fn idle_timeout(&self) -> Option<Duration> {
        (self.idle_timeout_ms > 0).then(|| Duration::from_millis(self.idle_timeout_ms))
    }

    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load configuration from `path`, or the default config if there is no
    /// such file. A file that exists but does not parse is an error.
    pub fn load_if_exists(path: &Path) -> Result<Self, ConfigError> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from default location or return default config
    pub fn load_or_default() -> Self {
        let Some(config_path) = Self::default_path() else {
            return Self::default();
        };
        Self::load_if_exists(&config_path).unwrap_or_else(|e| {
            tracing::warn!("Ignoring {}: {}", config_path.display(), e);
            Self::default()
        })
    }

    /// `~/.config/charwise/config.json`
    pub fn default_path() -> Option<PathBuf> {
        std::env::var("HOME").ok().map(|home| {
            PathBuf::from(home)
                .join(".config")
                .join("charwise")
                .join("config.json")
        })
    }
}

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
