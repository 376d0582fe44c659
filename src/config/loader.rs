use std::fs;
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::config::types::Config;

/// Errors that can occur when loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadError {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file '{path}': {source}")]
    ParseError {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Config validation failed: {message}")]
    ValidationError { message: String },
}

impl Config {
    /// Returns the path to the configuration file.
    ///
    /// Uses `~/.config/pairlink/config.toml` on Unix/macOS,
    /// or equivalent on other platforms via `dirs::config_dir()`.
    /// Falls back to current directory if config_dir is unavailable.
    pub fn config_path() -> PathBuf {
        let config_dir = dirs::config_dir().unwrap_or_else(|| PathBuf::from("."));
        config_dir.join("pairlink").join("config.toml")
    }

    /// Loads configuration from the default config file.
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from(&Self::config_path())
    }

    /// Loads configuration from `path`.
    ///
    /// - If the file doesn't exist, returns `Config::default()`.
    /// - If the file exists, parses it as TOML and validates.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        let config: Config = toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })?;

        config.validate()?;
        Ok(config)
    }

    /// Replace the port of `server.bind_addr` with `port` (the `PORT`
    /// convention of hosted platforms). Non-numeric values are ignored.
    pub fn apply_port_override(&mut self, port: Option<&str>) {
        let Some(port) = port.and_then(|p| p.trim().parse::<u16>().ok()) else {
            return;
        };
        let host = match self.server.bind_addr.rsplit_once(':') {
            Some((host, _)) => host.to_string(),
            None => "0.0.0.0".to_string(),
        };
        self.server.bind_addr = format!("{}:{}", host, port);
    }

    /// Validates the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.server.bind_addr.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::ValidationError {
                message: format!("Invalid bind address '{}'", self.server.bind_addr),
            });
        }

        if self.session.pairing_timeout_seconds == 0 {
            return Err(ConfigError::ValidationError {
                message: "session.pairing_timeout_seconds must be greater than 0".to_string(),
            });
        }

        if self.session.keepalive_interval_seconds == 0 {
            return Err(ConfigError::ValidationError {
                message: "session.keepalive_interval_seconds must be greater than 0".to_string(),
            });
        }

        if self.logs.capacity == 0 {
            return Err(ConfigError::ValidationError {
                message: "logs.capacity must be greater than 0".to_string(),
            });
        }

        if self.phone.min_digits == 0 || self.phone.min_digits > self.phone.max_digits {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "phone digit range {}..={} is empty",
                    self.phone.min_digits, self.phone.max_digits
                ),
            });
        }

        if !self.phone.country_prefix.chars().all(|c| c.is_ascii_digit()) {
            return Err(ConfigError::ValidationError {
                message: format!(
                    "phone.country_prefix '{}' must contain only digits",
                    self.phone.country_prefix
                ),
            });
        }

        Ok(())
    }
}
