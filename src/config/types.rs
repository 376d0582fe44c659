use std::collections::BTreeMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Root configuration container.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub phone: PhoneConfig,
    #[serde(default)]
    pub logs: LogsConfig,
    #[serde(default)]
    pub commands: CommandsConfig,
    #[serde(default)]
    pub loopback: LoopbackConfig,
}

/// HTTP listener settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Bind address for the API server (host:port).
    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,
    /// Allowed CORS origin, `*` for any.
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

/// Connection lifecycle timing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// How long `connect` waits for a pairing code or an established session.
    #[serde(default = "default_pairing_timeout")]
    pub pairing_timeout_seconds: u64,
    /// Upper bound on a single `close` call against the messaging client.
    #[serde(default = "default_close_timeout")]
    pub close_timeout_seconds: u64,
    /// Interval of the heartbeat line written while a session is attached.
    #[serde(default = "default_keepalive_interval")]
    pub keepalive_interval_seconds: u64,
}

/// Phone number acceptance rules.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PhoneConfig {
    #[serde(default = "default_min_digits")]
    pub min_digits: usize,
    #[serde(default = "default_max_digits")]
    pub max_digits: usize,
    /// Required country-code prefix; empty accepts any.
    #[serde(default = "default_country_prefix")]
    pub country_prefix: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogsConfig {
    #[serde(default = "default_log_capacity")]
    pub capacity: usize,
}

/// Chat command replies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandsConfig {
    /// URL advertised by the `/web` command.
    #[serde(default = "default_panel_url")]
    pub panel_url: String,
    /// Extra case-insensitive commands (command -> reply).
    #[serde(default)]
    pub extra: BTreeMap<String, String>,
}

/// Timing of the in-process loopback client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoopbackConfig {
    #[serde(default = "default_code_delay_ms")]
    pub code_delay_ms: u64,
    #[serde(default = "default_establish_delay_ms")]
    pub establish_delay_ms: u64,
}

impl SessionConfig {
    pub fn pairing_timeout(&self) -> Duration {
        Duration::from_secs(self.pairing_timeout_seconds)
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_secs(self.close_timeout_seconds)
    }

    pub fn keepalive_interval(&self) -> Duration {
        Duration::from_secs(self.keepalive_interval_seconds)
    }
}

fn default_bind_addr() -> String {
    "0.0.0.0:3000".to_string()
}

fn default_cors_origin() -> String {
    "*".to_string()
}

fn default_pairing_timeout() -> u64 {
    45
}

fn default_close_timeout() -> u64 {
    10
}

fn default_keepalive_interval() -> u64 {
    300
}

fn default_min_digits() -> usize {
    12
}

fn default_max_digits() -> usize {
    13
}

fn default_country_prefix() -> String {
    "55".to_string()
}

fn default_log_capacity() -> usize {
    crate::activity::DEFAULT_CAPACITY
}

fn default_panel_url() -> String {
    "http://127.0.0.1:3000".to_string()
}

fn default_code_delay_ms() -> u64 {
    500
}

fn default_establish_delay_ms() -> u64 {
    5000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: default_bind_addr(),
            cors_origin: default_cors_origin(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            pairing_timeout_seconds: default_pairing_timeout(),
            close_timeout_seconds: default_close_timeout(),
            keepalive_interval_seconds: default_keepalive_interval(),
        }
    }
}

impl Default for PhoneConfig {
    fn default() -> Self {
        Self {
            min_digits: default_min_digits(),
            max_digits: default_max_digits(),
            country_prefix: default_country_prefix(),
        }
    }
}

impl Default for LogsConfig {
    fn default() -> Self {
        Self {
            capacity: default_log_capacity(),
        }
    }
}

impl Default for CommandsConfig {
    fn default() -> Self {
        Self {
            panel_url: default_panel_url(),
            extra: BTreeMap::new(),
        }
    }
}

impl Default for LoopbackConfig {
    fn default() -> Self {
        Self {
            code_delay_ms: default_code_delay_ms(),
            establish_delay_ms: default_establish_delay_ms(),
        }
    }
}
