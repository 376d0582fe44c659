//! Configuration loading and storage.

mod loader;
mod store;
mod types;

pub use loader::ConfigError;
pub use store::ConfigStore;
pub use types::{
    CommandsConfig, Config, LogsConfig, LoopbackConfig, PhoneConfig, ServerConfig, SessionConfig,
};
