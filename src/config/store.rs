//! Shared configuration handle.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::RwLock;

use crate::config::loader::ConfigError;
use crate::config::types::Config;

/// Loaded config behind a lock, plus the file it came from.
#[derive(Clone)]
pub struct ConfigStore {
    inner: Arc<RwLock<Config>>,
    path: PathBuf,
}

impl ConfigStore {
    pub fn new(config: Config, path: PathBuf) -> Self {
        Self {
            inner: Arc::new(RwLock::new(config)),
            path,
        }
    }

    /// Load from `path`, or from [`Config::config_path`] when `None`.
    pub fn open(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path.map(Path::to_path_buf).unwrap_or_else(Config::config_path);
        let config = Config::load_from(&path)?;
        Ok(Self::new(config, path))
    }

    pub fn get(&self) -> Config {
        self.inner.read().clone()
    }

    /// Apply `f` to a copy of the config and keep it only if it validates.
    pub fn update(&self, f: impl FnOnce(&mut Config)) -> Result<(), ConfigError> {
        let mut next = self.get();
        f(&mut next);
        next.validate()?;
        *self.inner.write() = next;
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}
