//! Configuration management for Warden
//!
//! Settings come from an optional TOML file overlaid with `WARDEN__SECTION__KEY`
//! environment variables, e.g. `WARDEN__LOCK__OBJECT_LEASE_SECS=10`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;
use warden_common::LockConfig;

pub const DEFAULT_CONFIG_PATH: &str = "conf/warden.toml";
pub const ENV_PREFIX: &str = "WARDEN";

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub lock: LockConfig,
    pub store: StoreSettings,
    pub logging: LoggingSettings,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StoreBackend {
    #[default]
    Memory,
    Redis,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StoreSettings {
    pub backend: StoreBackend,
    pub redis_url: String,
    /// Expiry sweep interval of the memory store
    pub cleanup_interval_ms: u64,
}

impl Default for StoreSettings {
    fn default() -> Self {
        Self {
            backend: StoreBackend::Memory,
            redis_url: "redis://127.0.0.1:6379".to_string(),
            cleanup_interval_ms: 1000,
        }
    }
}

impl StoreSettings {
    pub fn cleanup_interval(&self) -> Duration {
        Duration::from_millis(self.cleanup_interval_ms)
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if self.cleanup_interval_ms == 0 {
            anyhow::bail!("store.cleanup_interval_ms must be positive");
        }
        Ok(())
    }
}

/// Log rotation policy
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogRotation {
    #[default]
    Daily,
    Hourly,
    Never,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingSettings {
    /// Level used when `RUST_LOG` is not set
    pub level: String,
    pub console: bool,
    /// Directory of the rolling log file; no file logging when unset
    pub dir: Option<PathBuf>,
    pub file_name: String,
    pub rotation: LogRotation,
}

impl Default for LoggingSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            console: true,
            dir: None,
            file_name: "warden.log".to_string(),
            rotation: LogRotation::Daily,
        }
    }
}

impl Settings {
    /// Load from `path` (or the default path) and the process environment.
    ///
    /// A missing file is not an error; every setting has a default.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_with_env(path, None)
    }

    /// Same as [`load`](Self::load) with `env` standing in for the process environment
    pub fn load_with_env(
        path: Option<&Path>,
        env: Option<HashMap<String, String>>,
    ) -> anyhow::Result<Self> {
        let path = path.unwrap_or(Path::new(DEFAULT_CONFIG_PATH));

        let settings: Settings = Config::builder()
            .add_source(File::from(path).required(false))
            .add_source(
                Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true)
                    .source(env),
            )
            .build()?
            .try_deserialize()?;

        settings.lock.validate()?;
        settings.store.validate()?;
        Ok(settings)
    }
}
