//! Configuration loading.
//!
//! Layers, lowest first: built-in defaults, an optional JSON file, then
//! `VIGIL__SECTION__KEY` environment variables. CLI overrides are applied by
//! the binary through [`ConfigManager::update`].

use config::{Config, Environment, File, FileFormat};
use directories::ProjectDirs;
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

use crate::config::AppConfig;
use crate::error::CoreError;

/// Config file name inside the platform config directory
const CONFIG_FILE_NAME: &str = "config.json";

/// Environment variable prefix
pub const ENV_PREFIX: &str = "VIGIL";

/// Holds the resolved configuration.
#[derive(Debug, Clone)]
pub struct ConfigManager {
    config: Arc<RwLock<AppConfig>>,
    config_path: Option<PathBuf>,
}

impl ConfigManager {
    /// Loads defaults, `path` (or the platform config file when present) and
    /// `VIGIL__*` variables.
    pub fn load(path: Option<&Path>) -> Result<Self, CoreError> {
        let path = match path {
            Some(p) => {
                if !p.exists() {
                    return Err(CoreError::Config(format!(
                        "config file not found: {}",
                        p.display()
                    )));
                }
                Some(p.to_path_buf())
            }
            None => Self::default_config_path().filter(|p| p.exists()),
        };
        Self::load_with_prefix(path.as_deref(), ENV_PREFIX)
    }

    /// Same as [`ConfigManager::load`] with an explicit environment prefix.
    pub fn load_with_prefix(path: Option<&Path>, env_prefix: &str) -> Result<Self, CoreError> {
        let mut builder = Config::builder().add_source(Config::try_from(&AppConfig::default_config())?);

        if let Some(p) = path {
            builder = builder.add_source(File::from(p).format(FileFormat::Json).required(true));
            info!(path = %p.display(), "loading config file");
        }

        builder = builder.add_source(
            Environment::with_prefix(env_prefix)
                .separator("__")
                .try_parsing(true),
        );

        let mut config: AppConfig = builder.build()?.try_deserialize()?;
        config.normalize();
        config.validate()?;

        debug!(?config, "configuration resolved");

        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path: path.map(Path::to_path_buf),
        })
    }

    /// Wraps an already-built configuration.
    pub fn from_config(mut config: AppConfig) -> Result<Self, CoreError> {
        config.normalize();
        config.validate()?;
        Ok(Self {
            config: Arc::new(RwLock::new(config)),
            config_path: None,
        })
    }

    /// Current configuration (clone)
    pub fn get(&self) -> AppConfig {
        self.config.read().clone()
    }

    /// Applies `f`, then normalizes and validates. The stored configuration
    /// is left untouched when validation fails.
    pub fn update<F>(&self, f: F) -> Result<(), CoreError>
    where
        F: FnOnce(&mut AppConfig),
    {
        let mut candidate = self.get();
        f(&mut candidate);
        candidate.normalize();
        candidate.validate()?;
        *self.config.write() = candidate;
        Ok(())
    }

    /// Writes the current configuration as pretty JSON.
    pub fn save_to(&self, path: &Path) -> Result<(), CoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| {
                    CoreError::Config(format!(
                        "failed to create config directory {}: {e}",
                        parent.display()
                    ))
                })?;
            }
        }
        let json = serde_json::to_string_pretty(&*self.config.read())?;
        fs::write(path, json)?;
        info!(path = %path.display(), "config saved");
        Ok(())
    }

    /// File the configuration was loaded from, if any.
    pub fn config_path(&self) -> Option<&Path> {
        self.config_path.as_deref()
    }

    /// Platform config file:
    /// - macOS: `~/Library/Application Support/dev.vigil.vigil/config.json`
    /// - Linux: `~/.config/vigil/config.json`
    /// - Windows: `%APPDATA%\vigil\vigil\config\config.json`
    pub fn default_config_path() -> Option<PathBuf> {
        ProjectDirs::from("dev", "vigil", "vigil").map(|p| p.config_dir().join(CONFIG_FILE_NAME))
    }

    /// Default output root: `<platform data dir>/recordings`, `./recordings`
    /// when no home directory is known.
    pub fn default_output_dir() -> PathBuf {
        ProjectDirs::from("dev", "vigil", "vigil")
            .map(|p| p.data_dir().join("recordings"))
            .unwrap_or_else(|| PathBuf::from("./recordings"))
    }
}
