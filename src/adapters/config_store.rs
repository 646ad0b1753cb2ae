use std::fs;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use crate::domain::{AppConfig, DomainError};
use crate::ports::ConfigStore;

const APP_DIR: &str = "CogniFlow";
const CONFIG_FILE: &str = "config.toml";

/// Configuration kept as `config.toml` in the OS config directory.
///
/// - macOS: ~/Library/Application Support/CogniFlow/
/// - Windows: %APPDATA%\CogniFlow\
/// - Linux: ~/.config/CogniFlow/
pub struct TomlConfigStore {
    data_dir: PathBuf,
}

impl TomlConfigStore {
    pub fn new() -> Result<Self, DomainError> {
        let data_dir = dirs::config_dir()
            .map(|p| p.join(APP_DIR))
            .ok_or_else(|| {
                DomainError::Config("Could not find application config directory".to_string())
            })?;
        Self::with_data_dir(data_dir)
    }

    /// Store rooted at an explicit directory, e.g. from `--config-dir`.
    pub fn with_data_dir(data_dir: PathBuf) -> Result<Self, DomainError> {
        fs::create_dir_all(&data_dir)?;
        info!(data_dir = ?data_dir, "ConfigStore initialized");
        Ok(Self { data_dir })
    }
}

impl ConfigStore for TomlConfigStore {
    fn load(&self) -> Result<AppConfig, DomainError> {
        let path = self.config_path();

        if !path.exists() {
            info!(path = ?path, "No configuration file, writing defaults");
            let config = AppConfig::new();
            self.save(&config)?;
            return Ok(config);
        }

        debug!(path = ?path, "Loading configuration");
        let content = fs::read_to_string(&path)?;
        let config: AppConfig = toml::from_str(&content).map_err(|e| {
            warn!(path = ?path, error = %e, "Configuration file is invalid");
            DomainError::Config(format!("{}: {}", path.display(), e))
        })?;

        if config.model.endpoints.is_empty() {
            // Still loads so the file can be inspected; generation refuses to run.
            warn!(path = ?path, "Configuration lists no model endpoints");
        }

        info!(path = ?path, "Configuration loaded");
        Ok(config)
    }

    fn save(&self, config: &AppConfig) -> Result<(), DomainError> {
        let path = self.config_path();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        fs::write(&path, toml::to_string_pretty(config)?)?;
        info!(path = ?path, "Configuration saved");
        Ok(())
    }

    fn config_path(&self) -> PathBuf {
        self.data_dir.join(CONFIG_FILE)
    }

    fn logs_dir(&self) -> PathBuf {
        dirs::data_local_dir()
            .map(|p| p.join(APP_DIR).join("logs"))
            .unwrap_or_else(|| self.data_dir.join("logs"))
    }

    fn default_export_dir(&self) -> PathBuf {
        std::env::current_dir().unwrap_or_else(|_| self.data_dir.join("exports"))
    }
}
