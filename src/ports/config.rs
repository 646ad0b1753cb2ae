use std::path::PathBuf;

use crate::domain::{AppConfig, DomainError};

/// Port for persisting the application configuration and locating the
/// directories the app writes to.
pub trait ConfigStore: Send + Sync {
    /// Load the configuration, writing the defaults on first run.
    fn load(&self) -> Result<AppConfig, DomainError>;

    /// Persist the configuration.
    fn save(&self, config: &AppConfig) -> Result<(), DomainError>;

    fn config_path(&self) -> PathBuf;

    fn logs_dir(&self) -> PathBuf;

    /// Where artifacts are exported when the config names no directory.
    fn default_export_dir(&self) -> PathBuf;
}
